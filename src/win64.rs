//! The Win64 ABI facade.
//!
//! Only the name and calling-convention mapping are implemented; the
//! Win64 argument classifier is not, and every lowering entry point
//! reports it as such.

use crate::callconv::CallingConvention;
use crate::ir;
use crate::result::{AbiError, AbiResult};

/// The Win64 ABI facade stub.
pub struct Win64Abi {
    _private: (),
}

impl Win64Abi {
    /// Create the Win64 facade.
    pub fn new() -> Self {
        Self { _private: () }
    }

    /// The ABI's short name.
    pub fn name(&self) -> &'static str {
        "Win64"
    }

    /// Map a source-level calling convention onto the backend id.
    pub fn calling_convention(&self, cc: CallingConvention) -> AbiResult<ir::CallConv> {
        match cc {
            CallingConvention::CDefault | CallingConvention::CppDefault => Ok(ir::CallConv::C),
            _ => Err(AbiError::InvalidCallConv(cc)),
        }
    }

    /// Every lowering operation on this target is unimplemented.
    pub fn unimplemented<T>(&self) -> AbiResult<T> {
        Err(AbiError::Unimplemented("Win64 argument classification"))
    }
}

impl Default for Win64Abi {
    fn default() -> Self {
        Self::new()
    }
}
