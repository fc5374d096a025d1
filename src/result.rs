//! Result and error types representing the outcome of lowering a signature.

use std::fmt;

use target_lexicon::Triple;

use crate::callconv::CallingConvention;

/// A lowering error.
///
/// Errors are fatal to the lowering that produced them; there is no partial
/// state to recover. The embedder is expected to report them to its own
/// user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AbiError {
    /// The target architecture of the given triple has no ABI
    /// implementation in this crate.
    UnsupportedTriple(Triple),

    /// The requested calling convention cannot be used on this target.
    InvalidCallConv(CallingConvention),

    /// The selected CPU only exists in 32-bit mode but the triple is
    /// 64-bit (or vice versa).
    InvalidArchForMode(String),

    /// A malformed abstract type was given: an explicit struct member
    /// offset behind the running layout offset, or a zero-length array.
    InvalidType(String),

    /// A lowering path that is recognized but not implemented, such as the
    /// Win64 argument classifier or expansion of complex values.
    Unimplemented(&'static str),

    /// The injected call emitter produced a return value for a `void`
    /// lowered return type, or failed to produce one for a non-`void`
    /// lowered return type.
    EmitterContract,
}

/// A convenient alias for a `Result` that uses `AbiError` as the error type.
pub type AbiResult<T> = Result<T, AbiError>;

impl fmt::Display for AbiError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::UnsupportedTriple(triple) => {
                write!(f, "no ABI available for triple: {triple}")
            }
            Self::InvalidCallConv(cc) => {
                write!(f, "calling convention not supported by target: {cc}")
            }
            Self::InvalidArchForMode(cpu) => {
                write!(f, "CPU '{cpu}' is not valid for the selected mode")
            }
            Self::InvalidType(msg) => write!(f, "malformed abstract type: {msg}"),
            Self::Unimplemented(what) => write!(f, "unimplemented ABI path: {what}"),
            Self::EmitterContract => {
                write!(f, "call emitter result does not match the lowered return type")
            }
        }
    }
}

impl std::error::Error for AbiError {}
