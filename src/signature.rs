//! Abstract function signatures.

use std::fmt;

use smallvec::SmallVec;

use crate::callconv::CallingConvention;
use crate::types::Type;

/// An abstract function signature: the return type, the fixed argument
/// types, whether the function is variadic, and its source-level calling
/// convention.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FunctionType<'a> {
    return_type: Type<'a>,
    argument_types: SmallVec<[Type<'a>; 8]>,
    is_var_arg: bool,
    call_conv: CallingConvention,
}

impl<'a> FunctionType<'a> {
    /// Create a signature with the default C calling convention.
    pub fn new(return_type: Type<'a>, argument_types: &[Type<'a>], is_var_arg: bool) -> Self {
        Self {
            return_type,
            argument_types: SmallVec::from_slice(argument_types),
            is_var_arg,
            call_conv: CallingConvention::CDefault,
        }
    }

    /// Replace the calling convention.
    pub fn with_call_conv(mut self, call_conv: CallingConvention) -> Self {
        self.call_conv = call_conv;
        self
    }

    /// The return type.
    pub fn return_type(&self) -> Type<'a> {
        self.return_type
    }

    /// The fixed argument types.
    pub fn argument_types(&self) -> &[Type<'a>] {
        &self.argument_types
    }

    /// Whether the function accepts further variadic arguments.
    pub fn is_var_arg(&self) -> bool {
        self.is_var_arg
    }

    /// The source-level calling convention.
    pub fn call_conv(&self) -> CallingConvention {
        self.call_conv
    }
}

impl fmt::Display for FunctionType<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}(", self.return_type)?;
        for (i, arg) in self.argument_types.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{arg}")?;
        }
        if self.is_var_arg {
            if !self.argument_types.is_empty() {
                write!(f, ", ")?;
            }
            write!(f, "...")?;
        }
        write!(f, ") {}", self.call_conv)
    }
}
