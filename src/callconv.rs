//! Calling convention identifiers.
//!
//! The abstract [`CallingConvention`] tags come from the front-end and name
//! the source-level convention of a function. Each ABI maps the tags it
//! supports onto a backend [`ir::CallConv`](crate::ir::CallConv) id and
//! rejects the rest.

use std::fmt;
use std::str;

/// Source-level calling convention tags.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CallingConvention {
    /// Default C calling convention.
    CDefault,
    /// Default C++ calling convention.
    CppDefault,
    /// `cdecl`.
    CDecl,
    /// `stdcall`.
    StdCall,
    /// `fastcall`.
    FastCall,
    /// `thiscall`.
    ThisCall,
    /// `pascal`.
    Pascal,
    /// MSVC convention that passes vectors and vector aggregates in SSE
    /// registers.
    VectorCall,
}

impl fmt::Display for CallingConvention {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            Self::CDefault => "c",
            Self::CppDefault => "c++",
            Self::CDecl => "cdecl",
            Self::StdCall => "stdcall",
            Self::FastCall => "fastcall",
            Self::ThisCall => "thiscall",
            Self::Pascal => "pascal",
            Self::VectorCall => "vectorcall",
        })
    }
}

impl str::FromStr for CallingConvention {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "c" => Ok(Self::CDefault),
            "c++" => Ok(Self::CppDefault),
            "cdecl" => Ok(Self::CDecl),
            "stdcall" => Ok(Self::StdCall),
            "fastcall" => Ok(Self::FastCall),
            "thiscall" => Ok(Self::ThisCall),
            "pascal" => Ok(Self::Pascal),
            "vectorcall" => Ok(Self::VectorCall),
            _ => Err(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_round_trips() {
        for cc in [
            CallingConvention::CDefault,
            CallingConvention::CppDefault,
            CallingConvention::CDecl,
            CallingConvention::StdCall,
            CallingConvention::FastCall,
            CallingConvention::ThisCall,
            CallingConvention::Pascal,
            CallingConvention::VectorCall,
        ] {
            assert_eq!(cc.to_string().parse::<CallingConvention>(), Ok(cc));
        }
    }
}
