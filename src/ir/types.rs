//! Machine-level IR types and lowered function signatures.

use std::fmt;

/// A lowered IR type, mirroring the LLVM first-class type grammar this
/// crate targets. Pointers are opaque (address space 0).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    /// The void type; only valid as a return type.
    Void,
    /// An integer of the given bit width. Widths need not be powers of
    /// two (`i24` slices the tail of an aggregate).
    Int(u32),
    /// Half-precision float.
    Half,
    /// 32-bit float.
    Float,
    /// 64-bit float.
    Double,
    /// 80-bit x87 extended precision float.
    X86Fp80,
    /// 128-bit float.
    Fp128,
    /// An opaque pointer.
    Ptr,
    /// A literal struct with the given field types.
    Struct(Vec<Type>),
    /// A fixed-length array.
    Array(u64, Box<Type>),
    /// A vector with the given lane count and type.
    Vector(u64, Box<Type>),
}

impl Type {
    /// Shorthand for an integer type of `bits` width.
    pub fn int(bits: u32) -> Self {
        Self::Int(bits)
    }

    /// Shorthand for a vector type.
    pub fn vector(lanes: u64, lane: Type) -> Self {
        Self::Vector(lanes, Box::new(lane))
    }

    /// Whether this is the void type.
    pub fn is_void(&self) -> bool {
        matches!(self, Self::Void)
    }

    /// Whether this is an integer type.
    pub fn is_int(&self) -> bool {
        matches!(self, Self::Int(_))
    }

    /// Whether this is the pointer type.
    pub fn is_ptr(&self) -> bool {
        matches!(self, Self::Ptr)
    }

    /// Whether this is a struct type.
    pub fn is_struct(&self) -> bool {
        matches!(self, Self::Struct(_))
    }

    /// The fields of a struct type, or an empty slice otherwise.
    pub fn struct_fields(&self) -> &[Type] {
        match self {
            Self::Struct(fields) => fields,
            _ => &[],
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Void => write!(f, "void"),
            Self::Int(bits) => write!(f, "i{bits}"),
            Self::Half => write!(f, "half"),
            Self::Float => write!(f, "float"),
            Self::Double => write!(f, "double"),
            Self::X86Fp80 => write!(f, "x86_fp80"),
            Self::Fp128 => write!(f, "fp128"),
            Self::Ptr => write!(f, "ptr"),
            Self::Struct(fields) => {
                write!(f, "{{")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{field}")?;
                }
                write!(f, "}}")
            }
            Self::Array(count, element) => write!(f, "[{count} x {element}]"),
            Self::Vector(count, element) => write!(f, "<{count} x {element}>"),
        }
    }
}

/// A lowered, ABI-correct function signature.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    /// The IR return type. `Void` for indirect (sret) returns.
    pub return_type: Type,
    /// The IR parameter types, including any sret and padding slots.
    pub params: Vec<Type>,
    /// Whether the function takes further variadic arguments.
    pub is_var_arg: bool,
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}(", self.return_type)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{param}")?;
        }
        if self.is_var_arg {
            if !self.params.is_empty() {
                write!(f, ", ")?;
            }
            write!(f, "...")?;
        }
        write!(f, ")")
    }
}

/// Backend calling convention ids, numbered like LLVM's `CallingConv`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum CallConv {
    /// The C calling convention.
    C = 0,
    /// `x86_stdcallcc`.
    X86StdCall = 64,
    /// `x86_fastcallcc`.
    X86FastCall = 65,
    /// `x86_thiscallcc`.
    X86ThisCall = 70,
    /// `x86_vectorcallcc`.
    X86VectorCall = 80,
}

impl CallConv {
    /// The numeric backend id.
    pub fn id(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for CallConv {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            Self::C => "ccc",
            Self::X86StdCall => "x86_stdcallcc",
            Self::X86FastCall => "x86_fastcallcc",
            Self::X86ThisCall => "x86_thiscallcc",
            Self::X86VectorCall => "x86_vectorcallcc",
        })
    }
}
