//! Argument passing descriptors.
//!
//! An [`ArgInfo`] records how one abstract argument or return value
//! crosses the function boundary. Classifiers produce them; the IR mapping
//! and the caller/callee machinery consume them.

use std::fmt;

use crate::types::{Type, VOID};

/// How a single argument or return value is passed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArgInfo<'a> {
    /// Pass directly, coerced into `coerce_to`.
    Direct {
        /// The IR-facing type the value is packed into.
        coerce_to: Type<'a>,
        /// Byte offset within a temporary of the abstract type at which
        /// the coerce-to type starts (slices off a trailing eightbyte).
        offset: u32,
        /// Padding slot type inserted before the argument, or void.
        padding: Type<'a>,
        /// Pass in a register where the convention allows it.
        in_reg: bool,
        /// Whether a struct coerce-to type may be flattened into one IR
        /// argument per field.
        can_be_flattened: bool,
    },

    /// Pass directly with sign/zero extension to register width.
    ExtendInteger {
        /// The IR-facing integer type.
        coerce_to: Type<'a>,
        /// Pass in a register where the convention allows it.
        in_reg: bool,
    },

    /// Pass through a hidden pointer.
    Indirect {
        /// Alignment of the stack copy in bytes; `0` for sret returns,
        /// whose slot carries no byval alignment.
        align: u32,
        /// Whether the pointee is a caller-owned stack copy (`byval`).
        by_val: bool,
        /// Whether the callee must copy to a stricter alignment first.
        realign: bool,
        /// Whether the sret pointer comes after a `this` argument
        /// (IR index 1 instead of 0).
        sret_after_this: bool,
        /// Pass the hidden pointer in a register where the convention
        /// allows it.
        in_reg: bool,
        /// Padding slot type inserted before the argument, or void.
        padding: Type<'a>,
    },

    /// The argument occupies no IR slot (empty records, void returns).
    Ignore,

    /// Flatten the aggregate into one IR argument per leaf scalar.
    Expand {
        /// Whether the padding slot is passed in a register.
        padding_in_reg: bool,
        /// Padding slot type inserted before the argument, or void.
        padding: Type<'a>,
    },

    /// Pass in a field of the argument memory area (`inalloca`).
    InAlloca {
        /// Index of the field within the argument memory struct.
        field_index: u32,
        /// Whether this field implements a struct return.
        sret: bool,
    },
}

impl<'a> ArgInfo<'a> {
    /// Pass directly as `coerce_to`.
    pub fn direct(coerce_to: Type<'a>) -> Self {
        Self::Direct {
            coerce_to,
            offset: 0,
            padding: VOID,
            in_reg: false,
            can_be_flattened: true,
        }
    }

    /// Pass directly as `coerce_to`, sliced from `offset` bytes into the
    /// abstract value.
    pub fn direct_at_offset(coerce_to: Type<'a>, offset: u32) -> Self {
        Self::Direct { coerce_to, offset, padding: VOID, in_reg: false, can_be_flattened: true }
    }

    /// Pass directly in a register.
    pub fn direct_in_reg(coerce_to: Type<'a>) -> Self {
        Self::Direct {
            coerce_to,
            offset: 0,
            padding: VOID,
            in_reg: true,
            can_be_flattened: true,
        }
    }

    /// Pass with integer extension.
    pub fn extend(coerce_to: Type<'a>) -> Self {
        Self::ExtendInteger { coerce_to, in_reg: false }
    }

    /// Pass with integer extension, in a register.
    pub fn extend_in_reg(coerce_to: Type<'a>) -> Self {
        Self::ExtendInteger { coerce_to, in_reg: true }
    }

    /// Pass nothing.
    pub fn ignore() -> Self {
        Self::Ignore
    }

    /// Pass through a hidden byval pointer with the given alignment.
    pub fn indirect(align: u32) -> Self {
        Self::Indirect {
            align,
            by_val: true,
            realign: false,
            sret_after_this: false,
            in_reg: false,
            padding: VOID,
        }
    }

    /// Pass through a hidden pointer that is not a stack copy (sret and
    /// plain reference passing).
    pub fn indirect_no_byval(align: u32) -> Self {
        Self::Indirect {
            align,
            by_val: false,
            realign: false,
            sret_after_this: false,
            in_reg: false,
            padding: VOID,
        }
    }

    /// Pass through a hidden byval pointer that the callee realigns.
    pub fn indirect_realign(align: u32) -> Self {
        Self::Indirect {
            align,
            by_val: true,
            realign: true,
            sret_after_this: false,
            in_reg: false,
            padding: VOID,
        }
    }

    /// Pass through a hidden pointer held in a register.
    pub fn indirect_in_reg(align: u32, by_val: bool) -> Self {
        Self::Indirect {
            align,
            by_val,
            realign: false,
            sret_after_this: false,
            in_reg: true,
            padding: VOID,
        }
    }

    /// Expand into one IR argument per leaf scalar.
    pub fn expand() -> Self {
        Self::Expand { padding_in_reg: false, padding: VOID }
    }

    /// Expand, with a padding slot before the leaves.
    pub fn expand_with_padding(padding_in_reg: bool, padding: Type<'a>) -> Self {
        Self::Expand { padding_in_reg, padding }
    }

    /// Pass in an `inalloca` field.
    pub fn in_alloca(field_index: u32) -> Self {
        Self::InAlloca { field_index, sret: false }
    }

    /// Whether this is a `Direct` descriptor.
    pub fn is_direct(&self) -> bool {
        matches!(self, Self::Direct { .. })
    }

    /// Whether this is an `ExtendInteger` descriptor.
    pub fn is_extend(&self) -> bool {
        matches!(self, Self::ExtendInteger { .. })
    }

    /// Whether this is an `Indirect` descriptor.
    pub fn is_indirect(&self) -> bool {
        matches!(self, Self::Indirect { .. })
    }

    /// Whether this is an `Ignore` descriptor.
    pub fn is_ignore(&self) -> bool {
        matches!(self, Self::Ignore)
    }

    /// Whether this is an `Expand` descriptor.
    pub fn is_expand(&self) -> bool {
        matches!(self, Self::Expand { .. })
    }

    /// The coerce-to type of a `Direct` or `ExtendInteger` descriptor.
    pub fn coerce_to(&self) -> Option<Type<'a>> {
        match self {
            Self::Direct { coerce_to, .. } | Self::ExtendInteger { coerce_to, .. } => {
                Some(*coerce_to)
            }
            _ => None,
        }
    }

    /// The padding slot type, or void when there is none.
    pub fn padding(&self) -> Type<'a> {
        match self {
            Self::Direct { padding, .. }
            | Self::Indirect { padding, .. }
            | Self::Expand { padding, .. } => *padding,
            _ => VOID,
        }
    }
}

impl fmt::Display for ArgInfo<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Direct { coerce_to, offset, .. } => {
                write!(f, "direct({coerce_to}")?;
                if *offset != 0 {
                    write!(f, " @{offset}")?;
                }
                write!(f, ")")
            }
            Self::ExtendInteger { coerce_to, .. } => write!(f, "extend({coerce_to})"),
            Self::Indirect { align, by_val, realign, .. } => {
                write!(f, "indirect(align {align}")?;
                if *by_val {
                    write!(f, ", byval")?;
                }
                if *realign {
                    write!(f, ", realign")?;
                }
                write!(f, ")")
            }
            Self::Ignore => write!(f, "ignore"),
            Self::Expand { .. } => write!(f, "expand"),
            Self::InAlloca { field_index, .. } => write!(f, "inalloca({field_index})"),
        }
    }
}
