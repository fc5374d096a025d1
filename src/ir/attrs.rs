//! Function and parameter attribute sets for lowered signatures.
//!
//! Attributes carry the part of the ABI contract that does not fit in the
//! type grammar: extension of small integers, hidden struct-return and
//! byval pointers, and the register hints some conventions use. The model
//! is deliberately small; the embedder translates it into its own IR
//! attribute representation.

use std::fmt;

use smallvec::SmallVec;

/// A function-level attribute.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FnAttr {
    /// The function reads and writes no memory.
    ///
    /// Cleared by the lowering whenever any argument goes through a
    /// hidden pointer, which the callee must dereference.
    ReadNone,
    /// The function writes no memory. Cleared like `ReadNone`.
    ReadOnly,
    /// The function never unwinds.
    NoUnwind,
    /// The function never returns.
    NoReturn,
}

/// A parameter-level attribute.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamAttr {
    /// Hidden pointer to the return slot.
    SRet,
    /// Pass-by-value through a pointer to a stack copy, with the given
    /// byte alignment.
    ByVal {
        /// Alignment of the stack copy in bytes.
        align: u32,
    },
    /// Sign-extend the value to register width.
    SExt,
    /// Zero-extend the value to register width.
    ZExt,
    /// Pass in a register where the convention allows it.
    InReg,
    /// The pointer does not alias any other argument.
    NoAlias,
    /// The callee does not retain the pointer.
    NoCapture,
}

impl ParamAttr {
    fn same_kind(self, other: ParamAttr) -> bool {
        matches!(
            (self, other),
            (Self::SRet, Self::SRet)
                | (Self::ByVal { .. }, Self::ByVal { .. })
                | (Self::SExt, Self::SExt)
                | (Self::ZExt, Self::ZExt)
                | (Self::InReg, Self::InReg)
                | (Self::NoAlias, Self::NoAlias)
                | (Self::NoCapture, Self::NoCapture)
        )
    }
}

/// The attributes of a lowered function: one set for the function itself
/// and one per lowered IR parameter.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AttributeSet {
    fn_attrs: SmallVec<[FnAttr; 2]>,
    params: Vec<SmallVec<[ParamAttr; 2]>>,
}

impl AttributeSet {
    /// An empty attribute set.
    pub fn new() -> Self {
        Self::default()
    }

    /// The function-level attributes.
    pub fn fn_attrs(&self) -> &[FnAttr] {
        &self.fn_attrs
    }

    /// Whether the function carries `attr`.
    pub fn has_fn_attr(&self, attr: FnAttr) -> bool {
        self.fn_attrs.contains(&attr)
    }

    /// Add a function-level attribute.
    pub fn add_fn_attr(&mut self, attr: FnAttr) {
        if !self.fn_attrs.contains(&attr) {
            self.fn_attrs.push(attr);
        }
    }

    /// Remove a function-level attribute if present.
    pub fn remove_fn_attr(&mut self, attr: FnAttr) {
        self.fn_attrs.retain(|a| *a != attr);
    }

    /// The attributes of the IR parameter at `index`.
    pub fn param_attrs(&self, index: usize) -> &[ParamAttr] {
        self.params.get(index).map(|attrs| attrs.as_slice()).unwrap_or(&[])
    }

    /// Add an attribute to the IR parameter at `index`, replacing any
    /// existing attribute of the same kind.
    pub fn add_param_attr(&mut self, index: usize, attr: ParamAttr) {
        if self.params.len() <= index {
            self.params.resize_with(index + 1, SmallVec::new);
        }
        let attrs = &mut self.params[index];
        attrs.retain(|a| !a.same_kind(attr));
        attrs.push(attr);
    }

    /// Whether the IR parameter at `index` carries an attribute of the
    /// same kind as `attr`.
    pub fn has_param_attr(&self, index: usize, attr: ParamAttr) -> bool {
        self.param_attrs(index).iter().any(|a| a.same_kind(attr))
    }
}

impl fmt::Display for AttributeSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "fn{:?}", self.fn_attrs)?;
        for (i, attrs) in self.params.iter().enumerate() {
            if !attrs.is_empty() {
                write!(f, " arg{i}{attrs:?}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn param_attr_replacement() {
        let mut attrs = AttributeSet::new();
        attrs.add_param_attr(2, ParamAttr::ByVal { align: 4 });
        attrs.add_param_attr(2, ParamAttr::ByVal { align: 8 });
        assert_eq!(attrs.param_attrs(2), &[ParamAttr::ByVal { align: 8 }]);
        assert!(attrs.param_attrs(0).is_empty());
    }

    #[test]
    fn fn_attr_add_remove() {
        let mut attrs = AttributeSet::new();
        attrs.add_fn_attr(FnAttr::ReadNone);
        attrs.add_fn_attr(FnAttr::ReadNone);
        assert_eq!(attrs.fn_attrs().len(), 1);
        attrs.remove_fn_attr(FnAttr::ReadNone);
        assert!(!attrs.has_fn_attr(FnAttr::ReadNone));
    }
}
