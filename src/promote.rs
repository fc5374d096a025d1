//! Default argument promotions for variadic calls.
//!
//! Arguments passed in the `...` of a variadic function undergo the C
//! default promotions before classification: small integers widen to
//! `int`/`unsigned int` and `float` widens to `double`. Fixed arguments
//! are never touched.

use smallvec::SmallVec;

use crate::ir::{Builder, TypedValue};
use crate::signature::FunctionType;
use crate::type_info::AbiTypeInfo;
use crate::types::{IntKind, Type, DOUBLE, INT, UINT};

/// Applies integer and float promotions to variadic arguments.
pub struct TypePromoter<'a, 'f> {
    type_info: &'f dyn AbiTypeInfo<'a>,
}

impl<'a, 'f> TypePromoter<'a, 'f> {
    /// Create a promoter over the given oracle.
    pub fn new(type_info: &'f dyn AbiTypeInfo<'a>) -> Self {
        Self { type_info }
    }

    /// The type `ty` promotes to in a variadic position, or `None` when
    /// it passes through unchanged.
    pub fn promoted_type(&self, ty: Type<'a>) -> Option<Type<'a>> {
        if ty.is_unspecified_width_integer() {
            match ty.integer_kind() {
                IntKind::Char => {
                    Some(if self.type_info.is_char_signed() { INT } else { UINT })
                }
                IntKind::Bool | IntKind::SChar | IntKind::Short => Some(INT),
                IntKind::UChar | IntKind::UShort => Some(UINT),
                _ => None,
            }
        } else if ty.is_float() {
            Some(DOUBLE)
        } else {
            None
        }
    }

    /// Widen `value` to `target`, emitting the matching extension.
    fn promote_value(
        &self,
        builder: &mut dyn Builder,
        value: TypedValue<'a>,
        target: Type<'a>,
    ) -> TypedValue<'a> {
        let target_ir = self.type_info.ir_type(target);
        let widened = if value.ty.is_integer() {
            if value
                .ty
                .has_signed_integer_representation(self.type_info.is_char_signed())
            {
                builder.sext(value.value, &target_ir)
            } else {
                builder.zext(value.value, &target_ir)
            }
        } else {
            builder.fpext(value.value, &target_ir)
        };
        TypedValue::new(widened, target)
    }

    /// Promote a single variadic argument value.
    pub fn promote_var_args_argument(
        &self,
        builder: &mut dyn Builder,
        value: TypedValue<'a>,
    ) -> TypedValue<'a> {
        match self.promoted_type(value.ty) {
            Some(target) => self.promote_value(builder, value, target),
            None => value,
        }
    }

    /// Promote every argument beyond the fixed prefix of `function_type`,
    /// passing fixed arguments through untouched.
    pub fn promote_arguments(
        &self,
        builder: &mut dyn Builder,
        function_type: &FunctionType<'a>,
        arguments: &[TypedValue<'a>],
    ) -> SmallVec<[TypedValue<'a>; 8]> {
        let num_fixed = function_type.argument_types().len();
        arguments
            .iter()
            .enumerate()
            .map(|(i, &arg)| {
                if i >= num_fixed {
                    self.promote_var_args_argument(builder, arg)
                } else {
                    arg
                }
            })
            .collect()
    }

    /// The types-only counterpart of
    /// [`promote_arguments`](Self::promote_arguments), used where no
    /// values exist yet (attribute computation).
    pub fn promote_argument_types(
        &self,
        function_type: &FunctionType<'a>,
        argument_types: &[Type<'a>],
    ) -> SmallVec<[Type<'a>; 8]> {
        let num_fixed = function_type.argument_types().len();
        argument_types
            .iter()
            .enumerate()
            .map(|(i, &ty)| {
                if i >= num_fixed {
                    self.promoted_type(ty).unwrap_or(ty)
                } else {
                    ty
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TypeBuilder, BOOL, CHAR, FLOAT, LONG_LONG, POINTER, SHORT, UCHAR, VOID};
    use crate::x86_64::cpu::{cpu_features, CpuKind};
    use crate::x86_64::type_info::TypeInfo;
    use std::str::FromStr;
    use target_lexicon::Triple;

    fn type_info<'a>(types: &'a TypeBuilder<'a>) -> TypeInfo<'a> {
        let triple = Triple::from_str("x86_64-unknown-linux-gnu").unwrap();
        TypeInfo::new(types, cpu_features(&triple, CpuKind::X86_64))
    }

    #[test]
    fn variadic_promotions() {
        let types = TypeBuilder::new();
        let ti = type_info(&types);
        let promoter = TypePromoter::new(&ti);

        assert_eq!(promoter.promoted_type(BOOL), Some(INT));
        assert_eq!(promoter.promoted_type(CHAR), Some(INT));
        assert_eq!(promoter.promoted_type(UCHAR), Some(UINT));
        assert_eq!(promoter.promoted_type(SHORT), Some(INT));
        assert_eq!(promoter.promoted_type(FLOAT), Some(DOUBLE));
        assert_eq!(promoter.promoted_type(INT), None);
        assert_eq!(promoter.promoted_type(LONG_LONG), None);
        assert_eq!(promoter.promoted_type(DOUBLE), None);
        assert_eq!(promoter.promoted_type(POINTER), None);
    }

    #[test]
    fn fixed_arguments_are_untouched() {
        let types = TypeBuilder::new();
        let ti = type_info(&types);
        let promoter = TypePromoter::new(&ti);

        // promote(args) over the fixed prefix is the identity.
        let fty = FunctionType::new(VOID, &[CHAR, SHORT, FLOAT], false);
        let arg_types = [CHAR, SHORT, FLOAT];
        let promoted = promoter.promote_argument_types(&fty, &arg_types);
        assert_eq!(promoted.as_slice(), &arg_types);
    }

    #[test]
    fn variadic_tail_is_promoted() {
        let types = TypeBuilder::new();
        let ti = type_info(&types);
        let promoter = TypePromoter::new(&ti);

        let fty = FunctionType::new(VOID, &[INT], true);
        let arg_types = [INT, FLOAT, CHAR];
        let promoted = promoter.promote_argument_types(&fty, &arg_types);
        assert_eq!(promoted.as_slice(), &[INT, DOUBLE, INT]);
    }
}
