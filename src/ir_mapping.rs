//! Mapping from classified arguments to the concrete IR argument layout.
//!
//! The classifier says *how* each abstract argument is passed; this module
//! decides *where*: which contiguous range of IR arguments each abstract
//! argument occupies, where the hidden sret pointer lands, how many IR
//! arguments the function has in total, and what the lowered signature and
//! attribute set look like.

use smallvec::SmallVec;

use crate::arg_info::ArgInfo;
use crate::ir;
use crate::ir::attrs::{AttributeSet, FnAttr, ParamAttr};
use crate::result::{AbiError, AbiResult};
use crate::signature::FunctionType;
use crate::type_info::AbiTypeInfo;
use crate::types::Type;

/// Where one abstract argument lands in the IR argument list.
///
/// The abstract argument expands to the IR arguments in the range
/// `[first_ir_arg, first_ir_arg + number_of_ir_args)`, preceded by an
/// optional padding argument.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArgIRMapping<'a> {
    /// Index of the padding IR argument, if one is inserted.
    pub padding_arg_index: Option<u32>,
    /// Index of the first IR argument backing this abstract argument.
    pub first_ir_arg: u32,
    /// Number of IR arguments backing this abstract argument.
    pub number_of_ir_args: u32,
    /// How the argument is passed.
    pub arg_info: ArgInfo<'a>,
}

/// The complete mapping from an abstract signature to its IR layout.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FunctionIRMapping<'a> {
    return_info: ArgInfo<'a>,
    sret_arg_index: Option<u32>,
    inalloca_arg_index: Option<u32>,
    arguments: SmallVec<[ArgIRMapping<'a>; 8]>,
    total_ir_args: u32,
}

impl<'a> FunctionIRMapping<'a> {
    /// How the return value is passed.
    pub fn return_info(&self) -> &ArgInfo<'a> {
        &self.return_info
    }

    /// The IR argument index of the hidden sret pointer, if any. Always 0,
    /// or 1 when the sret pointer follows a `this` argument.
    pub fn sret_arg_index(&self) -> Option<u32> {
        self.sret_arg_index
    }

    /// The IR argument index of the `inalloca` memory area, if any.
    pub fn inalloca_arg_index(&self) -> Option<u32> {
        self.inalloca_arg_index
    }

    /// Per-abstract-argument mappings, in argument order.
    pub fn arguments(&self) -> &[ArgIRMapping<'a>] {
        &self.arguments
    }

    /// Total number of IR arguments.
    pub fn total_ir_args(&self) -> u32 {
        self.total_ir_args
    }

    /// The IR argument range of abstract argument `index`.
    pub fn ir_arg_range(&self, index: usize) -> (u32, u32) {
        let arg = &self.arguments[index];
        (arg.first_ir_arg, arg.number_of_ir_args)
    }
}

/// The number of leaf scalars an expanded `ty` flattens to: arrays by
/// element count, structs by field, unions by their single largest member.
pub fn expansion_size<'a>(type_info: &dyn AbiTypeInfo<'a>, ty: Type<'a>) -> AbiResult<u32> {
    if ty.is_array() {
        let per_element = expansion_size(type_info, ty.array_element_type())?;
        Ok(per_element * ty.array_element_count() as u32)
    } else if ty.is_struct() {
        let mut total = 0;
        for member in ty.struct_members() {
            total += expansion_size(type_info, member.ty())?;
        }
        Ok(total)
    } else if ty.is_union() {
        match largest_union_member(type_info, ty) {
            Some(member) => expansion_size(type_info, member),
            None => Ok(0),
        }
    } else if ty.is_complex() {
        Err(AbiError::Unimplemented("expansion of complex values"))
    } else if ty.is_void() {
        Ok(0)
    } else {
        Ok(1)
    }
}

/// The single largest member of a union, which stands in for the whole
/// union in flattened contexts.
pub fn largest_union_member<'a>(
    type_info: &dyn AbiTypeInfo<'a>,
    ty: Type<'a>,
) -> Option<Type<'a>> {
    let mut largest: Option<(crate::size::DataSize, Type<'a>)> = None;
    for member in ty.union_members() {
        let size = type_info.alloc_size(*member);
        if largest.map_or(true, |(max, _)| size > max) {
            largest = Some((size, *member));
        }
    }
    largest.map(|(_, member)| member)
}

/// Collect the IR types of the leaf scalars of an expanded `ty`, in
/// flattening order.
pub fn expanded_types<'a>(
    type_info: &dyn AbiTypeInfo<'a>,
    ty: Type<'a>,
    out: &mut Vec<ir::Type>,
) -> AbiResult<()> {
    if ty.is_array() {
        for _ in 0..ty.array_element_count() {
            expanded_types(type_info, ty.array_element_type(), out)?;
        }
        Ok(())
    } else if ty.is_struct() {
        for member in ty.struct_members() {
            expanded_types(type_info, member.ty(), out)?;
        }
        Ok(())
    } else if ty.is_union() {
        if let Some(member) = largest_union_member(type_info, ty) {
            expanded_types(type_info, member, out)?;
        }
        Ok(())
    } else if ty.is_complex() {
        Err(AbiError::Unimplemented("expansion of complex values"))
    } else if ty.is_void() {
        Ok(())
    } else {
        out.push(type_info.ir_type(ty));
        Ok(())
    }
}

/// Lay out the IR arguments for a classified signature. Element 0 of
/// `arg_infos` describes the return.
pub fn function_ir_mapping<'a>(
    type_info: &dyn AbiTypeInfo<'a>,
    arg_infos: &[ArgInfo<'a>],
    argument_types: &[Type<'a>],
) -> AbiResult<FunctionIRMapping<'a>> {
    debug_assert!(!arg_infos.is_empty());
    debug_assert_eq!(arg_infos.len() - 1, argument_types.len());

    let return_info = arg_infos[0];
    let mut ir_arg_index: u32 = 0;
    let mut sret_arg_index = None;
    let mut swap_this_with_sret = false;

    if let ArgInfo::Indirect { sret_after_this, .. } = return_info {
        swap_this_with_sret = sret_after_this;
        sret_arg_index = Some(if swap_this_with_sret {
            1
        } else {
            let index = ir_arg_index;
            ir_arg_index += 1;
            index
        });
    }

    let mut arguments = SmallVec::new();

    for (arg_info, &arg_type) in arg_infos[1..].iter().zip(argument_types) {
        let padding_arg_index = if !arg_info.padding().is_void() {
            let index = ir_arg_index;
            ir_arg_index += 1;
            Some(index)
        } else {
            None
        };

        let number_of_ir_args = match arg_info {
            ArgInfo::Direct { coerce_to, can_be_flattened, .. } => {
                if *can_be_flattened && coerce_to.is_struct() {
                    coerce_to.struct_members().len() as u32
                } else {
                    1
                }
            }
            ArgInfo::ExtendInteger { .. } | ArgInfo::Indirect { .. } => 1,
            ArgInfo::Ignore | ArgInfo::InAlloca { .. } => 0,
            ArgInfo::Expand { .. } => expansion_size(type_info, arg_type)?,
        };

        let first_ir_arg = ir_arg_index;
        ir_arg_index += number_of_ir_args;

        // Skip over the sret parameter when it comes second; it was
        // assigned index 1 above.
        if ir_arg_index == 1 && swap_this_with_sret {
            ir_arg_index += 1;
        }

        arguments.push(ArgIRMapping {
            padding_arg_index,
            first_ir_arg,
            number_of_ir_args,
            arg_info: *arg_info,
        });
    }

    let mapping = FunctionIRMapping {
        return_info,
        sret_arg_index,
        inalloca_arg_index: None,
        arguments,
        total_ir_args: ir_arg_index,
    };

    if cfg!(debug_assertions) {
        for arg in mapping.arguments() {
            debug_assert!(arg.first_ir_arg + arg.number_of_ir_args <= mapping.total_ir_args());
        }
    }

    Ok(mapping)
}

/// Build the lowered IR signature for a mapped function.
pub fn ir_signature<'a>(
    type_info: &dyn AbiTypeInfo<'a>,
    function_type: &FunctionType<'a>,
    mapping: &FunctionIRMapping<'a>,
) -> AbiResult<ir::Signature> {
    let return_type = match mapping.return_info() {
        ArgInfo::Expand { .. } => unreachable!("expand is not a return kind"),
        ArgInfo::Direct { coerce_to, .. } | ArgInfo::ExtendInteger { coerce_to, .. } => {
            type_info.ir_type(*coerce_to)
        }
        // sret lowerings return nothing by value; the Win32 inalloca sret
        // variant returns the sret pointer itself.
        ArgInfo::InAlloca { sret: true, .. } => ir::Type::Ptr,
        ArgInfo::InAlloca { sret: false, .. } | ArgInfo::Indirect { .. } | ArgInfo::Ignore => {
            ir::Type::Void
        }
    };

    let mut params = vec![ir::Type::Void; mapping.total_ir_args() as usize];

    if let Some(sret_index) = mapping.sret_arg_index() {
        params[sret_index as usize] = ir::Type::Ptr;
    }

    for (arg, &arg_type) in mapping.arguments().iter().zip(function_type.argument_types()) {
        if let Some(padding_index) = arg.padding_arg_index {
            params[padding_index as usize] = type_info.ir_type(arg.arg_info.padding());
        }

        let first = arg.first_ir_arg as usize;
        match &arg.arg_info {
            ArgInfo::Ignore | ArgInfo::InAlloca { .. } => {
                debug_assert_eq!(arg.number_of_ir_args, 0);
            }

            ArgInfo::Indirect { .. } => {
                debug_assert_eq!(arg.number_of_ir_args, 1);
                params[first] = ir::Type::Ptr;
            }

            ArgInfo::Direct { coerce_to, can_be_flattened, .. } => {
                // Scalars are friendlier to the backend than first-class
                // aggregates, so flattenable struct coercions become one
                // IR argument per field.
                if *can_be_flattened && coerce_to.is_struct() {
                    debug_assert_eq!(
                        arg.number_of_ir_args as usize,
                        coerce_to.struct_members().len()
                    );
                    for (i, member) in coerce_to.struct_members().iter().enumerate() {
                        params[first + i] = type_info.ir_type(member.ty());
                    }
                } else {
                    debug_assert_eq!(arg.number_of_ir_args, 1);
                    params[first] = type_info.ir_type(*coerce_to);
                }
            }

            ArgInfo::ExtendInteger { coerce_to, .. } => {
                debug_assert_eq!(arg.number_of_ir_args, 1);
                params[first] = type_info.ir_type(*coerce_to);
            }

            ArgInfo::Expand { .. } => {
                let mut leaves = Vec::with_capacity(arg.number_of_ir_args as usize);
                expanded_types(type_info, arg_type, &mut leaves)?;
                debug_assert_eq!(leaves.len(), arg.number_of_ir_args as usize);
                params[first..first + leaves.len()].clone_from_slice(&leaves);
            }
        }
    }

    Ok(ir::Signature { return_type, params, is_var_arg: function_type.is_var_arg() })
}

/// Build the attribute set for a mapped function, preserving `existing`
/// attributes except where the lowering must override them.
pub fn function_attributes<'a>(
    type_info: &dyn AbiTypeInfo<'a>,
    mapping: &FunctionIRMapping<'a>,
    existing: AttributeSet,
) -> AttributeSet {
    let mut attrs = existing;

    let mut any_indirect = mapping.return_info().is_indirect();

    if let Some(sret_index) = mapping.sret_arg_index() {
        attrs.add_param_attr(sret_index as usize, ParamAttr::SRet);
        attrs.add_param_attr(sret_index as usize, ParamAttr::NoAlias);
    }

    for arg in mapping.arguments() {
        let first = arg.first_ir_arg as usize;
        match &arg.arg_info {
            ArgInfo::Indirect { align, by_val, in_reg, .. } => {
                any_indirect = true;
                if *by_val {
                    attrs.add_param_attr(first, ParamAttr::ByVal { align: *align });
                } else {
                    // A plain reference-passed aggregate: the callee sees
                    // a fresh pointer it must not retain.
                    attrs.add_param_attr(first, ParamAttr::NoAlias);
                    attrs.add_param_attr(first, ParamAttr::NoCapture);
                }
                if *in_reg {
                    attrs.add_param_attr(first, ParamAttr::InReg);
                }
            }

            ArgInfo::ExtendInteger { coerce_to, in_reg } => {
                let signed = coerce_to
                    .has_signed_integer_representation(type_info.is_char_signed());
                attrs.add_param_attr(
                    first,
                    if signed { ParamAttr::SExt } else { ParamAttr::ZExt },
                );
                if *in_reg {
                    attrs.add_param_attr(first, ParamAttr::InReg);
                }
            }

            ArgInfo::Direct { in_reg, .. } => {
                if *in_reg {
                    for i in 0..arg.number_of_ir_args {
                        attrs.add_param_attr(first + i as usize, ParamAttr::InReg);
                    }
                }
            }

            ArgInfo::Expand { padding_in_reg, .. } => {
                if *padding_in_reg {
                    if let Some(padding_index) = arg.padding_arg_index {
                        attrs.add_param_attr(padding_index as usize, ParamAttr::InReg);
                    }
                }
            }

            ArgInfo::Ignore | ArgInfo::InAlloca { .. } => {}
        }
    }

    // A hidden pointer argument observes memory, so the function can no
    // longer claim to be free of memory access.
    if any_indirect {
        attrs.remove_fn_attr(FnAttr::ReadNone);
        attrs.remove_fn_attr(FnAttr::ReadOnly);
    }

    attrs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TypeBuilder, DOUBLE, FLOAT, INT, VOID};

    use crate::x86_64::cpu::{cpu_features, CpuKind};
    use crate::x86_64::type_info::TypeInfo;
    use std::str::FromStr;
    use target_lexicon::Triple;

    fn type_info<'a>(types: &'a TypeBuilder<'a>) -> TypeInfo<'a> {
        let triple = Triple::from_str("x86_64-unknown-linux-gnu").unwrap();
        TypeInfo::new(types, cpu_features(&triple, CpuKind::X86_64))
    }

    #[test]
    fn sret_occupies_index_zero() {
        let types = TypeBuilder::new();
        let ti = type_info(&types);

        let arg_infos = [ArgInfo::indirect_no_byval(0), ArgInfo::direct(INT)];
        let mapping = function_ir_mapping(&ti, &arg_infos, &[INT]).unwrap();
        assert_eq!(mapping.sret_arg_index(), Some(0));
        assert_eq!(mapping.ir_arg_range(0), (1, 1));
        assert_eq!(mapping.total_ir_args(), 2);
    }

    #[test]
    fn sret_after_this_occupies_index_one() {
        let types = TypeBuilder::new();
        let ti = type_info(&types);

        let sret = ArgInfo::Indirect {
            align: 0,
            by_val: false,
            realign: false,
            sret_after_this: true,
            in_reg: false,
            padding: VOID,
        };
        let arg_infos = [sret, ArgInfo::direct(crate::types::POINTER), ArgInfo::direct(INT)];
        let mapping =
            function_ir_mapping(&ti, &arg_infos, &[crate::types::POINTER, INT]).unwrap();
        assert_eq!(mapping.sret_arg_index(), Some(1));
        // The `this` argument owns index 0; the next argument skips the
        // sret slot.
        assert_eq!(mapping.ir_arg_range(0), (0, 1));
        assert_eq!(mapping.ir_arg_range(1), (2, 1));
        assert_eq!(mapping.total_ir_args(), 3);
    }

    #[test]
    fn flattened_struct_takes_one_slot_per_field() {
        let types = TypeBuilder::new();
        let ti = type_info(&types);

        let pair = types.struct_ty(&[DOUBLE, INT]);
        let arg_infos = [ArgInfo::ignore(), ArgInfo::direct(pair), ArgInfo::direct(FLOAT)];
        let mapping = function_ir_mapping(&ti, &arg_infos, &[pair, FLOAT]).unwrap();
        assert_eq!(mapping.ir_arg_range(0), (0, 2));
        assert_eq!(mapping.ir_arg_range(1), (2, 1));
        assert_eq!(mapping.total_ir_args(), 3);
    }

    #[test]
    fn expand_counts_leaves() {
        let types = TypeBuilder::new();
        let ti = type_info(&types);

        let inner = types.struct_ty(&[INT, INT]);
        let ty = types.struct_ty(&[inner, types.array_ty(3, FLOAT)]);
        assert_eq!(expansion_size(&ti, ty).unwrap(), 5);

        let mut leaves = Vec::new();
        expanded_types(&ti, ty, &mut leaves).unwrap();
        assert_eq!(
            leaves,
            vec![
                ir::Type::int(32),
                ir::Type::int(32),
                ir::Type::Float,
                ir::Type::Float,
                ir::Type::Float,
            ]
        );
    }

    #[test]
    fn indirect_clears_readnone() {
        let types = TypeBuilder::new();
        let ti = type_info(&types);

        let big = types.struct_ty(&[INT, INT, INT, INT, INT]);
        let arg_infos = [ArgInfo::ignore(), ArgInfo::indirect(8)];
        let mapping = function_ir_mapping(&ti, &arg_infos, &[big]).unwrap();

        let mut existing = AttributeSet::new();
        existing.add_fn_attr(FnAttr::ReadNone);
        existing.add_fn_attr(FnAttr::NoUnwind);

        let attrs = function_attributes(&ti, &mapping, existing);
        assert!(!attrs.has_fn_attr(FnAttr::ReadNone));
        assert!(attrs.has_fn_attr(FnAttr::NoUnwind));
        assert!(attrs.has_param_attr(0, ParamAttr::ByVal { align: 8 }));
    }
}
