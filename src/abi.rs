//! The per-target ABI facades and the factory that selects one.
//!
//! The set of targets is small and closed, so the facade is a tagged enum
//! rather than a trait object; dispatch stays cheap and the call-emitter
//! closure can stay generic.

use target_lexicon::{Architecture, Triple};

use crate::arg_info::ArgInfo;
use crate::callconv::CallingConvention;
use crate::caller::Caller;
use crate::callee::FunctionEncoder;
use crate::ir;
use crate::ir::attrs::AttributeSet;
use crate::ir::{Builder, TypedValue, Value};
use crate::ir_mapping::FunctionIRMapping;
use crate::result::{AbiError, AbiResult};
use crate::signature::FunctionType;
use crate::size::DataSize;
use crate::type_info::AbiTypeInfo;
use crate::types::{Type, TypeBuilder};
use crate::win64::Win64Abi;
use crate::x86_32::X86_32Abi;
use crate::x86_64::X86_64Abi;

/// An ABI implementation for one target.
pub enum Abi<'a> {
    /// x86_64 System V.
    X86_64(X86_64Abi<'a>),
    /// i386.
    X86_32(X86_32Abi<'a>),
    /// Win64 (stub).
    Win64(Win64Abi),
}

impl<'a> Abi<'a> {
    /// The ABI's short, stable name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::X86_64(abi) => abi.name(),
            Self::X86_32(abi) => abi.name(),
            Self::Win64(abi) => abi.name(),
        }
    }

    /// Map a source-level calling convention onto the backend id, failing
    /// with `InvalidCallConv` for tags the target does not support.
    pub fn calling_convention(&self, cc: CallingConvention) -> AbiResult<ir::CallConv> {
        match self {
            Self::X86_64(abi) => abi.calling_convention(cc),
            Self::X86_32(abi) => abi.calling_convention(cc),
            Self::Win64(abi) => abi.calling_convention(cc),
        }
    }

    /// Lower an abstract signature to the IR signature an ABI-correct
    /// function of that type has.
    pub fn function_type(&self, function_type: &FunctionType<'a>) -> AbiResult<ir::Signature> {
        match self {
            Self::X86_64(abi) => abi.function_type(function_type),
            Self::X86_32(abi) => abi.function_type(function_type),
            Self::Win64(abi) => abi.unimplemented(),
        }
    }

    /// Compute the attribute set for a function of this signature called
    /// with the given concrete argument types (including variadic
    /// arguments), preserving `existing` attributes where possible.
    pub fn attributes(
        &self,
        function_type: &FunctionType<'a>,
        argument_types: &[Type<'a>],
        existing: AttributeSet,
    ) -> AbiResult<AttributeSet> {
        match self {
            Self::X86_64(abi) => abi.attributes(function_type, argument_types, existing),
            Self::X86_32(abi) => abi.attributes(function_type, argument_types, existing),
            Self::Win64(abi) => abi.unimplemented(),
        }
    }

    /// Emit an ABI-correct call.
    ///
    /// `arguments` are the abstract argument values (fixed ones first,
    /// then any variadic tail). The `emit` closure receives the encoded
    /// IR argument sequence, must emit the actual call, and returns the
    /// IR call result — `None` exactly when the lowered return type is
    /// `void`, anything else fails with `EmitterContract`.
    pub fn create_call<F>(
        &self,
        builder: &mut dyn Builder,
        function_type: &FunctionType<'a>,
        emit: F,
        arguments: &[TypedValue<'a>],
    ) -> AbiResult<Value>
    where
        F: FnOnce(&mut dyn Builder, &[Value]) -> Option<Value>,
    {
        match self {
            Self::X86_64(abi) => abi.create_call(builder, function_type, emit, arguments),
            Self::X86_32(abi) => abi.create_call(builder, function_type, emit, arguments),
            Self::Win64(abi) => abi.unimplemented(),
        }
    }

    /// Create the callee-side encoder for a function definition, given
    /// the IR parameters of the function being built.
    pub fn create_function_encoder<'f>(
        &'f self,
        builder: &mut dyn Builder,
        function_type: &FunctionType<'a>,
        ir_arguments: &[Value],
    ) -> AbiResult<FunctionEncoder<'a, 'f>> {
        match self {
            Self::X86_64(abi) => {
                abi.create_function_encoder(builder, function_type, ir_arguments)
            }
            Self::X86_32(abi) => {
                abi.create_function_encoder(builder, function_type, ir_arguments)
            }
            Self::Win64(abi) => abi.unimplemented(),
        }
    }
}

/// Select and construct the ABI for a target triple.
///
/// `cpu_name` selects the CPU feature set on x86_64 (empty means the
/// baseline `x86-64`); names map case-sensitively with the usual legacy
/// aliases and unknown names fall back to a generic CPU.
pub fn create_abi<'a>(
    types: &'a TypeBuilder<'a>,
    triple: &Triple,
    cpu_name: &str,
) -> AbiResult<Abi<'a>> {
    match triple.architecture {
        Architecture::X86_64 => {
            if triple.operating_system == target_lexicon::OperatingSystem::Windows {
                Ok(Abi::Win64(Win64Abi::new()))
            } else {
                Ok(Abi::X86_64(X86_64Abi::new(types, triple, cpu_name)?))
            }
        }
        Architecture::X86_32(_) => Ok(Abi::X86_32(X86_32Abi::new(types, triple.clone()))),
        _ => Err(AbiError::UnsupportedTriple(triple.clone())),
    }
}

/// Check one abstract type for the malformations the type model cannot
/// rule out: zero-length arrays and explicit struct member offsets behind
/// the running layout offset.
pub(crate) fn validate_type<'a>(
    type_info: &dyn AbiTypeInfo<'a>,
    ty: Type<'a>,
) -> AbiResult<()> {
    if ty.is_struct() {
        let mut running = DataSize::ZERO;
        for member in ty.struct_members() {
            if let Some(explicit) = member.offset() {
                if explicit < running {
                    return Err(AbiError::InvalidType(format!(
                        "struct member offset {} is behind the running offset {} in {ty}",
                        explicit, running,
                    )));
                }
            }
            validate_type(type_info, member.ty())?;

            let align = type_info.required_align(member.ty()).max(DataSize::bytes(1));
            let aligned = running.round_up_to_align(align);
            running = match member.offset() {
                Some(explicit) => explicit.max(aligned),
                None => aligned,
            };
            running += type_info.alloc_size(member.ty());
        }
        Ok(())
    } else if ty.is_union() {
        for member in ty.union_members() {
            validate_type(type_info, *member)?;
        }
        Ok(())
    } else if ty.is_array() {
        if ty.array_element_count() == 0 {
            return Err(AbiError::InvalidType(format!("zero-length array {ty}")));
        }
        validate_type(type_info, ty.array_element_type())
    } else if ty.is_vector() {
        validate_type(type_info, ty.vector_element_type())
    } else if ty.is_complex() {
        Ok(())
    } else {
        Ok(())
    }
}

/// Validate the return type and every argument type of a signature before
/// classification.
pub(crate) fn validate_function_type<'a>(
    type_info: &dyn AbiTypeInfo<'a>,
    function_type: &FunctionType<'a>,
    argument_types: &[Type<'a>],
) -> AbiResult<()> {
    validate_type(type_info, function_type.return_type())?;
    for &arg_type in argument_types {
        validate_type(type_info, arg_type)?;
    }
    Ok(())
}

/// The target-independent tail of `create_call`: encode, emit exactly
/// once, enforce the emitter contract, decode.
pub(crate) fn create_call_with_mapping<'a, F>(
    type_info: &dyn AbiTypeInfo<'a>,
    builder: &mut dyn Builder,
    function_type: &FunctionType<'a>,
    mapping: &FunctionIRMapping<'a>,
    emit: F,
    arguments: &[TypedValue<'a>],
) -> AbiResult<Value>
where
    F: FnOnce(&mut dyn Builder, &[Value]) -> Option<Value>,
{
    let caller = Caller::new(type_info, function_type, mapping);

    let encoded_arguments = caller.encode_arguments(builder, arguments, None)?;

    let encoded_return = emit(builder, &encoded_arguments);

    // The emitter must produce a value exactly when the lowered return
    // type is non-void.
    let expects_value = matches!(
        mapping.return_info(),
        ArgInfo::Direct { .. } | ArgInfo::ExtendInteger { .. } | ArgInfo::InAlloca { sret: true, .. }
    );
    if encoded_return.is_some() != expects_value {
        return Err(AbiError::EmitterContract);
    }

    caller.decode_return_value(builder, &encoded_arguments, encoded_return, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{StructMember, INT};
    use std::str::FromStr;

    #[test]
    fn factory_dispatch() {
        let types = TypeBuilder::new();

        let x86_64 = Triple::from_str("x86_64-unknown-linux-gnu").unwrap();
        assert_eq!(create_abi(&types, &x86_64, "").unwrap().name(), "x86_64");

        let i686 = Triple::from_str("i686-unknown-linux-gnu").unwrap();
        assert_eq!(create_abi(&types, &i686, "").unwrap().name(), "i386");

        let win64 = Triple::from_str("x86_64-pc-windows-msvc").unwrap();
        assert_eq!(create_abi(&types, &win64, "").unwrap().name(), "Win64");

        let arm = Triple::from_str("aarch64-unknown-linux-gnu").unwrap();
        assert!(matches!(
            create_abi(&types, &arm, ""),
            Err(AbiError::UnsupportedTriple(_))
        ));
    }

    #[test]
    fn unsupported_calling_conventions() {
        let types = TypeBuilder::new();
        let x86_64 = Triple::from_str("x86_64-unknown-linux-gnu").unwrap();
        let abi = create_abi(&types, &x86_64, "").unwrap();

        assert!(abi.calling_convention(CallingConvention::CDefault).is_ok());
        assert!(matches!(
            abi.calling_convention(CallingConvention::StdCall),
            Err(AbiError::InvalidCallConv(CallingConvention::StdCall))
        ));
    }

    #[test]
    fn malformed_types_are_rejected() {
        let types = TypeBuilder::new();
        let x86_64 = Triple::from_str("x86_64-unknown-linux-gnu").unwrap();
        let abi = create_abi(&types, &x86_64, "").unwrap();

        // An explicit offset behind the running offset.
        let bad = types.struct_with_members(
            &[
                StructMember::auto(INT),
                StructMember::at_offset(INT, DataSize::bytes(0)),
            ],
            None,
        );
        let fty = FunctionType::new(crate::types::VOID, &[bad], false);
        assert!(matches!(abi.function_type(&fty), Err(AbiError::InvalidType(_))));

        // A zero-length array.
        let bad = types.array_ty(0, INT);
        let fty = FunctionType::new(crate::types::VOID, &[bad], false);
        assert!(matches!(abi.function_type(&fty), Err(AbiError::InvalidType(_))));
    }
}
