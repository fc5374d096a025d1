//! The i386 ABIs (System V, Darwin, Win32 variants of the 32-bit x86
//! conventions).

pub mod classifier;
pub mod type_info;

use log::trace;
use smallvec::SmallVec;

use target_lexicon::Triple;

use crate::abi::{create_call_with_mapping, validate_function_type};
use crate::callconv::CallingConvention;
use crate::callee::FunctionEncoder;
use crate::ir;
use crate::ir::attrs::AttributeSet;
use crate::ir::{Builder, TypedValue, Value};
use crate::ir_mapping::{function_attributes, function_ir_mapping, ir_signature, FunctionIRMapping};
use crate::promote::TypePromoter;
use crate::result::AbiResult;
use crate::signature::FunctionType;
use crate::type_info::AbiTypeInfo;
use crate::types::{Type, TypeBuilder};

use self::classifier::Classifier;
use self::type_info::TypeInfo;

/// The i386 ABI facade.
pub struct X86_32Abi<'a> {
    type_info: TypeInfo<'a>,
    triple: Triple,
}

impl<'a> X86_32Abi<'a> {
    /// Create the ABI for an i386 triple.
    pub fn new(types: &'a TypeBuilder<'a>, triple: Triple) -> Self {
        Self { type_info: TypeInfo::new(types), triple }
    }

    /// The ABI's short name.
    pub fn name(&self) -> &'static str {
        "i386"
    }

    /// The type-info oracle.
    pub fn type_info(&self) -> &dyn AbiTypeInfo<'a> {
        &self.type_info
    }

    /// Map a source-level calling convention onto the backend id.
    pub fn calling_convention(&self, cc: CallingConvention) -> AbiResult<ir::CallConv> {
        match cc {
            CallingConvention::CDefault
            | CallingConvention::CDecl
            | CallingConvention::CppDefault => Ok(ir::CallConv::C),
            CallingConvention::StdCall | CallingConvention::Pascal => {
                Ok(ir::CallConv::X86StdCall)
            }
            CallingConvention::FastCall => Ok(ir::CallConv::X86FastCall),
            CallingConvention::ThisCall => Ok(ir::CallConv::X86ThisCall),
            CallingConvention::VectorCall => Ok(ir::CallConv::X86VectorCall),
        }
    }

    fn compute_mapping(
        &self,
        function_type: &FunctionType<'a>,
        argument_types: &[Type<'a>],
    ) -> AbiResult<FunctionIRMapping<'a>> {
        validate_function_type(&self.type_info, function_type, argument_types)?;

        let classifier = Classifier::new(&self.type_info, self.triple.clone());
        let arg_infos = classifier.classify_function_type(function_type, argument_types)?;
        function_ir_mapping(&self.type_info, &arg_infos, argument_types)
    }

    /// Lower an abstract signature to its IR signature.
    pub fn function_type(&self, function_type: &FunctionType<'a>) -> AbiResult<ir::Signature> {
        let mapping = self.compute_mapping(function_type, function_type.argument_types())?;
        let signature = ir_signature(&self.type_info, function_type, &mapping)?;
        trace!("i386 lowered {function_type} -> {signature}");
        Ok(signature)
    }

    /// Compute the attribute set for a function of this signature called
    /// with the given concrete argument types (including variadic ones).
    pub fn attributes(
        &self,
        function_type: &FunctionType<'a>,
        argument_types: &[Type<'a>],
        existing: AttributeSet,
    ) -> AbiResult<AttributeSet> {
        debug_assert!(argument_types.len() >= function_type.argument_types().len());

        let promoter = TypePromoter::new(&self.type_info);
        let argument_types = promoter.promote_argument_types(function_type, argument_types);

        let mapping = self.compute_mapping(function_type, &argument_types)?;
        Ok(function_attributes(&self.type_info, &mapping, existing))
    }

    /// Emit an ABI-correct call; see
    /// [`X86_64Abi::create_call`](crate::x86_64::X86_64Abi::create_call).
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
        let promoter = TypePromoter::new(&self.type_info);
        let arguments = promoter.promote_arguments(builder, function_type, arguments);

        let argument_types: SmallVec<[Type<'a>; 8]> =
            arguments.iter().map(|arg| arg.ty).collect();
        let mapping = self.compute_mapping(function_type, &argument_types)?;

        create_call_with_mapping(&self.type_info, builder, function_type, &mapping, emit, &arguments)
    }

    /// Create the callee-side encoder for a function definition.
    pub fn create_function_encoder<'f>(
        &'f self,
        builder: &mut dyn Builder,
        function_type: &FunctionType<'a>,
        ir_arguments: &[Value],
    ) -> AbiResult<FunctionEncoder<'a, 'f>> {
        let mapping = self.compute_mapping(function_type, function_type.argument_types())?;
        FunctionEncoder::new(
            &self.type_info,
            builder,
            function_type.clone(),
            mapping,
            ir_arguments,
        )
    }
}
