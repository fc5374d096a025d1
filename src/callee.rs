//! Decoding incoming IR arguments into abstract values and encoding the
//! abstract return value, plus the function-encoder protocol around them.

use smallvec::SmallVec;

use crate::arg_info::ArgInfo;
use crate::coerce::{coerced_load, coerced_store, mem_temp};
use crate::ir::{Builder, Value};
use crate::ir_mapping::{largest_union_member, FunctionIRMapping};
use crate::result::{AbiError, AbiResult};
use crate::signature::FunctionType;
use crate::type_info::AbiTypeInfo;
use crate::types::Type;

/// Decodes IR arguments inside a function body and encodes its return.
pub struct Callee<'a, 'f> {
    type_info: &'f dyn AbiTypeInfo<'a>,
    function_type: &'f FunctionType<'a>,
    mapping: &'f FunctionIRMapping<'a>,
}

impl<'a, 'f> Callee<'a, 'f> {
    /// Create a callee for one lowered signature.
    pub fn new(
        type_info: &'f dyn AbiTypeInfo<'a>,
        function_type: &'f FunctionType<'a>,
        mapping: &'f FunctionIRMapping<'a>,
    ) -> Self {
        Self { type_info, function_type, mapping }
    }

    /// Decode the incoming IR arguments into one abstract value per fixed
    /// argument.
    pub fn decode_arguments(
        &self,
        builder: &mut dyn Builder,
        encoded_arguments: &[Value],
    ) -> AbiResult<SmallVec<[Value; 8]>> {
        debug_assert_eq!(self.mapping.total_ir_args() as usize, encoded_arguments.len());

        let ti = self.type_info;
        let mut arguments = SmallVec::new();

        for (index, &arg_type) in self.function_type.argument_types().iter().enumerate() {
            let arg_info = &self.mapping.arguments()[index].arg_info;
            let (first_ir_arg, num_ir_args) = self.mapping.ir_arg_range(index);
            let first = first_ir_arg as usize;

            match arg_info {
                ArgInfo::InAlloca { .. } => {
                    return Err(AbiError::Unimplemented("inalloca argument decoding"));
                }

                ArgInfo::Indirect { align, realign, .. } => {
                    debug_assert_eq!(num_ir_args, 1);
                    let mut ptr = encoded_arguments[first];

                    if arg_type.is_array() || arg_type.is_struct() {
                        // Aggregates arrive by reference; realign through
                        // a copy when the caller's alignment is too weak.
                        if *realign {
                            let aligned = mem_temp(ti, builder, arg_type, "coerce.realign");
                            builder.memcpy(
                                aligned,
                                ptr,
                                ti.alloc_size(arg_type).as_bytes(),
                                *align,
                            );
                            ptr = aligned;
                        }

                        let natural = ti.required_align(arg_type).as_bytes() as u32;
                        let load_align = natural.max(*align);
                        arguments.push(builder.load(&ti.ir_type(arg_type), ptr, load_align));
                    } else {
                        arguments.push(builder.load(&ti.ir_type(arg_type), ptr, *align));
                    }
                }

                ArgInfo::Direct { coerce_to, offset, can_be_flattened, .. } => {
                    arguments.push(self.decode_direct(
                        builder,
                        arg_type,
                        *coerce_to,
                        *offset,
                        *can_be_flattened,
                        &encoded_arguments[first..first + num_ir_args as usize],
                    )?);
                }

                ArgInfo::ExtendInteger { coerce_to, .. } => {
                    arguments.push(self.decode_direct(
                        builder,
                        arg_type,
                        *coerce_to,
                        0,
                        false,
                        &encoded_arguments[first..first + num_ir_args as usize],
                    )?);
                }

                ArgInfo::Expand { .. } => {
                    // Reconstruct the aggregate from its expanded leaves.
                    let alloca = mem_temp(ti, builder, arg_type, "expand.dest.arg");
                    let mut cursor = 0;
                    expand_type_from_args(
                        ti,
                        builder,
                        arg_type,
                        alloca,
                        &encoded_arguments[first..first + num_ir_args as usize],
                        &mut cursor,
                    )?;
                    debug_assert_eq!(cursor, num_ir_args as usize);

                    let align = ti.required_align(arg_type).as_bytes() as u32;
                    arguments.push(builder.load(&ti.ir_type(arg_type), alloca, align));
                }

                ArgInfo::Ignore => {
                    debug_assert_eq!(num_ir_args, 0);
                    arguments.push(builder.undef(&ti.ir_type(arg_type)));
                }
            }
        }

        Ok(arguments)
    }

    fn decode_direct(
        &self,
        builder: &mut dyn Builder,
        arg_type: Type<'a>,
        coerce_to: Type<'a>,
        offset: u32,
        can_be_flattened: bool,
        encoded: &[Value],
    ) -> AbiResult<Value> {
        let ti = self.type_info;

        // Trivial case: the IR argument already is the abstract value.
        if !coerce_to.is_struct() && coerce_to == arg_type && offset == 0 {
            debug_assert_eq!(encoded.len(), 1);
            return Ok(encoded[0]);
        }

        // The temporary must satisfy both the abstract type and the
        // coerce-to access below.
        let align = ti.required_align(coerce_to).max(ti.required_align(arg_type));
        let alloca =
            builder.alloca(&ti.ir_type(arg_type), align.as_bytes() as u32, "coerce.mem");

        let mut dest_ptr = alloca;
        let mut dest_ty = arg_type;
        if offset != 0 {
            dest_ptr = builder.byte_gep(dest_ptr, offset as u64);
            dest_ty = coerce_to;
        }

        if can_be_flattened && coerce_to.is_struct() && coerce_to.struct_members().len() > 1 {
            debug_assert_eq!(encoded.len(), coerce_to.struct_members().len());

            let source_size = ti.alloc_size(coerce_to);
            let dest_size = ti.alloc_size(arg_type);
            let coerce_ir = ti.ir_type(coerce_to);

            if source_size <= dest_size {
                for (i, &field_value) in encoded.iter().enumerate() {
                    let element_ptr = builder.struct_gep(&coerce_ir, dest_ptr, i as u32);
                    builder.store(field_value, element_ptr, 0);
                }
            } else {
                // The coerced pair is wider than the value (a tail slice
                // was widened); assemble it off to the side and copy the
                // prefix in.
                let tmp = builder.alloca(&coerce_ir, align.as_bytes() as u32, "coerce");
                for (i, &field_value) in encoded.iter().enumerate() {
                    let element_ptr = builder.struct_gep(&coerce_ir, tmp, i as u32);
                    builder.store(field_value, element_ptr, 0);
                }
                builder.memcpy(dest_ptr, tmp, dest_size.as_bytes(), align.as_bytes() as u32);
            }
        } else {
            debug_assert_eq!(encoded.len(), 1);
            coerced_store(ti, builder, encoded[0], dest_ptr, coerce_to, dest_ty);
        }

        Ok(builder.load(&ti.ir_type(arg_type), alloca, 0))
    }

    /// Encode an abstract return value into the IR return form. Returns
    /// `None` when the lowered function returns `void` (indirect and
    /// ignored returns).
    pub fn encode_return_value(
        &self,
        builder: &mut dyn Builder,
        return_value: Value,
        encoded_arguments: &[Value],
    ) -> AbiResult<Option<Value>> {
        debug_assert_eq!(self.mapping.total_ir_args() as usize, encoded_arguments.len());

        match self.mapping.return_info() {
            ArgInfo::InAlloca { .. } => Err(AbiError::Unimplemented("inalloca return encoding")),

            ArgInfo::Indirect { .. } => {
                // The value is returned by storing through the sret
                // pointer; nothing is returned by value.
                let sret_index = self
                    .mapping
                    .sret_arg_index()
                    .expect("indirect return without an sret argument");
                let sret_ptr = encoded_arguments[sret_index as usize];
                builder.store(return_value, sret_ptr, 0);
                Ok(None)
            }

            ArgInfo::Direct { coerce_to, offset, .. } => {
                self.encode_direct_return(builder, return_value, *coerce_to, *offset)
            }

            ArgInfo::ExtendInteger { coerce_to, .. } => {
                self.encode_direct_return(builder, return_value, *coerce_to, 0)
            }

            ArgInfo::Ignore => Ok(None),

            ArgInfo::Expand { .. } => unreachable!("expand is not a return kind"),
        }
    }

    fn encode_direct_return(
        &self,
        builder: &mut dyn Builder,
        return_value: Value,
        coerce_to: Type<'a>,
        offset: u32,
    ) -> AbiResult<Option<Value>> {
        let ti = self.type_info;
        let return_type = self.function_type.return_type();

        if ti.ir_type(coerce_to) == ti.ir_type(return_type) && offset == 0 {
            return Ok(Some(return_value));
        }

        // Spill the value and perform a coerced load of the return shape.
        let mut source_ptr = mem_temp(ti, builder, return_type, "coerce");
        builder.store(return_value, source_ptr, 0);

        let mut source_ty = return_type;
        if offset != 0 {
            source_ptr = builder.byte_gep(source_ptr, offset as u64);
            source_ty = coerce_to;
        }

        Ok(Some(coerced_load(ti, builder, source_ptr, source_ty, coerce_to)))
    }
}

/// Recursively store expanded leaf scalars into the fields of a temporary:
/// the inverse of the caller's flattening.
pub(crate) fn expand_type_from_args<'a>(
    type_info: &dyn AbiTypeInfo<'a>,
    builder: &mut dyn Builder,
    ty: Type<'a>,
    ptr: Value,
    encoded: &[Value],
    cursor: &mut usize,
) -> AbiResult<()> {
    debug_assert!(!ty.is_void());

    if ty.is_array() {
        let element = ty.array_element_type();
        let element_size = type_info.alloc_size(element);
        for i in 0..ty.array_element_count() {
            let element_ptr = builder.byte_gep(ptr, (element_size * i).as_bytes());
            expand_type_from_args(type_info, builder, element, element_ptr, encoded, cursor)?;
        }
        Ok(())
    } else if ty.is_struct() {
        let struct_ir = type_info.ir_type(ty);
        for (i, member) in ty.struct_members().iter().enumerate() {
            let field_ptr = builder.struct_gep(&struct_ir, ptr, i as u32);
            expand_type_from_args(type_info, builder, member.ty(), field_ptr, encoded, cursor)?;
        }
        Ok(())
    } else if ty.is_union() {
        match largest_union_member(type_info, ty) {
            Some(member) => {
                expand_type_from_args(type_info, builder, member, ptr, encoded, cursor)
            }
            None => Ok(()),
        }
    } else if ty.is_complex() {
        Err(AbiError::Unimplemented("expansion of complex values"))
    } else {
        let align = type_info.required_align(ty).as_bytes() as u32;
        builder.store(encoded[*cursor], ptr, align);
        *cursor += 1;
        Ok(())
    }
}

/// A function under construction, from the callee's point of view.
///
/// Created by the ABI facade from the function's IR parameters. The
/// protocol is `Decoded -> Returned`: [`arguments`](Self::arguments) is
/// available immediately, and [`return_value`](Self::return_value) must be
/// called exactly once; a second call panics.
pub struct FunctionEncoder<'a, 'f> {
    type_info: &'f dyn AbiTypeInfo<'a>,
    function_type: FunctionType<'a>,
    mapping: FunctionIRMapping<'a>,
    encoded_arguments: SmallVec<[Value; 8]>,
    arguments: SmallVec<[Value; 8]>,
    returned: bool,
}

impl<'a, 'f> FunctionEncoder<'a, 'f> {
    pub(crate) fn new(
        type_info: &'f dyn AbiTypeInfo<'a>,
        builder: &mut dyn Builder,
        function_type: FunctionType<'a>,
        mapping: FunctionIRMapping<'a>,
        encoded_arguments: &[Value],
    ) -> AbiResult<Self> {
        let arguments = Callee::new(type_info, &function_type, &mapping)
            .decode_arguments(builder, encoded_arguments)?;

        Ok(Self {
            type_info,
            function_type,
            mapping,
            encoded_arguments: SmallVec::from_slice(encoded_arguments),
            arguments,
            returned: false,
        })
    }

    /// The function's arguments in ABI-independent form, one per fixed
    /// argument.
    pub fn arguments(&self) -> &[Value] {
        &self.arguments
    }

    /// Emit the code returning `value` from the function, including the
    /// return instruction.
    pub fn return_value(
        &mut self,
        builder: &mut dyn Builder,
        value: Value,
    ) -> AbiResult<()> {
        assert!(!self.returned, "return_value called more than once");
        self.returned = true;

        let encoded = Callee::new(self.type_info, &self.function_type, &self.mapping)
            .encode_return_value(builder, value, &self.encoded_arguments)?;
        builder.ret(encoded);
        Ok(())
    }
}
