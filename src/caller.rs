//! Encoding abstract arguments into IR call arguments and decoding the IR
//! return value back.

use smallvec::SmallVec;

use crate::arg_info::ArgInfo;
use crate::coerce::{build_agg_store, coerced_load, coerced_store, mem_temp, temp_alloca};
use crate::ir::{Builder, TypedValue, Value};
use crate::ir_mapping::{largest_union_member, FunctionIRMapping};
use crate::result::{AbiError, AbiResult};
use crate::signature::FunctionType;
use crate::type_info::AbiTypeInfo;
use crate::types::Type;

/// Encodes argument values for a call and decodes its return value.
pub struct Caller<'a, 'f> {
    type_info: &'f dyn AbiTypeInfo<'a>,
    function_type: &'f FunctionType<'a>,
    mapping: &'f FunctionIRMapping<'a>,
}

impl<'a, 'f> Caller<'a, 'f> {
    /// Create a caller for one lowered signature.
    pub fn new(
        type_info: &'f dyn AbiTypeInfo<'a>,
        function_type: &'f FunctionType<'a>,
        mapping: &'f FunctionIRMapping<'a>,
    ) -> Self {
        Self { type_info, function_type, mapping }
    }

    /// Encode abstract argument values into the full IR argument
    /// sequence, in argument-index order.
    ///
    /// `arguments` must cover the fixed arguments and may extend them with
    /// variadic ones. `return_value_ptr` optionally provides the sret
    /// destination, avoiding a temporary.
    pub fn encode_arguments(
        &self,
        builder: &mut dyn Builder,
        arguments: &[TypedValue<'a>],
        return_value_ptr: Option<Value>,
    ) -> AbiResult<SmallVec<[Value; 8]>> {
        debug_assert!(arguments.len() >= self.function_type.argument_types().len());
        debug_assert_eq!(arguments.len(), self.mapping.arguments().len());

        let ti = self.type_info;
        let mut ir_args: SmallVec<[Option<Value>; 8]> =
            smallvec::smallvec![None; self.mapping.total_ir_args() as usize];

        // An indirect return needs its destination before any argument is
        // encoded.
        let return_info = self.mapping.return_info();
        if return_info.is_indirect() {
            let sret_ptr = match return_value_ptr {
                Some(ptr) => ptr,
                None => mem_temp(ti, builder, self.function_type.return_type(), "agg.tmp"),
            };
            let sret_index = self
                .mapping
                .sret_arg_index()
                .expect("indirect return without an sret argument");
            ir_args[sret_index as usize] = Some(sret_ptr);
        } else if matches!(return_info, ArgInfo::InAlloca { .. }) {
            return Err(AbiError::Unimplemented("inalloca return encoding"));
        }

        for (index, argument) in arguments.iter().enumerate() {
            let arg = &self.mapping.arguments()[index];
            let arg_info = &arg.arg_info;
            let arg_type = argument.ty;
            let value = argument.value;

            if let Some(padding_index) = arg.padding_arg_index {
                let padding_ir = ti.ir_type(arg_info.padding());
                ir_args[padding_index as usize] = Some(builder.undef(&padding_ir));
            }

            let (first_ir_arg, num_ir_args) = self.mapping.ir_arg_range(index);
            let first = first_ir_arg as usize;

            match arg_info {
                ArgInfo::InAlloca { .. } => {
                    return Err(AbiError::Unimplemented("inalloca argument encoding"));
                }

                ArgInfo::Indirect { align, .. } => {
                    debug_assert_eq!(num_ir_args, 1);
                    // Pass a pointer to a stack copy, raising the copy's
                    // alignment to the descriptor's if stricter.
                    let natural = ti.required_align(arg_type).as_bytes() as u32;
                    let alloca_align = natural.max(*align);
                    let alloca = builder.alloca(
                        &ti.ir_type(arg_type),
                        alloca_align,
                        "indirect.arg.mem",
                    );
                    builder.store(value, alloca, alloca_align);
                    ir_args[first] = Some(alloca);
                }

                ArgInfo::Ignore => {
                    debug_assert_eq!(num_ir_args, 0);
                }

                ArgInfo::Direct { coerce_to, offset, can_be_flattened, .. } => {
                    self.encode_direct(
                        builder,
                        value,
                        arg_type,
                        *coerce_to,
                        *offset,
                        *can_be_flattened,
                        &mut ir_args[first..first + num_ir_args as usize],
                    )?;
                }

                ArgInfo::ExtendInteger { coerce_to, .. } => {
                    self.encode_direct(
                        builder,
                        value,
                        arg_type,
                        *coerce_to,
                        0,
                        false,
                        &mut ir_args[first..first + num_ir_args as usize],
                    )?;
                }

                ArgInfo::Expand { .. } => {
                    let alloca = mem_temp(ti, builder, arg_type, "expand.source.arg");
                    builder.store(value, alloca, ti.required_align(arg_type).as_bytes() as u32);

                    let mut cursor = 0;
                    expand_type_to_args(
                        ti,
                        builder,
                        arg_type,
                        alloca,
                        &mut ir_args[first..first + num_ir_args as usize],
                        &mut cursor,
                    )?;
                    debug_assert_eq!(cursor, num_ir_args as usize);
                }
            }
        }

        Ok(ir_args
            .into_iter()
            .map(|slot| slot.expect("IR argument slot left unfilled"))
            .collect())
    }

    fn encode_direct(
        &self,
        builder: &mut dyn Builder,
        value: Value,
        arg_type: Type<'a>,
        coerce_to: Type<'a>,
        offset: u32,
        flatten: bool,
        slots: &mut [Option<Value>],
    ) -> AbiResult<()> {
        let ti = self.type_info;

        // Trivial case: the value already has the lowered shape.
        if !coerce_to.is_struct() && coerce_to == arg_type && offset == 0 {
            debug_assert_eq!(slots.len(), 1);
            slots[0] = Some(value);
            return Ok(());
        }

        // Spill the value so the coerce-to type can be loaded out of it.
        let mut source_ptr = mem_temp(ti, builder, arg_type, "coerce.arg.source");
        builder.store(value, source_ptr, 0);

        if offset != 0 {
            source_ptr = builder.byte_gep(source_ptr, offset as u64);
        }

        if flatten && coerce_to.is_struct() {
            let source_size = ti.alloc_size(arg_type);
            let dest_size = ti.alloc_size(coerce_to);

            // When the source is smaller than the coerce-to type, widen it
            // through a temporary so every field load is in bounds; the
            // bits past the source stay undefined.
            if source_size < dest_size {
                let tmp = temp_alloca(ti, builder, coerce_to, "coerce.widened");
                builder.memcpy(tmp, source_ptr, source_size.as_bytes(), 0);
                source_ptr = tmp;
            }

            let coerce_ir = ti.ir_type(coerce_to);
            debug_assert_eq!(slots.len(), coerce_to.struct_members().len());
            for (i, member) in coerce_to.struct_members().iter().enumerate() {
                let element_ptr = builder.struct_gep(&coerce_ir, source_ptr, i as u32);
                // Nothing is known about what this slice of the temporary
                // is aligned to.
                let loaded = builder.load(&ti.ir_type(member.ty()), element_ptr, 1);
                slots[i] = Some(loaded);
            }
        } else {
            debug_assert_eq!(slots.len(), 1);
            let source_ty = if offset != 0 { coerce_to } else { arg_type };
            slots[0] = Some(coerced_load(ti, builder, source_ptr, source_ty, coerce_to));
        }

        Ok(())
    }

    /// Decode the IR return of a call back into an abstract value.
    ///
    /// `encoded_return` is the IR call result, absent for `void` lowered
    /// returns. `encoded_arguments` is the sequence produced by
    /// [`encode_arguments`](Self::encode_arguments), which holds the sret
    /// pointer for indirect returns.
    pub fn decode_return_value(
        &self,
        builder: &mut dyn Builder,
        encoded_arguments: &[Value],
        encoded_return: Option<Value>,
        return_value_ptr: Option<Value>,
    ) -> AbiResult<Value> {
        let ti = self.type_info;
        let return_type = self.function_type.return_type();

        match self.mapping.return_info() {
            ArgInfo::InAlloca { .. } => Err(AbiError::Unimplemented("inalloca return decoding")),

            ArgInfo::Indirect { align, .. } => {
                let sret_index = self
                    .mapping
                    .sret_arg_index()
                    .expect("indirect return without an sret argument");
                let sret_ptr = encoded_arguments[sret_index as usize];
                Ok(builder.load(&ti.ir_type(return_type), sret_ptr, *align))
            }

            ArgInfo::Ignore => Ok(builder.undef(&ti.ir_type(return_type))),

            ArgInfo::Direct { coerce_to, offset, .. } => {
                self.decode_direct_return(builder, *coerce_to, *offset, encoded_return, return_value_ptr)
            }

            ArgInfo::ExtendInteger { coerce_to, .. } => {
                self.decode_direct_return(builder, *coerce_to, 0, encoded_return, return_value_ptr)
            }

            ArgInfo::Expand { .. } => unreachable!("expand is not a return kind"),
        }
    }

    fn decode_direct_return(
        &self,
        builder: &mut dyn Builder,
        coerce_to: Type<'a>,
        offset: u32,
        encoded_return: Option<Value>,
        return_value_ptr: Option<Value>,
    ) -> AbiResult<Value> {
        let ti = self.type_info;
        let return_type = self.function_type.return_type();
        let encoded_return = encoded_return.ok_or(AbiError::EmitterContract)?;

        let return_ir = ti.ir_type(return_type);
        let coerce_ir = ti.ir_type(coerce_to);

        if coerce_ir == return_ir && offset == 0 {
            if return_type.is_array() || return_type.is_struct() {
                // First-class aggregate: store fields into the destination
                // and reload the whole value.
                let dest_ptr = match return_value_ptr {
                    Some(ptr) => ptr,
                    None => mem_temp(ti, builder, return_type, "agg.tmp"),
                };
                build_agg_store(ti, builder, encoded_return, coerce_to, dest_ptr, false);
                let align = ti.required_align(return_type).as_bytes() as u32;
                return Ok(builder.load(&return_ir, dest_ptr, align));
            }
            return Ok(encoded_return);
        }

        let dest_ptr = mem_temp(ti, builder, return_type, "coerce");

        let mut store_ptr = dest_ptr;
        let mut dest_ty = return_type;
        if offset != 0 {
            store_ptr = builder.byte_gep(store_ptr, offset as u64);
            dest_ty = coerce_to;
        }

        coerced_store(ti, builder, encoded_return, store_ptr, coerce_to, dest_ty);

        let align = ti.required_align(return_type).as_bytes() as u32;
        Ok(builder.load(&return_ir, dest_ptr, align))
    }
}

/// Recursively load the leaf scalars of an expanded value into sequential
/// IR argument slots: arrays by element, structs by field, unions by their
/// single largest member.
pub(crate) fn expand_type_to_args<'a>(
    type_info: &dyn AbiTypeInfo<'a>,
    builder: &mut dyn Builder,
    ty: Type<'a>,
    ptr: Value,
    slots: &mut [Option<Value>],
    cursor: &mut usize,
) -> AbiResult<()> {
    debug_assert!(!ty.is_void());

    if ty.is_array() {
        let element = ty.array_element_type();
        let element_size = type_info.alloc_size(element);
        for i in 0..ty.array_element_count() {
            let element_ptr = builder.byte_gep(ptr, (element_size * i).as_bytes());
            expand_type_to_args(type_info, builder, element, element_ptr, slots, cursor)?;
        }
        Ok(())
    } else if ty.is_struct() {
        let struct_ir = type_info.ir_type(ty);
        for (i, member) in ty.struct_members().iter().enumerate() {
            let field_ptr = builder.struct_gep(&struct_ir, ptr, i as u32);
            expand_type_to_args(type_info, builder, member.ty(), field_ptr, slots, cursor)?;
        }
        Ok(())
    } else if ty.is_union() {
        // Unions appear here only in degenerate cases where all members
        // flatten identically; use the largest.
        match largest_union_member(type_info, ty) {
            Some(member) => expand_type_to_args(type_info, builder, member, ptr, slots, cursor),
            None => Ok(()),
        }
    } else if ty.is_complex() {
        Err(AbiError::Unimplemented("expansion of complex values"))
    } else {
        let align = type_info.required_align(ty).as_bytes() as u32;
        let loaded = builder.load(&type_info.ir_type(ty), ptr, align);
        slots[*cursor] = Some(loaded);
        *cursor += 1;
        Ok(())
    }
}
