//! Coercion helpers shared between the caller and callee paths.
//!
//! Values cross the boundary in IR types that rarely match the abstract
//! type they came from. These helpers move values between the two shapes:
//! loading a coerce-to type out of a temporary of the abstract type,
//! storing an incoming coerced value back into one, and the int/pointer
//! width adjustments that behave as if the value had gone through memory.

use crate::ir::{Builder, Value};
use crate::type_info::AbiTypeInfo;
use crate::types::{Type, INTPTR_T};

/// Allocate a stack temporary of `ty` with its natural alignment.
pub(crate) fn temp_alloca<'a>(
    type_info: &dyn AbiTypeInfo<'a>,
    builder: &mut dyn Builder,
    ty: Type<'a>,
    name: &str,
) -> Value {
    builder.alloca(&type_info.ir_type(ty), 0, name)
}

/// Allocate a stack temporary of `ty` aligned to the type's required
/// alignment.
pub(crate) fn mem_temp<'a>(
    type_info: &dyn AbiTypeInfo<'a>,
    builder: &mut dyn Builder,
    ty: Type<'a>,
    name: &str,
) -> Value {
    let align = type_info.required_align(ty);
    builder.alloca(&type_info.ir_type(ty), align.as_bytes() as u32, name)
}

/// Given a pointer to a struct from which `dest_size` bytes will be
/// accessed, dive into leading elements as long as they cover the access:
/// enter the first element while it is at least as large as the access or
/// as large as the whole struct. Comparisons use store sizes; alloc sizes
/// would overstate what a load may touch.
pub(crate) fn enter_struct_for_coerced_access<'a>(
    type_info: &dyn AbiTypeInfo<'a>,
    builder: &mut dyn Builder,
    source_ptr: Value,
    source_struct: Type<'a>,
    dest_size: crate::size::DataSize,
) -> (Value, Type<'a>) {
    if source_struct.struct_members().is_empty() {
        // Can't dive into a zero-element struct.
        return (source_ptr, source_struct);
    }

    let first_element = source_struct.struct_members()[0].ty();
    let first_size = type_info.store_size(first_element);
    if first_size < dest_size && first_size < type_info.store_size(source_struct) {
        return (source_ptr, source_struct);
    }

    let dive_ptr = builder.struct_gep(&type_info.ir_type(source_struct), source_ptr, 0);

    if first_element.is_struct() {
        enter_struct_for_coerced_access(type_info, builder, dive_ptr, first_element, dest_size)
    } else {
        (dive_ptr, first_element)
    }
}

/// Convert `value` between integer/pointer types as if it had been stored
/// and reloaded: big-endian targets preserve the high bits across a width
/// change, little-endian targets the low bits.
pub(crate) fn coerce_int_or_ptr<'a>(
    type_info: &dyn AbiTypeInfo<'a>,
    builder: &mut dyn Builder,
    mut value: Value,
    source_ty: Type<'a>,
    dest_ty: Type<'a>,
) -> Value {
    let source_ir = type_info.ir_type(source_ty);
    let dest_ir = type_info.ir_type(dest_ty);
    if source_ir == dest_ir {
        return value;
    }

    // Pointers are carried through the pointer-width integer type.
    let mut current_ir = source_ir;
    if source_ty.is_pointer() {
        current_ir = type_info.ir_type(INTPTR_T);
        value = builder.ptr_to_int(value, &current_ir);
    }

    let dest_int_ir =
        if dest_ty.is_pointer() { type_info.ir_type(INTPTR_T) } else { dest_ir.clone() };

    if current_ir != dest_int_ir {
        if type_info.is_big_endian() {
            // Preserve the high bits, the way memory coercion would.
            let source_size = type_info.raw_size(source_ty);
            let dest_size = type_info.raw_size(dest_ty);
            if source_size > dest_size {
                value = builder.lshr(value, (source_size - dest_size).as_bits());
                value = builder.trunc(value, &dest_int_ir);
            } else {
                value = builder.zext(value, &dest_int_ir);
                value = builder.shl(value, (dest_size - source_size).as_bits());
            }
        } else {
            // Little-endian targets preserve the low bits; no shifts.
            value = builder.int_cast(value, &dest_int_ir, false);
        }
    }

    if dest_ty.is_pointer() {
        value = builder.int_to_ptr(value);
    }

    value
}

/// Load a value of `dest_ty` from a pointer to a `source_ty`.
///
/// When the source is smaller than the destination, the extra destination
/// bits are undefined (the value goes through a destination-sized
/// temporary).
pub(crate) fn coerced_load<'a>(
    type_info: &dyn AbiTypeInfo<'a>,
    builder: &mut dyn Builder,
    mut source_ptr: Value,
    mut source_ty: Type<'a>,
    dest_ty: Type<'a>,
) -> Value {
    // Same lowered type: plain load.
    if type_info.ir_type(source_ty) == type_info.ir_type(dest_ty) {
        return builder.load(&type_info.ir_type(dest_ty), source_ptr, 0);
    }

    let dest_size = type_info.alloc_size(dest_ty);

    if source_ty.is_struct() {
        let (ptr, ty) =
            enter_struct_for_coerced_access(type_info, builder, source_ptr, source_ty, dest_size);
        source_ptr = ptr;
        source_ty = ty;
    }

    let source_size = type_info.alloc_size(source_ty);

    // Integer/pointer pairs extend or truncate through registers.
    if (dest_ty.is_integer() || dest_ty.is_pointer())
        && (source_ty.is_integer() || source_ty.is_pointer())
    {
        let loaded = builder.load(&type_info.ir_type(source_ty), source_ptr, 0);
        return coerce_int_or_ptr(type_info, builder, loaded, source_ty, dest_ty);
    }

    if source_size >= dest_size {
        // The load cannot read past the source. Source bigger than the
        // destination happens with over-aligned padding; the reinterpreting
        // load is still in bounds, but nothing is known about alignment.
        builder.load(&type_info.ir_type(dest_ty), source_ptr, 1)
    } else {
        // Coercion through memory: copy into a destination-sized
        // temporary and load that, leaving the tail undefined.
        let tmp = temp_alloca(type_info, builder, dest_ty, "coerce.mem.load");
        builder.memcpy(tmp, source_ptr, source_size.as_bytes(), 1);
        builder.load(&type_info.ir_type(dest_ty), tmp, 0)
    }
}

/// Store a first-class value through `dest_ptr`, splitting aggregates into
/// per-field stores, which the backend handles better than aggregate
/// stores.
pub(crate) fn build_agg_store<'a>(
    type_info: &dyn AbiTypeInfo<'a>,
    builder: &mut dyn Builder,
    source: Value,
    source_ty: Type<'a>,
    dest_ptr: Value,
    low_alignment: bool,
) {
    let align = if low_alignment { 1 } else { 0 };
    let source_ir = type_info.ir_type(source_ty);

    if let crate::ir::Type::Struct(fields) = &source_ir {
        for (i, _field) in fields.iter().enumerate() {
            let element_ptr = builder.struct_gep(&source_ir, dest_ptr, i as u32);
            let element = builder.extract_value(source, i as u32);
            builder.store(element, element_ptr, align);
        }
    } else {
        builder.store(source, dest_ptr, align);
    }
}

/// Store a value of `source_ty` into a pointer to a `dest_ty`.
///
/// When the source is larger than the destination, the upper source bits
/// are dropped.
pub(crate) fn coerced_store<'a>(
    type_info: &dyn AbiTypeInfo<'a>,
    builder: &mut dyn Builder,
    source: Value,
    mut dest_ptr: Value,
    source_ty: Type<'a>,
    mut dest_ty: Type<'a>,
) {
    if type_info.ir_type(source_ty) == type_info.ir_type(dest_ty) {
        builder.store(source, dest_ptr, 0);
        return;
    }

    let source_size = type_info.alloc_size(source_ty);

    if dest_ty.is_struct() {
        let (ptr, ty) =
            enter_struct_for_coerced_access(type_info, builder, dest_ptr, dest_ty, source_size);
        dest_ptr = ptr;
        dest_ty = ty;
    }

    if (source_ty.is_integer() || source_ty.is_pointer())
        && (dest_ty.is_integer() || dest_ty.is_pointer())
    {
        let coerced = coerce_int_or_ptr(type_info, builder, source, source_ty, dest_ty);
        builder.store(coerced, dest_ptr, 0);
        return;
    }

    let dest_size = type_info.alloc_size(dest_ty);

    if source_size <= dest_size {
        build_agg_store(type_info, builder, source, source_ty, dest_ptr, true);
    } else {
        // Coercion through memory: spill the whole source, then copy the
        // prefix the destination can hold.
        let tmp = temp_alloca(type_info, builder, source_ty, "coerce.mem.store");
        builder.store(source, tmp, 0);
        builder.memcpy(dest_ptr, tmp, dest_size.as_bytes(), 1);
    }
}
