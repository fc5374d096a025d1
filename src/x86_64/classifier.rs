//! The x86_64 System V lowering policy.
//!
//! [`Classifier::classify_function_type`] turns an abstract signature into
//! one [`ArgInfo`] per boundary crossing (element 0 is the return): it runs
//! the eightbyte [`Classification`], picks concrete IR-facing types for
//! each eightbyte, forms register pairs, and debits the 6-integer/8-SSE
//! register budget, spilling whole arguments to the stack when their
//! registers do not fit.

use log::trace;
use smallvec::SmallVec;

use crate::arg_info::ArgInfo;
use crate::result::{AbiError, AbiResult};
use crate::signature::FunctionType;
use crate::size::DataSize;
use crate::type_info::AbiTypeInfo;
use crate::types::{Type, DOUBLE, FLOAT, LONG_DOUBLE};
use crate::x86_64::arg_class::ArgClass;
use crate::x86_64::classification::Classification;

/// Register counts debited by one argument.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RegsNeeded {
    /// General-purpose registers needed.
    pub int: u32,
    /// SSE registers needed.
    pub sse: u32,
}

/// Find the index of the field that contains `offset`, given the field
/// offsets of a struct.
fn field_containing_offset(field_offsets: &[DataSize], offset: DataSize) -> usize {
    let mut index = 0;
    while index + 1 < field_offsets.len() {
        if field_offsets[index] <= offset && field_offsets[index + 1] > offset {
            break;
        }
        index += 1;
    }
    index
}

/// Whether the bit range `[start_bit, end_bit)` of `ty` is known to be off
/// the end of the value or alignment padding. Conservatively `false`.
fn bits_contain_no_user_data<'a>(
    type_info: &dyn AbiTypeInfo<'a>,
    ty: Type<'a>,
    start_bit: u64,
    end_bit: u64,
) -> bool {
    debug_assert!(start_bit <= end_bit);

    // If the queried bits are off the end of the type, there is no user
    // data hiding here.
    if type_info.alloc_size(ty).as_bits() <= start_bit {
        return true;
    }

    if ty.is_array() {
        let element = ty.array_element_type();
        let element_size = type_info.alloc_size(element);

        for i in 0..ty.array_element_count() {
            let element_offset = (element_size * i).as_bits();
            if element_offset >= end_bit {
                break;
            }

            let element_start = start_bit.saturating_sub(element_offset);
            if !bits_contain_no_user_data(type_info, element, element_start, end_bit - element_offset)
            {
                return false;
            }
        }

        // The range overlaps no elements.
        return true;
    }

    if ty.is_struct() {
        let offsets = type_info.struct_offsets(ty.struct_members());

        for (member, offset) in ty.struct_members().iter().zip(offsets.iter()) {
            let field_offset = offset.as_bits();
            if field_offset >= end_bit {
                break;
            }

            let field_start = start_bit.saturating_sub(field_offset);
            if !bits_contain_no_user_data(type_info, member.ty(), field_start, end_bit - field_offset)
            {
                return false;
            }
        }

        return true;
    }

    false
}

/// Whether `ty` has a `float` member at exactly `offset`; e.g.
/// `{int, {float}}` has a float at offset 4. Conservatively `false`.
fn contains_float_at_offset<'a>(
    type_info: &dyn AbiTypeInfo<'a>,
    ty: Type<'a>,
    offset: DataSize,
) -> bool {
    if offset == DataSize::ZERO && ty.is_float() {
        return true;
    }

    if ty.is_struct() {
        if ty.struct_members().is_empty() {
            return false;
        }
        let offsets = type_info.struct_offsets(ty.struct_members());
        let index = field_containing_offset(&offsets, offset);
        if offsets[index] > offset {
            return false;
        }
        return contains_float_at_offset(
            type_info,
            ty.struct_members()[index].ty(),
            offset - offsets[index],
        );
    }

    if ty.is_array() {
        let element = ty.array_element_type();
        let element_size = type_info.alloc_size(element);
        if element_size == DataSize::ZERO {
            return false;
        }
        let element_offset = element_size * (offset / element_size);
        return contains_float_at_offset(type_info, element, offset - element_offset);
    }

    if ty.is_complex() {
        // A complex value is laid out as two adjacent scalars.
        let element_size = DataSize::bits(type_info.alloc_size(ty).as_bits() / 2);
        let element_is_float = ty.complex_kind() == crate::types::FloatKind::Float;
        return element_is_float && (offset == DataSize::ZERO || offset == element_size);
    }

    false
}

/// Pick the type passed in the low 8 bytes of an XMM register for an SSE
/// eightbyte: `float`, `<2 x float>`, or `double`.
fn sse_type_at_offset<'a>(
    type_info: &dyn AbiTypeInfo<'a>,
    ty: Type<'a>,
    offset: DataSize,
    source_ty: Type<'a>,
    source_offset: DataSize,
) -> Type<'a> {
    debug_assert!(source_offset.as_bytes() == 0 || source_offset.as_bytes() == 8);

    // Pass as float if the last 4 bytes are just padding, as they are for
    // a struct of 3 floats.
    if bits_contain_no_user_data(
        type_info,
        source_ty,
        source_offset.as_bits() + 32,
        source_offset.as_bits() + 64,
    ) {
        return FLOAT;
    }

    // Pass as <2 x float> if there is a float at offset and offset+4.
    if contains_float_at_offset(type_info, ty, offset)
        && contains_float_at_offset(type_info, ty, offset + DataSize::bytes(4))
    {
        return type_info.type_builder().vector_ty(2, FLOAT);
    }

    DOUBLE
}

/// Pick the type passed in an 8-byte general purpose register for an
/// INTEGER eightbyte: the source scalar itself when it fills or tails the
/// eightbyte, or an unsigned fixed-width integer covering the live bytes.
fn integer_type_at_offset<'a>(
    type_info: &dyn AbiTypeInfo<'a>,
    ty: Type<'a>,
    offset: DataSize,
    source_ty: Type<'a>,
    source_offset: DataSize,
) -> Type<'a> {
    debug_assert!(source_offset.as_bytes() == 0 || source_offset.as_bytes() == 8);

    if offset == DataSize::ZERO {
        let type_size = type_info.alloc_size(ty);

        // Pointers and 8-byte integers always fill the eightbyte.
        if (ty.is_pointer() || ty.is_integer()) && type_size == DataSize::bytes(8) {
            return ty;
        }

        // A 1/2/4-byte integer can be used only if the rest of the
        // eightbyte is tail padding: allowed for the int of
        // {double, int}, but not {double, int, int}, where returning the
        // first int would drop the second.
        if (ty.is_pointer() || ty.is_integer())
            && matches!(type_size.as_bytes(), 1 | 2 | 4)
            && bits_contain_no_user_data(
                type_info,
                source_ty,
                source_offset.as_bits() + type_size.as_bits(),
                source_offset.as_bits() + 64,
            )
        {
            return ty;
        }
    }

    if ty.is_struct() && offset < type_info.alloc_size(ty) {
        let offsets = type_info.struct_offsets(ty.struct_members());
        let index = field_containing_offset(&offsets, offset);
        debug_assert!(offsets[index] <= offset);
        return integer_type_at_offset(
            type_info,
            ty.struct_members()[index].ty(),
            offset - offsets[index],
            source_ty,
            source_offset,
        );
    }

    if ty.is_array() && type_info.alloc_size(ty.array_element_type()) > DataSize::ZERO {
        let element = ty.array_element_type();
        let element_size = type_info.alloc_size(element);
        let element_offset = element_size * (offset / element_size);
        debug_assert!(element_offset <= offset);
        return integer_type_at_offset(
            type_info,
            element,
            offset - element_offset,
            source_ty,
            source_offset,
        );
    }

    // No better idea: an unsigned integer covering the rest of the value,
    // capped at the eightbyte.
    let source_size = type_info.alloc_size(source_ty);
    debug_assert!(source_size != source_offset, "empty field?");
    let int_size = (source_size - source_offset).min(DataSize::bytes(8));
    type_info.type_builder().fixed_int_ty(int_size, /* signed = */ false)
}

/// The type passed in a full XMM/YMM register when the high eightbyte is
/// `SseUp`: the source vector itself if it is a clean 128..256-bit vector,
/// else `<2 x double>`.
fn byte_vector_type<'a>(type_info: &dyn AbiTypeInfo<'a>, ty: Type<'a>) -> Type<'a> {
    // Wrapper structs/arrays that only contain a vector are passed just
    // like the vector.
    let ty = ty.struct_single_element(type_info).unwrap_or(ty);

    if ty.is_vector() {
        let width = type_info.raw_size(ty);
        let element = ty.vector_element_type();
        let element_bits = type_info.raw_size(element).as_bits();
        if (128..=256).contains(&width.as_bits())
            && (element.is_float()
                || element.is_double()
                || (element.is_integer() && matches!(element_bits, 8 | 16 | 32 | 64 | 128)))
        {
            return ty;
        }
    }

    type_info.type_builder().vector_ty(2, DOUBLE)
}

/// Given the low and high eightbyte types of a register pair, build the
/// two-member aggregate `{low, high}` that passes them, widening the low
/// part when needed so the high part lands at offset 8.
fn byval_argument_pair<'a>(
    type_info: &dyn AbiTypeInfo<'a>,
    mut low: Type<'a>,
    high: Type<'a>,
) -> Type<'a> {
    let low_size = type_info.alloc_size(low);
    let high_align = type_info.required_align(high);
    let high_start = low_size.round_up_to_align(high_align);
    debug_assert!(
        high_start > DataSize::ZERO && high_start <= DataSize::bytes(8),
        "invalid x86-64 argument pair"
    );

    // The high part must start at offset 8. The only low types the
    // eightbyte pickers produce that are not 8 bytes wide are float and
    // small integers; widen them rather than growing the high part, which
    // could read off the end of the value.
    if high_start != DataSize::bytes(8) {
        if low.is_float() {
            low = DOUBLE;
        } else {
            debug_assert!(low.is_integer(), "invalid low type in argument pair");
            low = type_info.type_builder().fixed_int_ty(DataSize::bytes(8), /* signed = */ true);
        }
    }

    let pair = type_info.type_builder().struct_ty(&[low, high]);
    debug_assert_eq!(
        type_info.struct_offsets(pair.struct_members())[1],
        DataSize::bytes(8),
        "invalid x86-64 argument pair"
    );
    pair
}

/// The x86_64 System V classifier.
pub struct Classifier<'a, 't> {
    type_info: &'t dyn AbiTypeInfo<'a>,
}

impl<'a, 't> Classifier<'a, 't> {
    /// Create a classifier over the given oracle.
    pub fn new(type_info: &'t dyn AbiTypeInfo<'a>) -> Self {
        Self { type_info }
    }

    /// Return an `ArgInfo` for a value of `ty` returned in memory.
    fn indirect_return_result(&self, ty: Type<'a>) -> ArgInfo<'a> {
        // Scalar values are assumed to be put in the right place by the
        // backend.
        if !ty.is_aggregate() {
            return if ty.is_promotable_integer() {
                ArgInfo::extend(ty)
            } else {
                ArgInfo::direct(ty)
            };
        }

        ArgInfo::indirect_no_byval(0)
    }

    /// Return an `ArgInfo` for a value of `ty` passed on the stack.
    fn indirect_result(&self, ty: Type<'a>, free_int_regs: u32) -> ArgInfo<'a> {
        // Scalars end up in the right place without byval.
        if !ty.is_aggregate() && (!ty.is_vector() || self.type_info.is_legal_vector(ty)) {
            return if ty.is_promotable_integer() {
                ArgInfo::extend(ty)
            } else {
                ArgInfo::direct(ty)
            };
        }

        // The byval alignment is spelled out so the mid-level optimizer
        // knows it.
        let align = self.type_info.required_align(ty).max(DataSize::bytes(8));

        // Once the integer registers are exhausted, an eightbyte-sized
        // aggregate lands on the stack either way; coercing it to a bare
        // integer avoids byval, which the backend handles badly. With
        // registers still free the coerced value could steal one, so only
        // do this when none remain.
        if free_int_regs == 0 {
            let size = self.type_info.alloc_size(ty);
            if align == DataSize::bytes(8) && size <= DataSize::bytes(8) {
                return ArgInfo::direct(
                    self.type_info.type_builder().fixed_int_ty(size, /* signed = */ false),
                );
            }
        }

        ArgInfo::indirect(align.as_bytes() as u32)
    }

    /// Classify a whole value: run the eightbyte walk with the memory
    /// fast paths around it.
    pub fn classify(&self, ty: Type<'a>, is_named_arg: bool) -> Classification {
        let mut classification = Classification::new();

        // Values over four eightbytes, and values with unaligned fields,
        // are passed in memory without looking inside them.
        if self.type_info.alloc_size(ty) > DataSize::bytes(32)
            || ty.has_unaligned_fields(self.type_info)
        {
            classification.add_field(0, ArgClass::Memory);
            return classification;
        }

        classification.classify_type(self.type_info, ty, 0, is_named_arg);

        // If the value exceeds two eightbytes and the pieces don't form
        // one vector register (low SSE, high SSEUP), the whole value goes
        // in memory.
        if self.type_info.alloc_size(ty) > DataSize::bytes(16)
            && (classification.low() != ArgClass::Sse
                || classification.high() != ArgClass::SseUp)
        {
            classification.add_field(0, ArgClass::Memory);
        }

        classification
    }

    /// Classify one argument or return value, producing its `ArgInfo` and
    /// the registers it needs.
    pub fn classify_type(
        &self,
        ty: Type<'a>,
        is_argument: bool,
        is_named_arg: bool,
        free_int_regs: u32,
        needed: &mut RegsNeeded,
    ) -> AbiResult<ArgInfo<'a>> {
        let classification = self.classify(ty, is_named_arg);

        debug_assert!(
            classification.high() != ArgClass::Memory
                || classification.low() == ArgClass::Memory
        );
        debug_assert!(
            classification.high() != ArgClass::SseUp || classification.low() == ArgClass::Sse
        );

        *needed = RegsNeeded::default();

        let mut result_type = match classification.low() {
            ArgClass::NoClass => {
                if classification.high() == ArgClass::NoClass {
                    return Ok(ArgInfo::ignore());
                }
                // The low part is padding.
                debug_assert!(matches!(
                    classification.high(),
                    ArgClass::Sse | ArgClass::Integer | ArgClass::X87Up
                ));
                None
            }

            ArgClass::SseUp | ArgClass::X87Up => {
                unreachable!("low eightbyte can't be {:?}", classification.low())
            }

            ArgClass::Memory => {
                return Ok(if is_argument {
                    // AMD64 ABI §3.2.3p3 rule 1: MEMORY arguments go on
                    // the stack.
                    self.indirect_result(ty, free_int_regs)
                } else {
                    // §3.2.3p4 rule 2: MEMORY returns go through the
                    // hidden sret pointer.
                    self.indirect_return_result(ty)
                });
            }

            // §3.2.3p3 rule 2 / §3.2.3p4 rule 3: INTEGER eightbytes take
            // the next general purpose register.
            ArgClass::Integer => {
                needed.int += 1;

                let picked =
                    integer_type_at_offset(self.type_info, ty, DataSize::ZERO, ty, DataSize::ZERO);

                // Promotable integers keep their extension attribute.
                if classification.high() == ArgClass::NoClass
                    && picked.is_integer()
                    && ty.is_integral_type()
                    && ty.is_promotable_integer()
                {
                    return Ok(ArgInfo::extend(picked));
                }
                Some(picked)
            }

            // §3.2.3p3 rule 3 / §3.2.3p4 rule 4: SSE eightbytes take the
            // next SSE register.
            ArgClass::Sse => {
                needed.sse += 1;
                Some(sse_type_at_offset(self.type_info, ty, DataSize::ZERO, ty, DataSize::ZERO))
            }

            ArgClass::X87 => {
                if is_argument {
                    // §3.2.3p3 rule 5: x87 values go through memory.
                    return Ok(self.indirect_result(ty, free_int_regs));
                }
                // §3.2.3p4 rule 6: returned on the x87 stack in %st0.
                Some(LONG_DOUBLE)
            }

            ArgClass::ComplexX87 => {
                debug_assert!(classification.high() == ArgClass::ComplexX87);
                if is_argument {
                    return Ok(self.indirect_result(ty, free_int_regs));
                }
                // §3.2.3p4 rule 8: real part in %st0, imaginary in %st1.
                Some(self.type_info.type_builder().struct_ty(&[LONG_DOUBLE, LONG_DOUBLE]))
            }
        };

        let mut high_part: Option<Type<'a>> = None;

        match classification.high() {
            ArgClass::Memory | ArgClass::X87 | ArgClass::ComplexX87 => {
                unreachable!("high eightbyte can't be {:?}", classification.high())
            }

            ArgClass::NoClass => {}

            ArgClass::Integer => {
                needed.int += 1;
                let picked = integer_type_at_offset(
                    self.type_info,
                    ty,
                    DataSize::bytes(8),
                    ty,
                    DataSize::bytes(8),
                );
                if result_type.is_none() {
                    // Only the high eightbyte is live: pass it at offset 8.
                    return Ok(ArgInfo::direct_at_offset(picked, 8));
                }
                high_part = Some(picked);
            }

            ArgClass::Sse => {
                let picked = sse_type_at_offset(
                    self.type_info,
                    ty,
                    DataSize::bytes(8),
                    ty,
                    DataSize::bytes(8),
                );
                if result_type.is_none() {
                    return Ok(ArgInfo::direct_at_offset(picked, 8));
                }
                needed.sse += 1;
                high_part = Some(picked);
            }

            // §3.2.3p3 rule 4 / §3.2.3p4 rule 5: SSEUP extends the last
            // SSE register to a full vector.
            ArgClass::SseUp => {
                debug_assert!(classification.low() == ArgClass::Sse);
                result_type = Some(byte_vector_type(self.type_info, ty));
            }

            // §3.2.3p4 rule 7: X87UP is returned with the X87 low half in
            // %st0; anything else in the high half behaves like SSE.
            ArgClass::X87Up => {
                if classification.low() != ArgClass::X87 {
                    if is_argument {
                        return Err(AbiError::Unimplemented("x87up argument eightbyte"));
                    }
                    let picked = sse_type_at_offset(
                        self.type_info,
                        ty,
                        DataSize::bytes(8),
                        ty,
                        DataSize::bytes(8),
                    );
                    if result_type.is_none() {
                        return Ok(ArgInfo::direct_at_offset(picked, 8));
                    }
                    high_part = Some(picked);
                }
                needed.sse += 1;
            }
        }

        let result_type = result_type.expect("low eightbyte type must be picked by now");

        // When both halves are live, pass them as the first-class
        // aggregate {low, high} with the high half at offset 8.
        let result_type = match high_part {
            Some(high) => byval_argument_pair(self.type_info, result_type, high),
            None => result_type,
        };

        Ok(ArgInfo::direct(result_type))
    }

    /// Classify the return value of a function.
    pub fn classify_return_type(&self, ty: Type<'a>) -> AbiResult<ArgInfo<'a>> {
        let mut needed = RegsNeeded::default();
        self.classify_type(
            ty,
            /* is_argument = */ false,
            /* is_named_arg = */ true,
            /* free_int_regs = */ 0,
            &mut needed,
        )
    }

    /// Classify a whole signature, producing the `ArgInfo` sequence with
    /// the return descriptor at element 0.
    ///
    /// `argument_types` may extend the fixed arguments with (already
    /// promoted) variadic arguments; those share the register pool but
    /// never pass 256-bit vectors in registers.
    pub fn classify_function_type(
        &self,
        function_type: &FunctionType<'a>,
        argument_types: &[Type<'a>],
    ) -> AbiResult<SmallVec<[ArgInfo<'a>; 8]>> {
        let return_info = self.classify_return_type(function_type.return_type())?;

        let mut arg_infos: SmallVec<[ArgInfo<'a>; 8]> = SmallVec::new();
        arg_infos.push(return_info);

        let mut free_int_regs: u32 = 6;
        let mut free_sse_regs: u32 = 8;

        // An indirect return consumes one integer register for the hidden
        // sret pointer.
        if arg_infos[0].is_indirect() {
            free_int_regs -= 1;
        }

        let num_fixed_args = function_type.argument_types().len();

        // AMD64 ABI §3.2.3p3: registers are assigned left to right, and if
        // no registers remain for any eightbyte of an argument, the whole
        // argument goes on the stack.
        for (index, &arg_type) in argument_types.iter().enumerate() {
            let is_named_arg = index < num_fixed_args;

            let mut needed = RegsNeeded::default();
            let mut arg_info = self.classify_type(
                arg_type,
                /* is_argument = */ true,
                is_named_arg,
                free_int_regs,
                &mut needed,
            )?;

            if free_int_regs >= needed.int && free_sse_regs >= needed.sse {
                free_int_regs -= needed.int;
                free_sse_regs -= needed.sse;
            } else {
                arg_info = self.indirect_result(arg_type, free_int_regs);
            }

            trace!("x86_64 arg {index}: {arg_type} -> {arg_info}");
            arg_infos.push(arg_info);
        }

        Ok(arg_infos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TypeBuilder, CHAR, DOUBLE, FLOAT, INT, LONG_DOUBLE, POINTER, VOID};
    use crate::x86_64::cpu::{cpu_features, CpuKind};
    use crate::x86_64::type_info::TypeInfo;
    use std::str::FromStr;
    use target_lexicon::Triple;

    fn type_info<'a>(types: &'a TypeBuilder<'a>) -> TypeInfo<'a> {
        let triple = Triple::from_str("x86_64-unknown-linux-gnu").unwrap();
        TypeInfo::new(types, cpu_features(&triple, CpuKind::X86_64))
    }

    #[test]
    fn classification_is_deterministic() {
        let types = TypeBuilder::new();
        let ti = type_info(&types);
        let classifier = Classifier::new(&ti);

        let inner = types.struct_ty(&[FLOAT, FLOAT, INT]);
        let ty = types.struct_ty(&[inner, CHAR]);
        let fty = FunctionType::new(VOID, &[ty, INT, DOUBLE], false);

        let first = classifier.classify_function_type(&fty, fty.argument_types()).unwrap();
        let second = classifier.classify_function_type(&fty, fty.argument_types()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn two_ints_coerce_to_one_eightbyte() {
        let types = TypeBuilder::new();
        let ti = type_info(&types);
        let classifier = Classifier::new(&ti);

        let ty = types.struct_ty(&[INT, INT]);
        let info = classifier.classify_return_type(ty).unwrap();
        let coerced = info.coerce_to().unwrap();
        assert!(coerced.is_fixed_width_integer());
        assert_eq!(coerced.integer_width(), DataSize::bytes(8));
    }

    #[test]
    fn two_floats_coerce_to_vector() {
        let types = TypeBuilder::new();
        let ti = type_info(&types);
        let classifier = Classifier::new(&ti);

        let ty = types.struct_ty(&[FLOAT, FLOAT]);
        let info = classifier.classify_return_type(ty).unwrap();
        let coerced = info.coerce_to().unwrap();
        assert!(coerced.is_vector());
        assert_eq!(coerced.vector_element_count(), 2);
        assert_eq!(coerced.vector_element_type(), FLOAT);
    }

    #[test]
    fn x87_argument_stays_a_direct_scalar() {
        let types = TypeBuilder::new();
        let ti = type_info(&types);
        let classifier = Classifier::new(&ti);

        let mut needed = RegsNeeded::default();
        let info =
            classifier.classify_type(LONG_DOUBLE, true, true, 6, &mut needed).unwrap();
        // Scalar x87 arguments pass directly; the backend places them on
        // the stack.
        assert_eq!(info, ArgInfo::direct(LONG_DOUBLE));
    }

    #[test]
    fn long_double_returns_on_the_x87_stack() {
        let types = TypeBuilder::new();
        let ti = type_info(&types);
        let classifier = Classifier::new(&ti);

        let info = classifier.classify_return_type(LONG_DOUBLE).unwrap();
        assert_eq!(info.coerce_to(), Some(LONG_DOUBLE));
    }

    #[test]
    fn oversized_struct_spills_byval() {
        let types = TypeBuilder::new();
        let ti = type_info(&types);
        let classifier = Classifier::new(&ti);

        let ty = types.struct_ty(&[INT, INT, INT, INT, INT]);
        let mut needed = RegsNeeded::default();
        let info = classifier.classify_type(ty, true, true, 6, &mut needed).unwrap();
        assert!(matches!(info, ArgInfo::Indirect { align: 8, by_val: true, .. }));
    }

    #[test]
    fn eightbyte_budget_holds_for_small_aggregates() {
        let types = TypeBuilder::new();
        let ti = type_info(&types);
        let classifier = Classifier::new(&ti);

        for ty in [
            types.struct_ty(&[INT, INT]),
            types.struct_ty(&[INT, INT, INT, INT]),
            types.struct_ty(&[FLOAT, FLOAT, FLOAT]),
            types.struct_ty(&[DOUBLE, INT]),
            types.struct_ty(&[POINTER, INT]),
            types.array_ty(2, DOUBLE),
        ] {
            let classification = classifier.classify(ty, true);
            assert!(!classification.is_memory());

            let mut needed = RegsNeeded::default();
            let info = classifier.classify_type(ty, true, true, 6, &mut needed).unwrap();
            assert!(needed.int + needed.sse <= 2);
            let coerced = info.coerce_to().unwrap();
            assert!(ti.alloc_size(coerced) <= DataSize::bytes(16));
        }
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        /// An owned description of an abstract type, realizable against
        /// any builder.
        #[derive(Clone, Debug)]
        enum TypeSpec {
            Char,
            Int,
            LongLong,
            Float,
            Double,
            Ptr,
            Struct(Vec<TypeSpec>),
            Array(u8, Box<TypeSpec>),
        }

        fn realize<'a>(types: &'a TypeBuilder<'a>, spec: &TypeSpec) -> Type<'a> {
            match spec {
                TypeSpec::Char => CHAR,
                TypeSpec::Int => INT,
                TypeSpec::LongLong => crate::types::LONG_LONG,
                TypeSpec::Float => FLOAT,
                TypeSpec::Double => DOUBLE,
                TypeSpec::Ptr => POINTER,
                TypeSpec::Struct(members) => {
                    let members: Vec<Type<'a>> =
                        members.iter().map(|m| realize(types, m)).collect();
                    types.struct_ty(&members)
                }
                TypeSpec::Array(count, element) => {
                    types.array_ty(u64::from(*count), realize(types, element))
                }
            }
        }

        fn type_spec() -> impl Strategy<Value = TypeSpec> {
            let leaf = prop_oneof![
                Just(TypeSpec::Char),
                Just(TypeSpec::Int),
                Just(TypeSpec::LongLong),
                Just(TypeSpec::Float),
                Just(TypeSpec::Double),
                Just(TypeSpec::Ptr),
            ];
            leaf.prop_recursive(3, 16, 5, |inner| {
                prop_oneof![
                    prop::collection::vec(inner.clone(), 0..5).prop_map(TypeSpec::Struct),
                    (1u8..4, inner).prop_map(|(n, t)| TypeSpec::Array(n, Box::new(t))),
                ]
            })
        }

        proptest! {
            #[test]
            fn classification_is_deterministic_for_arbitrary_types(spec in type_spec()) {
                let types = TypeBuilder::new();
                let ti = type_info(&types);
                let classifier = Classifier::new(&ti);
                let ty = realize(&types, &spec);

                prop_assert_eq!(classifier.classify(ty, true), classifier.classify(ty, true));

                let mut first_needed = RegsNeeded::default();
                let mut second_needed = RegsNeeded::default();
                let first = classifier.classify_type(ty, true, true, 6, &mut first_needed);
                let second = classifier.classify_type(ty, true, true, 6, &mut second_needed);
                prop_assert_eq!(first, second);
                prop_assert_eq!(first_needed, second_needed);
            }

            #[test]
            fn eightbyte_budget_for_arbitrary_small_types(spec in type_spec()) {
                let types = TypeBuilder::new();
                let ti = type_info(&types);
                let classifier = Classifier::new(&ti);
                let ty = realize(&types, &spec);

                prop_assume!(ti.alloc_size(ty) <= DataSize::bytes(16));
                prop_assume!(!classifier.classify(ty, true).is_memory());

                let mut needed = RegsNeeded::default();
                let info = classifier.classify_type(ty, true, true, 6, &mut needed).unwrap();
                prop_assert!(needed.int + needed.sse <= 2);
                if let Some(coerced) = info.coerce_to() {
                    prop_assert!(ti.alloc_size(coerced) <= DataSize::bytes(16));
                }
            }
        }
    }

    #[test]
    fn register_exhaustion_spills_to_stack() {
        let types = TypeBuilder::new();
        let ti = type_info(&types);
        let classifier = Classifier::new(&ti);

        // Seven pointer-sized args: the seventh exhausts the 6 integer
        // registers and an aggregate in that position goes indirect.
        let pair = types.struct_ty(&[POINTER, POINTER]);
        let args = [POINTER, POINTER, POINTER, POINTER, POINTER, POINTER, pair];
        let fty = FunctionType::new(VOID, &args, false);
        let infos = classifier.classify_function_type(&fty, fty.argument_types()).unwrap();

        for info in &infos[1..7] {
            assert!(info.is_direct());
        }
        assert!(infos[7].is_indirect());
    }
}
