//! The i386 lowering policy.
//!
//! Simpler than x86_64: a small pool of integer registers for
//! fastcall/vectorcall/regparm, a return-in-register rule keyed on the OS,
//! struct expansion for flat 32/64-bit layouts, and byval with explicit
//! stack alignment for everything that stays in memory.

use log::trace;
use smallvec::SmallVec;

use crate::arg_info::ArgInfo;
use crate::callconv::CallingConvention;
use crate::result::AbiResult;
use crate::signature::FunctionType;
use crate::size::DataSize;
use crate::type_info::AbiTypeInfo;
use crate::types::{Type, DOUBLE, FLOAT, INT, VOID};

use target_lexicon::{OperatingSystem, Triple};

/// Minimum stack alignment guaranteed by the i386 ABI.
const MIN_ABI_STACK_ALIGN: DataSize = DataSize::bytes(4);

/// Mutable register accounting threaded through one signature's
/// classification.
struct CcState {
    call_conv: CallingConvention,
    free_regs: u32,
    free_sse_regs: u32,
}

/// A scalar's broad register class on i386.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Class {
    Integer,
    Float,
}

fn is_register_size(size: DataSize) -> bool {
    matches!(size.as_bits(), 8 | 16 | 32 | 64)
}

/// If `ty` is a homogeneous aggregate, the base type and leaf count.
///
/// A homogeneous aggregate has leaves that are all the one float, double,
/// or 128/256-bit vector type, with no padding, and at most four of them
/// (the vectorcall HVA limit).
pub(crate) fn homogeneous_aggregate<'a>(
    type_info: &dyn AbiTypeInfo<'a>,
    ty: Type<'a>,
) -> Option<(Type<'a>, u64)> {
    fn walk<'a>(type_info: &dyn AbiTypeInfo<'a>, ty: Type<'a>) -> Option<(Type<'a>, u64)> {
        if ty.is_float() || ty.is_double() {
            return Some((ty, 1));
        }
        if ty.is_vector() {
            let bits = type_info.alloc_size(ty).as_bits();
            return if bits == 128 || bits == 256 { Some((ty, 1)) } else { None };
        }
        if ty.is_array() {
            if ty.array_element_count() == 0 {
                return None;
            }
            let (base, count) = walk(type_info, ty.array_element_type())?;
            return Some((base, count * ty.array_element_count()));
        }
        if ty.is_struct() {
            let mut base: Option<Type<'a>> = None;
            let mut total = 0;
            for member in ty.struct_members() {
                let (member_base, count) = walk(type_info, member.ty())?;
                if *base.get_or_insert(member_base) != member_base {
                    return None;
                }
                total += count;
            }
            return base.map(|base| (base, total));
        }
        if ty.is_union() {
            let mut base: Option<Type<'a>> = None;
            let mut largest = 0;
            for member in ty.union_members() {
                let (member_base, count) = walk(type_info, *member)?;
                if *base.get_or_insert(member_base) != member_base {
                    return None;
                }
                largest = largest.max(count);
            }
            return base.map(|base| (base, largest));
        }
        None
    }

    let (base, count) = walk(type_info, ty)?;
    if count == 0 || count > 4 {
        return None;
    }
    // Padding disqualifies the aggregate.
    if type_info.alloc_size(base) * count != type_info.alloc_size(ty) {
        return None;
    }
    Some((base, count))
}

/// The i386 classifier.
pub struct Classifier<'a, 't> {
    type_info: &'t dyn AbiTypeInfo<'a>,
    triple: Triple,
}

impl<'a, 't> Classifier<'a, 't> {
    /// Create a classifier for an i386 triple.
    pub fn new(type_info: &'t dyn AbiTypeInfo<'a>, triple: Triple) -> Self {
        Self { type_info, triple }
    }

    fn is_darwin(&self) -> bool {
        matches!(
            self.triple.operating_system,
            OperatingSystem::Darwin | OperatingSystem::MacOSX { .. } | OperatingSystem::Ios
        )
    }

    /// Whether register-sized structs are returned in registers on this
    /// OS (Darwin, the BSDs and Win32; not Linux).
    fn is_small_struct_in_reg_abi(&self) -> bool {
        self.is_darwin()
            || matches!(
                self.triple.operating_system,
                OperatingSystem::Dragonfly
                    | OperatingSystem::Freebsd
                    | OperatingSystem::Openbsd
                    | OperatingSystem::Windows
            )
    }

    fn is_win32_struct_abi(&self) -> bool {
        // MSVC rules; MinGW follows the System V ones.
        self.triple.operating_system == OperatingSystem::Windows
            && self.triple.environment != target_lexicon::Environment::Gnu
    }

    /// Whether `ty` would be returned in a register under the Darwin-style
    /// small-struct rule: register sized, and transitively composed of
    /// register-passable primitives.
    fn should_return_type_in_register(&self, ty: Type<'a>) -> bool {
        let size = self.type_info.alloc_size(ty);

        if !is_register_size(size) {
            return false;
        }

        if ty.is_vector() {
            // 64- and 128-bit vectors inside structures are not returned
            // in registers.
            return !matches!(size.as_bits(), 64 | 128);
        }

        if ty.is_integer() || ty.is_floating_point() || ty.is_pointer() || ty.is_complex() {
            return true;
        }

        if ty.is_array() {
            return self.should_return_type_in_register(ty.array_element_type());
        }

        if !ty.is_struct() {
            return false;
        }

        ty.struct_members().iter().all(|member| {
            member.is_empty_field(/* allow_arrays = */ true)
                || self.should_return_type_in_register(member.ty())
        })
    }

    /// An indirect return; the hidden pointer consumes one register when
    /// any are free.
    fn indirect_return_result(&self, state: &mut CcState) -> ArgInfo<'a> {
        if state.free_regs > 0 {
            state.free_regs -= 1;
            return ArgInfo::indirect_in_reg(0, /* by_val = */ false);
        }
        ArgInfo::indirect_no_byval(0)
    }

    fn classify_return_type(&self, return_type: Type<'a>, state: &mut CcState) -> ArgInfo<'a> {
        if return_type.is_void() {
            return ArgInfo::ignore();
        }

        if state.call_conv == CallingConvention::VectorCall
            && homogeneous_aggregate(self.type_info, return_type).is_some()
        {
            // Homogeneous vector aggregates lower cleanly as themselves.
            return ArgInfo::direct(return_type);
        }

        if return_type.is_vector() {
            // On Darwin, some vectors are returned in registers.
            if self.is_darwin() {
                let size = self.type_info.alloc_size(return_type);

                // 128-bit vectors are returned in registers, in a shape
                // the backend likes.
                if size.as_bits() == 128 {
                    let i64_ty = self
                        .type_info
                        .type_builder()
                        .fixed_int_ty(DataSize::bytes(8), /* signed = */ true);
                    return ArgInfo::direct(
                        self.type_info.type_builder().vector_ty(2, i64_ty),
                    );
                }

                // Return in a register if it fits in one, or is 64 bits
                // with a single element.
                if matches!(size.as_bits(), 8 | 16 | 32)
                    || (size.as_bits() == 64 && return_type.vector_element_count() == 1)
                {
                    return ArgInfo::direct(
                        self.type_info.type_builder().fixed_int_ty(size, /* signed = */ false),
                    );
                }

                return self.indirect_return_result(state);
            }

            return ArgInfo::direct(return_type);
        }

        if return_type.is_aggregate() {
            // Unless the OS returns small structs in registers, structs
            // and unions are always indirect (complex values are not).
            if !self.is_small_struct_in_reg_abi() && !return_type.is_complex() {
                return self.indirect_return_result(state);
            }

            if self.should_return_type_in_register(return_type) {
                let size = self.type_info.alloc_size(return_type);

                // A single-element struct returns as its element when
                // that is a float/double (not under MSVC) or a pointer.
                if let Some(element) = return_type.struct_single_element(self.type_info) {
                    if (!self.is_win32_struct_abi() && element.is_floating_point())
                        || element.is_pointer()
                    {
                        return ArgInfo::direct(element);
                    }
                }

                return ArgInfo::direct(
                    self.type_info.type_builder().fixed_int_ty(size, /* signed = */ false),
                );
            }

            return self.indirect_return_result(state);
        }

        if return_type.is_promotable_integer() {
            ArgInfo::extend(return_type)
        } else {
            ArgInfo::direct(return_type)
        }
    }

    fn is_sse_vector_type(&self, ty: Type<'a>) -> bool {
        ty.is_vector() && self.type_info.alloc_size(ty).as_bits() == 128
    }

    fn is_record_with_sse_vector_type(&self, ty: Type<'a>) -> bool {
        if !ty.is_struct() {
            return false;
        }
        ty.struct_members().iter().any(|member| {
            self.is_sse_vector_type(member.ty())
                || self.is_record_with_sse_vector_type(member.ty())
        })
    }

    /// The explicit stack alignment for a byval argument, or zero when
    /// the default is fine.
    fn type_stack_align(&self, ty: Type<'a>, align: DataSize) -> DataSize {
        // At or below the minimum ABI alignment the backend handles it.
        if align <= MIN_ABI_STACK_ALIGN {
            return DataSize::ZERO;
        }

        // Outside Darwin the stack type alignment is always 4.
        if !self.is_darwin() {
            return MIN_ABI_STACK_ALIGN;
        }

        // On Darwin, SSE-containing records align to 16.
        if align >= DataSize::bytes(16)
            && (self.is_sse_vector_type(ty) || self.is_record_with_sse_vector_type(ty))
        {
            return DataSize::bytes(16);
        }

        MIN_ABI_STACK_ALIGN
    }

    fn indirect_result(&self, ty: Type<'a>, by_val: bool, state: &mut CcState) -> ArgInfo<'a> {
        if !by_val {
            if state.free_regs > 0 {
                state.free_regs -= 1;
                return ArgInfo::indirect_in_reg(0, /* by_val = */ false);
            }
            return ArgInfo::indirect_no_byval(0);
        }

        let type_align = self.type_info.required_align(ty);
        let stack_align = self.type_stack_align(ty, type_align);
        if stack_align == DataSize::ZERO {
            return ArgInfo::indirect(4);
        }

        // If the stack alignment is weaker than the type's, the callee
        // must realign.
        if type_align > stack_align {
            ArgInfo::indirect_realign(stack_align.as_bytes() as u32)
        } else {
            ArgInfo::indirect(stack_align.as_bytes() as u32)
        }
    }

    fn classify(&self, ty: Type<'a>) -> Class {
        let element = ty.struct_single_element(self.type_info).unwrap_or(ty);
        if element == FLOAT || element == DOUBLE {
            Class::Float
        } else {
            Class::Integer
        }
    }

    /// Decide whether `ty` goes in registers, debiting the pool. Sets
    /// `needs_padding` when fastcall/vectorcall must keep a register slot
    /// occupied with a padding argument.
    fn should_use_in_reg(&self, ty: Type<'a>, state: &mut CcState, needs_padding: &mut bool) -> bool {
        *needs_padding = false;

        if self.classify(ty) == Class::Float {
            return false;
        }

        let size = self.type_info.alloc_size(ty);
        let size_in_regs = size.round_up_to_align(DataSize::bytes(4)) / DataSize::bytes(4);

        if size_in_regs == 0 {
            return false;
        }

        if size_in_regs > state.free_regs as u64 {
            state.free_regs = 0;
            return false;
        }

        state.free_regs -= size_in_regs as u32;

        if matches!(state.call_conv, CallingConvention::FastCall | CallingConvention::VectorCall) {
            if size.as_bits() > 32 {
                return false;
            }

            if ty.is_integer() || ty.is_pointer() {
                return true;
            }

            if state.free_regs > 0 {
                *needs_padding = true;
            }

            return false;
        }

        true
    }

    /// Whether `ty` is an MMX-register vector: 64 bits of integer lanes
    /// narrower than 64 bits.
    fn is_mmx_type(&self, ty: Type<'a>) -> bool {
        ty.is_vector()
            && self.type_info.alloc_size(ty).as_bits() == 64
            && ty.vector_element_type().is_integer()
            && self.type_info.alloc_size(ty.vector_element_type()).as_bits() != 64
    }

    fn is_32_or_64_bit_basic_type(&self, ty: Type<'a>) -> bool {
        // Complex values count as their element type.
        let ty = if ty.is_complex() {
            let kind = ty.complex_kind();
            self.type_info.type_builder().float_ty(kind)
        } else {
            ty
        };

        if !ty.is_integral_type() {
            return false;
        }

        let size = self.type_info.alloc_size(ty);
        matches!(size.as_bits(), 32 | 64)
    }

    /// Whether the struct's layout is a flat, hole-free sequence of 32 or
    /// 64-bit primitives, making it expandable into plain arguments.
    fn can_expand_indirect_argument(&self, ty: Type<'a>) -> bool {
        if !ty.is_struct() {
            return false;
        }

        let mut size = DataSize::ZERO;
        for member in ty.struct_members() {
            if !self.is_32_or_64_bit_basic_type(member.ty()) {
                return false;
            }
            size += self.type_info.alloc_size(member.ty());
        }

        // No holes.
        size == self.type_info.alloc_size(ty)
    }

    fn classify_argument_type(&self, ty: Type<'a>, state: &mut CcState) -> ArgInfo<'a> {
        // vectorcall passes homogeneous vector aggregates in SSE
        // registers while any remain.
        if state.call_conv == CallingConvention::VectorCall {
            if let Some((_, count)) = homogeneous_aggregate(self.type_info, ty) {
                if state.free_sse_regs as u64 >= count {
                    state.free_sse_regs -= count as u32;
                    if ty.is_integer() || ty.is_floating_point() || ty.is_vector() {
                        return ArgInfo::direct(ty);
                    }
                    return ArgInfo::expand();
                }
                return self.indirect_result(ty, /* by_val = */ false, state);
            }
        }

        if ty.is_aggregate() {
            if ty.is_struct() {
                // Structs are always byval on Win32, regardless of what
                // they contain.
                if self.is_win32_struct_abi() {
                    return self.indirect_result(ty, /* by_val = */ true, state);
                }
            }

            if ty.is_empty_record(/* allow_arrays = */ true) {
                return ArgInfo::ignore();
            }

            let mut needs_padding = false;
            if self.should_use_in_reg(ty, state, &mut needs_padding) {
                // Pass in registers as a struct of i32s covering the
                // value.
                let size = self.type_info.alloc_size(ty);
                let size_in_regs = size.round_up_to_align(DataSize::bytes(4)) / DataSize::bytes(4);
                let elements: SmallVec<[Type<'a>; 3]> =
                    (0..size_in_regs).map(|_| INT).collect();
                let result = self.type_info.type_builder().struct_ty(&elements);
                return ArgInfo::direct_in_reg(result);
            }

            let padding = if needs_padding { INT } else { VOID };

            // Expand small records whose stack layout matches the struct
            // layout; byval would inhibit too many optimizations.
            if self.type_info.alloc_size(ty).as_bits() <= 4 * 32
                && self.can_expand_indirect_argument(ty)
            {
                return ArgInfo::expand_with_padding(
                    matches!(
                        state.call_conv,
                        CallingConvention::FastCall | CallingConvention::VectorCall
                    ),
                    padding,
                );
            }

            return self.indirect_result(ty, /* by_val = */ true, state);
        }

        if ty.is_vector() {
            // On Darwin, small vectors pass as integers.
            if self.is_darwin() {
                let size = self.type_info.alloc_size(ty);
                if matches!(size.as_bits(), 8 | 16 | 32)
                    || (size.as_bits() == 64 && ty.vector_element_count() == 1)
                {
                    return ArgInfo::direct(
                        self.type_info.type_builder().fixed_int_ty(size, /* signed = */ false),
                    );
                }
            }

            if self.is_mmx_type(ty) {
                return ArgInfo::direct(
                    self.type_info
                        .type_builder()
                        .fixed_int_ty(DataSize::bytes(8), /* signed = */ true),
                );
            }

            return ArgInfo::direct(ty);
        }

        let mut needs_padding = false;
        let in_reg = self.should_use_in_reg(ty, state, &mut needs_padding);

        if ty.is_promotable_integer() {
            if in_reg {
                return ArgInfo::extend_in_reg(ty);
            }
            return ArgInfo::extend(ty);
        }
        if in_reg {
            return ArgInfo::direct_in_reg(ty);
        }
        ArgInfo::direct(ty)
    }

    /// Classify a whole signature; element 0 of the result is the return.
    pub fn classify_function_type(
        &self,
        function_type: &FunctionType<'a>,
        argument_types: &[Type<'a>],
    ) -> AbiResult<SmallVec<[ArgInfo<'a>; 8]>> {
        let mut state = CcState {
            call_conv: function_type.call_conv(),
            free_regs: match function_type.call_conv() {
                CallingConvention::FastCall | CallingConvention::VectorCall => 2,
                // By default no arguments are passed in registers.
                _ => 0,
            },
            free_sse_regs: if function_type.call_conv() == CallingConvention::VectorCall {
                6
            } else {
                0
            },
        };

        let mut arg_infos = SmallVec::new();
        arg_infos.push(self.classify_return_type(function_type.return_type(), &mut state));

        for (index, &arg_type) in argument_types.iter().enumerate() {
            let arg_info = self.classify_argument_type(arg_type, &mut state);
            trace!("i386 arg {index}: {arg_type} -> {arg_info}");
            arg_infos.push(arg_info);
        }

        Ok(arg_infos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TypeBuilder, CHAR, INT, POINTER};
    use crate::x86_32::type_info::TypeInfo;
    use std::str::FromStr;

    fn classifier<'a, 't>(ti: &'t TypeInfo<'a>, triple: &str) -> Classifier<'a, 't> {
        Classifier::new(ti, Triple::from_str(triple).unwrap())
    }

    #[test]
    fn small_struct_returns_differ_by_os() {
        let types = TypeBuilder::new();
        let ti = TypeInfo::new(&types);
        let ty = types.struct_ty(&[INT]);

        // Linux returns even a register-sized struct through sret.
        let linux = classifier(&ti, "i686-unknown-linux-gnu");
        let fty = FunctionType::new(ty, &[], false);
        let infos = linux.classify_function_type(&fty, &[]).unwrap();
        assert!(infos[0].is_indirect());

        // Darwin returns it by value as i32... except a single-element
        // struct of a pointer/float unwraps to the element; an {int}
        // struct becomes a fixed i32.
        let darwin = classifier(&ti, "i686-apple-darwin");
        let infos = darwin.classify_function_type(&fty, &[]).unwrap();
        let coerced = infos[0].coerce_to().unwrap();
        assert!(coerced.is_fixed_width_integer());
        assert_eq!(coerced.integer_width(), DataSize::bytes(4));
    }

    #[test]
    fn flat_struct_expands() {
        let types = TypeBuilder::new();
        let ti = TypeInfo::new(&types);
        let linux = classifier(&ti, "i686-unknown-linux-gnu");

        let flat = types.struct_ty(&[INT, INT]);
        let fty = FunctionType::new(crate::types::VOID, &[flat], false);
        let infos = linux.classify_function_type(&fty, fty.argument_types()).unwrap();
        assert!(infos[1].is_expand());

        // A char member breaks the flat 32/64-bit rule.
        let ragged = types.struct_ty(&[INT, CHAR]);
        let fty = FunctionType::new(crate::types::VOID, &[ragged], false);
        let infos = linux.classify_function_type(&fty, fty.argument_types()).unwrap();
        assert!(infos[1].is_indirect());
    }

    #[test]
    fn fastcall_uses_two_registers() {
        let types = TypeBuilder::new();
        let ti = TypeInfo::new(&types);
        let linux = classifier(&ti, "i686-unknown-linux-gnu");

        let fty = FunctionType::new(crate::types::VOID, &[POINTER, POINTER, POINTER], false)
            .with_call_conv(CallingConvention::FastCall);
        let infos = linux.classify_function_type(&fty, fty.argument_types()).unwrap();
        assert!(matches!(infos[1], ArgInfo::Direct { in_reg: true, .. }));
        assert!(matches!(infos[2], ArgInfo::Direct { in_reg: true, .. }));
        assert!(matches!(infos[3], ArgInfo::Direct { in_reg: false, .. }));
    }
}
