//! The two-eightbyte classification state machine.

use crate::type_info::AbiTypeInfo;
use crate::types::{FloatKind, Type, DOUBLE, LONG, LONG_LONG, ULONG, ULONG_LONG};
use crate::x86_64::arg_class::ArgClass;

/// The classification of a value: one [`ArgClass`] for each of its two
/// eightbytes, with `Memory` short-circuiting both.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Classification {
    classes: [ArgClass; 2],
}

impl Classification {
    /// A fresh classification with both eightbytes unclassified.
    pub fn new() -> Self {
        Self { classes: [ArgClass::NoClass; 2] }
    }

    /// The class of the low eightbyte.
    pub fn low(self) -> ArgClass {
        self.classes[0]
    }

    /// The class of the high eightbyte.
    pub fn high(self) -> ArgClass {
        self.classes[1]
    }

    /// Whether the value is passed in memory.
    pub fn is_memory(self) -> bool {
        self.classes[0] == ArgClass::Memory
    }

    /// Merge a field of class `field_class` at byte `offset` into the
    /// containing eightbyte.
    ///
    /// Once either eightbyte merges to `Memory`, both become `Memory` and
    /// further additions are ignored. Fields never straddle an eightbyte
    /// here: unaligned fields and oversized values take the memory fast
    /// path in [`classify`] before any field is added.
    pub fn add_field(&mut self, offset: u64, field_class: ArgClass) {
        if self.is_memory() {
            return;
        }

        let idx = if offset < 8 { 0 } else { 1 };
        let merged = self.classes[idx].merge(field_class);
        if merged != self.classes[idx] {
            self.classes[idx] = merged;
            if merged == ArgClass::Memory {
                self.classes[1 - idx] = ArgClass::Memory;
            }
        }
    }

    /// Walk `ty` starting at byte `offset`, merging the class of every
    /// leaf field into the containing eightbyte.
    pub fn classify_type<'a>(
        &mut self,
        type_info: &dyn AbiTypeInfo<'a>,
        ty: Type<'a>,
        offset: u64,
        is_named_arg: bool,
    ) {
        if ty.is_void() {
            self.add_field(offset, ArgClass::NoClass);
        } else if ty.is_pointer() || ty.is_integer() {
            self.add_field(offset, ArgClass::Integer);
        } else if ty.is_floating_point() {
            if ty.float_kind() == FloatKind::LongDouble {
                self.add_field(offset, ArgClass::X87);
                self.add_field(offset + 8, ArgClass::X87Up);
            } else {
                self.add_field(offset, ArgClass::Sse);
            }
        } else if ty.is_complex() {
            match ty.complex_kind() {
                FloatKind::Float => {
                    self.add_field(offset, ArgClass::Sse);
                    self.add_field(offset + 4, ArgClass::Sse);
                }
                FloatKind::Double => {
                    self.add_field(offset, ArgClass::Sse);
                    self.add_field(offset + 8, ArgClass::Sse);
                }
                FloatKind::LongDouble => {
                    self.add_field(offset, ArgClass::ComplexX87);
                    self.add_field(offset + 16, ArgClass::ComplexX87);
                }
                FloatKind::HalfFloat | FloatKind::Float128 => {
                    self.add_field(offset, ArgClass::Sse);
                }
            }
        } else if ty.is_struct() {
            let member_offsets = type_info.struct_offsets(ty.struct_members());
            for (member, member_offset) in ty.struct_members().iter().zip(member_offsets) {
                self.classify_type(
                    type_info,
                    member.ty(),
                    offset + member_offset.as_bytes(),
                    is_named_arg,
                );
            }
        } else if ty.is_union() {
            // Every member starts at the same offset; the merge rules pick
            // the worst case.
            for member in ty.union_members() {
                self.classify_type(type_info, *member, offset, is_named_arg);
            }
        } else if ty.is_array() {
            let element = ty.array_element_type();
            let element_size = type_info.alloc_size(element);
            for i in 0..ty.array_element_count() {
                self.classify_type(
                    type_info,
                    element,
                    offset + i * element_size.as_bytes(),
                    is_named_arg,
                );
            }
        } else if ty.is_vector() {
            self.classify_vector(type_info, ty, offset, is_named_arg);
        } else {
            unreachable!("unknown type kind: {ty}");
        }
    }

    fn classify_vector<'a>(
        &mut self,
        type_info: &dyn AbiTypeInfo<'a>,
        ty: Type<'a>,
        offset: u64,
        is_named_arg: bool,
    ) {
        let size = type_info.alloc_size(ty);
        let element = ty.vector_element_type();

        if size.as_bits() == 32 {
            // gcc passes all <4 x char>, <2 x short>, <1 x int>,
            // <1 x float> as integer.
            self.add_field(offset, ArgClass::Integer);
        } else if size.as_bits() == 64 {
            // gcc passes <1 x double> in memory.
            if element == DOUBLE {
                self.add_field(offset, ArgClass::Memory);
                return;
            }

            // gcc passes <1 x long long> as INTEGER.
            if element == LONG_LONG || element == ULONG_LONG || element == LONG || element == ULONG
            {
                self.add_field(offset, ArgClass::Integer);
            } else {
                self.add_field(offset, ArgClass::Sse);
            }
        } else if size.as_bits() == 128
            || (is_named_arg && size.as_bits() == 256 && type_info.is_legal_vector(ty))
        {
            // A 256-bit vector splits into four eightbytes: the least
            // significant is SSE, the rest SSEUP. The low/high model here
            // only tracks two, which is fine because nothing inspects the
            // upper parts separately. 256-bit values only go in registers
            // when named, per AMD64 ABI §3.5.7.
            self.add_field(offset, ArgClass::Sse);
            self.add_field(offset + 8, ArgClass::SseUp);
        } else {
            self.add_field(offset, ArgClass::Memory);
        }
    }
}

impl Default for Classification {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::x86_64::arg_class::ArgClass::*;

    #[test]
    fn memory_is_sticky() {
        let mut c = Classification::new();
        c.add_field(0, Integer);
        c.add_field(8, Memory);
        assert_eq!(c.low(), Memory);
        assert_eq!(c.high(), Memory);

        // No subsequent field changes any slot.
        c.add_field(0, Sse);
        c.add_field(8, Integer);
        assert_eq!(c.low(), Memory);
        assert_eq!(c.high(), Memory);
    }

    #[test]
    fn fields_land_in_their_eightbyte() {
        let mut c = Classification::new();
        c.add_field(0, Sse);
        c.add_field(8, Integer);
        assert_eq!(c.low(), Sse);
        assert_eq!(c.high(), Integer);
    }
}
