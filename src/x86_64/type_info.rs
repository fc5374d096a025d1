//! Type information for the x86_64 System V ABI.

use std::cell::RefCell;

use smallvec::SmallVec;

use crate::fx::FxHashMap;
use crate::ir;
use crate::size::DataSize;
use crate::type_info::AbiTypeInfo;
use crate::types::{FloatKind, IntKind, StructMember, Type, TypeBuilder};
use crate::x86_64::cpu::CpuFeatures;

/// The x86_64 System V type-info oracle.
///
/// Aggregate size, alignment and lowering queries are memoized; one oracle
/// belongs to one ABI instance and is single-threaded by design.
pub struct TypeInfo<'a> {
    types: &'a TypeBuilder<'a>,
    features: CpuFeatures,
    size_cache: RefCell<FxHashMap<Type<'a>, DataSize>>,
    align_cache: RefCell<FxHashMap<Type<'a>, DataSize>>,
    ir_cache: RefCell<FxHashMap<Type<'a>, ir::Type>>,
}

impl<'a> TypeInfo<'a> {
    /// Create the oracle for a CPU's feature set.
    pub fn new(types: &'a TypeBuilder<'a>, features: CpuFeatures) -> Self {
        Self {
            types,
            features,
            size_cache: RefCell::new(FxHashMap::default()),
            align_cache: RefCell::new(FxHashMap::default()),
            ir_cache: RefCell::new(FxHashMap::default()),
        }
    }

    /// The selected CPU's feature set.
    pub fn features(&self) -> &CpuFeatures {
        &self.features
    }

    fn int_size(kind: IntKind) -> DataSize {
        match kind {
            IntKind::Bool | IntKind::Char | IntKind::SChar | IntKind::UChar => DataSize::bytes(1),
            IntKind::Short | IntKind::UShort => DataSize::bytes(2),
            IntKind::Int | IntKind::UInt => DataSize::bytes(4),
            IntKind::Long
            | IntKind::ULong
            | IntKind::LongLong
            | IntKind::ULongLong
            | IntKind::SizeT
            | IntKind::SSizeT
            | IntKind::PtrDiffT
            | IntKind::IntPtrT
            | IntKind::UIntPtrT => DataSize::bytes(8),
        }
    }

    fn float_size(kind: FloatKind) -> DataSize {
        match kind {
            FloatKind::HalfFloat => DataSize::bytes(2),
            FloatKind::Float => DataSize::bytes(4),
            FloatKind::Double => DataSize::bytes(8),
            // 80-bit value stored in 16 bytes.
            FloatKind::LongDouble => DataSize::bytes(16),
            FloatKind::Float128 => DataSize::bytes(16),
        }
    }

    fn float_ir_type(kind: FloatKind) -> ir::Type {
        match kind {
            FloatKind::HalfFloat => ir::Type::Half,
            FloatKind::Float => ir::Type::Float,
            FloatKind::Double => ir::Type::Double,
            FloatKind::LongDouble => ir::Type::X86Fp80,
            FloatKind::Float128 => ir::Type::Fp128,
        }
    }
}

impl<'a> AbiTypeInfo<'a> for TypeInfo<'a> {
    fn type_builder(&self) -> &'a TypeBuilder<'a> {
        self.types
    }

    fn raw_size(&self, ty: Type<'a>) -> DataSize {
        if ty.is_void() {
            DataSize::ZERO
        } else if ty.is_pointer() {
            DataSize::bytes(8)
        } else if ty.is_unspecified_width_integer() {
            Self::int_size(ty.integer_kind())
        } else if ty.is_fixed_width_integer() {
            ty.integer_width()
        } else if ty.is_floating_point() {
            Self::float_size(ty.float_kind())
        } else if ty.is_complex() {
            Self::float_size(ty.complex_kind()) * 2
        } else if ty.is_struct() {
            if ty.struct_members().is_empty() {
                return DataSize::ZERO;
            }
            let offsets = self.struct_offsets(ty.struct_members());
            let last_member = ty.struct_members().last().unwrap();
            let end = *offsets.last().unwrap() + self.alloc_size(last_member.ty());
            end.round_up_to_align(self.required_align(ty))
        } else if ty.is_union() {
            let mut size = DataSize::ZERO;
            for member in ty.union_members() {
                size = size.max(self.alloc_size(*member));
            }
            size.round_up_to_align(self.required_align(ty))
        } else if ty.is_array() {
            self.raw_size(ty.array_element_type()) * ty.array_element_count()
        } else if ty.is_vector() {
            self.raw_size(ty.vector_element_type()) * ty.vector_element_count()
        } else {
            unreachable!("unknown type kind: {ty}")
        }
    }

    fn alloc_size(&self, ty: Type<'a>) -> DataSize {
        if ty.is_fixed_width_integer() {
            return ty.integer_width().round_up_to_pow2_bytes();
        }
        if !ty.is_aggregate() {
            return self.raw_size(ty);
        }
        if let Some(size) = self.size_cache.borrow().get(&ty) {
            return *size;
        }
        let size = self.raw_size(ty);
        self.size_cache.borrow_mut().insert(ty, size);
        size
    }

    fn store_size(&self, ty: Type<'a>) -> DataSize {
        self.alloc_size(ty)
    }

    fn required_align(&self, ty: Type<'a>) -> DataSize {
        if ty.is_void() {
            return DataSize::ZERO;
        }
        if !ty.is_aggregate() && !ty.is_vector() {
            return match ty {
                _ if ty.is_pointer() => DataSize::bytes(8),
                _ if ty.is_unspecified_width_integer() => Self::int_size(ty.integer_kind()),
                _ if ty.is_fixed_width_integer() => {
                    ty.integer_width().round_up_to_pow2_bytes().max(DataSize::bytes(1))
                }
                _ => Self::float_size(ty.float_kind()),
            };
        }
        if ty.is_complex() {
            return Self::float_size(ty.complex_kind());
        }
        if let Some(align) = self.align_cache.borrow().get(&ty) {
            return *align;
        }
        let align = if ty.is_struct() {
            let mut strictest = DataSize::bytes(1);
            for member in ty.struct_members() {
                strictest = strictest.max(self.required_align(member.ty()));
            }
            strictest
        } else if ty.is_union() {
            let mut strictest = DataSize::bytes(1);
            for member in ty.union_members() {
                strictest = strictest.max(self.required_align(*member));
            }
            strictest
        } else if ty.is_array() {
            // AMD64 ABI §3.1.2p3: an array of at least 16 bytes always has
            // alignment of at least 16 bytes.
            let element_align = self.required_align(ty.array_element_type());
            let min_align = if self.alloc_size(ty) >= DataSize::bytes(16) {
                DataSize::bytes(16)
            } else {
                DataSize::bytes(1)
            };
            element_align.max(min_align)
        } else {
            debug_assert!(ty.is_vector());
            let element_align = self.required_align(ty.vector_element_type());
            let size = self.alloc_size(ty);
            let min_align = if size >= DataSize::bytes(32) {
                DataSize::bytes(32)
            } else if size >= DataSize::bytes(16) {
                DataSize::bytes(16)
            } else {
                DataSize::bytes(1)
            };
            element_align.max(min_align)
        };
        self.align_cache.borrow_mut().insert(ty, align);
        align
    }

    fn preferred_align(&self, ty: Type<'a>) -> DataSize {
        self.required_align(ty)
    }

    fn ir_type(&self, ty: Type<'a>) -> ir::Type {
        if let Some(cached) = self.ir_cache.borrow().get(&ty) {
            return cached.clone();
        }
        let lowered = if ty.is_void() {
            ir::Type::Void
        } else if ty.is_pointer() {
            ir::Type::Ptr
        } else if ty.is_integer() {
            ir::Type::int(self.raw_size(ty).as_bits() as u32)
        } else if ty.is_floating_point() {
            Self::float_ir_type(ty.float_kind())
        } else if ty.is_complex() {
            let element = Self::float_ir_type(ty.complex_kind());
            ir::Type::Struct(vec![element.clone(), element])
        } else if ty.is_struct() {
            ir::Type::Struct(
                ty.struct_members().iter().map(|member| self.ir_type(member.ty())).collect(),
            )
        } else if ty.is_union() {
            // A union lowers to a struct of its single largest member.
            let mut largest: Option<(DataSize, Type<'a>)> = None;
            for member in ty.union_members() {
                let size = self.alloc_size(*member);
                if largest.map_or(true, |(max, _)| size > max) {
                    largest = Some((size, *member));
                }
            }
            match largest {
                Some((_, member)) => ir::Type::Struct(vec![self.ir_type(member)]),
                None => ir::Type::Struct(Vec::new()),
            }
        } else if ty.is_array() {
            ir::Type::Array(
                ty.array_element_count(),
                Box::new(self.ir_type(ty.array_element_type())),
            )
        } else if ty.is_vector() {
            ir::Type::Vector(
                ty.vector_element_count(),
                Box::new(self.ir_type(ty.vector_element_type())),
            )
        } else {
            unreachable!("unknown type kind: {ty}")
        };
        self.ir_cache.borrow_mut().insert(ty, lowered.clone());
        lowered
    }

    fn struct_offsets(&self, members: &[StructMember<'a>]) -> SmallVec<[DataSize; 8]> {
        struct_offsets_with(self, members)
    }

    fn is_legal_vector(&self, ty: Type<'a>) -> bool {
        if !ty.is_vector() {
            return false;
        }
        let size = self.alloc_size(ty);
        let limit = if self.features.has_avx() { 256 } else { 128 };
        size.as_bits() > 64 && size.as_bits() <= limit
    }

    fn is_big_endian(&self) -> bool {
        false
    }

    fn is_char_signed(&self) -> bool {
        true
    }
}

/// The shared struct layout walk: each member lands at the larger of its
/// explicit offset and the aligned running offset, and the running offset
/// advances by the member's alloc size.
pub(crate) fn struct_offsets_with<'a>(
    type_info: &dyn AbiTypeInfo<'a>,
    members: &[StructMember<'a>],
) -> SmallVec<[DataSize; 8]> {
    let mut offsets = SmallVec::with_capacity(members.len());
    let mut offset = DataSize::ZERO;

    for member in members {
        let align = type_info.required_align(member.ty()).max(DataSize::bytes(1));
        let aligned = offset.round_up_to_align(align);
        offset = match member.offset() {
            Some(explicit) => explicit.max(aligned),
            None => aligned,
        };

        offsets.push(offset);
        offset += type_info.alloc_size(member.ty());
    }

    offsets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CHAR, DOUBLE, FLOAT, INT, LONG_DOUBLE, POINTER, SHORT};
    use crate::x86_64::cpu::{cpu_features, CpuKind};
    use std::str::FromStr;
    use target_lexicon::Triple;

    fn features() -> CpuFeatures {
        let triple = Triple::from_str("x86_64-unknown-linux-gnu").unwrap();
        cpu_features(&triple, CpuKind::X86_64)
    }

    #[test]
    fn primitive_sizes() {
        let types = TypeBuilder::new();
        let ti = TypeInfo::new(&types, features());
        assert_eq!(ti.raw_size(CHAR), DataSize::bytes(1));
        assert_eq!(ti.raw_size(INT), DataSize::bytes(4));
        assert_eq!(ti.raw_size(POINTER), DataSize::bytes(8));
        assert_eq!(ti.raw_size(LONG_DOUBLE), DataSize::bytes(16));
        assert_eq!(ti.required_align(LONG_DOUBLE), DataSize::bytes(16));
    }

    #[test]
    fn fixed_width_alloc_rounds_up() {
        let types = TypeBuilder::new();
        let ti = TypeInfo::new(&types, features());
        let i24 = types.fixed_int_ty(DataSize::bits(24), false);
        assert_eq!(ti.raw_size(i24), DataSize::bits(24));
        assert_eq!(ti.alloc_size(i24), DataSize::bytes(4));
    }

    #[test]
    fn struct_layout() {
        let types = TypeBuilder::new();
        let ti = TypeInfo::new(&types, features());

        // {char, int} -> char at 0, int at 4, size 8, align 4.
        let s = types.struct_ty(&[CHAR, INT]);
        let offsets = ti.struct_offsets(s.struct_members());
        assert_eq!(offsets.as_slice(), &[DataSize::ZERO, DataSize::bytes(4)]);
        assert_eq!(ti.alloc_size(s), DataSize::bytes(8));
        assert_eq!(ti.required_align(s), DataSize::bytes(4));

        // {double, int} -> size 16.
        let s = types.struct_ty(&[DOUBLE, INT]);
        assert_eq!(ti.alloc_size(s), DataSize::bytes(16));
    }

    #[test]
    fn explicit_offsets() {
        let types = TypeBuilder::new();
        let ti = TypeInfo::new(&types, features());

        let s = types.struct_with_members(
            &[
                StructMember::auto(SHORT),
                StructMember::at_offset(INT, DataSize::bytes(8)),
            ],
            None,
        );
        let offsets = ti.struct_offsets(s.struct_members());
        assert_eq!(offsets.as_slice(), &[DataSize::ZERO, DataSize::bytes(8)]);
        assert_eq!(ti.alloc_size(s), DataSize::bytes(12));
    }

    #[test]
    fn union_layout() {
        let types = TypeBuilder::new();
        let ti = TypeInfo::new(&types, features());
        let u = types.union_ty(&[INT, DOUBLE, CHAR], None);
        assert_eq!(ti.alloc_size(u), DataSize::bytes(8));
        assert_eq!(ti.required_align(u), DataSize::bytes(8));
    }

    #[test]
    fn array_alignment_promotes_at_16_bytes() {
        let types = TypeBuilder::new();
        let ti = TypeInfo::new(&types, features());
        let small = types.array_ty(2, INT);
        let large = types.array_ty(4, INT);
        assert_eq!(ti.required_align(small), DataSize::bytes(4));
        assert_eq!(ti.required_align(large), DataSize::bytes(16));
    }

    #[test]
    fn legal_vectors_depend_on_avx() {
        let triple = Triple::from_str("x86_64-unknown-linux-gnu").unwrap();
        let types = TypeBuilder::new();

        let v128 = types.vector_ty(4, FLOAT);
        let v256 = types.vector_ty(8, FLOAT);
        let v64 = types.vector_ty(2, FLOAT);

        let baseline = TypeInfo::new(&types, cpu_features(&triple, CpuKind::X86_64));
        assert!(baseline.is_legal_vector(v128));
        assert!(!baseline.is_legal_vector(v256));
        assert!(!baseline.is_legal_vector(v64));

        let avx = TypeInfo::new(&types, cpu_features(&triple, CpuKind::Haswell));
        assert!(avx.is_legal_vector(v256));
    }
}
