//! Type information for the i386 ABIs.

use smallvec::SmallVec;

use crate::ir;
use crate::size::DataSize;
use crate::type_info::AbiTypeInfo;
use crate::types::{FloatKind, IntKind, StructMember, Type, TypeBuilder};
use crate::x86_64::type_info::struct_offsets_with;

/// The i386 type-info oracle: ILP32 sizes, 4-byte `long long` and `double`
/// alignment, and the 12-byte `long double`.
pub struct TypeInfo<'a> {
    types: &'a TypeBuilder<'a>,
}

impl<'a> TypeInfo<'a> {
    /// Create the i386 oracle.
    pub fn new(types: &'a TypeBuilder<'a>) -> Self {
        Self { types }
    }

    fn int_size(kind: IntKind) -> DataSize {
        match kind {
            IntKind::Bool | IntKind::Char | IntKind::SChar | IntKind::UChar => DataSize::bytes(1),
            IntKind::Short | IntKind::UShort => DataSize::bytes(2),
            IntKind::Int
            | IntKind::UInt
            | IntKind::Long
            | IntKind::ULong
            | IntKind::SizeT
            | IntKind::SSizeT
            | IntKind::PtrDiffT
            | IntKind::IntPtrT
            | IntKind::UIntPtrT => DataSize::bytes(4),
            IntKind::LongLong | IntKind::ULongLong => DataSize::bytes(8),
        }
    }

    fn float_size(kind: FloatKind) -> DataSize {
        match kind {
            FloatKind::HalfFloat => DataSize::bytes(2),
            FloatKind::Float => DataSize::bytes(4),
            FloatKind::Double => DataSize::bytes(8),
            FloatKind::LongDouble => DataSize::bytes(12),
            FloatKind::Float128 => DataSize::bytes(16),
        }
    }

    fn float_align(kind: FloatKind) -> DataSize {
        match kind {
            FloatKind::HalfFloat => DataSize::bytes(2),
            // Doubles and long doubles align to 4 on i386.
            FloatKind::Float | FloatKind::Double | FloatKind::LongDouble => DataSize::bytes(4),
            FloatKind::Float128 => DataSize::bytes(16),
        }
    }

    fn vector_min_align(size: DataSize) -> DataSize {
        // Capped at the power of two of the alloc size, at most 32 bytes.
        if size >= DataSize::bytes(32) {
            DataSize::bytes(32)
        } else if size >= DataSize::bytes(16) {
            DataSize::bytes(16)
        } else if size >= DataSize::bytes(8) {
            DataSize::bytes(8)
        } else if size >= DataSize::bytes(4) {
            DataSize::bytes(4)
        } else {
            DataSize::bytes(1)
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
            DataSize::bytes(4)
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
        self.raw_size(ty)
    }

    fn store_size(&self, ty: Type<'a>) -> DataSize {
        self.alloc_size(ty)
    }

    fn required_align(&self, ty: Type<'a>) -> DataSize {
        if ty.is_void() {
            DataSize::ZERO
        } else if ty.is_pointer() {
            DataSize::bytes(4)
        } else if ty.is_unspecified_width_integer() {
            // Everything 4 bytes and wider aligns to 4, including
            // `long long`.
            Self::int_size(ty.integer_kind()).min(DataSize::bytes(4))
        } else if ty.is_fixed_width_integer() {
            ty.integer_width().round_up_to_pow2_bytes().min(DataSize::bytes(4))
        } else if ty.is_floating_point() {
            Self::float_align(ty.float_kind())
        } else if ty.is_complex() {
            Self::float_align(ty.complex_kind())
        } else if ty.is_struct() {
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
            self.required_align(ty.array_element_type())
        } else if ty.is_vector() {
            let element_align = self.required_align(ty.vector_element_type());
            element_align.max(Self::vector_min_align(self.alloc_size(ty)))
        } else {
            unreachable!("unknown type kind: {ty}")
        }
    }

    fn preferred_align(&self, ty: Type<'a>) -> DataSize {
        self.required_align(ty)
    }

    fn ir_type(&self, ty: Type<'a>) -> ir::Type {
        if ty.is_void() {
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
        }
    }

    fn struct_offsets(&self, members: &[StructMember<'a>]) -> SmallVec<[DataSize; 8]> {
        struct_offsets_with(self, members)
    }

    fn is_legal_vector(&self, ty: Type<'a>) -> bool {
        if !ty.is_vector() {
            return false;
        }
        let size = self.alloc_size(ty);
        size.as_bits() > 64 && size.as_bits() <= 128
    }

    fn is_big_endian(&self) -> bool {
        false
    }

    fn is_char_signed(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DOUBLE, INT, LONG_DOUBLE, LONG_LONG, POINTER};

    #[test]
    fn ilp32_layout() {
        let types = TypeBuilder::new();
        let ti = TypeInfo::new(&types);

        assert_eq!(ti.raw_size(POINTER), DataSize::bytes(4));
        assert_eq!(ti.raw_size(LONG_LONG), DataSize::bytes(8));
        assert_eq!(ti.required_align(LONG_LONG), DataSize::bytes(4));
        assert_eq!(ti.required_align(DOUBLE), DataSize::bytes(4));
        assert_eq!(ti.raw_size(LONG_DOUBLE), DataSize::bytes(12));
        assert_eq!(ti.required_align(LONG_DOUBLE), DataSize::bytes(4));
    }

    #[test]
    fn long_long_packs_on_four_bytes() {
        let types = TypeBuilder::new();
        let ti = TypeInfo::new(&types);

        let s = types.struct_ty(&[INT, LONG_LONG]);
        let offsets = ti.struct_offsets(s.struct_members());
        assert_eq!(offsets.as_slice(), &[DataSize::ZERO, DataSize::bytes(4)]);
        assert_eq!(ti.alloc_size(s), DataSize::bytes(12));
    }
}
