//! The per-target type-information oracle.

use smallvec::SmallVec;

use crate::ir;
use crate::size::DataSize;
use crate::types::{StructMember, Type, TypeBuilder};

/// Answers size, alignment, layout and lowering queries for abstract types
/// on one concrete target.
///
/// The distinction between the size queries mirrors the IR data layout:
/// `raw_size` is the exact value size, `store_size` is what a store writes,
/// and `alloc_size` is the stride used for layout (fixed-width integers
/// round up to a power of two of bytes; everything else coincides).
pub trait AbiTypeInfo<'a> {
    /// The type builder used to intern types this oracle synthesizes.
    fn type_builder(&self) -> &'a TypeBuilder<'a>;

    /// The exact size of a value of `ty`.
    fn raw_size(&self, ty: Type<'a>) -> DataSize;

    /// The size `ty` occupies in memory, including layout padding.
    fn alloc_size(&self, ty: Type<'a>) -> DataSize;

    /// The number of bytes a store of `ty` writes.
    fn store_size(&self, ty: Type<'a>) -> DataSize;

    /// The alignment the ABI requires for `ty`.
    fn required_align(&self, ty: Type<'a>) -> DataSize;

    /// The alignment the target prefers for `ty`.
    fn preferred_align(&self, ty: Type<'a>) -> DataSize;

    /// Lower `ty` to its concrete IR type.
    fn ir_type(&self, ty: Type<'a>) -> ir::Type;

    /// The byte offset of each member of a struct laid out by this
    /// target's rules.
    ///
    /// Each member lands at the larger of its explicit offset and the
    /// running offset rounded up to the member's required alignment; the
    /// running offset then advances by the member's alloc size.
    fn struct_offsets(&self, members: &[StructMember<'a>]) -> SmallVec<[DataSize; 8]>;

    /// Whether `ty` is a vector the target can pass in vector registers.
    fn is_legal_vector(&self, ty: Type<'a>) -> bool;

    /// Whether the target is big-endian.
    fn is_big_endian(&self) -> bool;

    /// Whether plain `char` is signed on this target.
    fn is_char_signed(&self) -> bool;
}
