//! The abstract type model.
//!
//! Types describe C-level values for the purpose of ABI-compliant lowering:
//! integers whose width the target resolves (`int`, `size_t`, ...),
//! fixed-width integers, floating-point kinds, complex values, and the
//! aggregate shapes (structs with optional explicit member offsets, unions,
//! arrays, vectors).
//!
//! A [`Type`] is a small `Copy` handle onto data interned in a
//! [`TypeBuilder`]. Interned data lives in a bump arena for the life of the
//! builder, so handles can be passed around freely and aggregate members can
//! be borrowed without bookkeeping. Equality and hashing are structural;
//! interning keeps repeated shapes shared.

use std::cell::RefCell;
use std::fmt;

use bumpalo::Bump;

use crate::fx::FxHashSet;
use crate::size::DataSize;
use crate::type_info::AbiTypeInfo;

/// The set of integer types whose width and signedness are resolved by the
/// target's type-info oracle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IntKind {
    /// `_Bool`.
    Bool,
    /// `char`; signedness is target-dependent.
    Char,
    /// `signed char`.
    SChar,
    /// `unsigned char`.
    UChar,
    /// `short`.
    Short,
    /// `unsigned short`.
    UShort,
    /// `int`.
    Int,
    /// `unsigned int`.
    UInt,
    /// `long`.
    Long,
    /// `unsigned long`.
    ULong,
    /// `long long`.
    LongLong,
    /// `unsigned long long`.
    ULongLong,
    /// `size_t`.
    SizeT,
    /// `ssize_t`.
    SSizeT,
    /// `ptrdiff_t`.
    PtrDiffT,
    /// `intptr_t`.
    IntPtrT,
    /// `uintptr_t`.
    UIntPtrT,
}

impl IntKind {
    /// Whether values of this kind are signed. `char` signedness is a
    /// per-target property and must be supplied.
    pub fn is_signed(self, char_is_signed: bool) -> bool {
        match self {
            Self::Char => char_is_signed,
            Self::SChar
            | Self::Short
            | Self::Int
            | Self::Long
            | Self::LongLong
            | Self::SSizeT
            | Self::PtrDiffT
            | Self::IntPtrT => true,
            Self::Bool
            | Self::UChar
            | Self::UShort
            | Self::UInt
            | Self::ULong
            | Self::ULongLong
            | Self::SizeT
            | Self::UIntPtrT => false,
        }
    }
}

/// The set of floating-point types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FloatKind {
    /// Half-precision float.
    HalfFloat,
    /// `float`.
    Float,
    /// `double`.
    Double,
    /// `long double`; layout is target-dependent (80-bit extended on x86).
    LongDouble,
    /// `__float128`.
    Float128,
}

/// A struct member: a type at either an automatically laid out offset or an
/// explicit byte offset ("start at N bytes").
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StructMember<'a> {
    ty: Type<'a>,
    offset: Option<DataSize>,
}

impl<'a> StructMember<'a> {
    /// A member laid out at the next suitably aligned offset.
    pub fn auto(ty: Type<'a>) -> Self {
        Self { ty, offset: None }
    }

    /// A member forced to start at the given offset.
    ///
    /// An explicit offset behind the running layout offset is rejected when
    /// the containing type reaches an ABI entry point.
    pub fn at_offset(ty: Type<'a>, offset: DataSize) -> Self {
        Self { ty, offset: Some(offset) }
    }

    /// The member's type.
    pub fn ty(self) -> Type<'a> {
        self.ty
    }

    /// The explicit offset, if one was given.
    pub fn offset(self) -> Option<DataSize> {
        self.offset
    }

    /// Whether this member is "empty": an empty record, possibly wrapped
    /// in single-element arrays (when `allow_arrays` is set).
    pub fn is_empty_field(self, allow_arrays: bool) -> bool {
        is_empty_field(self, allow_arrays)
    }
}

/// Interned payload of a [`Type`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum TypeData<'a> {
    Void,
    Pointer,
    Integer(IntKind),
    FixedWidthInteger { width: DataSize, signed: bool },
    FloatingPoint(FloatKind),
    Complex(FloatKind),
    Struct { name: Option<&'a str>, members: &'a [StructMember<'a>] },
    Union { name: Option<&'a str>, members: &'a [Type<'a>] },
    Array { count: u64, element: Type<'a> },
    Vector { count: u64, element: Type<'a> },
}

/// An abstract type handle.
///
/// Cheap to copy and compare; aggregate payloads are borrowed from the
/// [`TypeBuilder`] that interned them.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Type<'a>(&'a TypeData<'a>);

/// The `void` type, the sole zero-size type.
pub const VOID: Type<'static> = Type(&TypeData::Void);
/// The pointer type (address space 0).
pub const POINTER: Type<'static> = Type(&TypeData::Pointer);
/// `_Bool`.
pub const BOOL: Type<'static> = Type(&TypeData::Integer(IntKind::Bool));
/// `char`.
pub const CHAR: Type<'static> = Type(&TypeData::Integer(IntKind::Char));
/// `signed char`.
pub const SCHAR: Type<'static> = Type(&TypeData::Integer(IntKind::SChar));
/// `unsigned char`.
pub const UCHAR: Type<'static> = Type(&TypeData::Integer(IntKind::UChar));
/// `short`.
pub const SHORT: Type<'static> = Type(&TypeData::Integer(IntKind::Short));
/// `unsigned short`.
pub const USHORT: Type<'static> = Type(&TypeData::Integer(IntKind::UShort));
/// `int`.
pub const INT: Type<'static> = Type(&TypeData::Integer(IntKind::Int));
/// `unsigned int`.
pub const UINT: Type<'static> = Type(&TypeData::Integer(IntKind::UInt));
/// `long`.
pub const LONG: Type<'static> = Type(&TypeData::Integer(IntKind::Long));
/// `unsigned long`.
pub const ULONG: Type<'static> = Type(&TypeData::Integer(IntKind::ULong));
/// `long long`.
pub const LONG_LONG: Type<'static> = Type(&TypeData::Integer(IntKind::LongLong));
/// `unsigned long long`.
pub const ULONG_LONG: Type<'static> = Type(&TypeData::Integer(IntKind::ULongLong));
/// `size_t`.
pub const SIZE_T: Type<'static> = Type(&TypeData::Integer(IntKind::SizeT));
/// `ssize_t`.
pub const SSIZE_T: Type<'static> = Type(&TypeData::Integer(IntKind::SSizeT));
/// `ptrdiff_t`.
pub const PTRDIFF_T: Type<'static> = Type(&TypeData::Integer(IntKind::PtrDiffT));
/// `intptr_t`.
pub const INTPTR_T: Type<'static> = Type(&TypeData::Integer(IntKind::IntPtrT));
/// `uintptr_t`.
pub const UINTPTR_T: Type<'static> = Type(&TypeData::Integer(IntKind::UIntPtrT));
/// Half-precision float.
pub const HALF_FLOAT: Type<'static> = Type(&TypeData::FloatingPoint(FloatKind::HalfFloat));
/// `float`.
pub const FLOAT: Type<'static> = Type(&TypeData::FloatingPoint(FloatKind::Float));
/// `double`.
pub const DOUBLE: Type<'static> = Type(&TypeData::FloatingPoint(FloatKind::Double));
/// `long double`.
pub const LONG_DOUBLE: Type<'static> = Type(&TypeData::FloatingPoint(FloatKind::LongDouble));
/// `__float128`.
pub const FLOAT128: Type<'static> = Type(&TypeData::FloatingPoint(FloatKind::Float128));

impl<'a> Type<'a> {
    /// Whether this is the void type.
    pub fn is_void(self) -> bool {
        matches!(self.0, TypeData::Void)
    }

    /// Whether this is the pointer type.
    pub fn is_pointer(self) -> bool {
        matches!(self.0, TypeData::Pointer)
    }

    /// Whether this is any integer type, of unspecified or fixed width.
    pub fn is_integer(self) -> bool {
        matches!(self.0, TypeData::Integer(_) | TypeData::FixedWidthInteger { .. })
    }

    /// Whether this is an integer type whose width the target resolves.
    pub fn is_unspecified_width_integer(self) -> bool {
        matches!(self.0, TypeData::Integer(_))
    }

    /// Whether this is a fixed-width integer type.
    pub fn is_fixed_width_integer(self) -> bool {
        matches!(self.0, TypeData::FixedWidthInteger { .. })
    }

    /// The integer kind of an unspecified-width integer type.
    pub fn integer_kind(self) -> IntKind {
        match self.0 {
            TypeData::Integer(kind) => *kind,
            _ => unreachable!("integer_kind() on {self}"),
        }
    }

    /// The bit width of a fixed-width integer type.
    pub fn integer_width(self) -> DataSize {
        match self.0 {
            TypeData::FixedWidthInteger { width, .. } => *width,
            _ => unreachable!("integer_width() on {self}"),
        }
    }

    /// Whether this is a floating-point type.
    pub fn is_floating_point(self) -> bool {
        matches!(self.0, TypeData::FloatingPoint(_))
    }

    /// The kind of a floating-point type.
    pub fn float_kind(self) -> FloatKind {
        match self.0 {
            TypeData::FloatingPoint(kind) => *kind,
            _ => unreachable!("float_kind() on {self}"),
        }
    }

    /// Whether this is specifically `float`.
    pub fn is_float(self) -> bool {
        matches!(self.0, TypeData::FloatingPoint(FloatKind::Float))
    }

    /// Whether this is specifically `double`.
    pub fn is_double(self) -> bool {
        matches!(self.0, TypeData::FloatingPoint(FloatKind::Double))
    }

    /// Whether this is a complex type.
    pub fn is_complex(self) -> bool {
        matches!(self.0, TypeData::Complex(_))
    }

    /// The element kind of a complex type.
    pub fn complex_kind(self) -> FloatKind {
        match self.0 {
            TypeData::Complex(kind) => *kind,
            _ => unreachable!("complex_kind() on {self}"),
        }
    }

    /// Whether this is a struct type.
    pub fn is_struct(self) -> bool {
        matches!(self.0, TypeData::Struct { .. })
    }

    /// The members of a struct type.
    pub fn struct_members(self) -> &'a [StructMember<'a>] {
        match self.0 {
            TypeData::Struct { members, .. } => members,
            _ => unreachable!("struct_members() on {self}"),
        }
    }

    /// The name of a struct type, if it has one.
    pub fn struct_name(self) -> Option<&'a str> {
        match self.0 {
            TypeData::Struct { name, .. } => *name,
            _ => unreachable!("struct_name() on {self}"),
        }
    }

    /// Whether this is a union type.
    pub fn is_union(self) -> bool {
        matches!(self.0, TypeData::Union { .. })
    }

    /// The members of a union type.
    pub fn union_members(self) -> &'a [Type<'a>] {
        match self.0 {
            TypeData::Union { members, .. } => members,
            _ => unreachable!("union_members() on {self}"),
        }
    }

    /// Whether this is an array type.
    pub fn is_array(self) -> bool {
        matches!(self.0, TypeData::Array { .. })
    }

    /// The element count of an array type.
    pub fn array_element_count(self) -> u64 {
        match self.0 {
            TypeData::Array { count, .. } => *count,
            _ => unreachable!("array_element_count() on {self}"),
        }
    }

    /// The element type of an array type.
    pub fn array_element_type(self) -> Type<'a> {
        match self.0 {
            TypeData::Array { element, .. } => *element,
            _ => unreachable!("array_element_type() on {self}"),
        }
    }

    /// Whether this is a vector type.
    pub fn is_vector(self) -> bool {
        matches!(self.0, TypeData::Vector { .. })
    }

    /// The lane count of a vector type.
    pub fn vector_element_count(self) -> u64 {
        match self.0 {
            TypeData::Vector { count, .. } => *count,
            _ => unreachable!("vector_element_count() on {self}"),
        }
    }

    /// The lane type of a vector type.
    pub fn vector_element_type(self) -> Type<'a> {
        match self.0 {
            TypeData::Vector { element, .. } => *element,
            _ => unreachable!("vector_element_type() on {self}"),
        }
    }

    /// Whether this type is passed as a first-class scalar for ABI
    /// purposes: pointers, integers, floats and vectors.
    pub fn is_integral_type(self) -> bool {
        self.is_pointer() || self.is_integer() || self.is_floating_point() || self.is_vector()
    }

    /// Whether this type is an aggregate for ABI purposes: everything that
    /// is not a first-class scalar, including complex values.
    pub fn is_aggregate(self) -> bool {
        !self.is_integral_type()
    }

    /// Whether this is an integer type narrower than `int` that promotes
    /// to `int`/`unsigned int` across an ABI boundary.
    pub fn is_promotable_integer(self) -> bool {
        matches!(
            self.0,
            TypeData::Integer(
                IntKind::Bool
                    | IntKind::Char
                    | IntKind::SChar
                    | IntKind::UChar
                    | IntKind::Short
                    | IntKind::UShort
            )
        )
    }

    /// Whether values of this integer type are represented as signed.
    ///
    /// `char` resolves per the target's signedness flag; fixed-width
    /// integers carry their own flag.
    pub fn has_signed_integer_representation(self, char_is_signed: bool) -> bool {
        match self.0 {
            TypeData::Integer(kind) => kind.is_signed(char_is_signed),
            TypeData::FixedWidthInteger { signed, .. } => *signed,
            _ => unreachable!("signedness of non-integer {self}"),
        }
    }

    /// Whether this is a struct that transitively contains only empty
    /// fields. A field is empty if it is an empty record, possibly wrapped
    /// in single-element arrays (when `allow_arrays` is set).
    pub fn is_empty_record(self, allow_arrays: bool) -> bool {
        if !self.is_struct() {
            return false;
        }
        self.struct_members()
            .iter()
            .all(|member| is_empty_field(*member, allow_arrays))
    }

    /// If this is a struct with exactly one non-empty leaf field that
    /// covers the whole struct (no trailing padding beyond the element),
    /// return that field's type.
    pub fn struct_single_element(self, type_info: &dyn AbiTypeInfo<'a>) -> Option<Type<'a>> {
        if !self.is_struct() {
            return None;
        }

        let mut found: Option<Type<'a>> = None;
        for member in self.struct_members() {
            if is_empty_field(*member, /* allow_arrays = */ true) {
                continue;
            }

            // A second live element means this is not a single-element
            // struct.
            if found.is_some() {
                return None;
            }

            // Treat single element arrays as the element.
            let mut field_type = member.ty();
            while field_type.is_array() && field_type.array_element_count() == 1 {
                field_type = field_type.array_element_type();
            }

            if field_type.is_aggregate() {
                found = Some(field_type.struct_single_element(type_info)?);
            } else {
                found = Some(field_type);
            }
        }

        // Padding beyond the element type disqualifies the struct.
        match found {
            Some(element)
                if type_info.alloc_size(element) == type_info.alloc_size(self) =>
            {
                Some(element)
            }
            _ => None,
        }
    }

    /// Whether any field of this type ends up at an offset that is not a
    /// multiple of its required alignment. Only explicit struct member
    /// offsets can cause this.
    pub fn has_unaligned_fields(self, type_info: &dyn AbiTypeInfo<'a>) -> bool {
        match self.0 {
            TypeData::Struct { members, .. } => {
                let offsets = type_info.struct_offsets(members);
                members.iter().zip(offsets.iter()).any(|(member, offset)| {
                    let align = type_info.required_align(member.ty());
                    (align > DataSize::ZERO && offset.as_bits() % align.as_bits() != 0)
                        || member.ty().has_unaligned_fields(type_info)
                })
            }
            TypeData::Union { members, .. } => {
                members.iter().any(|member| member.has_unaligned_fields(type_info))
            }
            TypeData::Array { element, .. } => element.has_unaligned_fields(type_info),
            _ => false,
        }
    }
}

fn is_empty_field(member: StructMember<'_>, allow_arrays: bool) -> bool {
    let mut field_type = member.ty();

    // Arrays of a single empty record count as empty; strip them off.
    if allow_arrays {
        while field_type.is_array() && field_type.array_element_count() == 1 {
            field_type = field_type.array_element_type();
        }
    }

    field_type.is_empty_record(allow_arrays)
}

impl fmt::Debug for Type<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Type<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.0 {
            TypeData::Void => write!(f, "void"),
            TypeData::Pointer => write!(f, "ptr"),
            TypeData::Integer(kind) => write!(f, "{kind:?}"),
            TypeData::FixedWidthInteger { width, signed } => {
                write!(f, "{}{}", if *signed { "i" } else { "u" }, width.as_bits())
            }
            TypeData::FloatingPoint(kind) => write!(f, "{kind:?}"),
            TypeData::Complex(kind) => write!(f, "complex {kind:?}"),
            TypeData::Struct { name, members } => {
                if let Some(name) = name {
                    write!(f, "struct {name} ")?;
                }
                write!(f, "{{")?;
                for (i, member) in members.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    if let Some(offset) = member.offset() {
                        write!(f, "@{}: ", offset.as_bytes())?;
                    }
                    write!(f, "{}", member.ty())?;
                }
                write!(f, "}}")
            }
            TypeData::Union { name, members } => {
                if let Some(name) = name {
                    write!(f, "union {name} ")?;
                }
                write!(f, "union{{")?;
                for (i, member) in members.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{member}")?;
                }
                write!(f, "}}")
            }
            TypeData::Array { count, element } => write!(f, "[{count} x {element}]"),
            TypeData::Vector { count, element } => write!(f, "<{count} x {element}>"),
        }
    }
}

/// Interner and factory for abstract types.
///
/// Aggregate payloads are allocated into a bump arena owned by the builder
/// and deduplicated structurally, so identical shapes share storage. The
/// builder is single-threaded by design; one ABI instance holds onto one
/// builder for internally synthesized types (coercion pairs, fixed-width
/// integers).
pub struct TypeBuilder<'a> {
    arena: Bump,
    interned: RefCell<FxHashSet<&'a TypeData<'a>>>,
}

impl<'a> TypeBuilder<'a> {
    /// Create an empty type builder.
    pub fn new() -> Self {
        Self { arena: Bump::new(), interned: RefCell::new(FxHashSet::default()) }
    }

    fn intern(&'a self, data: TypeData<'a>) -> Type<'a> {
        if let Some(&existing) = self.interned.borrow().get(&data) {
            return Type(existing);
        }
        let slot: &'a TypeData<'a> = self.arena.alloc(data);
        self.interned.borrow_mut().insert(slot);
        Type(slot)
    }

    /// Get an unspecified-width integer type.
    pub fn int_ty(&'a self, kind: IntKind) -> Type<'a> {
        self.intern(TypeData::Integer(kind))
    }

    /// Get a floating-point type.
    pub fn float_ty(&'a self, kind: FloatKind) -> Type<'a> {
        self.intern(TypeData::FloatingPoint(kind))
    }

    /// Get a complex type.
    pub fn complex_ty(&'a self, kind: FloatKind) -> Type<'a> {
        self.intern(TypeData::Complex(kind))
    }

    /// Get a fixed-width integer type. The width need not be a power of
    /// two; the allocation size rounds up.
    pub fn fixed_int_ty(&'a self, width: DataSize, signed: bool) -> Type<'a> {
        self.intern(TypeData::FixedWidthInteger { width, signed })
    }

    /// Get an anonymous struct type with automatically laid out members.
    pub fn struct_ty(&'a self, member_types: &[Type<'a>]) -> Type<'a> {
        let members = self
            .arena
            .alloc_slice_fill_iter(member_types.iter().map(|&ty| StructMember::auto(ty)));
        self.intern(TypeData::Struct { name: None, members })
    }

    /// Get a struct type from explicit members, optionally named.
    pub fn struct_with_members(
        &'a self,
        members: &[StructMember<'a>],
        name: Option<&str>,
    ) -> Type<'a> {
        let members = self.arena.alloc_slice_copy(members);
        let name = name.map(|n| &*self.arena.alloc_str(n));
        self.intern(TypeData::Struct { name, members })
    }

    /// Get a union type, optionally named.
    pub fn union_ty(&'a self, member_types: &[Type<'a>], name: Option<&str>) -> Type<'a> {
        let members = self.arena.alloc_slice_copy(member_types);
        let name = name.map(|n| &*self.arena.alloc_str(n));
        self.intern(TypeData::Union { name, members })
    }

    /// Get a fixed-length array type.
    pub fn array_ty(&'a self, count: u64, element: Type<'a>) -> Type<'a> {
        self.intern(TypeData::Array { count, element })
    }

    /// Get a vector type.
    pub fn vector_ty(&'a self, count: u64, element: Type<'a>) -> Type<'a> {
        self.intern(TypeData::Vector { count, element })
    }
}

impl Default for TypeBuilder<'_> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_shares_structure() {
        let types = TypeBuilder::new();
        let a = types.struct_ty(&[INT, INT]);
        let b = types.struct_ty(&[INT, INT]);
        let c = types.struct_ty(&[INT, FLOAT]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(std::ptr::eq(a.struct_members().as_ptr(), b.struct_members().as_ptr()));
    }

    #[test]
    fn constants_equal_built_types() {
        let types = TypeBuilder::new();
        assert_eq!(types.int_ty(IntKind::Int), INT);
        assert_eq!(types.float_ty(FloatKind::Double), DOUBLE);
        assert_ne!(INT, UINT);
    }

    #[test]
    fn promotable_integers() {
        assert!(BOOL.is_promotable_integer());
        assert!(CHAR.is_promotable_integer());
        assert!(USHORT.is_promotable_integer());
        assert!(!INT.is_promotable_integer());
        assert!(!LONG_LONG.is_promotable_integer());
    }

    #[test]
    fn empty_records() {
        let types = TypeBuilder::new();
        let empty = types.struct_ty(&[]);
        assert!(empty.is_empty_record(true));
        let wrapper = types.struct_ty(&[empty]);
        assert!(wrapper.is_empty_record(true));
        let live = types.struct_ty(&[INT]);
        assert!(!live.is_empty_record(true));
    }
}
