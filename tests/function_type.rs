//! Signature-lowering scenarios for x86_64 System V and i386.

mod common;

use abilift::ir::attrs::{AttributeSet, ParamAttr};
use abilift::ir::{self, Type as IrType};
use abilift::{
    FunctionType, StructMember, TypeBuilder, CHAR, DataSize, DOUBLE, FLOAT, INT, LONG_DOUBLE,
    LONG_LONG, POINTER, VOID,
};
use common::{abi_for, I686_DARWIN, I686_LINUX, X86_64_LINUX};

fn lower<'a>(
    types: &'a TypeBuilder<'a>,
    triple: &str,
    fty: &FunctionType<'a>,
) -> ir::Signature {
    abi_for(types, triple).function_type(fty).unwrap()
}

#[test]
fn plain_int_argument() {
    let types = TypeBuilder::new();
    let fty = FunctionType::new(VOID, &[INT], false);
    let sig = lower(&types, X86_64_LINUX, &fty);
    assert_eq!(sig.return_type, IrType::Void);
    assert_eq!(sig.params, vec![IrType::int(32)]);
}

#[test]
fn scalar_arguments_with_extension_attributes() {
    let types = TypeBuilder::new();
    let fty = FunctionType::new(VOID, &[CHAR, abilift::SHORT, INT, LONG_LONG, POINTER], false);

    let sig = lower(&types, X86_64_LINUX, &fty);
    assert_eq!(
        sig.params,
        vec![
            IrType::int(8),
            IrType::int(16),
            IrType::int(32),
            IrType::int(64),
            IrType::Ptr,
        ]
    );

    let abi = abi_for(&types, X86_64_LINUX);
    let attrs = abi.attributes(&fty, fty.argument_types(), AttributeSet::new()).unwrap();
    // char and short are promotable and signed on this target.
    assert!(attrs.has_param_attr(0, ParamAttr::SExt));
    assert!(attrs.has_param_attr(1, ParamAttr::SExt));
    assert!(attrs.param_attrs(2).is_empty());
    assert!(attrs.param_attrs(3).is_empty());
    assert!(attrs.param_attrs(4).is_empty());
}

#[test]
fn two_ints_pack_into_one_eightbyte() {
    let types = TypeBuilder::new();
    let ty = types.struct_ty(&[INT, INT]);
    let fty = FunctionType::new(VOID, &[ty], false);
    let sig = lower(&types, X86_64_LINUX, &fty);
    assert_eq!(sig.params, vec![IrType::int(64)]);
}

#[test]
fn three_ints_split_eightbyte_plus_int() {
    let types = TypeBuilder::new();
    let ty = types.struct_ty(&[INT, INT, INT]);
    let fty = FunctionType::new(VOID, &[ty], false);
    let sig = lower(&types, X86_64_LINUX, &fty);
    assert_eq!(sig.params, vec![IrType::int(64), IrType::int(32)]);
}

#[test]
fn four_ints_use_two_eightbytes() {
    let types = TypeBuilder::new();
    let ty = types.struct_ty(&[INT, INT, INT, INT]);
    let fty = FunctionType::new(VOID, &[ty], false);
    let sig = lower(&types, X86_64_LINUX, &fty);
    assert_eq!(sig.params, vec![IrType::int(64), IrType::int(64)]);
}

#[test]
fn five_ints_go_byval() {
    let types = TypeBuilder::new();
    let ty = types.struct_ty(&[INT, INT, INT, INT, INT]);
    let fty = FunctionType::new(VOID, &[ty], false);

    let sig = lower(&types, X86_64_LINUX, &fty);
    assert_eq!(sig.params, vec![IrType::Ptr]);

    let abi = abi_for(&types, X86_64_LINUX);
    let attrs = abi.attributes(&fty, fty.argument_types(), AttributeSet::new()).unwrap();
    // Byval alignment is the required alignment raised to the 8-byte
    // stack slot minimum.
    assert!(attrs.has_param_attr(0, ParamAttr::ByVal { align: 8 }));
}

#[test]
fn two_floats_pack_into_a_vector() {
    let types = TypeBuilder::new();
    let ty = types.struct_ty(&[FLOAT, FLOAT]);
    let fty = FunctionType::new(VOID, &[ty], false);
    let sig = lower(&types, X86_64_LINUX, &fty);
    assert_eq!(sig.params, vec![IrType::vector(2, IrType::Float)]);
}

#[test]
fn three_floats_and_float_return() {
    let types = TypeBuilder::new();
    let ty = types.struct_ty(&[FLOAT, FLOAT, FLOAT]);
    let fty = FunctionType::new(FLOAT, &[ty], false);
    let sig = lower(&types, X86_64_LINUX, &fty);
    assert_eq!(sig.return_type, IrType::Float);
    assert_eq!(sig.params, vec![IrType::vector(2, IrType::Float), IrType::Float]);
}

#[test]
fn double_int_pair() {
    let types = TypeBuilder::new();
    let ty = types.struct_ty(&[DOUBLE, INT]);
    let fty = FunctionType::new(VOID, &[ty], false);
    let sig = lower(&types, X86_64_LINUX, &fty);
    assert_eq!(sig.params, vec![IrType::Double, IrType::int(32)]);
}

#[test]
fn char_array_tail_becomes_i24() {
    let types = TypeBuilder::new();
    let ty = types.struct_ty(&[types.array_ty(8, CHAR), CHAR, CHAR, CHAR]);
    let fty = FunctionType::new(VOID, &[ty], false);
    let sig = lower(&types, X86_64_LINUX, &fty);
    assert_eq!(sig.params, vec![IrType::int(64), IrType::int(24)]);
}

#[test]
fn long_double_returns_as_x87() {
    let types = TypeBuilder::new();
    let fty = FunctionType::new(LONG_DOUBLE, &[], false);
    let sig = lower(&types, X86_64_LINUX, &fty);
    assert_eq!(sig.return_type, IrType::X86Fp80);
    assert!(sig.params.is_empty());
}

#[test]
fn large_struct_returns_through_sret() {
    let types = TypeBuilder::new();
    let ty = types.struct_ty(&[LONG_LONG, LONG_LONG, LONG_LONG]);
    let fty = FunctionType::new(ty, &[INT], false);

    let sig = lower(&types, X86_64_LINUX, &fty);
    assert_eq!(sig.return_type, IrType::Void);
    assert_eq!(sig.params, vec![IrType::Ptr, IrType::int(32)]);

    let abi = abi_for(&types, X86_64_LINUX);
    let attrs = abi.attributes(&fty, fty.argument_types(), AttributeSet::new()).unwrap();
    assert!(attrs.has_param_attr(0, ParamAttr::SRet));
}

#[test]
fn explicit_offset_struct_lowering() {
    let types = TypeBuilder::new();
    // {int @0, int @8}: the hole keeps both eightbytes live.
    let ty = types.struct_with_members(
        &[
            StructMember::auto(INT),
            StructMember::at_offset(INT, DataSize::bytes(8)),
        ],
        None,
    );
    let fty = FunctionType::new(VOID, &[ty], false);
    let sig = lower(&types, X86_64_LINUX, &fty);
    // The low half widens to i64 so the high half lands at offset 8.
    assert_eq!(sig.params, vec![IrType::int(64), IrType::int(32)]);
}

#[test]
fn variadic_flag_is_preserved() {
    let types = TypeBuilder::new();
    let fty = FunctionType::new(VOID, &[INT], true);
    let sig = lower(&types, X86_64_LINUX, &fty);
    assert!(sig.is_var_arg);
}

#[test]
fn i386_four_byte_struct_return_linux_vs_darwin() {
    let types = TypeBuilder::new();
    let ty = types.struct_ty(&[CHAR, CHAR, CHAR, CHAR]);
    let fty = FunctionType::new(ty, &[], false);

    // Linux: returned through an sret pointer.
    let sig = lower(&types, I686_LINUX, &fty);
    assert_eq!(sig.return_type, IrType::Void);
    assert_eq!(sig.params, vec![IrType::Ptr]);

    let abi = abi_for(&types, I686_LINUX);
    let attrs = abi.attributes(&fty, &[], AttributeSet::new()).unwrap();
    assert!(attrs.has_param_attr(0, ParamAttr::SRet));

    // Darwin: returned by value as i32.
    let sig = lower(&types, I686_DARWIN, &fty);
    assert_eq!(sig.return_type, IrType::int(32));
    assert!(sig.params.is_empty());
}
