//! Caller/callee round trips through the recording builder.

mod common;

use abilift::ir::TypedValue;
use abilift::{FunctionType, TypeBuilder, CHAR, DOUBLE, FLOAT, INT, LONG_LONG, POINTER, VOID};
use common::{abi_for, Inst, RecordingBuilder, X86_64_LINUX};

#[test]
fn caller_and_callee_agree_on_ir_layout() {
    let types = TypeBuilder::new();
    let abi = abi_for(&types, X86_64_LINUX);

    let big = types.struct_ty(&[LONG_LONG, LONG_LONG, LONG_LONG]);
    let pair = types.struct_ty(&[INT, INT]);
    let mixed = types.struct_ty(&[DOUBLE, INT]);

    let signatures = [
        FunctionType::new(VOID, &[INT], false),
        FunctionType::new(VOID, &[pair], false),
        FunctionType::new(FLOAT, &[types.struct_ty(&[FLOAT, FLOAT, FLOAT])], false),
        FunctionType::new(big, &[mixed, POINTER], false),
        FunctionType::new(pair, &[CHAR], false),
    ];

    for fty in &signatures {
        let sig = abi.function_type(fty).unwrap();

        // Caller side: the encoded argument sequence covers exactly the
        // lowered parameter list.
        let mut builder = RecordingBuilder::new();
        let arguments: Vec<TypedValue> = fty
            .argument_types()
            .iter()
            .map(|&ty| TypedValue::new(builder.new_value(), ty))
            .collect();

        let mut seen = None;
        abi.create_call(
            &mut builder,
            fty,
            |builder, encoded| {
                seen = Some(encoded.len());
                if sig.return_type.is_void() {
                    None
                } else {
                    Some(builder.undef(&sig.return_type))
                }
            },
            &arguments,
        )
        .unwrap();
        assert_eq!(seen, Some(sig.params.len()), "caller layout for {fty}");

        // Callee side: the same lowered parameter list decodes back into
        // one abstract value per fixed argument.
        let mut builder = RecordingBuilder::new();
        let ir_args: Vec<_> = sig.params.iter().map(|_| builder.new_value()).collect();
        let mut encoder = abi.create_function_encoder(&mut builder, fty, &ir_args).unwrap();
        assert_eq!(
            encoder.arguments().len(),
            fty.argument_types().len(),
            "callee layout for {fty}"
        );

        let result = builder.new_value();
        encoder.return_value(&mut builder, result).unwrap();
        assert!(matches!(builder.insts.last(), Some(Inst::Ret { .. })));
    }
}

#[test]
fn trivial_scalar_arguments_pass_through_unchanged() {
    let types = TypeBuilder::new();
    let abi = abi_for(&types, X86_64_LINUX);
    let fty = FunctionType::new(VOID, &[INT, POINTER], false);

    let mut builder = RecordingBuilder::new();
    let a = builder.new_value();
    let b = builder.new_value();
    let arguments = [TypedValue::new(a, INT), TypedValue::new(b, POINTER)];

    let mut captured = Vec::new();
    abi.create_call(
        &mut builder,
        &fty,
        |_, encoded| {
            captured = encoded.to_vec();
            None
        },
        &arguments,
    )
    .unwrap();

    // No coercion machinery runs for matching scalars.
    assert_eq!(captured, vec![a, b]);
    assert!(builder.insts.iter().all(|inst| !matches!(inst, Inst::Alloca { .. })));
}

#[test]
fn coerced_struct_argument_spills_through_a_temporary() {
    let types = TypeBuilder::new();
    let abi = abi_for(&types, X86_64_LINUX);
    let pair = types.struct_ty(&[INT, INT]);
    let fty = FunctionType::new(VOID, &[pair], false);

    let mut builder = RecordingBuilder::new();
    let value = builder.new_value();

    abi.create_call(
        &mut builder,
        &fty,
        |_, encoded| {
            assert_eq!(encoded.len(), 1);
            None
        },
        &[TypedValue::new(value, pair)],
    )
    .unwrap();

    // The value is spilled and the eightbyte loaded back out.
    assert!(builder.any(|inst| matches!(inst, Inst::Alloca { .. })));
    assert!(builder.any(|inst| matches!(inst, Inst::Store { value: v, .. } if *v == value)));
    assert!(builder.any(|inst| matches!(inst, Inst::Load { .. })));
}

#[test]
fn indirect_return_goes_through_sret_temporary() {
    let types = TypeBuilder::new();
    let abi = abi_for(&types, X86_64_LINUX);
    let big = types.struct_ty(&[LONG_LONG, LONG_LONG, LONG_LONG]);
    let fty = FunctionType::new(big, &[], false);

    let mut builder = RecordingBuilder::new();
    let mut sret_arg = None;
    let result = abi
        .create_call(
            &mut builder,
            &fty,
            |_, encoded| {
                sret_arg = Some(encoded[0]);
                None
            },
            &[],
        )
        .unwrap();

    // The hidden pointer is a fresh temporary, and the abstract result is
    // loaded back out of it.
    let sret_arg = sret_arg.unwrap();
    assert!(builder.any(
        |inst| matches!(inst, Inst::Alloca { result, .. } if *result == sret_arg)
    ));
    assert!(builder.any(
        |inst| matches!(inst, Inst::Load { ptr, result: r, .. } if *ptr == sret_arg && *r == result)
    ));
}

#[test]
fn variadic_float_promotes_to_double() {
    let types = TypeBuilder::new();
    let abi = abi_for(&types, X86_64_LINUX);
    let fty = FunctionType::new(VOID, &[INT], true);

    let mut builder = RecordingBuilder::new();
    let fixed = builder.new_value();
    let vararg = builder.new_value();
    let arguments = [TypedValue::new(fixed, INT), TypedValue::new(vararg, FLOAT)];

    let mut captured = Vec::new();
    abi.create_call(
        &mut builder,
        &fty,
        |_, encoded| {
            captured = encoded.to_vec();
            None
        },
        &arguments,
    )
    .unwrap();

    assert_eq!(captured.len(), 2);
    assert_eq!(captured[0], fixed);
    // The float went through an fpext to double and the widened value is
    // what gets passed.
    let widened = builder.insts.iter().find_map(|inst| match inst {
        Inst::Fpext { value, result, .. } if *value == vararg => Some(*result),
        _ => None,
    });
    assert_eq!(widened, Some(captured[1]));
}

#[test]
fn emitter_contract_is_enforced() {
    let types = TypeBuilder::new();
    let abi = abi_for(&types, X86_64_LINUX);
    let fty = FunctionType::new(VOID, &[INT], false);

    let mut builder = RecordingBuilder::new();
    let value = builder.new_value();
    let bogus = builder.new_value();

    // Returning a value for a void-lowered call violates the contract.
    let result = abi.create_call(
        &mut builder,
        &fty,
        |_, _| Some(bogus),
        &[TypedValue::new(value, INT)],
    );
    assert_eq!(result.unwrap_err(), abilift::AbiError::EmitterContract);

    // So does returning no value for a non-void one.
    let fty = FunctionType::new(INT, &[], false);
    let result = abi.create_call(&mut builder, &fty, |_, _| None, &[]);
    assert_eq!(result.unwrap_err(), abilift::AbiError::EmitterContract);
}

#[test]
#[should_panic(expected = "return_value called more than once")]
fn function_encoder_rejects_a_second_return() {
    let types = TypeBuilder::new();
    let abi = abi_for(&types, X86_64_LINUX);
    let fty = FunctionType::new(INT, &[], false);
    let sig = abi.function_type(&fty).unwrap();

    let mut builder = RecordingBuilder::new();
    let ir_args: Vec<_> = sig.params.iter().map(|_| builder.new_value()).collect();
    let mut encoder = abi.create_function_encoder(&mut builder, &fty, &ir_args).unwrap();

    let value = builder.new_value();
    encoder.return_value(&mut builder, value).unwrap();
    encoder.return_value(&mut builder, value).unwrap();
}
