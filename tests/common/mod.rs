//! Shared test harness: an instruction-recording builder and helpers for
//! constructing ABIs.

// Not every test binary exercises every helper.
#![allow(dead_code)]

use std::str::FromStr;

use abilift::ir::{self, Builder, Value};
use abilift::{create_abi, Abi, TypeBuilder};
use target_lexicon::Triple;

/// One recorded builder operation.
#[derive(Clone, Debug, PartialEq)]
#[allow(dead_code)]
pub enum Inst {
    Alloca { ty: ir::Type, align: u32, name: String, result: Value },
    Load { ty: ir::Type, ptr: Value, align: u32, result: Value },
    Store { value: Value, ptr: Value, align: u32 },
    Memcpy { dst: Value, src: Value, bytes: u64, align: u32 },
    PtrToInt { value: Value, ty: ir::Type, result: Value },
    IntToPtr { value: Value, result: Value },
    IntCast { value: Value, ty: ir::Type, signed: bool, result: Value },
    Zext { value: Value, ty: ir::Type, result: Value },
    Sext { value: Value, ty: ir::Type, result: Value },
    Trunc { value: Value, ty: ir::Type, result: Value },
    Fpext { value: Value, ty: ir::Type, result: Value },
    Shl { value: Value, bits: u64, result: Value },
    Lshr { value: Value, bits: u64, result: Value },
    StructGep { struct_ty: ir::Type, ptr: Value, index: u32, result: Value },
    ByteGep { ptr: Value, offset: u64, result: Value },
    ExtractValue { agg: Value, index: u32, result: Value },
    Undef { ty: ir::Type, result: Value },
    Ret { value: Option<Value> },
}

/// A builder that records every requested instruction and mints sequential
/// value handles, standing in for a real IR builder.
#[derive(Default)]
pub struct RecordingBuilder {
    next_value: u32,
    pub insts: Vec<Inst>,
}

impl RecordingBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a fresh value, as if produced by embedder-side IR.
    pub fn new_value(&mut self) -> Value {
        let value = Value::from_u32(self.next_value);
        self.next_value += 1;
        value
    }

    /// Whether any recorded instruction satisfies `predicate`.
    #[allow(dead_code)]
    pub fn any(&self, predicate: impl Fn(&Inst) -> bool) -> bool {
        self.insts.iter().any(predicate)
    }
}

impl Builder for RecordingBuilder {
    fn alloca(&mut self, ty: &ir::Type, align: u32, name: &str) -> Value {
        let result = self.new_value();
        self.insts.push(Inst::Alloca {
            ty: ty.clone(),
            align,
            name: name.to_owned(),
            result,
        });
        result
    }

    fn load(&mut self, ty: &ir::Type, ptr: Value, align: u32) -> Value {
        let result = self.new_value();
        self.insts.push(Inst::Load { ty: ty.clone(), ptr, align, result });
        result
    }

    fn store(&mut self, value: Value, ptr: Value, align: u32) {
        self.insts.push(Inst::Store { value, ptr, align });
    }

    fn memcpy(&mut self, dst: Value, src: Value, bytes: u64, align: u32) {
        self.insts.push(Inst::Memcpy { dst, src, bytes, align });
    }

    fn ptr_to_int(&mut self, value: Value, ty: &ir::Type) -> Value {
        let result = self.new_value();
        self.insts.push(Inst::PtrToInt { value, ty: ty.clone(), result });
        result
    }

    fn int_to_ptr(&mut self, value: Value) -> Value {
        let result = self.new_value();
        self.insts.push(Inst::IntToPtr { value, result });
        result
    }

    fn int_cast(&mut self, value: Value, ty: &ir::Type, signed: bool) -> Value {
        let result = self.new_value();
        self.insts.push(Inst::IntCast { value, ty: ty.clone(), signed, result });
        result
    }

    fn zext(&mut self, value: Value, ty: &ir::Type) -> Value {
        let result = self.new_value();
        self.insts.push(Inst::Zext { value, ty: ty.clone(), result });
        result
    }

    fn sext(&mut self, value: Value, ty: &ir::Type) -> Value {
        let result = self.new_value();
        self.insts.push(Inst::Sext { value, ty: ty.clone(), result });
        result
    }

    fn trunc(&mut self, value: Value, ty: &ir::Type) -> Value {
        let result = self.new_value();
        self.insts.push(Inst::Trunc { value, ty: ty.clone(), result });
        result
    }

    fn fpext(&mut self, value: Value, ty: &ir::Type) -> Value {
        let result = self.new_value();
        self.insts.push(Inst::Fpext { value, ty: ty.clone(), result });
        result
    }

    fn shl(&mut self, value: Value, bits: u64) -> Value {
        let result = self.new_value();
        self.insts.push(Inst::Shl { value, bits, result });
        result
    }

    fn lshr(&mut self, value: Value, bits: u64) -> Value {
        let result = self.new_value();
        self.insts.push(Inst::Lshr { value, bits, result });
        result
    }

    fn struct_gep(&mut self, struct_ty: &ir::Type, ptr: Value, index: u32) -> Value {
        let result = self.new_value();
        self.insts.push(Inst::StructGep {
            struct_ty: struct_ty.clone(),
            ptr,
            index,
            result,
        });
        result
    }

    fn byte_gep(&mut self, ptr: Value, offset: u64) -> Value {
        let result = self.new_value();
        self.insts.push(Inst::ByteGep { ptr, offset, result });
        result
    }

    fn extract_value(&mut self, agg: Value, index: u32) -> Value {
        let result = self.new_value();
        self.insts.push(Inst::ExtractValue { agg, index, result });
        result
    }

    fn undef(&mut self, ty: &ir::Type) -> Value {
        let result = self.new_value();
        self.insts.push(Inst::Undef { ty: ty.clone(), result });
        result
    }

    fn ret(&mut self, value: Option<Value>) {
        self.insts.push(Inst::Ret { value });
    }
}

pub const X86_64_LINUX: &str = "x86_64-unknown-linux-gnu";
#[allow(dead_code)]
pub const I686_LINUX: &str = "i686-unknown-linux-gnu";
#[allow(dead_code)]
pub const I686_DARWIN: &str = "i686-apple-darwin";

/// Build the ABI for a triple string.
pub fn abi_for<'a>(types: &'a TypeBuilder<'a>, triple: &str) -> Abi<'a> {
    init_logging();
    let triple = Triple::from_str(triple).unwrap();
    create_abi(types, &triple, "").unwrap()
}

/// Route `trace!` output from the lowering into the test harness.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
