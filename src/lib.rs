//! Platform ABI signature lowering.
//!
//! This crate sits between a compiler front-end and an LLVM-style IR
//! builder and answers the three coupled questions needed to generate
//! ABI-correct calls: what the lowered IR function type is, which
//! function and parameter attributes it carries, and how abstract values
//! are packed into (and unpacked out of) that lowered form on both sides
//! of a call.
//!
//! The entry point is [`create_abi`], which selects an [`Abi`] for a
//! target triple. From there:
//!
//! - [`Abi::function_type`] lowers an abstract [`FunctionType`] to an
//!   [`ir::Signature`];
//! - [`Abi::attributes`] computes the matching attribute set;
//! - [`Abi::create_call`] encodes a call through an injected
//!   [`ir::Builder`] and decodes its result;
//! - [`Abi::create_function_encoder`] does the symmetric work inside a
//!   function definition.
//!
//! Abstract types are built with a [`TypeBuilder`] and passed around as
//! cheap [`Type`] handles; the crate emits no instructions itself and
//! owns no IR.

#![warn(missing_docs)]

pub mod ir;

mod abi;
mod arg_info;
mod callconv;
mod callee;
mod caller;
mod coerce;
mod fx;
mod ir_mapping;
mod promote;
mod result;
mod signature;
mod size;
mod type_info;
mod types;
mod win64;

pub mod x86_32;
pub mod x86_64;

pub use crate::abi::{create_abi, Abi};
pub use crate::arg_info::ArgInfo;
pub use crate::callconv::CallingConvention;
pub use crate::callee::{Callee, FunctionEncoder};
pub use crate::caller::Caller;
pub use crate::ir_mapping::{
    expansion_size, function_attributes, function_ir_mapping, ir_signature, ArgIRMapping,
    FunctionIRMapping,
};
pub use crate::promote::TypePromoter;
pub use crate::result::{AbiError, AbiResult};
pub use crate::signature::FunctionType;
pub use crate::size::DataSize;
pub use crate::type_info::AbiTypeInfo;
pub use crate::types::{FloatKind, IntKind, StructMember, Type, TypeBuilder};
pub use crate::win64::Win64Abi;

pub use crate::types::{
    BOOL, CHAR, DOUBLE, FLOAT, FLOAT128, HALF_FLOAT, INT, INTPTR_T, LONG, LONG_DOUBLE, LONG_LONG,
    POINTER, PTRDIFF_T, SCHAR, SHORT, SIZE_T, SSIZE_T, UCHAR, UINT, UINTPTR_T, ULONG, ULONG_LONG,
    USHORT, VOID,
};
