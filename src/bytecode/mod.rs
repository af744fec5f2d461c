//! Source bytecode: binary format, type catalog and instruction set
//!
//! # Module Layout
//!
//! ```text
//! "HLB" version flags counts... entrypoint
//! ints | floats | strings | [bytes] | [debug files]
//! types | globals | natives | functions | [constants]
//! ```
//!
//! Every count and index is a variable-length signed index (see
//! [`ByteReader::read_index`]); pools of fixed-width scalars are
//! little-endian.

pub mod debug_info;
pub mod decoder;
mod disasm;
pub mod error;
pub mod module;
pub mod opcodes;
pub mod reader;
pub mod types;
pub mod writer;

pub use decoder::decode;
pub use error::{DecodeError, DecodeErrorKind, DecodeResult};
pub use module::{
    Callee, Constant, DebugLine, Function, FunctionTable, Module, Native, RegisterName,
    FLAG_DEBUG, MAX_VERSION, MIN_VERSION,
};
pub use opcodes::{Arity, OpKind, Opcode};
pub use reader::{ByteReader, Diagnostic};
pub use types::{
    Binding, EnumConstruct, EnumType, Field, FunType, ObjType, Proto, Type, TypeKind, TypeRef,
    VirtualType,
};
pub use writer::{ByteWriter, EncodeError, EncodeResult, ModuleWriter};
