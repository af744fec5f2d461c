//! Opcode handlers
//!
//! One module per opcode family. Each handler emits the target sequence for
//! a single source instruction through the [`CodegenContext`](super::codegen::CodegenContext).

mod arithmetic;
mod calls;
mod control_flow;
mod conversions;
mod enums;
mod exceptions;
mod fields;
mod objects;
mod values;

pub use arithmetic::compile_arithmetic_op;
pub use calls::compile_call_op;
pub use control_flow::compile_control_op;
pub use conversions::compile_conversion_op;
pub use enums::compile_enum_op;
pub use exceptions::compile_exception_op;
pub use fields::compile_field_op;
pub use objects::compile_object_op;
pub use values::compile_value_op;
