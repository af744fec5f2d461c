//! Target-side model: a managed, class-based stack machine
//!
//! The compiler produces a [`TargetModule`]; persisting it is left to an
//! external serializer (the model derives `serde::Serialize`).

pub mod builder;
pub mod instr;
mod listing;
pub mod runtime;
pub mod types;

pub use builder::{MethodBody, MethodBuilder};
pub use instr::{CallTarget, Cmp, Conv, Instr, Label};
pub use runtime::{MemWidth, RuntimeMember};
pub use types::{
    DeclKind, FieldDecl, FieldRef, GlobalId, GlobalKind, GlobalSlot, MethodDecl, MethodId,
    MethodKind, NativeImport, Signature, TargetModule, TargetType, TypeDecl, TypeId,
};
