//! Compile error types

use std::fmt;

use crate::bytecode::OpKind;

use super::registry::Stage;

/// Fatal compilation error
///
/// Every variant names the declaration (type index, function index or
/// declaration name) it was raised for.
#[derive(Debug, Clone, PartialEq)]
pub enum CompileError {
    /// A type reference that never resolves to a usable declaration
    UnresolvedType { ty: usize, reason: String },
    /// A declaration was accessed out of its Resolve/Define/Compile order
    StageOrder { decl: String, expected: Stage, found: Option<Stage> },
    /// A type that must have a constructor has none
    MissingConstructor { decl: String },
    /// Opcode the translator has no template for
    UnknownOpcode { function: usize, at: usize, op: OpKind },
    /// Opcode from the catalogued list of untranslated kinds
    TranslationGap { function: usize, at: usize, op: OpKind },
    InvalidRegister { function: usize, at: usize, reg: i32 },
    InvalidField { function: usize, at: usize, field: i32, decl: String },
    InvalidProtoSlot { function: usize, at: usize, slot: i32, decl: String },
    InvalidFunctionIndex { function: usize, findex: i32 },
    InvalidBranchTarget { function: usize, at: usize, target: i64 },
    /// An operand of a type the instruction cannot work on
    UnsupportedOperand { function: usize, at: usize, op: OpKind, found: String },
    /// A constant-table entry that does not match its global's layout
    InvalidConstant { global: usize, reason: String },
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnresolvedType { ty, reason } => write!(f, "Unresolved type @{}: {}", ty, reason),
            Self::StageOrder { decl, expected, found } => match found {
                Some(found) => write!(
                    f,
                    "Declaration {} accessed at stage {:?} but is at {:?}",
                    decl, expected, found
                ),
                None => write!(f, "Declaration {} accessed at stage {:?} before it was resolved", decl, expected),
            },
            Self::MissingConstructor { decl } => write!(f, "Type {} has no constructor", decl),
            Self::UnknownOpcode { function, at, op } => {
                write!(f, "fun{}@{}: no translation for opcode {}", function, at, op)
            }
            Self::TranslationGap { function, at, op } => write!(
                f,
                "fun{}@{}: opcode {} is not translated (enable best-effort mode to emit nop)",
                function, at, op
            ),
            Self::InvalidRegister { function, at, reg } => {
                write!(f, "fun{}@{}: invalid register r{}", function, at, reg)
            }
            Self::InvalidField { function, at, field, decl } => {
                write!(f, "fun{}@{}: {} has no field {}", function, at, decl, field)
            }
            Self::InvalidProtoSlot { function, at, slot, decl } => {
                write!(f, "fun{}@{}: {} has no prototype slot {}", function, at, decl, slot)
            }
            Self::InvalidFunctionIndex { function, findex } => {
                write!(f, "fun{}: invalid function index {}", function, findex)
            }
            Self::InvalidBranchTarget { function, at, target } => {
                write!(f, "fun{}@{}: branch target {} outside the function", function, at, target)
            }
            Self::UnsupportedOperand { function, at, op, found } => {
                write!(f, "fun{}@{}: {} cannot operate on {}", function, at, op, found)
            }
            Self::InvalidConstant { global, reason } => {
                write!(f, "Invalid constant for global{}: {}", global, reason)
            }
        }
    }
}

impl std::error::Error for CompileError {}

/// Result type for compilation
pub type CompileResult<T> = Result<T, CompileError>;
