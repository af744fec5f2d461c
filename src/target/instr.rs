//! Stack-machine instruction set of the target

use serde::Serialize;

use super::runtime::RuntimeMember;
use super::types::{FieldRef, GlobalId, MethodId, Signature, TargetType};

/// Branch label, local to one method body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Label(pub usize);

/// Comparison folded into a conditional branch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Cmp {
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
    /// Unsigned / unordered forms
    LtUn,
    GeUn,
}

/// Numeric conversion of the top of stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Conv {
    U1,
    U2,
    I4,
    I8,
    R4,
    R8,
    /// Integer reinterpreted as unsigned, then converted to float
    RUn,
}

/// What a call instruction invokes
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum CallTarget {
    Method(MethodId),
    Runtime(RuntimeMember),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Instr {
    Nop,
    Pop,
    Dup,
    Ret,

    LdArg(u16),
    StArg(u16),
    LdLoc(u16),
    StLoc(u16),

    LdcI4(i32),
    LdcI8(i64),
    LdcR8(f64),
    LdStr(String),
    LdBytes(Vec<u8>),
    LdNull,
    LdToken(TargetType),

    LdFld(FieldRef),
    StFld(FieldRef),
    LdSFld(GlobalId),
    StSFld(GlobalId),

    Add,
    Sub,
    Mul,
    Div,
    DivUn,
    Rem,
    RemUn,
    Shl,
    Shr,
    ShrUn,
    And,
    Or,
    Xor,
    Neg,
    Not,
    Conv(Conv),

    Br(Label),
    BrTrue(Label),
    BrFalse(Label),
    Branch(Cmp, Label),
    /// Jump table on an `int32`; falls through when out of range
    Switch(Vec<Label>),
    MarkLabel(Label),

    Call(CallTarget),
    /// Allocate and run a constructor; pushes the instance
    NewObj(CallTarget),
    /// Delegate over a method; `bound` pops the receiver first
    NewDelegate { method: MethodId, bound: bool },
    /// Stack: delegate, args... -> result
    InvokeDelegate(Signature),

    Box(TargetType),
    UnboxAny(TargetType),
    CastClass(TargetType),
    IsInst(TargetType),
    /// `object[]` element of the given size
    NewArr(TargetType),
    LdElem(TargetType),
    StElem(TargetType),

    Throw,
    BeginTry,
    BeginCatch(TargetType),
    EndTry,
    Leave(Label),

    SequencePoint { file: usize, line: u32 },
}

impl Instr {
    /// Check if control never falls through to the next instruction
    pub fn is_terminator(&self) -> bool {
        matches!(self, Instr::Ret | Instr::Throw | Instr::Br(_) | Instr::Leave(_))
    }

    /// Labels this instruction may transfer control to
    pub fn targets(&self) -> Vec<Label> {
        match self {
            Instr::Br(l) | Instr::BrTrue(l) | Instr::BrFalse(l) | Instr::Branch(_, l) | Instr::Leave(l) => {
                vec![*l]
            }
            Instr::Switch(ls) => ls.clone(),
            _ => Vec::new(),
        }
    }
}
