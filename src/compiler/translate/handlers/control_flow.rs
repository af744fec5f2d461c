//! Control flow handlers
//!
//! Handles: JTrue, JFalse, JNull, JNotNull, JSLt, JSGte, JSGt, JSLte, JULt,
//! JUGte, JNotLt, JNotGte, JEq, JNotEq, JAlways, Switch, Label, Ret, Nop

use crate::bytecode::{OpKind, Opcode};
use crate::target::{Cmp, Instr, TargetType};

use super::super::super::error::CompileResult;
use super::super::codegen::CodegenContext;

fn comparison(kind: OpKind) -> Option<Cmp> {
    Some(match kind {
        OpKind::JSLt => Cmp::Lt,
        OpKind::JSGte => Cmp::Ge,
        OpKind::JSGt => Cmp::Gt,
        OpKind::JSLte => Cmp::Le,
        OpKind::JULt => Cmp::LtUn,
        OpKind::JUGte => Cmp::GeUn,
        // negated forms must also jump on unordered float operands
        OpKind::JNotLt => Cmp::GeUn,
        OpKind::JNotGte => Cmp::LtUn,
        OpKind::JEq => Cmp::Eq,
        OpKind::JNotEq => Cmp::Ne,
        _ => return None,
    })
}

/// Type both operands of a comparison are loaded as
fn operand_type(a: &TargetType, b: &TargetType) -> TargetType {
    use TargetType as T;
    match (a.is_value_type(), b.is_value_type()) {
        (true, true) => {
            if a.is_float() || b.is_float() {
                T::F64
            } else if *a == T::I64 || *b == T::I64 {
                T::I64
            } else {
                T::I32
            }
        }
        (true, false) if *b != T::Void => a.clone(),
        (false, true) if *a != T::Void => b.clone(),
        _ if a == b => a.clone(),
        _ => T::Any,
    }
}

fn compile_compare(ctx: &mut CodegenContext<'_>, cmp: Cmp, op: &Opcode) -> CompileResult<()> {
    let a = ctx.reg_type(op.p(0))?;
    let b = ctx.reg_type(op.p(1))?;
    let ty = operand_type(&a, &b);
    if !ty.is_value_type() && !matches!(cmp, Cmp::Eq | Cmp::Ne) {
        return Err(ctx.unsupported(format!("ordered comparison of {} and {}", a, b)));
    }
    ctx.load_as(op.p(0), &ty)?;
    ctx.load_as(op.p(1), &ty)?;
    ctx.branch(op.p(2), |target| Instr::Branch(cmp, target))
}

pub fn compile_control_op(ctx: &mut CodegenContext<'_>, op: &Opcode) -> CompileResult<()> {
    match op.kind {
        OpKind::JAlways => ctx.jump(op.p(0))?,

        OpKind::JTrue | OpKind::JFalse => {
            ctx.load(op.p(0))?;
            if op.kind == OpKind::JTrue {
                ctx.branch(op.p(1), Instr::BrTrue)?;
            } else {
                ctx.branch(op.p(1), Instr::BrFalse)?;
            }
        }

        OpKind::JNull | OpKind::JNotNull => {
            let ty = ctx.reg_type(op.p(0))?;
            // an empty nullable is the null reference
            match (op.kind, ty.is_value_type()) {
                // value registers are never null
                (OpKind::JNull, true) => {}
                (_, true) => ctx.jump(op.p(1))?,
                (OpKind::JNull, false) => {
                    ctx.load(op.p(0))?;
                    ctx.branch(op.p(1), Instr::BrFalse)?;
                }
                (_, false) => {
                    ctx.load(op.p(0))?;
                    ctx.branch(op.p(1), Instr::BrTrue)?;
                }
            }
        }

        OpKind::Switch => {
            ctx.load_as(op.p(0), &TargetType::I32)?;
            ctx.switch(op.switch_offsets())?;
        }

        OpKind::Ret => ctx.ret(op.p(0))?,

        OpKind::Label => {}

        OpKind::Nop => ctx.emit(Instr::Nop),

        kind => {
            let cmp = comparison(kind)
                .ok_or_else(|| ctx.unsupported(format!("{} is not a control opcode", kind)))?;
            compile_compare(ctx, cmp, op)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operand_type_widening() {
        assert_eq!(operand_type(&TargetType::U8, &TargetType::I32), TargetType::I32);
        assert_eq!(operand_type(&TargetType::I32, &TargetType::I64), TargetType::I64);
        assert_eq!(operand_type(&TargetType::I64, &TargetType::F64), TargetType::F64);
        assert_eq!(operand_type(&TargetType::Dynamic, &TargetType::I32), TargetType::I32);
        assert_eq!(operand_type(&TargetType::Bytes, &TargetType::Dynamic), TargetType::Any);
        assert_eq!(operand_type(&TargetType::Dynamic, &TargetType::Dynamic), TargetType::Dynamic);
    }

    #[test]
    fn test_negated_comparisons_are_unordered() {
        assert_eq!(comparison(OpKind::JNotLt), Some(Cmp::GeUn));
        assert_eq!(comparison(OpKind::JNotGte), Some(Cmp::LtUn));
        assert_eq!(comparison(OpKind::JAlways), None);
    }
}
