//! Arithmetic handlers
//!
//! Handles: Add, Sub, Mul, SDiv, UDiv, SMod, UMod, Shl, SShr, UShr, And,
//! Or, Xor, Neg, Not, Incr, Decr
//!
//! Operands are evaluated in the destination register's type. Results into
//! 8- and 16-bit registers are truncated back to their width.

use crate::bytecode::{OpKind, Opcode};
use crate::target::{Conv, Instr, TargetType};

use super::super::super::error::CompileResult;
use super::super::codegen::CodegenContext;

fn binary_instr(kind: OpKind, ty: &TargetType) -> Option<Instr> {
    let float = ty.is_float();
    Some(match kind {
        OpKind::Add => Instr::Add,
        OpKind::Sub => Instr::Sub,
        OpKind::Mul => Instr::Mul,
        OpKind::SDiv => Instr::Div,
        OpKind::UDiv if float => Instr::Div,
        OpKind::UDiv => Instr::DivUn,
        OpKind::SMod => Instr::Rem,
        OpKind::UMod if float => Instr::Rem,
        OpKind::UMod => Instr::RemUn,
        OpKind::Shl if !float => Instr::Shl,
        OpKind::SShr if !float => Instr::Shr,
        OpKind::UShr if !float => Instr::ShrUn,
        OpKind::And if !float => Instr::And,
        OpKind::Or if !float => Instr::Or,
        OpKind::Xor if !float => Instr::Xor,
        _ => return None,
    })
}

/// Truncate a 32-bit stack result back to a narrow register
fn wrap(ctx: &mut CodegenContext<'_>, ty: &TargetType) {
    match ty {
        TargetType::U8 => ctx.emit(Instr::Conv(Conv::U1)),
        TargetType::U16 => ctx.emit(Instr::Conv(Conv::U2)),
        _ => {}
    }
}

fn one(ty: &TargetType) -> Instr {
    match ty {
        TargetType::I64 => Instr::LdcI8(1),
        TargetType::F32 | TargetType::F64 => Instr::LdcR8(1.0),
        _ => Instr::LdcI4(1),
    }
}

pub fn compile_arithmetic_op(ctx: &mut CodegenContext<'_>, op: &Opcode) -> CompileResult<()> {
    let dst = op.p(0);
    let ty = ctx.reg_type(dst)?;
    if !ty.is_value_type() {
        return Err(ctx.unsupported(format!("arithmetic on {}", ty)));
    }

    match op.kind {
        OpKind::Neg => {
            ctx.load_as(op.p(1), &ty)?;
            ctx.emit(Instr::Neg);
            wrap(ctx, &ty);
        }

        OpKind::Not => {
            ctx.load_as(op.p(1), &ty)?;
            if ty == TargetType::Bool {
                ctx.emit(Instr::LdcI4(1));
                ctx.emit(Instr::Xor);
            } else if ty.is_float() {
                return Err(ctx.unsupported(format!("not on {}", ty)));
            } else {
                ctx.emit(Instr::Not);
                wrap(ctx, &ty);
            }
        }

        OpKind::Incr | OpKind::Decr => {
            ctx.load(dst)?;
            ctx.emit(one(&ty));
            ctx.emit(if op.kind == OpKind::Incr { Instr::Add } else { Instr::Sub });
            wrap(ctx, &ty);
        }

        kind => {
            let instr = binary_instr(kind, &ty)
                .ok_or_else(|| ctx.unsupported(format!("{} on {}", kind, ty)))?;
            let shift = matches!(kind, OpKind::Shl | OpKind::SShr | OpKind::UShr);
            ctx.load_as(op.p(1), &ty)?;
            let amount_ty = if shift { TargetType::I32 } else { ty.clone() };
            ctx.load_as(op.p(2), &amount_ty)?;
            ctx.emit(instr);
            wrap(ctx, &ty);
        }
    }

    ctx.store(dst)
}
