//! Exception handlers
//!
//! Handles: Throw, Rethrow, Trap, EndTrap, NullCheck, Assert
//!
//! A `Trap` opens a protected region whose handler is the trap's jump
//! target. The matching `EndTrap` closes it: the normal path leaves to the
//! next instruction, the catch block stores the carried value into the trap
//! register and leaves to the handler.

use crate::bytecode::{OpKind, Opcode};
use crate::target::{Instr, RuntimeMember, TargetType};

use super::super::super::error::CompileResult;
use super::super::codegen::{CodegenContext, TrapFrame};

fn compile_end_trap(ctx: &mut CodegenContext<'_>, reg: i32) -> CompileResult<()> {
    let frame = ctx
        .traps
        .pop()
        .ok_or_else(|| ctx.unsupported("endtrap without an open trap"))?;
    if frame.reg != reg {
        return Err(ctx.unsupported(format!("endtrap r{} closes trap on r{}", reg, frame.reg)));
    }

    let after = ctx.builder.new_label();
    ctx.emit(Instr::Leave(after));
    ctx.emit(Instr::BeginCatch(TargetType::Any));
    ctx.call_runtime(RuntimeMember::ExceptionValue);
    ctx.store_from(frame.reg, &TargetType::Dynamic)?;
    ctx.emit(Instr::Leave(frame.handler));
    ctx.emit(Instr::EndTry);
    ctx.builder.mark(after);
    Ok(())
}

pub fn compile_exception_op(ctx: &mut CodegenContext<'_>, op: &Opcode) -> CompileResult<()> {
    match op.kind {
        OpKind::Throw => {
            ctx.load_as(op.p(0), &TargetType::Dynamic)?;
            ctx.call_runtime(RuntimeMember::ExceptionNew);
            ctx.emit(Instr::Throw);
        }

        OpKind::Rethrow => {
            ctx.load_as(op.p(0), &TargetType::Dynamic)?;
            ctx.call_runtime(RuntimeMember::Rethrow);
        }

        OpKind::Trap => {
            let reg = op.p(0);
            ctx.reg_type(reg)?;
            let handler = ctx.branch_label(op.p(1))?;
            let region = ctx.trap_region()?;
            ctx.traps.push(TrapFrame { reg, handler, region });
            ctx.emit(Instr::BeginTry);
        }

        OpKind::EndTrap => compile_end_trap(ctx, op.p(0))?,

        OpKind::NullCheck => {
            let reg = op.p(0);
            if ctx.reg_type(reg)?.is_reference() {
                let ok = ctx.builder.new_label();
                ctx.load(reg)?;
                ctx.emit(Instr::BrTrue(ok));
                ctx.call_runtime(RuntimeMember::NullCheckErrorNew);
                ctx.emit(Instr::Throw);
                ctx.builder.mark(ok);
            }
        }

        OpKind::Assert => ctx.call_runtime(RuntimeMember::Assert),

        other => return Err(ctx.unsupported(format!("{} is not an exception opcode", other))),
    }
    Ok(())
}
