//! Moves and pooled constants
//!
//! Handles: Mov, Int, Float, Bool, Bytes, String, Null

use crate::bytecode::{OpKind, Opcode};
use crate::target::{Instr, RuntimeMember, TargetType};

use super::super::super::error::CompileResult;
use super::super::codegen::CodegenContext;

fn pool_index(ctx: &CodegenContext<'_>, raw: i32, pool: &str) -> CompileResult<usize> {
    usize::try_from(raw)
        .map_err(|_| ctx.unsupported(format!("{} pool index {}", pool, raw)))
}

pub fn compile_value_op(ctx: &mut CodegenContext<'_>, op: &Opcode) -> CompileResult<()> {
    let dst = op.p(0);
    match op.kind {
        OpKind::Mov => {
            let to = ctx.reg_type(dst)?;
            ctx.load_as(op.p(1), &to)?;
            ctx.store(dst)?;
        }

        OpKind::Int => {
            let index = pool_index(ctx, op.p(1), "int")?;
            let v = *ctx
                .module
                .ints
                .get(index)
                .ok_or_else(|| ctx.unsupported(format!("int pool index {}", index)))?;
            if ctx.reg_type(dst)? == TargetType::I64 {
                ctx.emit(Instr::LdcI8(v as i64));
                ctx.store(dst)?;
            } else {
                ctx.emit(Instr::LdcI4(v));
                ctx.store_from(dst, &TargetType::I32)?;
            }
        }

        OpKind::Float => {
            let index = pool_index(ctx, op.p(1), "float")?;
            let v = *ctx
                .module
                .floats
                .get(index)
                .ok_or_else(|| ctx.unsupported(format!("float pool index {}", index)))?;
            ctx.emit(Instr::LdcR8(v));
            ctx.store_from(dst, &TargetType::F64)?;
        }

        OpKind::Bool => {
            ctx.emit(Instr::LdcI4((op.p(1) != 0) as i32));
            ctx.store_from(dst, &TargetType::Bool)?;
        }

        OpKind::String => {
            let index = pool_index(ctx, op.p(1), "string")?;
            let s = ctx
                .module
                .string(index)
                .ok_or_else(|| ctx.unsupported(format!("string pool index {}", index)))?
                .to_string();
            ctx.emit(Instr::LdStr(s));
            if ctx.reg_type(dst)? == TargetType::Bytes {
                ctx.call_runtime(RuntimeMember::BytesFromString);
                ctx.store(dst)?;
            } else {
                ctx.store_from(dst, &TargetType::Str)?;
            }
        }

        OpKind::Bytes => {
            let index = pool_index(ctx, op.p(1), "bytes")?;
            if ctx.module.version >= 5 {
                let blob = ctx
                    .module
                    .bytes_blob(index)
                    .ok_or_else(|| ctx.unsupported(format!("bytes pool index {}", index)))?
                    .to_vec();
                ctx.emit(Instr::LdBytes(blob));
                ctx.call_runtime(RuntimeMember::BytesFromRaw);
            } else {
                let s = ctx
                    .module
                    .string(index)
                    .ok_or_else(|| ctx.unsupported(format!("string pool index {}", index)))?
                    .to_string();
                ctx.emit(Instr::LdStr(s));
                ctx.call_runtime(RuntimeMember::BytesFromString);
            }
            ctx.store_from(dst, &TargetType::Bytes)?;
        }

        OpKind::Null => {
            ctx.emit(Instr::LdNull);
            ctx.store(dst)?;
        }

        other => return Err(ctx.unsupported(format!("{} is not a value opcode", other))),
    }
    Ok(())
}
