//! Enum handlers
//!
//! Handles: MakeEnum, EnumAlloc, EnumIndex, EnumField, SetEnumField

use crate::bytecode::{OpKind, Opcode};
use crate::target::{CallTarget, FieldRef, Instr, TargetType};

use super::super::super::error::{CompileError, CompileResult};
use super::super::super::registry::{CompiledConstruct, CompiledEnum};
use super::super::codegen::CodegenContext;

fn enum_of<'r>(ctx: &CodegenContext<'r>, reg: i32) -> CompileResult<&'r CompiledEnum> {
    let index = ctx.source_type_index(reg)?;
    let registry = ctx.registry;
    registry
        .enum_type(index)
        .ok_or_else(|| ctx.unsupported(format!("r{} is not an enum", reg)))
}

fn construct_of<'r>(
    ctx: &CodegenContext<'r>,
    e: &'r CompiledEnum,
    construct: i32,
) -> CompileResult<&'r CompiledConstruct> {
    usize::try_from(construct)
        .ok()
        .and_then(|c| e.constructs.get(c))
        .ok_or_else(|| ctx.unsupported(format!("enum {} has no construct {}", e.name, construct)))
}

/// Field, field type and construct class of one enum construct field
fn enum_field(
    ctx: &CodegenContext<'_>,
    value: i32,
    construct: i32,
    field: i32,
) -> CompileResult<(FieldRef, TargetType, TargetType)> {
    let e = enum_of(ctx, value)?;
    let c = construct_of(ctx, e, construct)?;
    let f = usize::try_from(field)
        .ok()
        .and_then(|i| c.fields.get(i))
        .ok_or(CompileError::InvalidField {
            function: ctx.findex(),
            at: ctx.at,
            field,
            decl: format!("{}.{}", e.name, c.name),
        })?;
    Ok((f.field, f.ty.clone(), TargetType::Object(c.decl)))
}

pub fn compile_enum_op(ctx: &mut CodegenContext<'_>, op: &Opcode) -> CompileResult<()> {
    match op.kind {
        OpKind::MakeEnum | OpKind::EnumAlloc => {
            let dst = op.p(0);
            let e = enum_of(ctx, dst)?;
            let c = construct_of(ctx, e, op.p(1))?;
            if op.kind == OpKind::MakeEnum {
                let args = op.call_args();
                if args.len() != c.fields.len() {
                    return Err(ctx.unsupported(format!(
                        "{} arguments for construct {} with {} fields",
                        args.len(),
                        c.name,
                        c.fields.len()
                    )));
                }
                for (r, f) in args.iter().zip(&c.fields) {
                    ctx.load_as(*r, &f.ty)?;
                }
            } else {
                for f in &c.fields {
                    ctx.push_default(&f.ty);
                }
            }
            ctx.emit(Instr::NewObj(CallTarget::Method(c.constructor)));
            ctx.store_from(dst, &TargetType::Enum(e.decl))
        }

        OpKind::EnumIndex => {
            let e = enum_of(ctx, op.p(1))?;
            ctx.load(op.p(1))?;
            ctx.emit(Instr::LdFld(e.index_field));
            ctx.store_from(op.p(0), &TargetType::I32)
        }

        OpKind::EnumField => {
            let (field, ty, construct) = enum_field(ctx, op.p(1), op.p(2), op.p(3))?;
            ctx.load(op.p(1))?;
            ctx.emit(Instr::CastClass(construct));
            ctx.emit(Instr::LdFld(field));
            ctx.store_from(op.p(0), &ty)
        }

        // the opcode carries no construct index; it addresses the first one
        OpKind::SetEnumField => {
            let (field, ty, construct) = enum_field(ctx, op.p(0), 0, op.p(1))?;
            ctx.load(op.p(0))?;
            ctx.emit(Instr::CastClass(construct));
            ctx.load_as(op.p(2), &ty)?;
            ctx.emit(Instr::StFld(field));
            Ok(())
        }

        other => Err(ctx.unsupported(format!("{} is not an enum opcode", other))),
    }
}
