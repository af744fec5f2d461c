//! Field access handlers
//!
//! Handles: Field, SetField, GetThis, SetThis, DynGet, DynSet, GetGlobal,
//! SetGlobal

use crate::bytecode::{OpKind, Opcode, Type};
use crate::target::{FieldRef, GlobalId, Instr, RuntimeMember, TargetType};

use super::super::super::error::{CompileError, CompileResult};
use super::super::codegen::CodegenContext;

/// Field `fid` of the object or virtual held in `obj`
fn field_of(ctx: &CodegenContext<'_>, obj: i32, fid: i32) -> CompileResult<(FieldRef, TargetType)> {
    let index = ctx.source_type_index(obj)?;
    let invalid = |decl: String| CompileError::InvalidField {
        function: ctx.findex(),
        at: ctx.at,
        field: fid,
        decl,
    };
    match ctx.source_type(obj)? {
        Type::Obj(o) | Type::Struct(o) => {
            let compiled = ctx.registry.obj(index).ok_or_else(|| invalid(o.name.clone()))?;
            let f = compiled.field(fid).ok_or_else(|| invalid(o.name.clone()))?;
            Ok((f.field, f.ty.clone()))
        }
        Type::Virtual(_) => {
            let name = format!("virtual{}", index);
            let compiled = ctx.registry.virtual_type(index).ok_or_else(|| invalid(name.clone()))?;
            let f = compiled.field(fid).ok_or_else(|| invalid(name))?;
            Ok((f.field, f.ty.clone()))
        }
        other => Err(ctx.unsupported(format!("field access on {:?}", other.kind()))),
    }
}

fn load_field(ctx: &mut CodegenContext<'_>, dst: i32, obj: i32, fid: i32) -> CompileResult<()> {
    let (field, ty) = field_of(ctx, obj, fid)?;
    ctx.load(obj)?;
    ctx.emit(Instr::LdFld(field));
    ctx.store_from(dst, &ty)
}

fn store_field(ctx: &mut CodegenContext<'_>, obj: i32, fid: i32, src: i32) -> CompileResult<()> {
    let (field, ty) = field_of(ctx, obj, fid)?;
    ctx.load(obj)?;
    ctx.load_as(src, &ty)?;
    ctx.emit(Instr::StFld(field));
    Ok(())
}

fn field_name(ctx: &CodegenContext<'_>, raw: i32) -> CompileResult<String> {
    usize::try_from(raw)
        .ok()
        .and_then(|i| ctx.module.string(i))
        .map(str::to_string)
        .ok_or_else(|| ctx.unsupported(format!("field name string {}", raw)))
}

fn global_of(ctx: &CodegenContext<'_>, raw: i32) -> CompileResult<(GlobalId, TargetType)> {
    usize::try_from(raw)
        .ok()
        .and_then(|g| ctx.registry.global(g))
        .and_then(|id| ctx.registry.target.globals.get(id.0).map(|slot| (id, slot.ty.clone())))
        .ok_or_else(|| ctx.unsupported(format!("global {}", raw)))
}

pub fn compile_field_op(ctx: &mut CodegenContext<'_>, op: &Opcode) -> CompileResult<()> {
    match op.kind {
        OpKind::Field => load_field(ctx, op.p(0), op.p(1), op.p(2)),
        OpKind::SetField => store_field(ctx, op.p(0), op.p(1), op.p(2)),
        OpKind::GetThis => load_field(ctx, op.p(0), 0, op.p(1)),
        OpKind::SetThis => store_field(ctx, 0, op.p(0), op.p(1)),

        OpKind::DynGet => {
            let name = field_name(ctx, op.p(2))?;
            ctx.load_as(op.p(1), &TargetType::Dynamic)?;
            ctx.emit(Instr::LdStr(name));
            ctx.call_runtime(RuntimeMember::DynamicGetField);
            ctx.store_from(op.p(0), &TargetType::Dynamic)
        }

        OpKind::DynSet => {
            let name = field_name(ctx, op.p(1))?;
            ctx.load_as(op.p(0), &TargetType::Dynamic)?;
            ctx.emit(Instr::LdStr(name));
            ctx.load_as(op.p(2), &TargetType::Dynamic)?;
            ctx.call_runtime(RuntimeMember::DynamicSetField);
            Ok(())
        }

        OpKind::GetGlobal => {
            let (id, ty) = global_of(ctx, op.p(1))?;
            ctx.emit(Instr::LdSFld(id));
            ctx.store_from(op.p(0), &ty)
        }

        OpKind::SetGlobal => {
            let (id, ty) = global_of(ctx, op.p(0))?;
            ctx.load_as(op.p(1), &ty)?;
            ctx.emit(Instr::StSFld(id));
            Ok(())
        }

        other => Err(ctx.unsupported(format!("{} is not a field opcode", other))),
    }
}
