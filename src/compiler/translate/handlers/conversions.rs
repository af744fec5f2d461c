//! Conversion handlers
//!
//! Handles: ToDyn, ToSFloat, ToUFloat, ToInt, SafeCast, UnsafeCast, ToVirtual

use crate::bytecode::{OpKind, Opcode, Type};
use crate::config::SafeCastPolicy;
use crate::target::{CallTarget, Conv, FieldRef, Instr, RuntimeMember, TargetType};

use super::super::super::error::CompileResult;
use super::super::codegen::CodegenContext;

/// Where a `ToVirtual` field value comes from
enum FieldSource {
    Field(FieldRef, TargetType),
    Dynamic,
}

fn compile_to_float(ctx: &mut CodegenContext<'_>, dst: i32, src: i32, unsigned: bool) -> CompileResult<()> {
    let from = ctx.load(src)?;
    if from.is_float() {
        return ctx.store_from(dst, &from);
    }
    if !from.is_value_type() {
        return Err(ctx.unsupported(format!("float conversion of {}", from)));
    }
    if unsigned {
        ctx.emit(Instr::Conv(Conv::RUn));
    }
    ctx.emit(Instr::Conv(Conv::R8));
    ctx.store_from(dst, &TargetType::F64)
}

fn compile_to_int(ctx: &mut CodegenContext<'_>, dst: i32, src: i32) -> CompileResult<()> {
    let to = ctx.reg_type(dst)?;
    let from = ctx.load(src)?;
    if from.is_float() {
        let (conv, pushed) = if to == TargetType::I64 {
            (Conv::I8, TargetType::I64)
        } else {
            (Conv::I4, TargetType::I32)
        };
        ctx.emit(Instr::Conv(conv));
        return ctx.store_from(dst, &pushed);
    }
    ctx.coerce(&from, &to)?;
    ctx.store(dst)
}

fn compile_to_virtual(ctx: &mut CodegenContext<'_>, dst: i32, src: i32) -> CompileResult<()> {
    let vindex = ctx.source_type_index(dst)?;
    let virt = ctx
        .registry
        .virtual_type(vindex)
        .ok_or_else(|| ctx.unsupported("virtual conversion into a non-virtual register"))?;
    let src_index = ctx.source_type_index(src)?;
    let src_type = ctx.source_type(src)?;

    let mut plan = Vec::with_capacity(virt.fields.len());
    for vf in &virt.fields {
        let source = match src_type {
            Type::Obj(_) | Type::Struct(_) => ctx
                .registry
                .obj(src_index)
                .and_then(|o| o.field_by_name(&vf.name))
                .map(|f| FieldSource::Field(f.field, f.ty.clone())),
            Type::Virtual(_) => ctx
                .registry
                .virtual_type(src_index)
                .and_then(|v| v.fields.iter().find(|f| f.name == vf.name))
                .map(|f| FieldSource::Field(f.field, f.ty.clone())),
            Type::Dyn | Type::DynObj => Some(FieldSource::Dynamic),
            other => return Err(ctx.unsupported(format!("virtual conversion from {:?}", other.kind()))),
        };
        // fields the source lacks keep their default
        if let Some(source) = source {
            plan.push((vf.name.clone(), vf.field, vf.ty.clone(), source));
        }
    }
    let constructor = virt.constructor;
    let decl = virt.decl;

    ctx.emit(Instr::NewObj(CallTarget::Method(constructor)));
    for (name, field, ty, source) in plan {
        ctx.emit(Instr::Dup);
        match source {
            FieldSource::Field(from_field, from_ty) => {
                ctx.load(src)?;
                ctx.emit(Instr::LdFld(from_field));
                ctx.coerce(&from_ty, &ty)?;
            }
            FieldSource::Dynamic => {
                ctx.load_as(src, &TargetType::Dynamic)?;
                ctx.emit(Instr::LdStr(name));
                ctx.call_runtime(RuntimeMember::DynamicGetField);
                ctx.coerce(&TargetType::Dynamic, &ty)?;
            }
        }
        ctx.emit(Instr::StFld(field));
    }
    ctx.store_from(dst, &TargetType::Virtual(decl))
}

pub fn compile_conversion_op(ctx: &mut CodegenContext<'_>, op: &Opcode) -> CompileResult<()> {
    let (dst, src) = (op.p(0), op.p(1));
    match op.kind {
        OpKind::ToDyn => {
            let to = ctx.reg_type(dst)?;
            ctx.load_as(src, &to)?;
            ctx.store(dst)
        }
        OpKind::ToSFloat => compile_to_float(ctx, dst, src, false),
        OpKind::ToUFloat => compile_to_float(ctx, dst, src, true),
        OpKind::ToInt => compile_to_int(ctx, dst, src),
        OpKind::SafeCast | OpKind::UnsafeCast => {
            let to = ctx.reg_type(dst)?;
            let from = ctx.load(src)?;
            if op.kind == OpKind::SafeCast && ctx.config.safe_cast == SafeCastPolicy::Checked {
                ctx.coerce(&from, &to)?;
            } else {
                ctx.coerce_unchecked(&from, &to)?;
            }
            ctx.store(dst)
        }
        OpKind::ToVirtual => compile_to_virtual(ctx, dst, src),
        other => Err(ctx.unsupported(format!("{} is not a conversion opcode", other))),
    }
}
