//! Allocation, memory, array, type-query and reference handlers
//!
//! Handles: New, ArraySize, Type, GetType, GetTID, GetI8, GetI16, GetMem,
//! SetI8, SetI16, SetMem, GetArray, SetArray, Ref, Unref, Setref

use crate::bytecode::{OpKind, Opcode, Type, TypeRef};
use crate::target::{CallTarget, Instr, MemWidth, RuntimeMember, TargetType};

use super::super::super::error::CompileResult;
use super::super::super::type_map::map_type;
use super::super::codegen::CodegenContext;

fn compile_new(ctx: &mut CodegenContext<'_>, dst: i32) -> CompileResult<()> {
    let index = ctx.source_type_index(dst)?;
    let (ctor, ty) = match ctx.source_type(dst)? {
        Type::Obj(_) | Type::Struct(_) => {
            let obj = ctx
                .registry
                .obj(index)
                .ok_or_else(|| ctx.unsupported(format!("object type @{} has no declaration", index)))?;
            (obj.constructor, TargetType::Object(obj.decl))
        }
        Type::Virtual(_) => {
            let v = ctx
                .registry
                .virtual_type(index)
                .ok_or_else(|| ctx.unsupported(format!("virtual type @{} has no declaration", index)))?;
            (v.constructor, TargetType::Virtual(v.decl))
        }
        Type::Dyn | Type::DynObj => {
            ctx.emit(Instr::LdNull);
            ctx.call_runtime(RuntimeMember::DynamicNew);
            return ctx.store_from(dst, &TargetType::Dynamic);
        }
        other => return Err(ctx.unsupported(format!("allocation of {:?}", other.kind()))),
    };
    ctx.emit(Instr::NewObj(CallTarget::Method(ctor)));
    ctx.store_from(dst, &ty)
}

/// Access width selected by a register's source type
fn mem_width(ctx: &CodegenContext<'_>, r: i32) -> CompileResult<MemWidth> {
    Ok(match ctx.source_type(r)? {
        Type::U8 | Type::Bool => MemWidth::U8,
        Type::U16 => MemWidth::U16,
        Type::I32 => MemWidth::I32,
        Type::I64 => MemWidth::I64,
        Type::F32 => MemWidth::F32,
        Type::F64 => MemWidth::F64,
        other => return Err(ctx.unsupported(format!("memory access of {:?}", other.kind()))),
    })
}

fn compile_mem_get(ctx: &mut CodegenContext<'_>, op: &Opcode, width: MemWidth) -> CompileResult<()> {
    ctx.load_as(op.p(1), &TargetType::Bytes)?;
    ctx.load_as(op.p(2), &TargetType::I32)?;
    ctx.call_runtime(RuntimeMember::BytesGet(width));
    ctx.store_from(op.p(0), &width.stack_type())
}

fn compile_mem_set(ctx: &mut CodegenContext<'_>, op: &Opcode, width: MemWidth) -> CompileResult<()> {
    ctx.load_as(op.p(0), &TargetType::Bytes)?;
    ctx.load_as(op.p(1), &TargetType::I32)?;
    ctx.load_as(op.p(2), &width.stack_type())?;
    ctx.call_runtime(RuntimeMember::BytesSet(width));
    Ok(())
}

fn ref_inner(ctx: &CodegenContext<'_>, r: i32) -> CompileResult<TargetType> {
    match ctx.reg_type(r)? {
        TargetType::Ref(inner) => Ok(*inner),
        other => Err(ctx.unsupported(format!("dereference of {}", other))),
    }
}

pub fn compile_object_op(ctx: &mut CodegenContext<'_>, op: &Opcode) -> CompileResult<()> {
    match op.kind {
        OpKind::New => compile_new(ctx, op.p(0)),

        OpKind::ArraySize => {
            ctx.load_as(op.p(1), &TargetType::Array)?;
            ctx.call_runtime(RuntimeMember::ArraySize);
            ctx.store_from(op.p(0), &TargetType::I32)
        }

        OpKind::Type => {
            let r = usize::try_from(op.p(1))
                .map(TypeRef)
                .map_err(|_| ctx.unsupported(format!("type index {}", op.p(1))))?;
            let ty = map_type(ctx.module, ctx.registry, r)?;
            ctx.emit(Instr::LdToken(ty));
            ctx.store_from(op.p(0), &TargetType::TypeValue)
        }

        OpKind::GetType => {
            ctx.load_as(op.p(1), &TargetType::Dynamic)?;
            ctx.call_runtime(RuntimeMember::TypeOf);
            ctx.store_from(op.p(0), &TargetType::TypeValue)
        }

        OpKind::GetTID => {
            ctx.load_as(op.p(1), &TargetType::TypeValue)?;
            ctx.call_runtime(RuntimeMember::TypeKindOf);
            ctx.store_from(op.p(0), &TargetType::I32)
        }

        OpKind::GetI8 => compile_mem_get(ctx, op, MemWidth::U8),
        OpKind::GetI16 => compile_mem_get(ctx, op, MemWidth::U16),
        OpKind::GetMem => {
            let width = mem_width(ctx, op.p(0))?;
            compile_mem_get(ctx, op, width)
        }
        OpKind::SetI8 => compile_mem_set(ctx, op, MemWidth::U8),
        OpKind::SetI16 => compile_mem_set(ctx, op, MemWidth::U16),
        OpKind::SetMem => {
            let width = mem_width(ctx, op.p(2))?;
            compile_mem_set(ctx, op, width)
        }

        OpKind::GetArray => {
            ctx.load_as(op.p(1), &TargetType::Array)?;
            ctx.load_as(op.p(2), &TargetType::I32)?;
            ctx.emit(Instr::LdElem(TargetType::Any));
            ctx.store_from(op.p(0), &TargetType::Any)
        }

        OpKind::SetArray => {
            ctx.load_as(op.p(0), &TargetType::Array)?;
            ctx.load_as(op.p(1), &TargetType::I32)?;
            ctx.load_as(op.p(2), &TargetType::Any)?;
            ctx.emit(Instr::StElem(TargetType::Any));
            Ok(())
        }

        OpKind::Ref => {
            let inner = ctx.reg_type(op.p(1))?;
            ctx.load(op.p(1))?;
            ctx.call_runtime(RuntimeMember::RefBoxNew(inner.clone()));
            ctx.store_from(op.p(0), &TargetType::Ref(Box::new(inner)))
        }

        OpKind::Unref => {
            let inner = ref_inner(ctx, op.p(1))?;
            ctx.load(op.p(1))?;
            ctx.call_runtime(RuntimeMember::RefBoxGet(inner.clone()));
            ctx.store_from(op.p(0), &inner)
        }

        OpKind::Setref => {
            let inner = ref_inner(ctx, op.p(0))?;
            ctx.load(op.p(0))?;
            ctx.load_as(op.p(1), &inner)?;
            ctx.call_runtime(RuntimeMember::RefBoxSet(inner));
            Ok(())
        }

        other => Err(ctx.unsupported(format!("{} is not an object opcode", other))),
    }
}
