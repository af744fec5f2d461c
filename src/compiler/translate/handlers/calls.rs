//! Call and closure handlers
//!
//! Handles: Call0-Call4, CallN, CallMethod, CallThis, CallClosure,
//! StaticClosure, InstanceClosure, VirtualClosure
//!
//! Direct calls go straight to the method reserved for the function index.
//! Method calls load the receiver's slot delegate and invoke it; closures
//! typed as dynamic go through the runtime's `Dynamic::Invoke` with the
//! arguments boxed into an `object[]`.

use crate::bytecode::{OpKind, Opcode, Type};
use crate::target::{CallTarget, FieldRef, Instr, RuntimeMember, Signature, TargetType};

use super::super::super::error::{CompileError, CompileResult};
use super::super::super::registry::CompiledFunction;
use super::super::codegen::CodegenContext;

fn callee<'r>(ctx: &CodegenContext<'r>, raw: i32) -> CompileResult<&'r CompiledFunction> {
    usize::try_from(raw)
        .ok()
        .and_then(|f| ctx.registry.function(f))
        .ok_or(CompileError::InvalidFunctionIndex {
            function: ctx.findex(),
            findex: raw,
        })
}

/// Push `args` converted to `params`
fn push_args(ctx: &mut CodegenContext<'_>, args: &[i32], params: &[TargetType]) -> CompileResult<()> {
    if args.len() != params.len() {
        return Err(ctx.unsupported(format!(
            "{} arguments for {} parameters",
            args.len(),
            params.len()
        )));
    }
    for (r, ty) in args.iter().zip(params) {
        ctx.load_as(*r, ty)?;
    }
    Ok(())
}

fn store_result(ctx: &mut CodegenContext<'_>, dst: i32, ret: &TargetType) -> CompileResult<()> {
    if *ret == TargetType::Void {
        return Ok(());
    }
    ctx.store_from(dst, ret)
}

/// Delegate field and signature behind method slot `slot` of `recv`
fn receiver_slot(
    ctx: &CodegenContext<'_>,
    recv: i32,
    slot: i32,
) -> CompileResult<(FieldRef, Signature)> {
    let index = ctx.source_type_index(recv)?;
    match ctx.source_type(recv)? {
        Type::Obj(_) | Type::Struct(_) => {
            let obj = ctx
                .registry
                .obj(index)
                .ok_or_else(|| ctx.unsupported(format!("object type @{} has no declaration", index)))?;
            let proto = obj.proto(slot).ok_or_else(|| CompileError::InvalidProtoSlot {
                function: ctx.findex(),
                at: ctx.at,
                slot,
                decl: obj.name.clone(),
            })?;
            Ok((proto.field, proto.signature.clone()))
        }
        Type::Virtual(_) => {
            let v = ctx
                .registry
                .virtual_type(index)
                .ok_or_else(|| ctx.unsupported(format!("virtual type @{} has no declaration", index)))?;
            let field = v.field(slot).ok_or_else(|| CompileError::InvalidProtoSlot {
                function: ctx.findex(),
                at: ctx.at,
                slot,
                decl: format!("virtual{}", index),
            })?;
            let sig = field
                .ty
                .as_delegate()
                .cloned()
                .ok_or_else(|| ctx.unsupported(format!("field {} is not callable", field.name)))?;
            Ok((field.field, sig))
        }
        other => Err(ctx.unsupported(format!("method call on {:?}", other.kind()))),
    }
}

fn compile_method_call(
    ctx: &mut CodegenContext<'_>,
    dst: i32,
    recv: i32,
    slot: i32,
    args: &[i32],
) -> CompileResult<()> {
    let (field, sig) = receiver_slot(ctx, recv, slot)?;
    ctx.load(recv)?;
    ctx.emit(Instr::LdFld(field));
    push_args(ctx, args, &sig.params)?;
    ctx.emit(Instr::InvokeDelegate(sig.clone()));
    store_result(ctx, dst, &sig.ret)
}

fn compile_closure_call(ctx: &mut CodegenContext<'_>, dst: i32, closure: i32, args: &[i32]) -> CompileResult<()> {
    match ctx.reg_type(closure)? {
        TargetType::Dynamic => {
            ctx.load(closure)?;
            ctx.emit(Instr::LdcI4(args.len() as i32));
            ctx.emit(Instr::NewArr(TargetType::Any));
            for (i, r) in args.iter().enumerate() {
                ctx.emit(Instr::Dup);
                ctx.emit(Instr::LdcI4(i as i32));
                ctx.load_as(*r, &TargetType::Any)?;
                ctx.emit(Instr::StElem(TargetType::Any));
            }
            ctx.call_runtime(RuntimeMember::DynamicInvoke);
            ctx.stats.bridges += 1;
            store_result(ctx, dst, &TargetType::Dynamic)
        }
        TargetType::Delegate(sig) => {
            ctx.load(closure)?;
            push_args(ctx, args, &sig.params)?;
            ctx.emit(Instr::InvokeDelegate((*sig).clone()));
            store_result(ctx, dst, &sig.ret)
        }
        other => Err(ctx.unsupported(format!("call through {}", other))),
    }
}

pub fn compile_call_op(ctx: &mut CodegenContext<'_>, op: &Opcode) -> CompileResult<()> {
    let dst = op.p(0);
    match op.kind {
        OpKind::Call0 | OpKind::Call1 | OpKind::Call2 | OpKind::Call3 | OpKind::Call4 | OpKind::CallN => {
            let f = callee(ctx, op.p(1))?;
            push_args(ctx, op.call_args(), &f.signature.params)?;
            ctx.emit(Instr::Call(CallTarget::Method(f.method)));
            store_result(ctx, dst, &f.signature.ret)
        }

        OpKind::CallMethod => {
            let args = op.call_args();
            let (recv, rest) = args
                .split_first()
                .ok_or_else(|| ctx.unsupported("method call without a receiver"))?;
            compile_method_call(ctx, dst, *recv, op.p(1), rest)
        }

        OpKind::CallThis => compile_method_call(ctx, dst, 0, op.p(1), op.call_args()),

        OpKind::CallClosure => compile_closure_call(ctx, dst, op.p(1), op.call_args()),

        OpKind::StaticClosure => {
            let f = callee(ctx, op.p(1))?;
            ctx.emit(Instr::NewDelegate {
                method: f.method,
                bound: false,
            });
            store_result(ctx, dst, &TargetType::Delegate(Box::new(f.signature.clone())))
        }

        OpKind::InstanceClosure => {
            let f = callee(ctx, op.p(1))?;
            let (first, rest) = f
                .signature
                .params
                .split_first()
                .ok_or_else(|| ctx.unsupported("bound closure over a function without parameters"))?;
            ctx.load_as(op.p(2), first)?;
            ctx.emit(Instr::NewDelegate {
                method: f.method,
                bound: true,
            });
            let bound = Signature::new(rest.to_vec(), f.signature.ret.clone());
            store_result(ctx, dst, &TargetType::Delegate(Box::new(bound)))
        }

        OpKind::VirtualClosure => {
            let (field, sig) = receiver_slot(ctx, op.p(1), op.p(2))?;
            ctx.load(op.p(1))?;
            ctx.emit(Instr::LdFld(field));
            store_result(ctx, dst, &TargetType::Delegate(Box::new(sig)))
        }

        other => Err(ctx.unsupported(format!("{} is not a call opcode", other))),
    }
}
