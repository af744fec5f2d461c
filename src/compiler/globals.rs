//! Global slots and the constant table
//!
//! Each source global becomes one static slot whose storage class is fixed
//! here from the global's declared type kind. Initial values from the
//! constant table are lowered into a module initializer method.

use tracing::debug;

use crate::bytecode::{Constant, Module, Type};
use crate::target::{
    CallTarget, GlobalId, GlobalKind, GlobalSlot, Instr, MethodId, MethodKind, RuntimeMember,
    TargetType,
};

use super::error::{CompileError, CompileResult};
use super::registry::{Registry, Stage};
use super::type_map::map_type;

fn global_kind(ty: &Type) -> GlobalKind {
    match ty {
        Type::Obj(_) | Type::Struct(_) => GlobalKind::Object,
        Type::Enum(_) => GlobalKind::Enum,
        t if t.is_value() => GlobalKind::Value,
        _ => GlobalKind::Handle,
    }
}

/// Declare one static slot per source global
pub fn declare_globals(module: &Module, registry: &mut Registry) -> CompileResult<()> {
    for (index, r) in module.globals.iter().enumerate() {
        let source = module.get_type(*r).ok_or_else(|| CompileError::UnresolvedType {
            ty: r.0,
            reason: format!("type of global{}", index),
        })?;
        let slot = GlobalSlot {
            id: GlobalId(index),
            name: format!("global{}", index),
            kind: global_kind(source),
            ty: map_type(module, registry, *r)?,
        };
        registry.target.globals.push(slot);
    }
    debug!(target: "hlbridge::compile::types", globals = module.globals.len(), "Declared globals");
    Ok(())
}

fn invalid(global: usize, reason: impl Into<String>) -> CompileError {
    CompileError::InvalidConstant {
        global,
        reason: reason.into(),
    }
}

/// Push the pooled value of one constant field
fn constant_value(
    module: &Module,
    global: usize,
    field_ty: &Type,
    index: usize,
    body: &mut Vec<Instr>,
) -> CompileResult<()> {
    let missing = |pool: &str| invalid(global, format!("{} pool has no entry {}", pool, index));
    match field_ty {
        Type::U8 | Type::U16 | Type::I32 => {
            let v = module.ints.get(index).ok_or_else(|| missing("int"))?;
            body.push(Instr::LdcI4(*v));
        }
        Type::I64 => {
            let v = module.ints.get(index).ok_or_else(|| missing("int"))?;
            body.push(Instr::LdcI8(*v as i64));
        }
        Type::F32 | Type::F64 => {
            let v = module.floats.get(index).ok_or_else(|| missing("float"))?;
            body.push(Instr::LdcR8(*v));
        }
        Type::Bool => body.push(Instr::LdcI4((index != 0) as i32)),
        Type::Bytes => {
            let s = module.string(index).ok_or_else(|| missing("string"))?;
            body.push(Instr::LdStr(s.to_string()));
            body.push(Instr::Call(CallTarget::Runtime(RuntimeMember::BytesFromString)));
        }
        other => return Err(invalid(global, format!("field of type {} cannot be a constant", other))),
    }
    Ok(())
}

fn lower_constant(module: &Module, registry: &Registry, c: &Constant, body: &mut Vec<Instr>) -> CompileResult<()> {
    let r = module
        .globals
        .get(c.global)
        .ok_or_else(|| invalid(c.global, "no such global"))?;
    if module.get_type(*r).and_then(Type::as_obj).is_none() {
        return Err(invalid(c.global, "global is not an object"));
    }
    let obj = registry.require_obj(r.0, Stage::Compiled)?;
    if obj.flat_fields.len() != c.fields.len() {
        return Err(invalid(
            c.global,
            format!("{} values for {} fields", c.fields.len(), obj.flat_fields.len()),
        ));
    }
    let slot = registry
        .global(c.global)
        .ok_or_else(|| invalid(c.global, "global slot not declared"))?;

    body.push(Instr::NewObj(CallTarget::Method(obj.constructor)));
    for (field, &value) in obj.flat_fields.iter().zip(&c.fields) {
        let field_ty = module
            .get_type(field.source)
            .ok_or_else(|| invalid(c.global, format!("field {} has no type", field.name)))?;
        body.push(Instr::Dup);
        constant_value(module, c.global, field_ty, value, body)?;
        body.push(Instr::StFld(field.field));
    }
    body.push(Instr::StSFld(slot));
    Ok(())
}

/// Lower the constant table into a module initializer
///
/// Returns `None` when there is nothing to initialize.
pub fn lower_constants(module: &Module, registry: &mut Registry) -> CompileResult<Option<MethodId>> {
    if module.constants.is_empty() {
        return Ok(None);
    }
    let mut body = Vec::new();
    for c in &module.constants {
        lower_constant(module, registry, c, &mut body)?;
    }
    body.push(Instr::Ret);

    let id = registry.target.add_method("$init", MethodKind::ModuleInitializer);
    if let Some(m) = registry.target.method_mut(id) {
        m.signature.ret = TargetType::Void;
        m.body = body;
    }
    registry.target.initializer = Some(id);
    debug!(target: "hlbridge::compile::types", constants = module.constants.len(), "Lowered constant table");
    Ok(Some(id))
}
