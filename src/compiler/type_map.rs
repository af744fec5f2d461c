//! Source type → target type mapping
//!
//! Primitive kinds map to built-in target types; compound kinds map to the
//! declaration registered for them during Resolve. Wrapper kinds (`Ref`,
//! `Null`, `Packed`) are computed on demand from their inner type.

use crate::bytecode::{Module, Type, TypeRef};
use crate::target::{Signature, TargetType};

use super::error::{CompileError, CompileResult};
use super::registry::Registry;

/// Nesting limit for wrapper and function types
const MAX_DEPTH: usize = 64;

/// Map a source type to its target representation
pub fn map_type(module: &Module, registry: &Registry, r: TypeRef) -> CompileResult<TargetType> {
    map_at(module, registry, r, 0)
}

/// Map a function type to a target signature
pub fn fun_signature(module: &Module, registry: &Registry, r: TypeRef) -> CompileResult<Signature> {
    signature_at(module, registry, r, 0)
}

/// Signature of a method slot: the function type with its receiver dropped
pub fn slot_signature(module: &Module, registry: &Registry, r: TypeRef) -> CompileResult<Signature> {
    let mut sig = fun_signature(module, registry, r)?;
    if !sig.params.is_empty() {
        sig.params.remove(0);
    }
    Ok(sig)
}

fn unresolved(r: TypeRef, reason: &str) -> CompileError {
    CompileError::UnresolvedType {
        ty: r.0,
        reason: reason.to_string(),
    }
}

fn signature_at(module: &Module, registry: &Registry, r: TypeRef, depth: usize) -> CompileResult<Signature> {
    let fun = module
        .fun_type(r)
        .ok_or_else(|| unresolved(r, "not a function type"))?;
    let params = fun
        .args
        .iter()
        .map(|a| map_at(module, registry, *a, depth + 1))
        .collect::<CompileResult<Vec<_>>>()?;
    let ret = map_at(module, registry, fun.ret, depth + 1)?;
    Ok(Signature::new(params, ret))
}

fn declared(registry: &Registry, r: TypeRef) -> CompileResult<crate::target::TypeId> {
    registry
        .compiled_type(r.0)
        .map(|t| t.decl())
        .ok_or_else(|| unresolved(r, "type has no declaration"))
}

fn map_at(module: &Module, registry: &Registry, r: TypeRef, depth: usize) -> CompileResult<TargetType> {
    if depth > MAX_DEPTH {
        return Err(unresolved(r, "type nesting too deep"));
    }
    let ty = module
        .get_type(r)
        .ok_or_else(|| unresolved(r, "index outside the type table"))?;
    Ok(match ty {
        Type::Void => TargetType::Void,
        Type::U8 => TargetType::U8,
        Type::U16 => TargetType::U16,
        Type::I32 => TargetType::I32,
        Type::I64 => TargetType::I64,
        Type::F32 | Type::F64 => TargetType::F64,
        Type::Bool => TargetType::Bool,
        Type::Bytes => TargetType::Bytes,
        Type::Dyn | Type::DynObj => TargetType::Dynamic,
        Type::Array => TargetType::Array,
        Type::Type => TargetType::TypeValue,
        Type::Fun(_) | Type::Method(_) => {
            TargetType::Delegate(Box::new(signature_at(module, registry, r, depth + 1)?))
        }
        Type::Obj(_) | Type::Struct(_) => TargetType::Object(declared(registry, r)?),
        Type::Virtual(_) => TargetType::Virtual(declared(registry, r)?),
        Type::Enum(_) => TargetType::Enum(declared(registry, r)?),
        Type::Abstract(_) => TargetType::Abstract(declared(registry, r)?),
        Type::Ref(inner) => TargetType::Ref(Box::new(map_at(module, registry, *inner, depth + 1)?)),
        Type::Null(inner) => {
            TargetType::Nullable(Box::new(map_at(module, registry, *inner, depth + 1)?))
        }
        Type::Packed(inner) => map_at(module, registry, *inner, depth + 1)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::FunType;

    #[test]
    fn test_primitives_and_wrappers() {
        let mut m = Module::empty(4);
        m.types = vec![
            Type::F32,
            Type::Null(TypeRef(0)),
            Type::Ref(TypeRef(3)),
            Type::I32,
            Type::Fun(FunType { args: vec![TypeRef(0), TypeRef(3)], ret: TypeRef(5) }),
            Type::Dyn,
        ];
        let r = Registry::new("m", m.types.len(), 0);

        assert_eq!(map_type(&m, &r, TypeRef(0)).unwrap(), TargetType::F64);
        assert_eq!(
            map_type(&m, &r, TypeRef(1)).unwrap(),
            TargetType::Nullable(Box::new(TargetType::F64))
        );
        assert_eq!(
            map_type(&m, &r, TypeRef(2)).unwrap(),
            TargetType::Ref(Box::new(TargetType::I32))
        );
        let sig = slot_signature(&m, &r, TypeRef(4)).unwrap();
        assert_eq!(sig.params, vec![TargetType::I32]);
        assert_eq!(sig.ret, TargetType::Dynamic);
    }

    #[test]
    fn test_undeclared_object_is_unresolved() {
        let mut m = Module::empty(4);
        m.types = vec![Type::Abstract("hl_fd".into()), Type::Packed(TypeRef(1))];
        let r = Registry::new("m", m.types.len(), 0);
        assert!(matches!(
            map_type(&m, &r, TypeRef(0)),
            Err(CompileError::UnresolvedType { ty: 0, .. })
        ));
        // self-referencing wrapper never terminates on its own
        assert!(map_type(&m, &r, TypeRef(1)).is_err());
        assert!(map_type(&m, &r, TypeRef(9)).is_err());
    }
}
