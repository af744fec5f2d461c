//! Object and struct types
//!
//! An object becomes a class. Its prototype slots become delegate fields,
//! declared on the type that introduces the slot and bound to `this` in
//! each constructor; a derived constructor re-binds the slots it overrides.

use tracing::trace;

use crate::bytecode::{Module, ObjType, Proto};
use crate::target::{
    CallTarget, DeclKind, FieldDecl, FieldRef, Instr, MethodKind, Signature, TargetType,
};

use super::super::error::{CompileError, CompileResult};
use super::super::registry::{CompiledObj, CompiledType, FlatField, ProtoSlot, Registry, Stage};
use super::super::type_map::{map_type, slot_signature};

fn source_obj(module: &Module, index: usize) -> CompileResult<&ObjType> {
    module
        .types
        .get(index)
        .and_then(|t| t.as_obj())
        .ok_or_else(|| CompileError::UnresolvedType {
            ty: index,
            reason: "not an object type".to_string(),
        })
}

/// Source indices of the super chain, base-most first, ending with `index`
pub fn super_chain(module: &Module, index: usize) -> CompileResult<Vec<usize>> {
    let mut chain = vec![index];
    let mut current = source_obj(module, index)?;
    while let Some(parent) = current.super_type {
        if chain.len() > module.types.len() {
            return Err(CompileError::UnresolvedType {
                ty: index,
                reason: "cyclic super type chain".to_string(),
            });
        }
        chain.push(parent.0);
        current = source_obj(module, parent.0)?;
    }
    chain.reverse();
    Ok(chain)
}

/// Where one prototype of the chain lands in the flattened slot list
#[derive(Debug)]
pub struct PlannedProto<'m> {
    pub owner: usize,
    pub proto: &'m Proto,
    /// Flattened slot index
    pub slot: usize,
    /// Position among the owner's newly introduced slots, `None` on override
    pub new_slot: Option<usize>,
}

/// Lay out the prototypes of a super chain
///
/// A prototype with a negative parent-slot index is not virtual and takes no
/// slot. A virtual prototype lands at exactly its parent-slot index: walking
/// base-most first, an index below the current table length overrides that
/// slot and the next free index introduces a new one. A virtual prototype
/// that would leave an unfilled slot behind it is rejected.
pub fn plan_protos<'m>(module: &'m Module, chain: &[usize]) -> CompileResult<Vec<PlannedProto<'m>>> {
    let mut planned = Vec::new();
    let mut len = 0usize;
    for &owner in chain {
        let obj = source_obj(module, owner)?;
        let mut introduced = 0usize;
        for proto in &obj.protos {
            let Ok(slot) = usize::try_from(proto.pindex) else {
                continue;
            };
            if slot < len {
                planned.push(PlannedProto {
                    owner,
                    proto,
                    slot,
                    new_slot: None,
                });
                continue;
            }
            if slot > len {
                return Err(CompileError::UnresolvedType {
                    ty: owner,
                    reason: format!(
                        "prototype {} takes slot {} but slot {} is unfilled",
                        proto.name, slot, len
                    ),
                });
            }
            planned.push(PlannedProto {
                owner,
                proto,
                slot,
                new_slot: Some(introduced),
            });
            len = slot + 1;
            introduced += 1;
        }
    }
    Ok(planned)
}

fn proto_signature(module: &Module, registry: &Registry, proto: &Proto) -> CompileResult<Signature> {
    let ty = module
        .findex_type(proto.findex)
        .ok_or(CompileError::InvalidFunctionIndex {
            function: proto.findex,
            findex: proto.findex as i32,
        })?;
    slot_signature(module, registry, ty)
}

pub fn resolve(registry: &mut Registry, index: usize, obj: &ObjType) -> CompileResult<()> {
    let decl = registry.target.add_type(obj.name.clone(), DeclKind::Class);
    let constructor = registry
        .target
        .add_method(format!("{}..ctor", obj.name), MethodKind::Constructor);
    if let Some(t) = registry.target.type_decl_mut(decl) {
        t.source_type = Some(index);
        t.constructor = Some(constructor);
    }
    if let Some(m) = registry.target.method_mut(constructor) {
        m.owner = Some(decl);
    }
    registry.register_type(
        index,
        CompiledType::Obj(CompiledObj {
            stage: Stage::Resolved,
            source: index,
            name: obj.name.clone(),
            decl,
            constructor,
            base: None,
            flat_fields: Vec::new(),
            flat_protos: Vec::new(),
        }),
    )
}

pub fn define(module: &Module, registry: &mut Registry, index: usize, obj: &ObjType) -> CompileResult<()> {
    registry.advance(index, Stage::Defined)?;
    let decl = registry.require_obj(index, Stage::Defined)?.decl;

    let base = match obj.super_type {
        Some(parent) => Some((parent.0, registry.require_obj(parent.0, Stage::Resolved)?.decl)),
        None => None,
    };

    let mut fields = obj
        .fields
        .iter()
        .map(|f| {
            Ok(FieldDecl {
                name: f.name.clone(),
                ty: map_type(module, registry, f.ty)?,
            })
        })
        .collect::<CompileResult<Vec<_>>>()?;

    let chain = super_chain(module, index)?;
    for planned in plan_protos(module, &chain)? {
        if planned.owner == index && planned.new_slot.is_some() {
            let sig = proto_signature(module, registry, planned.proto)?;
            fields.push(FieldDecl {
                name: format!("${}", planned.proto.name),
                ty: TargetType::Delegate(Box::new(sig)),
            });
        }
    }

    if let Some(t) = registry.target.type_decl_mut(decl) {
        t.base = base.map(|(_, id)| id);
        t.fields = fields;
    }
    if let Some(o) = registry.obj_mut(index) {
        o.base = base.map(|(source, _)| source);
    }
    trace!(target: "hlbridge::compile::types", index, name = %obj.name, "Defined object");
    Ok(())
}

pub fn compile(module: &Module, registry: &mut Registry, index: usize, obj: &ObjType) -> CompileResult<()> {
    registry.advance(index, Stage::Compiled)?;
    let chain = super_chain(module, index)?;

    let mut flat_fields = Vec::new();
    let mut own_field_counts = Vec::with_capacity(chain.len());
    for &owner in &chain {
        let owner_obj = source_obj(module, owner)?;
        let owner_decl = registry.require_obj(owner, Stage::Defined)?.decl;
        let decl_fields = registry
            .target
            .type_decl(owner_decl)
            .map(|t| t.fields.as_slice())
            .unwrap_or(&[]);
        for (i, f) in owner_obj.fields.iter().enumerate() {
            let ty = decl_fields
                .get(i)
                .map(|d| d.ty.clone())
                .ok_or_else(|| CompileError::UnresolvedType {
                    ty: owner,
                    reason: format!("field {} missing from declaration", f.name),
                })?;
            flat_fields.push(FlatField {
                name: f.name.clone(),
                field: FieldRef { owner: owner_decl, index: i },
                ty,
                source: f.ty,
            });
        }
        own_field_counts.push((owner, owner_decl, owner_obj.fields.len()));
    }

    let planned = plan_protos(module, &chain)?;
    let mut flat_protos: Vec<ProtoSlot> = Vec::new();
    for p in &planned {
        match p.new_slot {
            Some(k) => {
                let (_, owner_decl, nfields) = own_field_counts
                    .iter()
                    .copied()
                    .find(|(o, _, _)| *o == p.owner)
                    .ok_or_else(|| CompileError::UnresolvedType {
                        ty: p.owner,
                        reason: "prototype owner outside the super chain".to_string(),
                    })?;
                flat_protos.push(ProtoSlot {
                    name: p.proto.name.clone(),
                    findex: p.proto.findex,
                    field: FieldRef { owner: owner_decl, index: nfields + k },
                    signature: proto_signature(module, registry, p.proto)?,
                });
            }
            None => {
                if let Some(slot) = flat_protos.get_mut(p.slot) {
                    slot.findex = p.proto.findex;
                }
            }
        }
    }

    // Constructor: chain to the base, then bind the slots this type fills
    let compiled = registry.require_obj(index, Stage::Compiled)?;
    let constructor = compiled.constructor;
    let mut body = vec![];
    if let Some(parent) = compiled.base {
        let base_ctor = registry.require_obj(parent, Stage::Defined)?.constructor;
        body.push(Instr::LdArg(0));
        body.push(Instr::Call(CallTarget::Method(base_ctor)));
    }
    for p in planned.iter().filter(|p| p.owner == index) {
        let method = registry
            .function_method(p.proto.findex)
            .ok_or(CompileError::InvalidFunctionIndex {
                function: p.proto.findex,
                findex: p.proto.findex as i32,
            })?;
        let field = flat_protos
            .get(p.slot)
            .map(|s| s.field)
            .ok_or_else(|| CompileError::MissingConstructor { decl: obj.name.clone() })?;
        body.push(Instr::LdArg(0));
        body.push(Instr::LdArg(0));
        body.push(Instr::NewDelegate { method, bound: true });
        body.push(Instr::StFld(field));
    }
    body.push(Instr::Ret);

    let ctor = registry
        .target
        .method_mut(constructor)
        .ok_or_else(|| CompileError::MissingConstructor { decl: obj.name.clone() })?;
    ctor.body = body;

    trace!(
        target: "hlbridge::compile::types",
        index,
        name = %obj.name,
        fields = flat_fields.len(),
        protos = flat_protos.len(),
        "Compiled object"
    );
    if let Some(o) = registry.obj_mut(index) {
        o.flat_fields = flat_fields;
        o.flat_protos = flat_protos;
    }
    Ok(())
}
