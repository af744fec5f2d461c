//! Virtual (structural record) types
//!
//! A virtual becomes a sealed class with one field per record entry and a
//! parameterless constructor. Values are produced by copying fields by name
//! (see the `ToVirtual` translation).

use crate::bytecode::{Module, VirtualType};
use crate::target::{DeclKind, FieldDecl, FieldRef, Instr, MethodKind};

use super::super::error::{CompileError, CompileResult};
use super::super::registry::{CompiledType, CompiledVirtual, FlatField, Registry, Stage};
use super::super::type_map::map_type;

pub fn resolve(registry: &mut Registry, index: usize) -> CompileResult<()> {
    let name = format!("virtual{}", index);
    let decl = registry.target.add_type(name.clone(), DeclKind::Virtual);
    let constructor = registry
        .target
        .add_method(format!("{}..ctor", name), MethodKind::Constructor);
    if let Some(t) = registry.target.type_decl_mut(decl) {
        t.source_type = Some(index);
        t.constructor = Some(constructor);
    }
    if let Some(m) = registry.target.method_mut(constructor) {
        m.owner = Some(decl);
    }
    registry.register_type(
        index,
        CompiledType::Virtual(CompiledVirtual {
            stage: Stage::Resolved,
            source: index,
            decl,
            constructor,
            fields: Vec::new(),
        }),
    )
}

pub fn define(module: &Module, registry: &mut Registry, index: usize, v: &VirtualType) -> CompileResult<()> {
    registry.advance(index, Stage::Defined)?;
    let decl = registry
        .virtual_type(index)
        .map(|c| c.decl)
        .ok_or_else(|| CompileError::UnresolvedType {
            ty: index,
            reason: "not a virtual type".to_string(),
        })?;

    let fields = v
        .fields
        .iter()
        .enumerate()
        .map(|(i, f)| {
            Ok(FlatField {
                name: f.name.clone(),
                field: FieldRef { owner: decl, index: i },
                ty: map_type(module, registry, f.ty)?,
                source: f.ty,
            })
        })
        .collect::<CompileResult<Vec<_>>>()?;

    if let Some(t) = registry.target.type_decl_mut(decl) {
        t.fields = fields
            .iter()
            .map(|f| FieldDecl {
                name: f.name.clone(),
                ty: f.ty.clone(),
            })
            .collect();
    }
    if let Some(c) = registry.virtual_mut(index) {
        c.fields = fields;
    }
    Ok(())
}

pub fn compile(registry: &mut Registry, index: usize) -> CompileResult<()> {
    registry.advance(index, Stage::Compiled)?;
    let constructor = registry
        .virtual_type(index)
        .map(|c| c.constructor)
        .ok_or_else(|| CompileError::MissingConstructor {
            decl: format!("virtual{}", index),
        })?;
    if let Some(m) = registry.target.method_mut(constructor) {
        m.body = vec![Instr::Ret];
    }
    Ok(())
}
