//! Enum types
//!
//! An enum becomes an abstract base class carrying the construct index, plus
//! one derived class per construct whose constructor takes the construct's
//! parameters positionally.

use tracing::trace;

use crate::bytecode::{EnumType, Module};
use crate::target::{DeclKind, FieldDecl, FieldRef, Instr, MethodKind, TargetType};

use super::super::error::{CompileError, CompileResult};
use super::super::registry::{CompiledConstruct, CompiledEnum, CompiledType, FlatField, Registry, Stage};
use super::super::type_map::map_type;

pub fn resolve(registry: &mut Registry, index: usize, e: &EnumType) -> CompileResult<()> {
    let decl = registry.target.add_type(e.name.clone(), DeclKind::Enum);
    if let Some(t) = registry.target.type_decl_mut(decl) {
        t.source_type = Some(index);
    }

    let mut constructs = Vec::with_capacity(e.constructs.len());
    for c in &e.constructs {
        let name = format!("{}.{}", e.name, c.name);
        let cdecl = registry.target.add_type(name.clone(), DeclKind::EnumConstruct);
        let ctor = registry.target.add_method(format!("{}..ctor", name), MethodKind::Constructor);
        if let Some(t) = registry.target.type_decl_mut(cdecl) {
            t.base = Some(decl);
            t.constructor = Some(ctor);
            t.source_type = Some(index);
        }
        if let Some(m) = registry.target.method_mut(ctor) {
            m.owner = Some(cdecl);
        }
        constructs.push(CompiledConstruct {
            name: c.name.clone(),
            decl: cdecl,
            constructor: ctor,
            fields: Vec::new(),
        });
    }

    registry.register_type(
        index,
        CompiledType::Enum(CompiledEnum {
            stage: Stage::Resolved,
            source: index,
            name: e.name.clone(),
            decl,
            index_field: FieldRef { owner: decl, index: 0 },
            constructs,
        }),
    )
}

pub fn define(module: &Module, registry: &mut Registry, index: usize, e: &EnumType) -> CompileResult<()> {
    registry.advance(index, Stage::Defined)?;
    let (decl, construct_decls): (_, Vec<_>) = {
        let compiled = registry.enum_type(index).ok_or_else(|| CompileError::UnresolvedType {
            ty: index,
            reason: "not an enum type".to_string(),
        })?;
        (
            compiled.decl,
            compiled.constructs.iter().map(|c| (c.decl, c.constructor)).collect(),
        )
    };

    if let Some(t) = registry.target.type_decl_mut(decl) {
        t.fields = vec![FieldDecl {
            name: "index".to_string(),
            ty: TargetType::I32,
        }];
    }

    let mut all_fields = Vec::with_capacity(e.constructs.len());
    for (c, (cdecl, ctor)) in e.constructs.iter().zip(construct_decls) {
        let mut fields = Vec::with_capacity(c.params.len());
        for (i, p) in c.params.iter().enumerate() {
            fields.push(FlatField {
                name: format!("p{}", i),
                field: FieldRef { owner: cdecl, index: i },
                ty: map_type(module, registry, *p)?,
                source: *p,
            });
        }
        if let Some(t) = registry.target.type_decl_mut(cdecl) {
            t.fields = fields
                .iter()
                .map(|f| FieldDecl {
                    name: f.name.clone(),
                    ty: f.ty.clone(),
                })
                .collect();
        }
        if let Some(m) = registry.target.method_mut(ctor) {
            m.signature.params = fields.iter().map(|f| f.ty.clone()).collect();
        }
        all_fields.push(fields);
    }

    if let Some(compiled) = registry.enum_mut(index) {
        for (c, fields) in compiled.constructs.iter_mut().zip(all_fields) {
            c.fields = fields;
        }
    }
    trace!(target: "hlbridge::compile::types", index, name = %e.name, "Defined enum");
    Ok(())
}

pub fn compile(registry: &mut Registry, index: usize) -> CompileResult<()> {
    registry.advance(index, Stage::Compiled)?;
    let compiled = registry
        .enum_type(index)
        .cloned()
        .ok_or_else(|| CompileError::UnresolvedType {
            ty: index,
            reason: "not an enum type".to_string(),
        })?;

    for (k, c) in compiled.constructs.iter().enumerate() {
        let mut body = vec![
            Instr::LdArg(0),
            Instr::LdcI4(k as i32),
            Instr::StFld(compiled.index_field),
        ];
        for (i, f) in c.fields.iter().enumerate() {
            body.push(Instr::LdArg(0));
            body.push(Instr::LdArg(i as u16 + 1));
            body.push(Instr::StFld(f.field));
        }
        body.push(Instr::Ret);
        let ctor = registry
            .target
            .method_mut(c.constructor)
            .ok_or_else(|| CompileError::MissingConstructor {
                decl: format!("{}.{}", compiled.name, c.name),
            })?;
        ctor.body = body;
    }
    trace!(
        target: "hlbridge::compile::types",
        index,
        name = %compiled.name,
        constructs = compiled.constructs.len(),
        "Compiled enum"
    );
    Ok(())
}
