//! Type compiler
//!
//! Runs Resolve, Define and Compile as three full passes over the type
//! table. Every type gets an identity before any type's structure is filled
//! in, and every structure is filled in before any declaration is
//! materialized, so forward and cyclic references are always safe.
//!
//! Function types and the primitive kinds have no declaration; wrapper kinds
//! are mapped on demand by [`super::type_map`].

pub mod abstracts;
pub mod enums;
pub mod object;
pub mod virtuals;

use tracing::debug;

use crate::bytecode::{Module, Type};

use super::error::CompileResult;
use super::registry::{Registry, Stage};

/// Allocate an identity for every declared type
pub fn resolve_all(module: &Module, registry: &mut Registry) -> CompileResult<()> {
    registry.enter_pass(Stage::Resolved)?;
    for (index, ty) in module.types.iter().enumerate() {
        match ty {
            Type::Obj(o) | Type::Struct(o) => object::resolve(registry, index, o)?,
            Type::Enum(e) => enums::resolve(registry, index, e)?,
            Type::Virtual(_) => virtuals::resolve(registry, index)?,
            Type::Abstract(name) => abstracts::resolve(registry, index, name)?,
            _ => {}
        }
    }
    debug!(
        target: "hlbridge::compile::types",
        declared = registry.declared_type_count(),
        "Resolved types"
    );
    Ok(())
}

/// Fill in bases, fields and slots
pub fn define_all(module: &Module, registry: &mut Registry) -> CompileResult<()> {
    registry.enter_pass(Stage::Defined)?;
    for (index, ty) in module.types.iter().enumerate() {
        match ty {
            Type::Obj(o) | Type::Struct(o) => object::define(module, registry, index, o)?,
            Type::Enum(e) => enums::define(module, registry, index, e)?,
            Type::Virtual(v) => virtuals::define(module, registry, index, v)?,
            Type::Abstract(_) => abstracts::advance(registry, index, Stage::Defined)?,
            _ => {}
        }
    }
    debug!(target: "hlbridge::compile::types", "Defined types");
    Ok(())
}

/// Flatten layouts and synthesize constructors
pub fn compile_all(module: &Module, registry: &mut Registry) -> CompileResult<()> {
    registry.enter_pass(Stage::Compiled)?;
    for (index, ty) in module.types.iter().enumerate() {
        match ty {
            Type::Obj(o) | Type::Struct(o) => object::compile(module, registry, index, o)?,
            Type::Enum(_) => enums::compile(registry, index)?,
            Type::Virtual(_) => virtuals::compile(registry, index)?,
            Type::Abstract(_) => abstracts::advance(registry, index, Stage::Compiled)?,
            _ => {}
        }
    }
    debug!(target: "hlbridge::compile::types", "Compiled types");
    Ok(())
}

/// Run all three type passes
pub fn compile_types(module: &Module, registry: &mut Registry) -> CompileResult<()> {
    resolve_all(module, registry)?;
    define_all(module, registry)?;
    compile_all(module, registry)
}
