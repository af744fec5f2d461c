//! Abstract (opaque handle) types

use crate::target::DeclKind;

use super::super::error::CompileResult;
use super::super::registry::{CompiledAbstract, CompiledType, Registry, Stage};

pub fn resolve(registry: &mut Registry, index: usize, name: &str) -> CompileResult<()> {
    let decl = registry.target.add_type(name, DeclKind::Abstract);
    if let Some(t) = registry.target.type_decl_mut(decl) {
        t.source_type = Some(index);
    }
    registry.register_type(
        index,
        CompiledType::Abstract(CompiledAbstract {
            stage: Stage::Resolved,
            source: index,
            name: name.to_string(),
            decl,
        }),
    )
}

/// Handles have no structure; the later stages only record progress
pub fn advance(registry: &mut Registry, index: usize, to: Stage) -> CompileResult<()> {
    registry.advance(index, to)
}
