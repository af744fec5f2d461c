//! Module compiler
//!
//! Drives a decoded [`Module`] through the type passes, global and constant
//! lowering, and the function passes, producing a [`TargetModule`].
//!
//! ```text
//! Resolve types → Define types → Compile types
//!     → globals + constants → Define functions → Compile functions
//! ```
//!
//! Everything produced during a run lives in the [`Registry`]; a failed run
//! returns the first error and discards the partial module.

pub mod error;
pub mod functions;
pub mod globals;
pub mod registry;
pub mod translate;
pub mod type_map;
pub mod types;

#[cfg(test)]
mod tests;

use tracing::info;

use crate::bytecode::Module;
use crate::config::CompilerConfig;
use crate::target::TargetModule;

pub use error::{CompileError, CompileResult};
pub use registry::{Registry, Stage};
pub use translate::TranslateStats;

/// Summary of one compilation run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompileStats {
    pub types: usize,
    pub methods: usize,
    pub instructions: usize,
    /// Boxing and dynamic-bridge conversions inserted
    pub bridges: usize,
    /// Untranslated opcodes downgraded to `nop` in best-effort mode
    pub gaps: usize,
}

/// Module compiler
#[derive(Debug, Clone, Default)]
pub struct Compiler {
    config: CompilerConfig,
}

impl Compiler {
    pub fn new(config: CompilerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Compile a module
    pub fn compile(&self, module: &Module) -> CompileResult<TargetModule> {
        self.compile_with_stats(module).map(|(target, _)| target)
    }

    /// Compile a module and report what the run produced
    pub fn compile_with_stats(&self, module: &Module) -> CompileResult<(TargetModule, CompileStats)> {
        let mut registry = Registry::new(
            self.config.assembly_name(),
            module.types.len(),
            module.function_table.len(),
        );

        types::compile_types(module, &mut registry)?;
        globals::declare_globals(module, &mut registry)?;
        globals::lower_constants(module, &mut registry)?;
        functions::define_all(module, &mut registry)?;
        let translated = functions::compile_all(module, &mut registry, &self.config)?;

        let target = registry.into_target();
        let stats = CompileStats {
            types: target.types.len(),
            methods: target.methods.len(),
            instructions: target.instruction_count(),
            bridges: translated.bridges,
            gaps: translated.gaps,
        };
        info!(
            target: "hlbridge::compile",
            module = %target.name,
            types = stats.types,
            methods = stats.methods,
            instructions = stats.instructions,
            bridges = stats.bridges,
            gaps = stats.gaps,
            "Compiled module"
        );
        Ok((target, stats))
    }
}
