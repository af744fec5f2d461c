//! Function compiler
//!
//! Define gives every function index its signature, name and locals; Compile
//! translates bodies once every signature is known, so calls can target any
//! function regardless of table order.

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::bytecode::{Function, Module, Native, Type};
use crate::config::CompilerConfig;
use crate::target::{NativeImport, TargetType};

use super::error::{CompileError, CompileResult};
use super::registry::{CompiledFunction, Registry, Stage};
use super::translate::{translate_function, TranslateStats};
use super::type_map::{fun_signature, map_type};

/// `Type.member` names for functions bound to an object's protos or fields
fn member_names(module: &Module, registry: &Registry) -> HashMap<usize, String> {
    let mut names = HashMap::new();
    for (index, ty) in module.types.iter().enumerate() {
        let Some(obj) = ty.as_obj() else { continue };
        for proto in &obj.protos {
            names
                .entry(proto.findex)
                .or_insert_with(|| format!("{}.{}", obj.name, proto.name));
        }
        let flat = registry.obj(index);
        for binding in &obj.bindings {
            let field = flat
                .and_then(|o| o.flat_fields.get(binding.field))
                .map(|f| f.name.clone())
                .unwrap_or_else(|| format!("field{}", binding.field));
            names
                .entry(binding.findex)
                .or_insert_with(|| format!("{}.{}", obj.name, field));
        }
    }
    names
}

fn require_types_compiled(registry: &Registry) -> CompileResult<()> {
    if registry.pass() != Some(Stage::Compiled) {
        return Err(CompileError::StageOrder {
            decl: "functions".to_string(),
            expected: Stage::Defined,
            found: registry.pass(),
        });
    }
    Ok(())
}

fn define_function(
    module: &Module,
    registry: &mut Registry,
    f: &Function,
    name: Option<&String>,
) -> CompileResult<()> {
    let method = registry
        .function_method(f.findex)
        .ok_or(CompileError::InvalidFunctionIndex {
            function: f.findex,
            findex: f.findex as i32,
        })?;
    let signature = fun_signature(module, registry, f.ty)?;
    let nargs = signature.params.len();
    if f.regs.len() < nargs {
        return Err(CompileError::InvalidRegister {
            function: f.findex,
            at: 0,
            reg: nargs as i32 - 1,
        });
    }
    let locals = f.regs[nargs..]
        .iter()
        .map(|r| match module.get_type(*r) {
            Some(Type::Void) => Ok(TargetType::Any),
            _ => map_type(module, registry, *r),
        })
        .collect::<CompileResult<Vec<_>>>()?;

    if let Some(m) = registry.target.method_mut(method) {
        if let Some(name) = name {
            m.name = name.clone();
        }
        m.signature = signature.clone();
        m.locals = locals;
        m.source_findex = Some(f.findex);
    }
    registry.define_function(CompiledFunction {
        stage: Stage::Defined,
        findex: f.findex,
        method,
        signature,
        native: false,
    })
}

fn define_native(module: &Module, registry: &mut Registry, n: &Native) -> CompileResult<()> {
    let method = registry
        .function_method(n.findex)
        .ok_or(CompileError::InvalidFunctionIndex {
            function: n.findex,
            findex: n.findex as i32,
        })?;
    let signature = fun_signature(module, registry, n.ty)?;
    if let Some(m) = registry.target.method_mut(method) {
        m.name = format!("{}.{}", n.lib, n.name);
        m.signature = signature.clone();
        m.native = Some(NativeImport {
            lib: n.lib.clone(),
            symbol: n.name.clone(),
        });
        m.source_findex = Some(n.findex);
    }
    registry.define_function(CompiledFunction {
        stage: Stage::Defined,
        findex: n.findex,
        method,
        signature,
        native: true,
    })
}

/// Give every function and native its signature, name and locals
pub fn define_all(module: &Module, registry: &mut Registry) -> CompileResult<()> {
    require_types_compiled(registry)?;
    let names = member_names(module, registry);
    for f in &module.functions {
        define_function(module, registry, f, names.get(&f.findex))?;
    }
    for n in &module.natives {
        define_native(module, registry, n)?;
    }
    debug!(
        target: "hlbridge::compile::functions",
        functions = module.functions.len(),
        natives = module.natives.len(),
        "Defined functions"
    );
    Ok(())
}

/// Translate every body and select the entrypoint
pub fn compile_all(
    module: &Module,
    registry: &mut Registry,
    config: &CompilerConfig,
) -> CompileResult<TranslateStats> {
    let mut stats = TranslateStats::default();
    for f in &module.functions {
        let compiled = registry
            .function(f.findex)
            .filter(|c| c.stage == Stage::Defined)
            .cloned()
            .ok_or_else(|| CompileError::StageOrder {
                decl: format!("fun{}", f.findex),
                expected: Stage::Compiled,
                found: registry.function(f.findex).map(|c| c.stage),
            })?;
        let (body, fstats) = translate_function(module, registry, config, f, &compiled.signature)?;
        if let Some(m) = registry.target.method_mut(compiled.method) {
            m.body = body.body;
            m.locals = body.locals;
        }
        registry.mark_function_compiled(f.findex)?;
        stats.merge(fstats);
        trace!(
            target: "hlbridge::compile::functions",
            findex = f.findex,
            ops = f.ops.len(),
            "Compiled function"
        );
    }
    for n in &module.natives {
        registry.mark_function_compiled(n.findex)?;
    }

    if module.resolve_findex(module.entrypoint).is_some() {
        registry.target.entrypoint = registry.function_method(module.entrypoint);
    } else {
        debug!(
            target: "hlbridge::compile::functions",
            entrypoint = module.entrypoint,
            "Entrypoint index names no function, module has no entrypoint"
        );
    }
    debug!(
        target: "hlbridge::compile::functions",
        instructions = stats.instructions,
        bridges = stats.bridges,
        gaps = stats.gaps,
        "Compiled function bodies"
    );
    Ok(stats)
}
