//! Compilation registry
//!
//! Maps every source declaration (type-table index, function index, global
//! index) to the target declaration built for it. The registry owns the
//! target module under construction and is the only state mutated across
//! the compiler passes.
//!
//! Each declaration records the last stage it completed. Passes advance a
//! declaration with [`Registry::advance`], which rejects anything out of
//! Resolve → Define → Compile order; the registry-wide pass gate
//! [`Registry::enter_pass`] does the same for whole passes.

use serde::Serialize;

use crate::bytecode::TypeRef;
use crate::target::{FieldRef, GlobalId, MethodId, MethodKind, Signature, TargetModule, TargetType, TypeId};

use super::error::{CompileError, CompileResult};

/// Completed compilation stage of a declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Stage {
    Resolved,
    Defined,
    Compiled,
}

impl Stage {
    /// Stage that must be complete before this one may run
    pub fn previous(self) -> Option<Stage> {
        match self {
            Stage::Resolved => None,
            Stage::Defined => Some(Stage::Resolved),
            Stage::Compiled => Some(Stage::Defined),
        }
    }
}

/// One entry of an object's flattened field list
#[derive(Debug, Clone, PartialEq)]
pub struct FlatField {
    pub name: String,
    pub field: FieldRef,
    pub ty: TargetType,
    pub source: TypeRef,
}

/// One entry of an object's flattened prototype list
#[derive(Debug, Clone, PartialEq)]
pub struct ProtoSlot {
    pub name: String,
    /// Function currently bound to the slot (after overrides)
    pub findex: usize,
    /// Delegate field holding the bound method
    pub field: FieldRef,
    /// Signature of the slot delegate (receiver excluded)
    pub signature: Signature,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledObj {
    pub stage: Stage,
    pub source: usize,
    pub name: String,
    pub decl: TypeId,
    pub constructor: MethodId,
    /// Source index of the super type
    pub base: Option<usize>,
    pub flat_fields: Vec<FlatField>,
    pub flat_protos: Vec<ProtoSlot>,
}

impl CompiledObj {
    pub fn field(&self, index: i32) -> Option<&FlatField> {
        usize::try_from(index).ok().and_then(|i| self.flat_fields.get(i))
    }

    pub fn field_by_name(&self, name: &str) -> Option<&FlatField> {
        self.flat_fields.iter().find(|f| f.name == name)
    }

    pub fn proto(&self, slot: i32) -> Option<&ProtoSlot> {
        usize::try_from(slot).ok().and_then(|i| self.flat_protos.get(i))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledConstruct {
    pub name: String,
    pub decl: TypeId,
    pub constructor: MethodId,
    pub fields: Vec<FlatField>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledEnum {
    pub stage: Stage,
    pub source: usize,
    pub name: String,
    pub decl: TypeId,
    /// Construct index field on the base declaration
    pub index_field: FieldRef,
    pub constructs: Vec<CompiledConstruct>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledVirtual {
    pub stage: Stage,
    pub source: usize,
    pub decl: TypeId,
    pub constructor: MethodId,
    pub fields: Vec<FlatField>,
}

impl CompiledVirtual {
    pub fn field(&self, index: i32) -> Option<&FlatField> {
        usize::try_from(index).ok().and_then(|i| self.fields.get(i))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledAbstract {
    pub stage: Stage,
    pub source: usize,
    pub name: String,
    pub decl: TypeId,
}

/// Target-side counterpart of a source type with a declaration
#[derive(Debug, Clone, PartialEq)]
pub enum CompiledType {
    Obj(CompiledObj),
    Enum(CompiledEnum),
    Virtual(CompiledVirtual),
    Abstract(CompiledAbstract),
}

impl CompiledType {
    pub fn stage(&self) -> Stage {
        match self {
            CompiledType::Obj(o) => o.stage,
            CompiledType::Enum(e) => e.stage,
            CompiledType::Virtual(v) => v.stage,
            CompiledType::Abstract(a) => a.stage,
        }
    }

    fn stage_mut(&mut self) -> &mut Stage {
        match self {
            CompiledType::Obj(o) => &mut o.stage,
            CompiledType::Enum(e) => &mut e.stage,
            CompiledType::Virtual(v) => &mut v.stage,
            CompiledType::Abstract(a) => &mut a.stage,
        }
    }

    /// Declaration values of this type are typed with
    pub fn decl(&self) -> TypeId {
        match self {
            CompiledType::Obj(o) => o.decl,
            CompiledType::Enum(e) => e.decl,
            CompiledType::Virtual(v) => v.decl,
            CompiledType::Abstract(a) => a.decl,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFunction {
    pub stage: Stage,
    pub findex: usize,
    pub method: MethodId,
    pub signature: Signature,
    pub native: bool,
}

/// Source-to-target lookup for one compilation run
#[derive(Debug)]
pub struct Registry {
    pass: Option<Stage>,
    types: Vec<Option<CompiledType>>,
    functions: Vec<Option<CompiledFunction>>,
    function_methods: Vec<MethodId>,
    pub target: TargetModule,
}

impl Registry {
    /// Create a registry and reserve one target method per function index
    ///
    /// Method identities exist before any function is defined so type
    /// constructors can bind prototype slots during the type passes.
    pub fn new(name: impl Into<String>, type_count: usize, function_count: usize) -> Self {
        let mut target = TargetModule::new(name);
        let function_methods = (0..function_count)
            .map(|f| target.add_method(format!("fun{}", f), MethodKind::Static))
            .collect();
        Self {
            pass: None,
            types: vec![None; type_count],
            functions: vec![None; function_count],
            function_methods,
            target,
        }
    }

    /// Start a registry-wide pass
    pub fn enter_pass(&mut self, stage: Stage) -> CompileResult<()> {
        if self.pass != stage.previous() {
            return Err(CompileError::StageOrder {
                decl: "module".to_string(),
                expected: stage,
                found: self.pass,
            });
        }
        self.pass = Some(stage);
        Ok(())
    }

    pub fn pass(&self) -> Option<Stage> {
        self.pass
    }

    /// Register a freshly resolved type
    pub fn register_type(&mut self, index: usize, compiled: CompiledType) -> CompileResult<()> {
        let slot = self.types.get_mut(index).ok_or_else(|| CompileError::UnresolvedType {
            ty: index,
            reason: "index outside the type table".to_string(),
        })?;
        if let Some(existing) = slot {
            return Err(CompileError::StageOrder {
                decl: format!("@{}", index),
                expected: Stage::Resolved,
                found: Some(existing.stage()),
            });
        }
        *slot = Some(compiled);
        Ok(())
    }

    /// Advance a declaration to `to`; it must have completed the stage before
    pub fn advance(&mut self, index: usize, to: Stage) -> CompileResult<()> {
        let expected = to.previous();
        let found = self.types.get(index).and_then(|t| t.as_ref()).map(CompiledType::stage);
        if found.is_none() || found != expected {
            return Err(CompileError::StageOrder {
                decl: format!("@{}", index),
                expected: to,
                found,
            });
        }
        if let Some(Some(t)) = self.types.get_mut(index) {
            *t.stage_mut() = to;
        }
        Ok(())
    }

    pub fn compiled_type(&self, index: usize) -> Option<&CompiledType> {
        self.types.get(index).and_then(|t| t.as_ref())
    }

    /// Declaration of a type that has at least completed `min`
    pub fn require_type(&self, index: usize, min: Stage) -> CompileResult<&CompiledType> {
        let t = self.compiled_type(index).ok_or_else(|| CompileError::StageOrder {
            decl: format!("@{}", index),
            expected: min,
            found: None,
        })?;
        if t.stage() < min {
            return Err(CompileError::StageOrder {
                decl: format!("@{}", index),
                expected: min,
                found: Some(t.stage()),
            });
        }
        Ok(t)
    }

    pub fn obj(&self, index: usize) -> Option<&CompiledObj> {
        match self.compiled_type(index)? {
            CompiledType::Obj(o) => Some(o),
            _ => None,
        }
    }

    pub fn obj_mut(&mut self, index: usize) -> Option<&mut CompiledObj> {
        match self.types.get_mut(index)?.as_mut()? {
            CompiledType::Obj(o) => Some(o),
            _ => None,
        }
    }

    /// Object declaration that has at least completed `min`
    pub fn require_obj(&self, index: usize, min: Stage) -> CompileResult<&CompiledObj> {
        match self.require_type(index, min)? {
            CompiledType::Obj(o) => Ok(o),
            _ => Err(CompileError::UnresolvedType {
                ty: index,
                reason: "not an object type".to_string(),
            }),
        }
    }

    pub fn enum_type(&self, index: usize) -> Option<&CompiledEnum> {
        match self.compiled_type(index)? {
            CompiledType::Enum(e) => Some(e),
            _ => None,
        }
    }

    pub fn enum_mut(&mut self, index: usize) -> Option<&mut CompiledEnum> {
        match self.types.get_mut(index)?.as_mut()? {
            CompiledType::Enum(e) => Some(e),
            _ => None,
        }
    }

    pub fn virtual_type(&self, index: usize) -> Option<&CompiledVirtual> {
        match self.compiled_type(index)? {
            CompiledType::Virtual(v) => Some(v),
            _ => None,
        }
    }

    pub fn virtual_mut(&mut self, index: usize) -> Option<&mut CompiledVirtual> {
        match self.types.get_mut(index)?.as_mut()? {
            CompiledType::Virtual(v) => Some(v),
            _ => None,
        }
    }

    /// Number of source types with a target declaration
    pub fn declared_type_count(&self) -> usize {
        self.types.iter().flatten().count()
    }

    /// Method reserved for a function index
    pub fn function_method(&self, findex: usize) -> Option<MethodId> {
        self.function_methods.get(findex).copied()
    }

    pub fn define_function(&mut self, compiled: CompiledFunction) -> CompileResult<()> {
        let findex = compiled.findex;
        let slot = self
            .functions
            .get_mut(findex)
            .ok_or(CompileError::InvalidFunctionIndex {
                function: findex,
                findex: findex as i32,
            })?;
        if let Some(existing) = slot {
            return Err(CompileError::StageOrder {
                decl: format!("fun{}", findex),
                expected: Stage::Defined,
                found: Some(existing.stage),
            });
        }
        *slot = Some(compiled);
        Ok(())
    }

    pub fn function(&self, findex: usize) -> Option<&CompiledFunction> {
        self.functions.get(findex).and_then(|f| f.as_ref())
    }

    pub fn mark_function_compiled(&mut self, findex: usize) -> CompileResult<()> {
        match self.functions.get_mut(findex).and_then(|f| f.as_mut()) {
            Some(f) if f.stage == Stage::Defined => {
                f.stage = Stage::Compiled;
                Ok(())
            }
            other => Err(CompileError::StageOrder {
                decl: format!("fun{}", findex),
                expected: Stage::Compiled,
                found: other.map(|f| f.stage),
            }),
        }
    }

    /// Global slot for a source global; slots are dense and share its index
    pub fn global(&self, index: usize) -> Option<GlobalId> {
        (index < self.target.globals.len()).then_some(GlobalId(index))
    }

    pub fn into_target(self) -> TargetModule {
        self.target
    }
}
