//! Declarations of the target module
//!
//! Everything is addressed by dense ids into the owning [`TargetModule`]
//! vectors, so the model stays plain data and serializes as-is.

use std::fmt;

use serde::Serialize;

use super::instr::Instr;

/// Index into [`TargetModule::types`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TypeId(pub usize);

/// Index into [`TargetModule::methods`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct MethodId(pub usize);

/// Index into [`TargetModule::globals`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct GlobalId(pub usize);

/// A field declared directly on `owner` (position in its own field list)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct FieldRef {
    pub owner: TypeId,
    pub index: usize,
}

/// Delegate / method signature
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Signature {
    pub params: Vec<TargetType>,
    pub ret: TargetType,
}

impl Signature {
    pub fn new(params: Vec<TargetType>, ret: TargetType) -> Self {
        Self { params, ret }
    }
}

/// A value type as seen by the target
///
/// Registers typed as 32-bit floats are carried as `F64`; `F32` only
/// appears as a memory or array element width.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TargetType {
    Void,
    Bool,
    U8,
    U16,
    I32,
    I64,
    F32,
    F64,
    /// Runtime byte-string wrapper
    Bytes,
    /// Runtime boxed-dynamic wrapper
    Dynamic,
    /// `object[]`
    Array,
    /// Runtime type token
    TypeValue,
    /// Host string; only appears in runtime member signatures
    Str,
    /// Host root object
    Any,
    Object(TypeId),
    Virtual(TypeId),
    Enum(TypeId),
    /// Opaque handle; declared but never instantiated by compiled code
    Abstract(TypeId),
    Delegate(Box<Signature>),
    /// Runtime mutable-reference box over the inner type
    Ref(Box<TargetType>),
    /// Runtime nullable wrapper over the inner type
    Nullable(Box<TargetType>),
}

impl TargetType {
    /// Check if values live unboxed (must be boxed before widening to object)
    pub fn is_value_type(&self) -> bool {
        matches!(
            self,
            TargetType::Bool
                | TargetType::U8
                | TargetType::U16
                | TargetType::I32
                | TargetType::I64
                | TargetType::F32
                | TargetType::F64
        )
    }

    /// Integer types that share the 32-bit evaluation stack slot
    pub fn is_small_int(&self) -> bool {
        matches!(self, TargetType::Bool | TargetType::U8 | TargetType::U16 | TargetType::I32)
    }

    pub fn is_float(&self) -> bool {
        matches!(self, TargetType::F32 | TargetType::F64)
    }

    pub fn is_unsigned(&self) -> bool {
        matches!(self, TargetType::U8 | TargetType::U16)
    }

    pub fn is_reference(&self) -> bool {
        !self.is_value_type() && *self != TargetType::Void
    }

    pub fn as_delegate(&self) -> Option<&Signature> {
        match self {
            TargetType::Delegate(sig) => Some(sig),
            _ => None,
        }
    }

    /// Declaration backing a class-like type
    pub fn type_id(&self) -> Option<TypeId> {
        match self {
            TargetType::Object(id)
            | TargetType::Virtual(id)
            | TargetType::Enum(id)
            | TargetType::Abstract(id) => Some(*id),
            _ => None,
        }
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetType::Void => write!(f, "void"),
            TargetType::Bool => write!(f, "bool"),
            TargetType::U8 => write!(f, "uint8"),
            TargetType::U16 => write!(f, "uint16"),
            TargetType::I32 => write!(f, "int32"),
            TargetType::I64 => write!(f, "int64"),
            TargetType::F32 => write!(f, "float32"),
            TargetType::F64 => write!(f, "float64"),
            TargetType::Bytes => write!(f, "Bytes"),
            TargetType::Dynamic => write!(f, "Dynamic"),
            TargetType::Array => write!(f, "object[]"),
            TargetType::TypeValue => write!(f, "Type"),
            TargetType::Str => write!(f, "string"),
            TargetType::Any => write!(f, "object"),
            TargetType::Object(id) | TargetType::Virtual(id) | TargetType::Enum(id) => {
                write!(f, "class#{}", id.0)
            }
            TargetType::Abstract(id) => write!(f, "handle#{}", id.0),
            TargetType::Delegate(sig) => {
                write!(f, "delegate(")?;
                for (i, p) in sig.params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", p)?;
                }
                write!(f, ") -> {}", sig.ret)
            }
            TargetType::Ref(inner) => write!(f, "RefBox<{}>", inner),
            TargetType::Nullable(inner) => write!(f, "Nullable<{}>", inner),
        }
    }
}

/// Flavor of a type declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeclKind {
    Class,
    /// Base class of a tagged union
    Enum,
    /// One construct of a tagged union; derives from the enum base
    EnumConstruct,
    Virtual,
    Abstract,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDecl {
    pub name: String,
    pub ty: TargetType,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeDecl {
    pub id: TypeId,
    pub name: String,
    pub kind: DeclKind,
    pub base: Option<TypeId>,
    /// Fields declared on this type only; inherited ones live on the bases
    pub fields: Vec<FieldDecl>,
    pub constructor: Option<MethodId>,
    /// Source type-table index this declaration was produced from
    pub source_type: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MethodKind {
    Static,
    /// Instance constructor; argument 0 is the instance
    Constructor,
    /// Runs once before the entrypoint
    ModuleInitializer,
}

/// External binding of a bodiless method
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NativeImport {
    pub lib: String,
    pub symbol: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MethodDecl {
    pub id: MethodId,
    pub name: String,
    pub owner: Option<TypeId>,
    pub kind: MethodKind,
    pub signature: Signature,
    pub locals: Vec<TargetType>,
    pub body: Vec<Instr>,
    pub native: Option<NativeImport>,
    pub source_findex: Option<usize>,
}

impl MethodDecl {
    pub fn new(id: MethodId, name: impl Into<String>, kind: MethodKind) -> Self {
        Self {
            id,
            name: name.into(),
            owner: None,
            kind,
            signature: Signature::new(Vec::new(), TargetType::Void),
            locals: Vec::new(),
            body: Vec::new(),
            native: None,
            source_findex: None,
        }
    }

    /// Instance methods take the receiver as an implicit argument 0
    pub fn arg_offset(&self) -> u16 {
        match self.kind {
            MethodKind::Constructor => 1,
            _ => 0,
        }
    }
}

/// Storage class of a global slot, fixed by the global's declared type kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GlobalKind {
    Object,
    Enum,
    /// Address of an opaque or dynamic value
    Handle,
    Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GlobalSlot {
    pub id: GlobalId,
    pub name: String,
    pub kind: GlobalKind,
    pub ty: TargetType,
}

/// A complete translated module
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetModule {
    pub name: String,
    pub types: Vec<TypeDecl>,
    pub methods: Vec<MethodDecl>,
    pub globals: Vec<GlobalSlot>,
    pub entrypoint: Option<MethodId>,
    pub initializer: Option<MethodId>,
}

impl TargetModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            types: Vec::new(),
            methods: Vec::new(),
            globals: Vec::new(),
            entrypoint: None,
            initializer: None,
        }
    }

    pub fn add_type(&mut self, name: impl Into<String>, kind: DeclKind) -> TypeId {
        let id = TypeId(self.types.len());
        self.types.push(TypeDecl {
            id,
            name: name.into(),
            kind,
            base: None,
            fields: Vec::new(),
            constructor: None,
            source_type: None,
        });
        id
    }

    pub fn add_method(&mut self, name: impl Into<String>, kind: MethodKind) -> MethodId {
        let id = MethodId(self.methods.len());
        self.methods.push(MethodDecl::new(id, name, kind));
        id
    }

    pub fn type_decl(&self, id: TypeId) -> Option<&TypeDecl> {
        self.types.get(id.0)
    }

    pub fn type_decl_mut(&mut self, id: TypeId) -> Option<&mut TypeDecl> {
        self.types.get_mut(id.0)
    }

    pub fn method(&self, id: MethodId) -> Option<&MethodDecl> {
        self.methods.get(id.0)
    }

    pub fn method_mut(&mut self, id: MethodId) -> Option<&mut MethodDecl> {
        self.methods.get_mut(id.0)
    }

    pub fn field(&self, r: FieldRef) -> Option<&FieldDecl> {
        self.type_decl(r.owner).and_then(|t| t.fields.get(r.index))
    }

    pub fn method_by_name(&self, name: &str) -> Option<&MethodDecl> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn type_by_name(&self, name: &str) -> Option<&TypeDecl> {
        self.types.iter().find(|t| t.name == name)
    }

    /// Total instruction count across all method bodies
    pub fn instruction_count(&self) -> usize {
        self.methods.iter().map(|m| m.body.len()).sum()
    }
}
