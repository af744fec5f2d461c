//! Type catalog of a decoded module
//!
//! Types refer to each other by position in the module's type table through
//! [`TypeRef`], so a type may mention itself or a type declared later.

use std::fmt;

/// Lazy handle to an entry of the type table
///
/// A `TypeRef` never owns the type; resolving it re-reads the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeRef(pub usize);

impl TypeRef {
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }

    /// Look the type up in a table
    #[inline]
    pub fn resolve(self, types: &[Type]) -> Option<&Type> {
        types.get(self.0)
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// Tag byte of a type record
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Void = 0,
    U8 = 1,
    U16 = 2,
    I32 = 3,
    I64 = 4,
    F32 = 5,
    F64 = 6,
    Bool = 7,
    Bytes = 8,
    Dyn = 9,
    Fun = 10,
    Obj = 11,
    Array = 12,
    Type = 13,
    Ref = 14,
    Virtual = 15,
    DynObj = 16,
    Abstract = 17,
    Enum = 18,
    Null = 19,
    Method = 20,
    Struct = 21,
    Packed = 22,
}

impl TypeKind {
    pub fn from_byte(byte: u8) -> Option<Self> {
        use TypeKind::*;
        Some(match byte {
            0 => Void,
            1 => U8,
            2 => U16,
            3 => I32,
            4 => I64,
            5 => F32,
            6 => F64,
            7 => Bool,
            8 => Bytes,
            9 => Dyn,
            10 => Fun,
            11 => Obj,
            12 => Array,
            13 => Type,
            14 => Ref,
            15 => Virtual,
            16 => DynObj,
            17 => Abstract,
            18 => Enum,
            19 => Null,
            20 => Method,
            21 => Struct,
            22 => Packed,
            _ => return None,
        })
    }
}

/// Signature of a function type
#[derive(Debug, Clone, PartialEq)]
pub struct FunType {
    pub args: Vec<TypeRef>,
    pub ret: TypeRef,
}

/// A named, typed field
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub ty: TypeRef,
}

/// A prototype (method) slot of an object type
#[derive(Debug, Clone, PartialEq)]
pub struct Proto {
    pub name: String,
    /// Function bound to the slot
    pub findex: usize,
    /// Virtual slot this proto fills; negative when the method is not virtual
    pub pindex: i32,
}

/// Static method bound to a field of an object type
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Binding {
    pub field: usize,
    pub findex: usize,
}

/// Object (class) or struct type
#[derive(Debug, Clone, PartialEq)]
pub struct ObjType {
    pub name: String,
    pub super_type: Option<TypeRef>,
    /// Global holding the class value, if any
    pub global: Option<usize>,
    pub fields: Vec<Field>,
    pub protos: Vec<Proto>,
    pub bindings: Vec<Binding>,
}

/// One construct of an enum type
#[derive(Debug, Clone, PartialEq)]
pub struct EnumConstruct {
    pub name: String,
    pub params: Vec<TypeRef>,
}

/// Tagged-union type
#[derive(Debug, Clone, PartialEq)]
pub struct EnumType {
    pub name: String,
    pub global: Option<usize>,
    pub constructs: Vec<EnumConstruct>,
}

/// Structural record type
#[derive(Debug, Clone, PartialEq)]
pub struct VirtualType {
    pub fields: Vec<Field>,
}

/// A decoded type
#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Void,
    U8,
    U16,
    I32,
    I64,
    F32,
    F64,
    Bool,
    Bytes,
    Dyn,
    Fun(FunType),
    Obj(ObjType),
    Array,
    Type,
    Ref(TypeRef),
    Virtual(VirtualType),
    DynObj,
    Abstract(String),
    Enum(EnumType),
    Null(TypeRef),
    Method(FunType),
    Struct(ObjType),
    Packed(TypeRef),
}

impl Type {
    pub fn kind(&self) -> TypeKind {
        match self {
            Type::Void => TypeKind::Void,
            Type::U8 => TypeKind::U8,
            Type::U16 => TypeKind::U16,
            Type::I32 => TypeKind::I32,
            Type::I64 => TypeKind::I64,
            Type::F32 => TypeKind::F32,
            Type::F64 => TypeKind::F64,
            Type::Bool => TypeKind::Bool,
            Type::Bytes => TypeKind::Bytes,
            Type::Dyn => TypeKind::Dyn,
            Type::Fun(_) => TypeKind::Fun,
            Type::Obj(_) => TypeKind::Obj,
            Type::Array => TypeKind::Array,
            Type::Type => TypeKind::Type,
            Type::Ref(_) => TypeKind::Ref,
            Type::Virtual(_) => TypeKind::Virtual,
            Type::DynObj => TypeKind::DynObj,
            Type::Abstract(_) => TypeKind::Abstract,
            Type::Enum(_) => TypeKind::Enum,
            Type::Null(_) => TypeKind::Null,
            Type::Method(_) => TypeKind::Method,
            Type::Struct(_) => TypeKind::Struct,
            Type::Packed(_) => TypeKind::Packed,
        }
    }

    /// Function signature for `Fun` and `Method` types
    pub fn as_fun(&self) -> Option<&FunType> {
        match self {
            Type::Fun(f) | Type::Method(f) => Some(f),
            _ => None,
        }
    }

    /// Object payload for `Obj` and `Struct` types
    pub fn as_obj(&self) -> Option<&ObjType> {
        match self {
            Type::Obj(o) | Type::Struct(o) => Some(o),
            _ => None,
        }
    }

    /// Check if values of this type live unboxed
    pub fn is_value(&self) -> bool {
        matches!(
            self,
            Type::U8 | Type::U16 | Type::I32 | Type::I64 | Type::F32 | Type::F64 | Type::Bool
        )
    }

    /// Check if the type carries no payload and never yields a declaration
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            Type::Void
                | Type::U8
                | Type::U16
                | Type::I32
                | Type::I64
                | Type::F32
                | Type::F64
                | Type::Bool
                | Type::Bytes
                | Type::Dyn
                | Type::Array
                | Type::Type
                | Type::DynObj
        )
    }

    /// Declared name for named compound types
    pub fn name(&self) -> Option<&str> {
        match self {
            Type::Obj(o) | Type::Struct(o) => Some(&o.name),
            Type::Enum(e) => Some(&e.name),
            Type::Abstract(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::U8 => write!(f, "u8"),
            Type::U16 => write!(f, "u16"),
            Type::I32 => write!(f, "i32"),
            Type::I64 => write!(f, "i64"),
            Type::F32 => write!(f, "f32"),
            Type::F64 => write!(f, "f64"),
            Type::Bool => write!(f, "bool"),
            Type::Bytes => write!(f, "bytes"),
            Type::Dyn => write!(f, "dynamic"),
            Type::Fun(fun) | Type::Method(fun) => {
                write!(f, "(")?;
                for (i, a) in fun.args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", a)?;
                }
                write!(f, ") -> {}", fun.ret)
            }
            Type::Obj(o) => write!(f, "obj {}", o.name),
            Type::Struct(o) => write!(f, "struct {}", o.name),
            Type::Array => write!(f, "array"),
            Type::Type => write!(f, "type"),
            Type::Ref(t) => write!(f, "ref<{}>", t),
            Type::Virtual(v) => write!(f, "virtual<{} fields>", v.fields.len()),
            Type::DynObj => write!(f, "dynobj"),
            Type::Abstract(name) => write!(f, "abstract {}", name),
            Type::Enum(e) => write!(f, "enum {}", e.name),
            Type::Null(t) => write!(f, "null<{}>", t),
            Type::Packed(t) => write!(f, "packed<{}>", t),
        }
    }
}
