//! Runtime-support contract
//!
//! Compiled code calls into a small support library for everything the
//! source VM models as a built-in: boxed dynamics, byte strings, reference
//! boxes, nullable wrappers and the exception carrier. Only the member
//! signatures live here; the library itself is supplied by the host.
//!
//! | Member | Stack before | Stack after |
//! |---|---|---|
//! | `DynamicNew` | `object` | `Dynamic` |
//! | `DynamicGetField` | `Dynamic, string` | `Dynamic` |
//! | `DynamicSetField` | `Dynamic, string, Dynamic` | |
//! | `DynamicInvoke` | `Dynamic, object[]` | `Dynamic` |
//! | `DynamicValue` | `Dynamic` | `object` |
//! | `BytesGet(w)` | `Bytes, int32` | value of width `w` |
//! | `BytesSet(w)` | `Bytes, int32, value` | |

use serde::Serialize;

use super::types::{Signature, TargetType};

/// Element width of a byte-string access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MemWidth {
    U8,
    U16,
    I32,
    I64,
    F32,
    F64,
}

impl MemWidth {
    /// Type pushed by a read of this width
    pub fn stack_type(self) -> TargetType {
        match self {
            MemWidth::U8 => TargetType::U8,
            MemWidth::U16 => TargetType::U16,
            MemWidth::I32 => TargetType::I32,
            MemWidth::I64 => TargetType::I64,
            MemWidth::F32 => TargetType::F32,
            MemWidth::F64 => TargetType::F64,
        }
    }
}

/// A member of the runtime-support library
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum RuntimeMember {
    /// `Dynamic(object)` constructor
    DynamicNew,
    DynamicGetField,
    DynamicSetField,
    DynamicInvoke,
    /// Underlying value of a `Dynamic`
    DynamicValue,
    /// Byte string from a literal (UTF-8 plus terminator)
    BytesFromString,
    /// Byte string from a raw blob
    BytesFromRaw,
    BytesGet(MemWidth),
    BytesSet(MemWidth),
    /// `RefBox<T>(T)` constructor
    RefBoxNew(TargetType),
    RefBoxGet(TargetType),
    RefBoxSet(TargetType),
    /// `Nullable<T>(T)` constructor
    NullableNew(TargetType),
    NullableValue(TargetType),
    /// `HlException(Dynamic)` constructor
    ExceptionNew,
    /// Source-level value carried by a caught exception
    ExceptionValue,
    /// `NullCheckError()` constructor
    NullCheckErrorNew,
    /// Re-raise a source value, keeping the original trace
    Rethrow,
    Assert,
    ArraySize,
    /// Runtime type token of a dynamic value
    TypeOf,
    /// Kind tag of a runtime type token
    TypeKindOf,
}

impl RuntimeMember {
    /// Stack signature of the member; constructors return the new instance
    pub fn signature(&self) -> Signature {
        use TargetType as T;
        match self {
            RuntimeMember::DynamicNew => Signature::new(vec![T::Any], T::Dynamic),
            RuntimeMember::DynamicGetField => Signature::new(vec![T::Dynamic, T::Str], T::Dynamic),
            RuntimeMember::DynamicSetField => {
                Signature::new(vec![T::Dynamic, T::Str, T::Dynamic], T::Void)
            }
            RuntimeMember::DynamicInvoke => Signature::new(vec![T::Dynamic, T::Array], T::Dynamic),
            RuntimeMember::DynamicValue => Signature::new(vec![T::Dynamic], T::Any),
            RuntimeMember::BytesFromString => Signature::new(vec![T::Str], T::Bytes),
            RuntimeMember::BytesFromRaw => Signature::new(vec![T::Any], T::Bytes),
            RuntimeMember::BytesGet(w) => Signature::new(vec![T::Bytes, T::I32], w.stack_type()),
            RuntimeMember::BytesSet(w) => {
                Signature::new(vec![T::Bytes, T::I32, w.stack_type()], T::Void)
            }
            RuntimeMember::RefBoxNew(t) => {
                Signature::new(vec![t.clone()], T::Ref(Box::new(t.clone())))
            }
            RuntimeMember::RefBoxGet(t) => {
                Signature::new(vec![T::Ref(Box::new(t.clone()))], t.clone())
            }
            RuntimeMember::RefBoxSet(t) => {
                Signature::new(vec![T::Ref(Box::new(t.clone())), t.clone()], T::Void)
            }
            RuntimeMember::NullableNew(t) => {
                Signature::new(vec![t.clone()], T::Nullable(Box::new(t.clone())))
            }
            RuntimeMember::NullableValue(t) => {
                Signature::new(vec![T::Nullable(Box::new(t.clone()))], t.clone())
            }
            RuntimeMember::ExceptionNew => Signature::new(vec![T::Dynamic], T::Any),
            RuntimeMember::ExceptionValue => Signature::new(vec![T::Any], T::Dynamic),
            RuntimeMember::NullCheckErrorNew => Signature::new(vec![], T::Any),
            RuntimeMember::Rethrow => Signature::new(vec![T::Dynamic], T::Void),
            RuntimeMember::Assert => Signature::new(vec![], T::Void),
            RuntimeMember::ArraySize => Signature::new(vec![T::Array], T::I32),
            RuntimeMember::TypeOf => Signature::new(vec![T::Dynamic], T::TypeValue),
            RuntimeMember::TypeKindOf => Signature::new(vec![T::TypeValue], T::I32),
        }
    }

    /// Qualified member name used in listings
    pub fn name(&self) -> String {
        match self {
            RuntimeMember::DynamicNew => "Dynamic::.ctor".into(),
            RuntimeMember::DynamicGetField => "Dynamic::GetField".into(),
            RuntimeMember::DynamicSetField => "Dynamic::SetField".into(),
            RuntimeMember::DynamicInvoke => "Dynamic::Invoke".into(),
            RuntimeMember::DynamicValue => "Dynamic::get_Value".into(),
            RuntimeMember::BytesFromString => "Bytes::FromString".into(),
            RuntimeMember::BytesFromRaw => "Bytes::FromRaw".into(),
            RuntimeMember::BytesGet(w) => format!("Bytes::Get{:?}", w),
            RuntimeMember::BytesSet(w) => format!("Bytes::Set{:?}", w),
            RuntimeMember::RefBoxNew(t) => format!("RefBox<{}>::.ctor", t),
            RuntimeMember::RefBoxGet(t) => format!("RefBox<{}>::get_Value", t),
            RuntimeMember::RefBoxSet(t) => format!("RefBox<{}>::set_Value", t),
            RuntimeMember::NullableNew(t) => format!("Nullable<{}>::.ctor", t),
            RuntimeMember::NullableValue(t) => format!("Nullable<{}>::get_Value", t),
            RuntimeMember::ExceptionNew => "HlException::.ctor".into(),
            RuntimeMember::ExceptionValue => "HlException::get_Value".into(),
            RuntimeMember::NullCheckErrorNew => "NullCheckError::.ctor".into(),
            RuntimeMember::Rethrow => "Runtime::Rethrow".into(),
            RuntimeMember::Assert => "Runtime::Assert".into(),
            RuntimeMember::ArraySize => "Runtime::ArraySize".into(),
            RuntimeMember::TypeOf => "Runtime::TypeOf".into(),
            RuntimeMember::TypeKindOf => "Runtime::TypeKindOf".into(),
        }
    }

    /// Check if the member is a constructor (invoked with `newobj`)
    pub fn is_constructor(&self) -> bool {
        matches!(
            self,
            RuntimeMember::DynamicNew
                | RuntimeMember::RefBoxNew(_)
                | RuntimeMember::NullableNew(_)
                | RuntimeMember::ExceptionNew
                | RuntimeMember::NullCheckErrorNew
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generic_members_carry_inner_type() {
        let sig = RuntimeMember::RefBoxGet(TargetType::I32).signature();
        assert_eq!(sig.params, vec![TargetType::Ref(Box::new(TargetType::I32))]);
        assert_eq!(sig.ret, TargetType::I32);
        assert_eq!(RuntimeMember::NullableNew(TargetType::F64).name(), "Nullable<float64>::.ctor");
    }

    #[test]
    fn test_constructors() {
        assert!(RuntimeMember::DynamicNew.is_constructor());
        assert!(!RuntimeMember::DynamicValue.is_constructor());
        assert_eq!(
            RuntimeMember::BytesGet(MemWidth::U16).signature().ret,
            TargetType::U16
        );
    }
}
