//! Runtime values.
//!
//! Scalars travel by value; strings and host objects travel by
//! reference (borrowed from the host data bound into the context) or
//! by shared handle (values created during evaluation, e.g. by casts).
//! Collections are never copied.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use verdict_ir::{FormulaError, FormulaResult, TypeId};

use crate::filter::FilterValue;

/// A string value: borrowed from host data or shared.
#[derive(Clone)]
pub enum StrRef<'a> {
    Borrowed(&'a str),
    Shared(Rc<str>),
}

impl fmt::Debug for StrRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StrRef").field(&self.as_str()).finish()
    }
}

impl StrRef<'_> {
    #[inline]
    pub fn as_str(&self) -> &str {
        match self {
            StrRef::Borrowed(s) => s,
            StrRef::Shared(s) => s,
        }
    }

    /// Address of the string data, used as a memoization key.
    #[inline]
    pub fn addr(&self) -> usize {
        self.as_str().as_ptr() as usize
    }
}

/// A host object: engine type id plus a type-erased reference.
#[derive(Clone)]
pub struct ObjValue<'a> {
    pub type_id: TypeId,
    pub obj: ObjRef<'a>,
}

impl fmt::Debug for ObjValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjValue")
            .field("type_id", &self.type_id)
            .field("obj", &self.obj)
            .finish()
    }
}

/// Reference flavour of a host object.
#[derive(Clone)]
pub enum ObjRef<'a> {
    /// Borrowed from host data bound into the context.
    Borrowed(&'a dyn Any),
    /// Created during evaluation (host casts) and shared.
    Shared(Rc<dyn Any>),
}

impl fmt::Debug for ObjRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjRef::Borrowed(_) => f.write_str("ObjRef::Borrowed(..)"),
            ObjRef::Shared(_) => f.write_str("ObjRef::Shared(..)"),
        }
    }
}

impl<'a> ObjRef<'a> {
    #[inline]
    pub fn downcast<T: Any>(&self) -> Option<&T> {
        match self {
            ObjRef::Borrowed(r) => r.downcast_ref::<T>(),
            ObjRef::Shared(rc) => rc.downcast_ref::<T>(),
        }
    }

    /// Downcast keeping the full host lifetime. Only borrowed objects
    /// can escape the enclosing value.
    #[inline]
    pub fn downcast_borrowed<T: Any>(&self) -> Option<&'a T> {
        match self {
            ObjRef::Borrowed(r) => r.downcast_ref::<T>(),
            ObjRef::Shared(_) => None,
        }
    }

    /// Stable address of the object, used as a memoization key.
    #[inline]
    pub fn addr(&self) -> usize {
        match self {
            ObjRef::Borrowed(r) => (*r as *const dyn Any).cast::<()>() as usize,
            ObjRef::Shared(rc) => Rc::as_ptr(rc).cast::<()>() as usize,
        }
    }
}

/// A runtime value. The lifetime covers the host data bound into the
/// evaluating context.
#[derive(Clone)]
pub enum Value<'a> {
    Void,
    Bool(bool),
    Int(i64),
    Double(f64),
    Str(StrRef<'a>),
    Obj(ObjValue<'a>),
    Filter(Rc<FilterValue<'a>>),
}

impl fmt::Debug for Value<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Void => f.write_str("Void"),
            Value::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
            Value::Int(i) => f.debug_tuple("Int").field(i).finish(),
            Value::Double(d) => f.debug_tuple("Double").field(d).finish(),
            Value::Str(s) => f.debug_tuple("Str").field(s).finish(),
            Value::Obj(o) => f.debug_tuple("Obj").field(o).finish(),
            Value::Filter(fl) => f.debug_tuple("Filter").field(fl).finish(),
        }
    }
}

impl<'a> Value<'a> {
    /// Runtime type id of this value.
    pub fn type_id(&self) -> TypeId {
        match self {
            Value::Void => TypeId::VOID,
            Value::Bool(_) => TypeId::BOOL,
            Value::Int(_) => TypeId::INT,
            Value::Double(_) => TypeId::DOUBLE,
            Value::Str(_) => TypeId::STRING,
            Value::Obj(o) => o.type_id,
            Value::Filter(f) => f.type_id,
        }
    }

    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[inline]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    #[inline]
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    #[inline]
    pub fn downcast_obj<T: Any>(&self) -> Option<&T> {
        match self {
            Value::Obj(o) => o.obj.downcast::<T>(),
            _ => None,
        }
    }

    /// Downcast a borrowed host object keeping the host lifetime.
    #[inline]
    pub fn downcast_obj_borrowed<T: Any>(&self) -> Option<&'a T> {
        match self {
            Value::Obj(o) => o.obj.downcast_borrowed::<T>(),
            _ => None,
        }
    }

    /// The "zero" of a primitive type, returned when an optional
    /// attribute is absent (with the NaN flag raised beside it).
    pub fn zero(type_id: TypeId) -> Option<Value<'static>> {
        match type_id {
            TypeId::BOOL => Some(Value::Bool(false)),
            TypeId::INT => Some(Value::Int(0)),
            TypeId::DOUBLE => Some(Value::Double(0.0)),
            TypeId::STRING => Some(Value::Str(StrRef::Borrowed(""))),
            _ => None,
        }
    }

    /// Detach a value from borrowed host data. Scalars copy, strings
    /// copy into a shared handle, shared objects keep their handle;
    /// borrowed objects and filters cannot be detached.
    pub fn detach(self) -> FormulaResult<Value<'static>> {
        match self {
            Value::Void => Ok(Value::Void),
            Value::Bool(b) => Ok(Value::Bool(b)),
            Value::Int(i) => Ok(Value::Int(i)),
            Value::Double(d) => Ok(Value::Double(d)),
            Value::Str(s) => Ok(Value::Str(StrRef::Shared(match s {
                StrRef::Shared(rc) => rc,
                StrRef::Borrowed(b) => Rc::from(b),
            }))),
            Value::Obj(ObjValue {
                type_id,
                obj: ObjRef::Shared(rc),
            }) => Ok(Value::Obj(ObjValue {
                type_id,
                obj: ObjRef::Shared(rc),
            })),
            Value::Obj(_) | Value::Filter(_) => Err(FormulaError::Internal(
                "cannot detach a borrowed object from its context".to_string(),
            )),
        }
    }

    /// Memoization key for this value: bit pattern for scalars,
    /// address for strings and objects.
    pub fn memo_key(&self) -> Option<u64> {
        match self {
            Value::Void | Value::Filter(_) => None,
            Value::Bool(b) => Some(u64::from(*b)),
            Value::Int(i) => Some(*i as u64),
            Value::Double(d) => Some(d.to_bits()),
            Value::Str(s) => Some(s.addr() as u64),
            Value::Obj(o) => Some(o.obj.addr() as u64),
        }
    }
}

/// A value owned by a constant node: the only shapes the parser and
/// the constant folder ever need.
#[derive(Clone, Debug, PartialEq)]
pub enum OwnedValue {
    Bool(bool),
    Int(i64),
    Double(f64),
    Str(Rc<str>),
}

impl OwnedValue {
    pub fn type_id(&self) -> TypeId {
        match self {
            OwnedValue::Bool(_) => TypeId::BOOL,
            OwnedValue::Int(_) => TypeId::INT,
            OwnedValue::Double(_) => TypeId::DOUBLE,
            OwnedValue::Str(_) => TypeId::STRING,
        }
    }

    pub fn as_value(&self) -> Value<'static> {
        match self {
            OwnedValue::Bool(b) => Value::Bool(*b),
            OwnedValue::Int(i) => Value::Int(*i),
            OwnedValue::Double(d) => Value::Double(*d),
            OwnedValue::Str(s) => Value::Str(StrRef::Shared(s.clone())),
        }
    }

    /// Capture an evaluated value, if it has a constant-friendly shape.
    pub fn from_value(value: &Value<'_>) -> Option<OwnedValue> {
        match value {
            Value::Bool(b) => Some(OwnedValue::Bool(*b)),
            Value::Int(i) => Some(OwnedValue::Int(*i)),
            Value::Double(d) => Some(OwnedValue::Double(*d)),
            Value::Str(s) => Some(OwnedValue::Str(Rc::from(s.as_str()))),
            _ => None,
        }
    }

    /// Literal printed form: strings quoted, doubles always carrying a
    /// decimal point so the form re-lexes to the same type.
    pub fn literal(&self) -> String {
        match self {
            OwnedValue::Bool(true) => "true".to_string(),
            OwnedValue::Bool(false) => "false".to_string(),
            OwnedValue::Int(i) => i.to_string(),
            OwnedValue::Double(d) => format!("{d:?}"),
            OwnedValue::Str(s) => {
                let escaped = s.replace('\\', "\\\\").replace('\'', "\\'");
                format!("'{escaped}'")
            }
        }
    }
}

/// Extract a bool, failing with an internal error; the grammar's type
/// checks make a mismatch here an invariant violation.
#[inline]
pub fn expect_bool(value: &Value<'_>) -> FormulaResult<bool> {
    value
        .as_bool()
        .ok_or_else(|| FormulaError::Internal("boolean operand expected".to_string()))
}

#[inline]
pub fn expect_int(value: &Value<'_>) -> FormulaResult<i64> {
    value
        .as_int()
        .ok_or_else(|| FormulaError::Internal("int operand expected".to_string()))
}

#[inline]
pub fn expect_double(value: &Value<'_>) -> FormulaResult<f64> {
    value
        .as_double()
        .ok_or_else(|| FormulaError::Internal("double operand expected".to_string()))
}
