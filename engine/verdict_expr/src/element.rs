//! Conversions between Rust types and engine values.
//!
//! [`Element`] is what makes a Rust type usable as a fact, an
//! attribute result or a container element. All integer widths and
//! `char` collapse onto the engine `int`; `f32` and `f64` collapse
//! onto `double`. Host object types get an impl from the
//! [`fact_object!`](crate::fact_object) macro.

use std::any::Any;

use verdict_ir::{FormulaResult, TypeId, TypeRegistry};

use crate::value::{ObjRef, ObjValue, StrRef, Value};

/// A Rust type the engine can bind, iterate and compare.
pub trait Element: Any + Sized {
    /// Engine type id for this Rust type.
    fn element_type(registry: &TypeRegistry) -> FormulaResult<TypeId>;

    /// View this element as a value. `type_id` is the id returned by
    /// [`element_type`](Self::element_type); object impls embed it.
    fn as_value<'a>(&'a self, type_id: TypeId) -> Value<'a>;

    /// Equality against an evaluated value, used by `in`.
    fn matches(&self, value: &Value<'_>) -> bool;
}

macro_rules! int_element {
    ($($ty:ty),+) => {$(
        impl Element for $ty {
            fn element_type(_registry: &TypeRegistry) -> FormulaResult<TypeId> {
                Ok(TypeId::INT)
            }

            fn as_value<'a>(&'a self, _type_id: TypeId) -> Value<'a> {
                Value::Int(*self as i64)
            }

            fn matches(&self, value: &Value<'_>) -> bool {
                value.as_int() == Some(*self as i64)
            }
        }
    )+};
}

int_element!(i8, u8, i16, u16, i32, u32, i64, u64, isize, usize);

impl Element for char {
    fn element_type(_registry: &TypeRegistry) -> FormulaResult<TypeId> {
        Ok(TypeId::INT)
    }

    fn as_value<'a>(&'a self, _type_id: TypeId) -> Value<'a> {
        Value::Int(i64::from(u32::from(*self)))
    }

    fn matches(&self, value: &Value<'_>) -> bool {
        value.as_int() == Some(i64::from(u32::from(*self)))
    }
}

macro_rules! float_element {
    ($($ty:ty),+) => {$(
        impl Element for $ty {
            fn element_type(_registry: &TypeRegistry) -> FormulaResult<TypeId> {
                Ok(TypeId::DOUBLE)
            }

            fn as_value<'a>(&'a self, _type_id: TypeId) -> Value<'a> {
                Value::Double(f64::from(*self))
            }

            fn matches(&self, value: &Value<'_>) -> bool {
                value.as_double() == Some(f64::from(*self))
            }
        }
    )+};
}

float_element!(f32, f64);

impl Element for bool {
    fn element_type(_registry: &TypeRegistry) -> FormulaResult<TypeId> {
        Ok(TypeId::BOOL)
    }

    fn as_value<'a>(&'a self, _type_id: TypeId) -> Value<'a> {
        Value::Bool(*self)
    }

    fn matches(&self, value: &Value<'_>) -> bool {
        value.as_bool() == Some(*self)
    }
}

impl Element for String {
    fn element_type(_registry: &TypeRegistry) -> FormulaResult<TypeId> {
        Ok(TypeId::STRING)
    }

    fn as_value<'a>(&'a self, _type_id: TypeId) -> Value<'a> {
        Value::Str(StrRef::Borrowed(self.as_str()))
    }

    fn matches(&self, value: &Value<'_>) -> bool {
        value.as_str() == Some(self.as_str())
    }
}

/// Containers bound as facts or returned by attributes are objects
/// like any other; equality is element-wise (containment of whole
/// containers inside containers-of-containers uses it).
impl<T: Any + PartialEq> Element for Vec<T> {
    fn element_type(registry: &TypeRegistry) -> FormulaResult<TypeId> {
        registry.expect_rust::<Vec<T>>()
    }

    fn as_value<'a>(&'a self, type_id: TypeId) -> Value<'a> {
        object_value(self, type_id)
    }

    fn matches(&self, value: &Value<'_>) -> bool {
        value.downcast_obj::<Vec<T>>().map_or(false, |other| other == self)
    }
}

/// View a host object as a value; used by the `fact_object!` macro.
pub fn object_value<'a, T: Any>(object: &'a T, type_id: TypeId) -> Value<'a> {
    Value::Obj(ObjValue {
        type_id,
        obj: ObjRef::Borrowed(object),
    })
}

/// Implement [`Element`] for a host object type.
///
/// The type must be registered with the grammar before use and must
/// implement `PartialEq` (containment uses a linear equality scan).
///
/// ```ignore
/// #[derive(PartialEq)]
/// struct Service { code: String }
/// verdict_expr::fact_object!(Service);
/// ```
#[macro_export]
macro_rules! fact_object {
    ($($ty:ty),+ $(,)?) => {$(
        impl $crate::Element for $ty {
            fn element_type(
                registry: &$crate::TypeRegistry,
            ) -> $crate::FormulaResult<$crate::TypeId> {
                registry.expect_rust::<$ty>()
            }

            fn as_value<'a>(&'a self, type_id: $crate::TypeId) -> $crate::Value<'a> {
                $crate::element::object_value(self, type_id)
            }

            fn matches(&self, value: &$crate::Value<'_>) -> bool {
                value.downcast_obj::<$ty>().map_or(false, |other| other == self)
            }
        }
    )+};
}
