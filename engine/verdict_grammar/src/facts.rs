//! Fact and attribute registration.
//!
//! Facts resolve by name against the context's fact map; attributes
//! are unary operators keyed by attribute name whose functor projects
//! a field out of a host object. Optional attributes flip the NaN
//! flag and yield the type's zero when the underlying datum is
//! absent.

use std::any::Any;
use std::marker::PhantomData;
use std::rc::Rc;

use verdict_expr::{
    unary_fn, Context, Element, ExprArena, ExprId, FactKind, FactValue, UnaryStyle, Value,
};
use verdict_ir::{FormulaError, FormulaResult, TypeId};

use crate::grammar::{FactInstantiator, Grammar, UnaryOpInstantiator};

/// Default resolver: read the fact straight from the context map.
/// Absence is structural (`MissingFact`).
pub struct DefaultFactInstantiator {
    pub out: TypeId,
}

impl FactInstantiator for DefaultFactInstantiator {
    fn instantiate(
        &self,
        arena: &mut ExprArena,
        _grammar: &Grammar,
        name: &Rc<str>,
    ) -> FormulaResult<ExprId> {
        Ok(arena.fact_expr(name.clone(), self.out, FactKind::Grammar, 1))
    }
}

/// Resolver for arrow-bound locals: absence is a recoverable missing
/// value, so a filter predicate over a gone binding excludes the
/// element instead of failing the evaluation.
pub struct LocalFactInstantiator {
    pub out: TypeId,
}

impl FactInstantiator for LocalFactInstantiator {
    fn instantiate(
        &self,
        arena: &mut ExprArena,
        _grammar: &Grammar,
        name: &Rc<str>,
    ) -> FormulaResult<ExprId> {
        Ok(arena.fact_expr(name.clone(), self.out, FactKind::Local, 2))
    }
}

/// Install the default resolver for a fact of element type `T`.
pub fn register_fact<T: Element>(grammar: &mut Grammar, name: &str) -> FormulaResult<()> {
    let out = grammar.element_type::<T>()?;
    grammar.register_fact_resolver(name, out, Rc::new(DefaultFactInstantiator { out }));
    Ok(())
}

/// Bind a host value to a fact name, by reference.
pub fn set_fact<'a, T: Element>(
    grammar: &Grammar,
    ctx: &mut Context<'a>,
    name: &str,
    value: &'a T,
) -> FormulaResult<()> {
    let type_id = grammar.element_type::<T>()?;
    let as_value = value.as_value(type_id);
    let fact = FactValue::from_value(&as_value).ok_or_else(|| {
        FormulaError::Internal(format!("fact {name} has no bindable representation"))
    })?;
    ctx.set_fact_value(name, fact)
}

struct AttributeInstantiator<T, R, F> {
    accessor: Rc<F>,
    _marker: PhantomData<fn(&T) -> &R>,
}

impl<T, R, F> UnaryOpInstantiator for AttributeInstantiator<T, R, F>
where
    T: Any,
    R: Element,
    F: for<'x> Fn(&'x T) -> &'x R + 'static,
{
    fn instantiate(
        &self,
        arena: &mut ExprArena,
        grammar: &Grammar,
        symbol: &Rc<str>,
        child: ExprId,
    ) -> FormulaResult<ExprId> {
        let out = grammar.element_type::<R>()?;
        let accessor = self.accessor.clone();
        let op = unary_fn(move |_cx, value: Value<'_>| {
            if let Some(object) = value.downcast_obj_borrowed::<T>() {
                return Ok((*accessor)(object).as_value(out));
            }
            if let Some(object) = value.downcast_obj::<T>() {
                // Object created during evaluation: project and detach.
                return (*accessor)(object).as_value(out).detach();
            }
            Err(FormulaError::Internal(format!(
                "attribute applied to a value of unexpected type {}",
                value.type_id().label()
            )))
        });
        Ok(arena.unary_expr(child, symbol.clone(), out, UnaryStyle::Attribute, 1, op))
    }
}

/// Register an attribute of a host object type: a unary operator on
/// `T` addressed by `name`, projecting a borrowed field.
pub fn register_attribute<T, R, F>(
    grammar: &mut Grammar,
    name: &str,
    accessor: F,
) -> FormulaResult<()>
where
    T: Any,
    R: Element,
    F: for<'x> Fn(&'x T) -> &'x R + 'static,
{
    let input = grammar.expect_type::<T>()?;
    let out = grammar.element_type::<R>()?;
    grammar.register_attribute_resolver(
        input,
        out,
        name,
        Rc::new(AttributeInstantiator::<T, R, F> {
            accessor: Rc::new(accessor),
            _marker: PhantomData,
        }),
    );
    Ok(())
}

struct OptionalAttributeInstantiator<T, R, F, H> {
    accessor: Rc<F>,
    has: Rc<H>,
    _marker: PhantomData<fn(&T) -> &R>,
}

impl<T, R, F, H> UnaryOpInstantiator for OptionalAttributeInstantiator<T, R, F, H>
where
    T: Any,
    R: Element,
    F: for<'x> Fn(&'x T) -> &'x R + 'static,
    H: Fn(&T) -> bool + 'static,
{
    fn instantiate(
        &self,
        arena: &mut ExprArena,
        grammar: &Grammar,
        symbol: &Rc<str>,
        child: ExprId,
    ) -> FormulaResult<ExprId> {
        let out = grammar.element_type::<R>()?;
        if Value::zero(out).is_none() {
            return Err(FormulaError::Internal(format!(
                "optional attribute {symbol} needs a primitive output type, got {}",
                grammar.type_name(out)
            )));
        }
        let accessor = self.accessor.clone();
        let has = self.has.clone();
        let op = unary_fn(move |cx, value: Value<'_>| {
            if let Some(object) = value.downcast_obj_borrowed::<T>() {
                if (*has)(object) {
                    return Ok((*accessor)(object).as_value(out));
                }
            } else if let Some(object) = value.downcast_obj::<T>() {
                if (*has)(object) {
                    return (*accessor)(object).as_value(out).detach();
                }
            } else {
                return Err(FormulaError::Internal(format!(
                    "attribute applied to a value of unexpected type {}",
                    value.type_id().label()
                )));
            }
            cx.ctx.set_nan();
            Value::zero(out).ok_or_else(|| {
                FormulaError::Internal("optional attribute lost its zero value".to_string())
            })
        });
        Ok(arena.unary_expr(child, symbol.clone(), out, UnaryStyle::Attribute, 1, op))
    }
}

/// Register an optional attribute: when `has` reports the datum
/// absent, evaluation flags NaN and yields the output type's zero.
pub fn register_optional_attribute<T, R, F, H>(
    grammar: &mut Grammar,
    name: &str,
    accessor: F,
    has: H,
) -> FormulaResult<()>
where
    T: Any,
    R: Element,
    F: for<'x> Fn(&'x T) -> &'x R + 'static,
    H: Fn(&T) -> bool + 'static,
{
    let input = grammar.expect_type::<T>()?;
    let out = grammar.element_type::<R>()?;
    if Value::zero(out).is_none() {
        return Err(FormulaError::Internal(format!(
            "optional attribute {name} needs a primitive output type, got {}",
            grammar.type_name(out)
        )));
    }
    grammar.register_attribute_resolver(
        input,
        out,
        name,
        Rc::new(OptionalAttributeInstantiator::<T, R, F, H> {
            accessor: Rc::new(accessor),
            has: Rc::new(has),
            _marker: PhantomData,
        }),
    );
    Ok(())
}
