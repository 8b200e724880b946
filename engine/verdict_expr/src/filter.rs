//! Lazy filtered views produced by the arrow operator.
//!
//! A filter never materialises a collection: iterating it walks the
//! base sequence (a host container, or another filter) and runs the
//! predicate per element with the binding fact set to that element.
//! Elements whose predicate is false, raises a missing value, or
//! flags NaN are skipped without poisoning their neighbours.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use verdict_ir::{FormulaError, FormulaResult, TypeId};

use crate::arena::ExprId;
use crate::context::FactValue;
use crate::eval::EvalCx;
use crate::value::{expect_bool, Value};

/// Iteration over a type-erased host container, captured at operator
/// registration time where the container type is statically known.
/// The callback returns `false` to stop.
pub type HostIterFn = Rc<dyn for<'x> Fn(&'x dyn Any, &mut dyn FnMut(Value<'x>) -> bool)>;

/// What a filter iterates over.
pub enum BaseSeq<'a> {
    /// A borrowed host container with its captured iteration closure.
    Host { any: &'a dyn Any, iter: HostIterFn },
    /// Another filter; recursion handles filter-of-filter of any depth.
    Nested(Rc<FilterValue<'a>>),
}

impl fmt::Debug for BaseSeq<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BaseSeq::Host { .. } => f.write_str("BaseSeq::Host(..)"),
            BaseSeq::Nested(inner) => f.debug_tuple("BaseSeq::Nested").field(inner).finish(),
        }
    }
}

/// A lazy filtered view over a container.
pub struct FilterValue<'a> {
    /// Engine type id of the filter itself.
    pub type_id: TypeId,
    pub elem_type: TypeId,
    pub base: BaseSeq<'a>,
    /// Predicate subtree, evaluated per element.
    pub predicate: ExprId,
    /// Fact name the element is bound to while the predicate runs.
    pub binding: Rc<str>,
}

impl fmt::Debug for FilterValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterValue")
            .field("type_id", &self.type_id)
            .field("elem_type", &self.elem_type)
            .field("base", &self.base)
            .field("predicate", &self.predicate)
            .field("binding", &self.binding)
            .finish()
    }
}

impl<'a> FilterValue<'a> {
    /// Drive the filter: `f` is called once per passing element and
    /// returns `false` to stop early. Structural errors from the
    /// predicate or from `f` propagate.
    pub fn for_each(
        &self,
        cx: &mut EvalCx<'a, '_>,
        f: &mut dyn FnMut(&mut EvalCx<'a, '_>, Value<'a>) -> FormulaResult<bool>,
    ) -> FormulaResult<()> {
        match &self.base {
            BaseSeq::Host { any, iter } => {
                let mut outcome: FormulaResult<()> = Ok(());
                (**iter)(*any, &mut |element| {
                    match self.test(cx, &element) {
                        Ok(false) => true,
                        Ok(true) => match f(cx, element) {
                            Ok(keep_going) => keep_going,
                            Err(err) => {
                                outcome = Err(err);
                                false
                            }
                        },
                        Err(err) => {
                            outcome = Err(err);
                            false
                        }
                    }
                });
                outcome
            }
            BaseSeq::Nested(inner) => inner.for_each(cx, &mut |cx, element| {
                if self.test(cx, &element)? {
                    f(cx, element)
                } else {
                    Ok(true)
                }
            }),
        }
    }

    /// Run the predicate for one element under the saved/restored NaN
    /// regime: a NaN outcome or a missing value excludes the element;
    /// if NaN is already set nothing passes.
    fn test(&self, cx: &mut EvalCx<'a, '_>, element: &Value<'a>) -> FormulaResult<bool> {
        if cx.ctx.is_nan() {
            return Ok(false);
        }
        let binding = FactValue::from_value(element).ok_or_else(|| {
            FormulaError::Internal("cannot bind a temporary value as a filter element".to_string())
        })?;
        cx.ctx.set_fact_value(&self.binding, binding)?;
        match cx.eval(self.predicate) {
            Ok(verdict) => {
                if cx.ctx.is_nan() {
                    cx.ctx.clear_nan();
                    return Ok(false);
                }
                expect_bool(&verdict)
            }
            Err(err) if err.is_recoverable() => {
                if cx.ctx.is_nan() {
                    cx.ctx.clear_nan();
                }
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }
}
