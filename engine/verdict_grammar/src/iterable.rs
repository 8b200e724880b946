//! Collection semantics: `in`, `count`, `empty`, indexed access and
//! the `->` arrow filter.
//!
//! Registering a (element, container) pair installs the container
//! operators plus, once per element type, a `Filter<Elem>` type with
//! the same operators implemented lazily over the filtered view.
//! Because a filter-of-filter is the same engine type, the hierarchy
//! closes after that single extra registration and filters nest to
//! any depth.

use std::any::Any;
use std::marker::PhantomData;
use std::rc::Rc;

use tracing::debug;

use verdict_expr::{
    binary_fn, unary_fn, BinaryStyle, Element, ExprArena, ExprId, HostIterFn, UnaryStyle, Value,
};
use verdict_ir::{FormulaError, FormulaResult, TypeId};

use crate::facts::LocalFactInstantiator;
use crate::grammar::{
    ArrowOpInstantiator, BinaryOpInstantiator, FactInstantiator, Grammar, UnaryOpInstantiator,
};

/// Cost hint for `count`: random-access containers answer in O(1),
/// anything else is a linear walk.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SizeHint {
    Counted,
    Scanned,
}

impl SizeHint {
    fn cost(self) -> u32 {
        match self {
            SizeHint::Counted => 1,
            SizeHint::Scanned => 10,
        }
    }
}

fn iterate_host<'x, T, U>(elem: TypeId, any: &'x dyn Any, f: &mut dyn FnMut(Value<'x>) -> bool)
where
    T: Element,
    U: Any,
    for<'y> &'y U: IntoIterator<Item = &'y T>,
{
    let Some(container) = any.downcast_ref::<U>() else {
        return;
    };
    for item in container {
        if !f(item.as_value(elem)) {
            return;
        }
    }
}

fn host_iter<T, U>(elem: TypeId) -> HostIterFn
where
    T: Element,
    U: Any,
    for<'y> &'y U: IntoIterator<Item = &'y T>,
{
    Rc::new(move |any, f| iterate_host::<T, U>(elem, any, f))
}

fn container_of<'v, U: Any>(value: &'v Value<'_>) -> FormulaResult<&'v U> {
    value.downcast_obj::<U>().ok_or_else(|| {
        FormulaError::Internal("collection operator applied to an unexpected value".to_string())
    })
}

/// `count` and `empty` over a host container.
struct ContainerUnary<T, U> {
    count_cost: u32,
    _marker: PhantomData<fn(&U) -> &T>,
}

impl<T, U> UnaryOpInstantiator for ContainerUnary<T, U>
where
    T: Element,
    U: Any,
    for<'y> &'y U: IntoIterator<Item = &'y T>,
{
    fn instantiate(
        &self,
        arena: &mut ExprArena,
        grammar: &Grammar,
        symbol: &Rc<str>,
        child: ExprId,
    ) -> FormulaResult<ExprId> {
        let sym = symbol.clone();
        match &**symbol {
            "count" => Ok(arena.unary_expr(
                child,
                sym,
                TypeId::INT,
                UnaryStyle::Attribute,
                self.count_cost,
                unary_fn(|_cx, value| {
                    let container = container_of::<U>(&value)?;
                    Ok(Value::Int(container.into_iter().count() as i64))
                }),
            )),
            "empty" => Ok(arena.unary_expr(
                child,
                sym,
                TypeId::BOOL,
                UnaryStyle::Attribute,
                1,
                unary_fn(|_cx, value| {
                    let container = container_of::<U>(&value)?;
                    Ok(Value::Bool(container.into_iter().next().is_none()))
                }),
            )),
            _ => Err(FormulaError::OperatorNotFound {
                symbol: symbol.to_string(),
                left: grammar.type_name(arena.out_type(child)),
                right: "void".to_string(),
            }),
        }
    }
}

/// `element in container` by linear equality scan.
struct ContainerIn<T, U> {
    _marker: PhantomData<fn(&U) -> &T>,
}

impl<T, U> BinaryOpInstantiator for ContainerIn<T, U>
where
    T: Element,
    U: Any,
    for<'y> &'y U: IntoIterator<Item = &'y T>,
{
    fn instantiate(
        &self,
        arena: &mut ExprArena,
        _grammar: &Grammar,
        symbol: &Rc<str>,
        left: ExprId,
        right: ExprId,
    ) -> FormulaResult<ExprId> {
        Ok(arena.binary_expr(
            left,
            right,
            symbol.clone(),
            TypeId::BOOL,
            BinaryStyle::Spaced,
            1,
            binary_fn(|_cx, needle, haystack| {
                let container = container_of::<U>(&haystack)?;
                Ok(Value::Bool(
                    container.into_iter().any(|item| item.matches(&needle)),
                ))
            }),
        ))
    }
}

/// Arrow over a host container: produces the lazy filter value.
struct ContainerArrow<T, U> {
    elem: TypeId,
    filter: TypeId,
    local: Rc<LocalFactInstantiator>,
    _marker: PhantomData<fn(&U) -> &T>,
}

impl<T, U> ArrowOpInstantiator for ContainerArrow<T, U>
where
    T: Element,
    U: Any,
    for<'y> &'y U: IntoIterator<Item = &'y T>,
{
    fn local_fact(&self) -> Option<Rc<dyn FactInstantiator>> {
        Some(self.local.clone())
    }

    fn instantiate(
        &self,
        arena: &mut ExprArena,
        grammar: &Grammar,
        _symbol: &Rc<str>,
        left: ExprId,
        right: ExprId,
        binding: &Rc<str>,
    ) -> FormulaResult<ExprId> {
        if arena.out_type(right) != TypeId::BOOL {
            return Err(FormulaError::OperatorNotFound {
                symbol: "->".to_string(),
                left: grammar.type_name(arena.out_type(left)),
                right: grammar.type_name(arena.out_type(right)),
            });
        }
        Ok(arena.arrow_expr(
            left,
            right,
            binding.clone(),
            self.elem,
            self.filter,
            Some(host_iter::<T, U>(self.elem)),
        ))
    }
}

/// Structural equality between a yielded element and an evaluated
/// value, routed through the element impl for object types.
fn element_matches<T: Element>(element: &Value<'_>, needle: &Value<'_>) -> bool {
    if let Some(object) = element.downcast_obj::<T>() {
        return object.matches(needle);
    }
    match (element, needle) {
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Int(a), Value::Int(b)) => a == b,
        (Value::Double(a), Value::Double(b)) => a == b,
        (Value::Str(a), Value::Str(b)) => a.as_str() == b.as_str(),
        _ => false,
    }
}

fn filter_of<'v, 'a>(
    value: &'v Value<'a>,
) -> FormulaResult<&'v Rc<verdict_expr::FilterValue<'a>>> {
    match value {
        Value::Filter(filter) => Ok(filter),
        _ => Err(FormulaError::Internal(
            "filter operator applied to a non-filter value".to_string(),
        )),
    }
}

/// `count` and `empty` over a filter, driving it lazily.
struct FilterUnary<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T: Element> UnaryOpInstantiator for FilterUnary<T> {
    fn instantiate(
        &self,
        arena: &mut ExprArena,
        grammar: &Grammar,
        symbol: &Rc<str>,
        child: ExprId,
    ) -> FormulaResult<ExprId> {
        let sym = symbol.clone();
        match &**symbol {
            "count" => Ok(arena.unary_expr(
                child,
                sym,
                TypeId::INT,
                UnaryStyle::Attribute,
                10,
                unary_fn(|cx, value| {
                    let filter = filter_of(&value)?.clone();
                    let mut count: i64 = 0;
                    filter.for_each(cx, &mut |_cx, _element| {
                        count += 1;
                        Ok(true)
                    })?;
                    Ok(Value::Int(count))
                }),
            )),
            "empty" => Ok(arena.unary_expr(
                child,
                sym,
                TypeId::BOOL,
                UnaryStyle::Attribute,
                10,
                unary_fn(|cx, value| {
                    let filter = filter_of(&value)?.clone();
                    let mut found = false;
                    filter.for_each(cx, &mut |_cx, _element| {
                        found = true;
                        Ok(false)
                    })?;
                    Ok(Value::Bool(!found))
                }),
            )),
            _ => Err(FormulaError::OperatorNotFound {
                symbol: symbol.to_string(),
                left: grammar.type_name(arena.out_type(child)),
                right: "void".to_string(),
            }),
        }
    }
}

/// `element in filter`: linear scan of the passing elements.
struct FilterIn<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T: Element> BinaryOpInstantiator for FilterIn<T> {
    fn instantiate(
        &self,
        arena: &mut ExprArena,
        _grammar: &Grammar,
        symbol: &Rc<str>,
        left: ExprId,
        right: ExprId,
    ) -> FormulaResult<ExprId> {
        Ok(arena.binary_expr(
            left,
            right,
            symbol.clone(),
            TypeId::BOOL,
            BinaryStyle::Spaced,
            10,
            binary_fn(|cx, needle, haystack| {
                let filter = filter_of(&haystack)?.clone();
                let mut found = false;
                filter.for_each(cx, &mut |_cx, element| {
                    if element_matches::<T>(&element, &needle) {
                        found = true;
                        return Ok(false);
                    }
                    Ok(true)
                })?;
                Ok(Value::Bool(found))
            }),
        ))
    }
}

/// Arrow over a filter: the nested view recurses at iteration time.
struct FilterArrow<T> {
    elem: TypeId,
    filter: TypeId,
    local: Rc<LocalFactInstantiator>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Element> ArrowOpInstantiator for FilterArrow<T> {
    fn local_fact(&self) -> Option<Rc<dyn FactInstantiator>> {
        Some(self.local.clone())
    }

    fn instantiate(
        &self,
        arena: &mut ExprArena,
        grammar: &Grammar,
        _symbol: &Rc<str>,
        left: ExprId,
        right: ExprId,
        binding: &Rc<str>,
    ) -> FormulaResult<ExprId> {
        if arena.out_type(right) != TypeId::BOOL {
            return Err(FormulaError::OperatorNotFound {
                symbol: "->".to_string(),
                left: grammar.type_name(arena.out_type(left)),
                right: grammar.type_name(arena.out_type(right)),
            });
        }
        Ok(arena.arrow_expr(
            left,
            right,
            binding.clone(),
            self.elem,
            self.filter,
            None,
        ))
    }
}

/// Register the filter type for an element type, with its own lazy
/// operator set. Idempotent per grammar.
fn ensure_filter_type<T: Element>(grammar: &mut Grammar, elem: TypeId) -> TypeId {
    let name = format!("Filter<{}>", grammar.type_name(elem));
    if let Some(existing) = grammar.find_type_name(&name) {
        return existing;
    }
    let filter = grammar.register_type_name(&name);
    debug!(%name, id = filter.raw(), "registered filter type");

    let unary = Rc::new(FilterUnary::<T> {
        _marker: PhantomData,
    });
    grammar.register_unary_op(filter, TypeId::INT, "count", unary.clone());
    grammar.register_unary_op(filter, TypeId::BOOL, "empty", unary);
    grammar.register_binary_op(
        elem,
        filter,
        TypeId::BOOL,
        "in",
        Rc::new(FilterIn::<T> {
            _marker: PhantomData,
        }),
    );
    grammar.register_arrow_op(
        filter,
        TypeId::BOOL,
        filter,
        "->",
        Rc::new(FilterArrow::<T> {
            elem,
            filter,
            local: Rc::new(LocalFactInstantiator { out: elem }),
            _marker: PhantomData,
        }),
    );
    filter
}

/// Register iteration for a (element, container) pair: `in`, `empty`,
/// `count` and the `->` filter, plus the filter type's own operators.
pub fn register_iterable<T, U>(
    grammar: &mut Grammar,
    container_name: &str,
    hint: SizeHint,
) -> FormulaResult<()>
where
    T: Element,
    U: Any,
    for<'y> &'y U: IntoIterator<Item = &'y T>,
{
    let elem = grammar.element_type::<T>()?;
    let container = grammar.register_type::<U>(container_name);
    let filter = ensure_filter_type::<T>(grammar, elem);

    grammar.register_binary_op(
        elem,
        container,
        TypeId::BOOL,
        "in",
        Rc::new(ContainerIn::<T, U> {
            _marker: PhantomData,
        }),
    );
    let unary = Rc::new(ContainerUnary::<T, U> {
        count_cost: hint.cost(),
        _marker: PhantomData,
    });
    grammar.register_unary_op(container, TypeId::INT, "count", unary.clone());
    grammar.register_unary_op(container, TypeId::BOOL, "empty", unary);
    grammar.register_arrow_op(
        container,
        TypeId::BOOL,
        filter,
        "->",
        Rc::new(ContainerArrow::<T, U> {
            elem,
            filter,
            local: Rc::new(LocalFactInstantiator { out: elem }),
            _marker: PhantomData,
        }),
    );
    Ok(())
}

/// `container[int] -> element`, registered separately from iteration.
struct RandomAccess<T, U> {
    elem: TypeId,
    _marker: PhantomData<fn(&U) -> &T>,
}

impl<T, U> BinaryOpInstantiator for RandomAccess<T, U>
where
    T: Element,
    U: Any,
    for<'y> &'y U: IntoIterator<Item = &'y T>,
{
    fn instantiate(
        &self,
        arena: &mut ExprArena,
        _grammar: &Grammar,
        symbol: &Rc<str>,
        left: ExprId,
        right: ExprId,
    ) -> FormulaResult<ExprId> {
        let elem = self.elem;
        Ok(arena.binary_expr(
            left,
            right,
            symbol.clone(),
            elem,
            BinaryStyle::Index,
            1,
            binary_fn(move |_cx, container, index| {
                let at = verdict_expr::expect_int(&index)?;
                if at < 0 {
                    return Err(FormulaError::ValueMissing(format!("negative index {at}")));
                }
                let container = container.downcast_obj_borrowed::<U>().ok_or_else(|| {
                    FormulaError::Internal(
                        "indexing needs a container bound to host data".to_string(),
                    )
                })?;
                container
                    .into_iter()
                    .nth(at as usize)
                    .map(|item| item.as_value(elem))
                    .ok_or_else(|| {
                        FormulaError::ValueMissing(format!("index {at} out of range"))
                    })
            }),
        ))
    }
}

/// Register indexed access for a (element, container) pair.
pub fn register_random_access<T, U>(grammar: &mut Grammar, container_name: &str) -> FormulaResult<()>
where
    T: Element,
    U: Any,
    for<'y> &'y U: IntoIterator<Item = &'y T>,
{
    let elem = grammar.element_type::<T>()?;
    let container = grammar.register_type::<U>(container_name);
    grammar.register_binary_op(
        container,
        TypeId::INT,
        elem,
        "[]",
        Rc::new(RandomAccess::<T, U> {
            elem,
            _marker: PhantomData,
        }),
    );
    Ok(())
}
