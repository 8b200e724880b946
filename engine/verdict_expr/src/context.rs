//! Per-evaluation context: named facts, the NaN flag, caches.
//!
//! A context binds host data by reference for the duration of the
//! evaluations run against it. Fact holders use an interior-mutable
//! slot so rebinding a name (the arrow filter does it once per
//! element) stays visible through handles cached earlier in the same
//! evaluation.

use std::any::Any;
use std::cell::Cell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use rustc_hash::FxHashMap;

use verdict_ir::{FormulaError, FormulaResult, TypeId};

use crate::value::{ObjRef, ObjValue, StrRef, Value};

/// Process-wide unique-id source; monotonic, never reused.
static NEXT_UNIQUE_ID: AtomicU64 = AtomicU64::new(1);

fn fresh_unique_id() -> u64 {
    NEXT_UNIQUE_ID.fetch_add(1, Ordering::Relaxed)
}

/// The value bound to a fact name. `Copy`, so it lives in a `Cell`.
#[derive(Copy, Clone)]
pub enum FactValue<'a> {
    Bool(bool),
    Int(i64),
    Double(f64),
    Str(&'a str),
    Obj(TypeId, &'a dyn Any),
}

impl<'a> FactValue<'a> {
    pub fn type_id(&self) -> TypeId {
        match self {
            FactValue::Bool(_) => TypeId::BOOL,
            FactValue::Int(_) => TypeId::INT,
            FactValue::Double(_) => TypeId::DOUBLE,
            FactValue::Str(_) => TypeId::STRING,
            FactValue::Obj(id, _) => *id,
        }
    }

    pub fn as_value(&self) -> Value<'a> {
        match self {
            FactValue::Bool(b) => Value::Bool(*b),
            FactValue::Int(i) => Value::Int(*i),
            FactValue::Double(d) => Value::Double(*d),
            FactValue::Str(s) => Value::Str(StrRef::Borrowed(s)),
            FactValue::Obj(id, any) => Value::Obj(ObjValue {
                type_id: *id,
                obj: ObjRef::Borrowed(*any),
            }),
        }
    }

    /// Capture an evaluated value as a binding. Only borrowed shapes
    /// qualify; values created during evaluation have no host-lifetime
    /// backing to bind.
    pub fn from_value(value: &Value<'a>) -> Option<FactValue<'a>> {
        match value {
            Value::Bool(b) => Some(FactValue::Bool(*b)),
            Value::Int(i) => Some(FactValue::Int(*i)),
            Value::Double(d) => Some(FactValue::Double(*d)),
            Value::Str(StrRef::Borrowed(s)) => Some(FactValue::Str(s)),
            Value::Obj(ObjValue {
                type_id,
                obj: ObjRef::Borrowed(any),
            }) => Some(FactValue::Obj(*type_id, *any)),
            _ => None,
        }
    }
}

/// Holder of one named fact. Fact-reference nodes cache the handle;
/// rebinding goes through the cell, so cached handles never go stale.
pub struct FactHolder<'a> {
    type_id: TypeId,
    slot: Cell<FactValue<'a>>,
}

impl<'a> FactHolder<'a> {
    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    #[inline]
    pub fn get(&self) -> FactValue<'a> {
        self.slot.get()
    }
}

/// Per-evaluation scratch area: fact map, unique id, NaN flag and the
/// caches the compiled tree's slotted nodes use.
pub struct Context<'a> {
    facts: FxHashMap<Rc<str>, Rc<FactHolder<'a>>>,
    unique_id: u64,
    nan: bool,
    /// Fact-resolution cache: (arena id, fact slot) -> holder.
    fact_slots: FxHashMap<(u64, u32), Rc<FactHolder<'a>>>,
    /// Memoized results: (arena id, memo slot, fact key) -> value + NaN outcome.
    memo: FxHashMap<(u64, u32, u64), (Value<'a>, bool)>,
}

impl Default for Context<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> Context<'a> {
    pub fn new() -> Self {
        Context {
            facts: FxHashMap::default(),
            unique_id: fresh_unique_id(),
            nan: false,
            fact_slots: FxHashMap::default(),
            memo: FxHashMap::default(),
        }
    }

    /// Identifier of this context generation; bumped by [`clean`](Self::clean).
    #[inline]
    pub fn unique_id(&self) -> u64 {
        self.unique_id
    }

    /// Whether the current evaluation met a missing/invalid value.
    #[inline]
    pub fn is_nan(&self) -> bool {
        self.nan
    }

    #[inline]
    pub fn set_nan(&mut self) {
        self.nan = true;
    }

    #[inline]
    pub fn clear_nan(&mut self) {
        self.nan = false;
    }

    /// Bind a value to a fact name. Rebinding keeps the original
    /// holder (handles cached by fact nodes stay valid); changing the
    /// type bound to a name is an error.
    pub fn set_fact_value(&mut self, name: &str, value: FactValue<'a>) -> FormulaResult<()> {
        if let Some(holder) = self.facts.get(name) {
            if holder.type_id != value.type_id() {
                return Err(FormulaError::TypeMismatch {
                    expr: format!("${name}"),
                    expected: holder.type_id.label(),
                    actual: value.type_id().label(),
                });
            }
            holder.slot.set(value);
            return Ok(());
        }
        self.facts.insert(
            Rc::from(name),
            Rc::new(FactHolder {
                type_id: value.type_id(),
                slot: Cell::new(value),
            }),
        );
        Ok(())
    }

    /// Look up a fact holder by name.
    pub fn fact(&self, name: &str) -> Option<Rc<FactHolder<'a>>> {
        self.facts.get(name).cloned()
    }

    /// Current value bound to a fact name.
    pub fn fact_value(&self, name: &str) -> Option<FactValue<'a>> {
        self.facts.get(name).map(|holder| holder.get())
    }

    /// Slot-cached holder lookup used by fact-reference nodes.
    pub fn fact_holder(
        &mut self,
        arena_id: u64,
        slot: u32,
        name: &str,
    ) -> Option<Rc<FactHolder<'a>>> {
        if let Some(holder) = self.fact_slots.get(&(arena_id, slot)) {
            return Some(holder.clone());
        }
        let holder = self.facts.get(name)?.clone();
        self.fact_slots.insert((arena_id, slot), holder.clone());
        Some(holder)
    }

    /// Memoized result lookup for a factorized node.
    pub fn memo_get(&self, arena_id: u64, slot: u32, key: u64) -> Option<(Value<'a>, bool)> {
        self.memo
            .get(&(arena_id, slot, key))
            .map(|(v, nan)| (v.clone(), *nan))
    }

    pub fn memo_put(&mut self, arena_id: u64, slot: u32, key: u64, value: Value<'a>, nan: bool) {
        self.memo.insert((arena_id, slot, key), (value, nan));
    }

    /// Drop all facts and caches, clear NaN and take a fresh unique id.
    pub fn clean(&mut self) {
        self.facts.clear();
        self.fact_slots.clear();
        self.memo.clear();
        self.nan = false;
        self.unique_id = fresh_unique_id();
    }
}
