//! Verdict Factor - the factorizing optimizer.
//!
//! Attached to the parser as an [`Observer`], the factorizer sees
//! every freshly built node and may substitute an optimized one:
//!
//! 1. **Common-subexpression elimination**: nodes are canonicalised
//!    by printed form; a form seen before resolves to the node (or
//!    replacement) recorded for it. Printed forms are deterministic
//!    and pure, so equal form means equal meaning.
//! 2. **Constant folding**: a node depending on no fact is evaluated
//!    once in a throw-away context and replaced by a constant that
//!    keeps the original printed form.
//! 3. **Single-fact memoization**: a node depending on exactly one
//!    fact whose accumulated complexity exceeds a small threshold is
//!    wrapped in a memoizing node keyed on the fact value's address
//!    or bit pattern.
//!
//! The factorizer's maps hold ids into the compiled arena; reset or
//! drop it together with that arena.

use std::collections::BTreeSet;
use std::rc::Rc;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use verdict_expr::{display, evaluate, Context, ExprArena, ExprId, OwnedValue};
use verdict_grammar::GrammarObserver;
use verdict_ir::{FormulaError, FormulaResult, TypeId};
use verdict_parse::Observer;

/// Complexity above which a single-fact node earns a memo wrapper.
const MEMO_THRESHOLD: u64 = 5;

struct KnownInfo {
    total_complexity: u64,
    facts: BTreeSet<Rc<str>>,
    display: String,
    /// Never dangling, but may change as optimizations apply.
    optimized: ExprId,
}

/// The optimizer. One instance serves any number of formulas compiled
/// into one arena, sharing subtrees across them.
pub struct Factorizer {
    infos: Vec<KnownInfo>,
    by_node: FxHashMap<ExprId, usize>,
    by_display: FxHashMap<String, usize>,
    /// First resolver node seen per fact name; memo wrappers key on
    /// the value this resolver produces.
    fact_nodes: FxHashMap<Rc<str>, ExprId>,
    /// Types the attached grammar told us about; folding and
    /// memoization only touch nodes of known types.
    known_types: FxHashSet<TypeId>,
}

impl Default for Factorizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Factorizer {
    /// A factorizer that knows the four primitive value types; attach
    /// it to a grammar with `add_observer` to teach it host types.
    pub fn new() -> Self {
        let mut known_types = FxHashSet::default();
        known_types.insert(TypeId::STRING);
        known_types.insert(TypeId::INT);
        known_types.insert(TypeId::DOUBLE);
        known_types.insert(TypeId::BOOL);
        Factorizer {
            infos: Vec::new(),
            by_node: FxHashMap::default(),
            by_display: FxHashMap::default(),
            fact_nodes: FxHashMap::default(),
            known_types,
        }
    }

    /// Forget every recorded node. Required when the arena the nodes
    /// live in is cleaned or dropped.
    pub fn reset(&mut self) {
        self.infos.clear();
        self.by_node.clear();
        self.by_display.clear();
        self.fact_nodes.clear();
    }

    fn hit(&self, printed: &str) -> Option<ExprId> {
        self.by_display
            .get(printed)
            .map(|&idx| self.infos[idx].optimized)
    }

    fn record(&mut self, arena: &ExprArena, id: ExprId, printed: String) -> usize {
        let idx = self.infos.len();
        self.infos.push(KnownInfo {
            total_complexity: u64::from(arena.cost(id)),
            facts: BTreeSet::new(),
            display: printed.clone(),
            optimized: id,
        });
        self.by_node.insert(id, idx);
        self.by_display.insert(printed, idx);
        idx
    }

    fn add_dependency(&mut self, idx: usize, dep: ExprId) -> FormulaResult<()> {
        let dep_idx = *self.by_node.get(&dep).ok_or_else(|| {
            FormulaError::Internal(format!("factorizer lost track of {dep:?}"))
        })?;
        let (facts, complexity) = {
            let dep_info = &self.infos[dep_idx];
            (dep_info.facts.clone(), dep_info.total_complexity)
        };
        let info = &mut self.infos[idx];
        info.facts.extend(facts);
        info.total_complexity += complexity;
        Ok(())
    }

    fn optimize(&mut self, arena: &mut ExprArena, idx: usize) -> ExprId {
        let node = self.infos[idx].optimized;
        let node_type = arena.out_type(node);
        if !self.known_types.contains(&node_type) {
            return node;
        }
        if self.infos[idx].facts.is_empty() {
            if let Some(value) = fold_constant(arena, node) {
                let printed = arena.intern(&self.infos[idx].display);
                let constant = arena.const_with_display(value, printed);
                debug!(form = %self.infos[idx].display, "folded constant expression");
                self.infos[idx].optimized = constant;
                self.by_node.insert(constant, idx);
                return constant;
            }
            return node;
        }
        if self.infos[idx].total_complexity > MEMO_THRESHOLD && self.infos[idx].facts.len() == 1 {
            let fact_name = match self.infos[idx].facts.iter().next() {
                Some(name) => name.clone(),
                None => return node,
            };
            if let Some(&fact_node) = self.fact_nodes.get(&fact_name) {
                let cost = arena.cost(fact_node) + 2;
                let memo = arena.memo_expr(node, fact_node, node_type, cost);
                debug!(
                    form = %self.infos[idx].display,
                    fact = %fact_name,
                    "memoized single-fact expression"
                );
                self.infos[idx].optimized = memo;
                self.infos[idx].total_complexity = u64::from(cost);
                self.by_node.insert(memo, idx);
                return memo;
            }
        }
        node
    }
}

/// Evaluate a fact-free node once; any error or NaN outcome vetoes
/// the fold.
fn fold_constant(arena: &ExprArena, node: ExprId) -> Option<OwnedValue> {
    let mut ctx = Context::new();
    let value = evaluate(arena, node, &mut ctx).ok()?;
    if ctx.is_nan() {
        return None;
    }
    OwnedValue::from_value(&value)
}

impl Observer for Factorizer {
    fn new_constant(&mut self, arena: &mut ExprArena, result: ExprId) -> FormulaResult<ExprId> {
        let printed = display(arena, result);
        if let Some(known) = self.hit(&printed) {
            return Ok(known);
        }
        self.record(arena, result, printed);
        Ok(result)
    }

    fn new_fact(
        &mut self,
        arena: &mut ExprArena,
        result: ExprId,
        name: &Rc<str>,
    ) -> FormulaResult<ExprId> {
        let printed = display(arena, result);
        if let Some(known) = self.hit(&printed) {
            return Ok(known);
        }
        let idx = self.record(arena, result, printed);
        self.infos[idx].facts.insert(name.clone());
        self.fact_nodes.entry(name.clone()).or_insert(result);
        Ok(result)
    }

    fn new_unary(
        &mut self,
        arena: &mut ExprArena,
        result: ExprId,
        child: ExprId,
        _symbol: &Rc<str>,
    ) -> FormulaResult<ExprId> {
        let printed = display(arena, result);
        if let Some(known) = self.hit(&printed) {
            return Ok(known);
        }
        let idx = self.record(arena, result, printed);
        self.add_dependency(idx, child)?;
        Ok(self.optimize(arena, idx))
    }

    fn new_binary(
        &mut self,
        arena: &mut ExprArena,
        result: ExprId,
        left: ExprId,
        right: ExprId,
        _symbol: &Rc<str>,
    ) -> FormulaResult<ExprId> {
        let printed = display(arena, result);
        if let Some(known) = self.hit(&printed) {
            return Ok(known);
        }
        let idx = self.record(arena, result, printed);
        self.add_dependency(idx, left)?;
        self.add_dependency(idx, right)?;
        Ok(self.optimize(arena, idx))
    }

    fn new_choice(
        &mut self,
        arena: &mut ExprArena,
        result: ExprId,
        cond: ExprId,
        left: ExprId,
        right: ExprId,
    ) -> FormulaResult<ExprId> {
        let printed = display(arena, result);
        if let Some(known) = self.hit(&printed) {
            return Ok(known);
        }
        let idx = self.record(arena, result, printed);
        self.add_dependency(idx, cond)?;
        self.add_dependency(idx, left)?;
        self.add_dependency(idx, right)?;
        Ok(self.optimize(arena, idx))
    }

    fn new_arrow(
        &mut self,
        arena: &mut ExprArena,
        result: ExprId,
        container: ExprId,
        predicate: ExprId,
        binding: &Rc<str>,
    ) -> FormulaResult<ExprId> {
        let printed = display(arena, result);
        if let Some(known) = self.hit(&printed) {
            return Ok(known);
        }
        let idx = self.record(arena, result, printed);
        self.add_dependency(idx, container)?;
        self.add_dependency(idx, predicate)?;
        // The binding is scoped to the predicate; the filter as a
        // whole does not depend on it.
        self.infos[idx].facts.remove(&**binding);
        Ok(self.optimize(arena, idx))
    }
}

impl GrammarObserver for Factorizer {
    fn type_registered(&mut self, id: TypeId, _name: &str) {
        self.known_types.insert(id);
    }
}

#[cfg(test)]
mod tests;
