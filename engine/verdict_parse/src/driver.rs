//! The callback surface an expression parser drives.
//!
//! Every node construction funnels through [`ParseDriver`]: it asks
//! the grammar for the instantiator, then gives an attached
//! [`Observer`] the chance to substitute an optimized node. Arrow
//! bindings live in the [`AdditionalFacts`] overlay, consulted before
//! the grammar when a `$name` is resolved.

use std::rc::Rc;

use rustc_hash::FxHashMap;
use tracing::debug;

use verdict_expr::{display, ExprArena, ExprId, OwnedValue};
use verdict_grammar::{FactInstantiator, Grammar};
use verdict_ir::{FormulaError, FormulaResult, TypeId};

/// Observer of freshly built nodes; each hook returns the node to
/// splice into the parent position (often the input itself). The
/// default implementation observes nothing, so partial observers
/// only override what they need.
pub trait Observer {
    fn new_constant(&mut self, _arena: &mut ExprArena, result: ExprId) -> FormulaResult<ExprId> {
        Ok(result)
    }

    fn new_fact(
        &mut self,
        _arena: &mut ExprArena,
        result: ExprId,
        _name: &Rc<str>,
    ) -> FormulaResult<ExprId> {
        Ok(result)
    }

    fn new_unary(
        &mut self,
        _arena: &mut ExprArena,
        result: ExprId,
        _child: ExprId,
        _symbol: &Rc<str>,
    ) -> FormulaResult<ExprId> {
        Ok(result)
    }

    fn new_binary(
        &mut self,
        _arena: &mut ExprArena,
        result: ExprId,
        _left: ExprId,
        _right: ExprId,
        _symbol: &Rc<str>,
    ) -> FormulaResult<ExprId> {
        Ok(result)
    }

    fn new_choice(
        &mut self,
        _arena: &mut ExprArena,
        result: ExprId,
        _cond: ExprId,
        _left: ExprId,
        _right: ExprId,
    ) -> FormulaResult<ExprId> {
        Ok(result)
    }

    fn new_arrow(
        &mut self,
        _arena: &mut ExprArena,
        result: ExprId,
        _container: ExprId,
        _predicate: ExprId,
        _binding: &Rc<str>,
    ) -> FormulaResult<ExprId> {
        Ok(result)
    }
}

/// Fact-resolver overlay consulted before the grammar; holds the
/// arrow-bound locals while the parser is inside a predicate.
#[derive(Default)]
pub struct AdditionalFacts {
    facts: FxHashMap<Rc<str>, Rc<dyn FactInstantiator>>,
}

impl AdditionalFacts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_fact(&mut self, name: &str, inst: Rc<dyn FactInstantiator>) {
        self.facts.insert(Rc::from(name), inst);
    }

    pub fn has_fact(&self, name: &str) -> bool {
        self.facts.contains_key(name)
    }

    pub fn remove_fact(&mut self, name: &str) {
        self.facts.remove(name);
    }

    pub fn instantiate(
        &self,
        arena: &mut ExprArena,
        grammar: &Grammar,
        name: &str,
    ) -> FormulaResult<ExprId> {
        match self.facts.get(name) {
            Some(inst) => {
                let interned = arena.intern(name);
                inst.instantiate(arena, grammar, &interned)
            }
            None => grammar.instantiate_fact(arena, name),
        }
    }
}

/// Drives node construction on behalf of the expression parser.
pub struct ParseDriver<'a, 'g, 'o> {
    arena: &'a mut ExprArena,
    grammar: &'g Grammar,
    locals: AdditionalFacts,
    observer: Option<&'o mut dyn Observer>,
}

impl<'a, 'g, 'o> ParseDriver<'a, 'g, 'o> {
    pub fn new(
        arena: &'a mut ExprArena,
        grammar: &'g Grammar,
        observer: Option<&'o mut dyn Observer>,
    ) -> Self {
        ParseDriver {
            arena,
            grammar,
            locals: AdditionalFacts::new(),
            observer,
        }
    }

    pub fn grammar(&self) -> &'g Grammar {
        self.grammar
    }

    pub fn intern(&mut self, s: &str) -> Rc<str> {
        self.arena.intern(s)
    }

    pub fn on_constant(&mut self, value: OwnedValue) -> FormulaResult<ExprId> {
        let id = self.arena.const_expr(value);
        match &mut self.observer {
            Some(observer) => observer.new_constant(self.arena, id),
            None => Ok(id),
        }
    }

    /// `$name`: the locals overlay wins over the grammar.
    pub fn on_fact(&mut self, name: &str) -> FormulaResult<ExprId> {
        let id = if self.locals.has_fact(name) {
            self.locals.instantiate(self.arena, self.grammar, name)?
        } else {
            self.grammar.instantiate_fact(self.arena, name)?
        };
        let interned = self.arena.intern(name);
        match &mut self.observer {
            Some(observer) => observer.new_fact(self.arena, id, &interned),
            None => Ok(id),
        }
    }

    pub fn on_unary(&mut self, child: ExprId, symbol: &str) -> FormulaResult<ExprId> {
        let id = self.grammar.instantiate_unary(self.arena, child, symbol)?;
        let interned = self.arena.intern(symbol);
        match &mut self.observer {
            Some(observer) => observer.new_unary(self.arena, id, child, &interned),
            None => Ok(id),
        }
    }

    pub fn on_binary(&mut self, left: ExprId, right: ExprId, symbol: &str) -> FormulaResult<ExprId> {
        let id = self
            .grammar
            .instantiate_binary(self.arena, left, right, symbol)?;
        let interned = self.arena.intern(symbol);
        match &mut self.observer {
            Some(observer) => observer.new_binary(self.arena, id, left, right, &interned),
            None => Ok(id),
        }
    }

    /// `cond ? left : right`; the condition must be boolean and the
    /// branches must agree on type.
    pub fn on_choice(
        &mut self,
        cond: ExprId,
        left: ExprId,
        right: ExprId,
    ) -> FormulaResult<ExprId> {
        let cond_type = self.arena.out_type(cond);
        if cond_type != TypeId::BOOL {
            return Err(FormulaError::TypeMismatch {
                expr: display(self.arena, cond),
                expected: "bool".to_string(),
                actual: self.grammar.type_name(cond_type),
            });
        }
        let left_type = self.arena.out_type(left);
        let right_type = self.arena.out_type(right);
        if left_type != right_type {
            return Err(FormulaError::TypeMismatch {
                expr: display(self.arena, right),
                expected: self.grammar.type_name(left_type),
                actual: self.grammar.type_name(right_type),
            });
        }
        let id = self.arena.choice_expr(cond, left, right, left_type);
        match &mut self.observer {
            Some(observer) => observer.new_choice(self.arena, id, cond, left, right),
            None => Ok(id),
        }
    }

    /// `(typename)expr`: a unary operator keyed on the parenthesized
    /// type name.
    pub fn on_cast(&mut self, child: ExprId, type_name: &str) -> FormulaResult<ExprId> {
        let symbol = format!("({type_name})");
        self.on_unary(child, &symbol)
    }

    /// `.name`: unary lookup by attribute name.
    pub fn on_attribute(&mut self, object: ExprId, name: &str) -> FormulaResult<ExprId> {
        let id = self
            .grammar
            .instantiate_attribute(self.arena, object, name)?;
        let interned = self.arena.intern(name);
        match &mut self.observer {
            Some(observer) => observer.new_unary(self.arena, id, object, &interned),
            None => Ok(id),
        }
    }

    /// `container -> name ? predicate`; pops the local declared for
    /// the predicate.
    pub fn on_arrow(
        &mut self,
        container: ExprId,
        predicate: ExprId,
        binding: &str,
    ) -> FormulaResult<ExprId> {
        let interned = self.arena.intern(binding);
        let id = self
            .grammar
            .instantiate_arrow(self.arena, container, predicate, &interned)?;
        if self.locals.has_fact(binding) {
            self.pop_local(binding)?;
        }
        match &mut self.observer {
            Some(observer) => observer.new_arrow(self.arena, id, container, predicate, &interned),
            None => Ok(id),
        }
    }

    /// Declare the arrow-bound local before the parser descends into
    /// the predicate.
    pub fn declare_local(&mut self, container: ExprId, name: &str) -> FormulaResult<()> {
        let container_type = self.arena.out_type(container);
        if let Some(inst) = self.grammar.local_instantiator(container_type)? {
            if self.locals.has_fact(name) {
                return Err(FormulaError::ParseFailed(format!(
                    "local variable {name} shadows an enclosing binding"
                )));
            }
            debug!(name, "declared arrow local");
            self.locals.add_fact(name, inst);
        }
        Ok(())
    }

    pub fn pop_local(&mut self, name: &str) -> FormulaResult<()> {
        if !self.locals.has_fact(name) {
            return Err(FormulaError::Internal(format!(
                "cannot remove missing local {name}"
            )));
        }
        self.locals.remove_fact(name);
        Ok(())
    }
}
