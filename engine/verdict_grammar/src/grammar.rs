//! The grammar: a keyed dispatch table from
//! `(left type, right type, symbol)` to an operator instantiator.
//!
//! Unary operators and fact lookups use `VOID` for the vacant slots of
//! the key. Grammars chain: a lookup that misses falls through to the
//! linked parent. Each key maps to at most one instantiator per
//! grammar; a key resolving to the wrong arity is treated as not
//! found (and may still match further down the chain).

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use tracing::debug;

use verdict_expr::{Element, ExprArena, ExprId};
use verdict_ir::{FormulaError, FormulaResult, TypeId, TypeRegistry};

/// Builds the node for a fact reference (`$Name`).
pub trait FactInstantiator {
    fn instantiate(
        &self,
        arena: &mut ExprArena,
        grammar: &Grammar,
        name: &Rc<str>,
    ) -> FormulaResult<ExprId>;
}

/// Builds the node for a unary operator, cast or attribute.
pub trait UnaryOpInstantiator {
    fn instantiate(
        &self,
        arena: &mut ExprArena,
        grammar: &Grammar,
        symbol: &Rc<str>,
        child: ExprId,
    ) -> FormulaResult<ExprId>;
}

/// Builds the node for a binary operator.
pub trait BinaryOpInstantiator {
    fn instantiate(
        &self,
        arena: &mut ExprArena,
        grammar: &Grammar,
        symbol: &Rc<str>,
        left: ExprId,
        right: ExprId,
    ) -> FormulaResult<ExprId>;
}

/// Builds the node for an arrow (filter) operator.
pub trait ArrowOpInstantiator {
    /// Resolver for the arrow-bound local variable, consulted by the
    /// parser before it descends into the predicate.
    fn local_fact(&self) -> Option<Rc<dyn FactInstantiator>> {
        None
    }

    fn instantiate(
        &self,
        arena: &mut ExprArena,
        grammar: &Grammar,
        symbol: &Rc<str>,
        left: ExprId,
        right: ExprId,
        binding: &Rc<str>,
    ) -> FormulaResult<ExprId>;
}

/// Notified of every type a grammar knows, so an optimizer can decide
/// which node types it may fold or memoize.
pub trait GrammarObserver {
    fn type_registered(&mut self, id: TypeId, name: &str);
}

enum OpEntry {
    Unary {
        inst: Rc<dyn UnaryOpInstantiator>,
    },
    Binary {
        inst: Rc<dyn BinaryOpInstantiator>,
    },
    Arrow {
        inst: Rc<dyn ArrowOpInstantiator>,
    },
    Fact {
        out: TypeId,
        inst: Rc<dyn FactInstantiator>,
    },
}

/// Type registry plus operator dispatch table, optionally chained to a
/// parent grammar.
pub struct Grammar {
    registry: TypeRegistry,
    ops: FxHashMap<(TypeId, TypeId), FxHashMap<Rc<str>, OpEntry>>,
    parent: Option<Rc<Grammar>>,
    observers: Vec<Rc<RefCell<dyn GrammarObserver>>>,
}

impl Default for Grammar {
    fn default() -> Self {
        Self::new()
    }
}

impl Grammar {
    pub fn new() -> Self {
        Grammar {
            registry: TypeRegistry::new(),
            ops: FxHashMap::default(),
            parent: None,
            observers: Vec::new(),
        }
    }

    /// A grammar pre-loaded with the standard operator set.
    pub fn with_standard_ops() -> Self {
        let mut grammar = Self::new();
        crate::standard::register_standard_ops(&mut grammar);
        grammar
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Chain-of-responsibility: lookups that miss here fall through to
    /// `parent`. The chain is immutable once linked.
    pub fn link_parent(&mut self, parent: Rc<Grammar>) {
        self.parent = Some(parent);
    }

    /// Attach an optimizer observer; it hears about every type this
    /// grammar already knows and every one registered afterwards.
    pub fn add_observer(&mut self, observer: Rc<RefCell<dyn GrammarObserver>>) {
        for (id, name) in self.registry.iter_value_types() {
            observer.borrow_mut().type_registered(id, name);
        }
        self.observers.push(observer);
    }

    fn notify_type(&self, id: TypeId, name: &str) {
        for observer in &self.observers {
            observer.borrow_mut().type_registered(id, name);
        }
    }

    /// Register (or look up) a host Rust type under a canonical name.
    pub fn register_type<T: Any>(&mut self, name: &str) -> TypeId {
        let known = self.registry.find_rust::<T>();
        let id = self.registry.register_rust::<T>(name);
        if known.is_none() {
            debug!(name, id = id.raw(), "registered type");
            self.notify_type(id, name);
        }
        id
    }

    /// Register (or look up) a type by name alone.
    pub fn register_type_name(&mut self, name: &str) -> TypeId {
        let known = self.registry.find_name(name);
        let id = self.registry.register(name);
        if known.is_none() {
            self.notify_type(id, name);
        }
        id
    }

    pub fn find_type<T: Any>(&self) -> Option<TypeId> {
        self.registry
            .find_rust::<T>()
            .or_else(|| self.parent.as_ref().and_then(|p| p.find_type::<T>()))
    }

    pub fn find_type_name(&self, name: &str) -> Option<TypeId> {
        self.registry
            .find_name(name)
            .or_else(|| self.parent.as_ref().and_then(|p| p.find_type_name(name)))
    }

    pub fn expect_type<T: Any>(&self) -> FormulaResult<TypeId> {
        self.find_type::<T>().ok_or_else(|| {
            FormulaError::UnregisteredType(std::any::type_name::<T>().to_string())
        })
    }

    /// Engine type id for an element type, honoring the chain.
    pub fn element_type<E: Element>(&self) -> FormulaResult<TypeId> {
        match E::element_type(&self.registry) {
            Ok(id) => Ok(id),
            Err(err) => match &self.parent {
                Some(parent) => parent.element_type::<E>().map_err(|_| err),
                None => Err(err),
            },
        }
    }

    /// Canonical name of a type id anywhere along the chain.
    pub fn type_name(&self, id: TypeId) -> String {
        if let Some(name) = self.registry.lookup_name(id) {
            return name.to_string();
        }
        match &self.parent {
            Some(parent) => parent.type_name(id),
            None => id.label(),
        }
    }

    fn insert_op(&mut self, left: TypeId, right: TypeId, symbol: &str, entry: OpEntry) {
        self.ops
            .entry((left, right))
            .or_default()
            .insert(Rc::from(symbol), entry);
    }

    fn entry(&self, left: TypeId, right: TypeId, symbol: &str) -> Option<&OpEntry> {
        self.ops.get(&(left, right)).and_then(|map| map.get(symbol))
    }

    pub fn register_unary_op(
        &mut self,
        input: TypeId,
        _out: TypeId,
        symbol: &str,
        inst: Rc<dyn UnaryOpInstantiator>,
    ) {
        self.insert_op(input, TypeId::VOID, symbol, OpEntry::Unary { inst });
    }

    pub fn register_binary_op(
        &mut self,
        left: TypeId,
        right: TypeId,
        _out: TypeId,
        symbol: &str,
        inst: Rc<dyn BinaryOpInstantiator>,
    ) {
        self.insert_op(left, right, symbol, OpEntry::Binary { inst });
    }

    /// Registering an arrow also installs the partial
    /// `(left, VOID, symbol)` key the parser uses to resolve the
    /// arrow-bound local before the right operand exists.
    pub fn register_arrow_op(
        &mut self,
        left: TypeId,
        right: TypeId,
        _out: TypeId,
        symbol: &str,
        inst: Rc<dyn ArrowOpInstantiator>,
    ) {
        self.insert_op(
            left,
            right,
            symbol,
            OpEntry::Arrow { inst: inst.clone() },
        );
        self.insert_op(left, TypeId::VOID, symbol, OpEntry::Arrow { inst });
    }

    pub fn register_fact_resolver(
        &mut self,
        name: &str,
        out: TypeId,
        inst: Rc<dyn FactInstantiator>,
    ) {
        self.insert_op(TypeId::VOID, TypeId::VOID, name, OpEntry::Fact { out, inst });
    }

    /// Attributes are unary operators addressed by name.
    pub fn register_attribute_resolver(
        &mut self,
        input: TypeId,
        out: TypeId,
        symbol: &str,
        inst: Rc<dyn UnaryOpInstantiator>,
    ) {
        self.register_unary_op(input, out, symbol, inst);
    }

    fn not_found(&self, symbol: &str, left: TypeId, right: TypeId) -> FormulaError {
        FormulaError::OperatorNotFound {
            symbol: symbol.to_string(),
            left: self.type_name(left),
            right: self.type_name(right),
        }
    }

    pub fn instantiate_unary(
        &self,
        arena: &mut ExprArena,
        child: ExprId,
        symbol: &str,
    ) -> FormulaResult<ExprId> {
        let child_type = arena.out_type(child);
        if let Some(OpEntry::Unary { inst }) = self.entry(child_type, TypeId::VOID, symbol) {
            let sym = arena.intern(symbol);
            return inst.instantiate(arena, self, &sym, child);
        }
        if let Some(parent) = &self.parent {
            return parent.instantiate_unary(arena, child, symbol);
        }
        Err(self.not_found(symbol, child_type, TypeId::VOID))
    }

    pub fn instantiate_binary(
        &self,
        arena: &mut ExprArena,
        left: ExprId,
        right: ExprId,
        symbol: &str,
    ) -> FormulaResult<ExprId> {
        let left_type = arena.out_type(left);
        let right_type = arena.out_type(right);
        if let Some(OpEntry::Binary { inst }) = self.entry(left_type, right_type, symbol) {
            let sym = arena.intern(symbol);
            return inst.instantiate(arena, self, &sym, left, right);
        }
        if let Some(parent) = &self.parent {
            return parent.instantiate_binary(arena, left, right, symbol);
        }
        Err(self.not_found(symbol, left_type, right_type))
    }

    pub fn instantiate_arrow(
        &self,
        arena: &mut ExprArena,
        left: ExprId,
        right: ExprId,
        binding: &Rc<str>,
    ) -> FormulaResult<ExprId> {
        let left_type = arena.out_type(left);
        let right_type = arena.out_type(right);
        if let Some(OpEntry::Arrow { inst }) = self.entry(left_type, right_type, "->") {
            let sym = arena.intern("->");
            return inst.instantiate(arena, self, &sym, left, right, binding);
        }
        if let Some(parent) = &self.parent {
            return parent.instantiate_arrow(arena, left, right, binding);
        }
        Err(self.not_found("->", left_type, right_type))
    }

    /// Resolver for an arrow-bound local over a container of
    /// `container_type`, from the partial arrow key.
    pub fn local_instantiator(
        &self,
        container_type: TypeId,
    ) -> FormulaResult<Option<Rc<dyn FactInstantiator>>> {
        if let Some(OpEntry::Arrow { inst }) = self.entry(container_type, TypeId::VOID, "->") {
            return Ok(inst.local_fact());
        }
        if let Some(parent) = &self.parent {
            return parent.local_instantiator(container_type);
        }
        Err(self.not_found("->", container_type, TypeId::VOID))
    }

    pub fn has_fact(&self, name: &str) -> bool {
        if matches!(
            self.entry(TypeId::VOID, TypeId::VOID, name),
            Some(OpEntry::Fact { .. })
        ) {
            return true;
        }
        self.parent.as_ref().is_some_and(|p| p.has_fact(name))
    }

    /// Declared output type of a registered fact.
    pub fn fact_type(&self, name: &str) -> Option<TypeId> {
        if let Some(OpEntry::Fact { out, .. }) = self.entry(TypeId::VOID, TypeId::VOID, name) {
            return Some(*out);
        }
        self.parent.as_ref().and_then(|p| p.fact_type(name))
    }

    pub fn instantiate_fact(&self, arena: &mut ExprArena, name: &str) -> FormulaResult<ExprId> {
        if let Some(OpEntry::Fact { inst, .. }) = self.entry(TypeId::VOID, TypeId::VOID, name) {
            let interned = arena.intern(name);
            return inst.instantiate(arena, self, &interned);
        }
        if let Some(parent) = &self.parent {
            return parent.instantiate_fact(arena, name);
        }
        Err(self.not_found(&format!("${name}"), TypeId::VOID, TypeId::VOID))
    }

    /// Attribute lookup is unary lookup by attribute name.
    pub fn instantiate_attribute(
        &self,
        arena: &mut ExprArena,
        object: ExprId,
        attribute: &str,
    ) -> FormulaResult<ExprId> {
        self.instantiate_unary(arena, object, attribute)
    }
}
