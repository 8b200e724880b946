//! One-shot formulas and the multi-formula compiler session.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::debug;

use verdict_expr::{display, evaluate, Context, ExprArena, ExprId, Value};
use verdict_factor::Factorizer;
use verdict_grammar::Grammar;
use verdict_ir::{FormulaError, FormulaResult, TypeId};
use verdict_parse::parse_into;

/// A compiled formula owning its arena: parse once, evaluate many
/// times against varying contexts.
pub struct Formula {
    arena: ExprArena,
    root: ExprId,
    source: String,
    out_name: String,
}

impl Formula {
    /// Compile with a private factorizer (CSE, constant folding and
    /// memoization over the primitive types).
    pub fn parse(grammar: &Grammar, source: &str) -> FormulaResult<Formula> {
        let mut factorizer = Factorizer::new();
        Self::build(grammar, source, Some(&mut factorizer))
    }

    /// Compile without any optimization.
    pub fn parse_plain(grammar: &Grammar, source: &str) -> FormulaResult<Formula> {
        Self::build(grammar, source, None)
    }

    fn build(
        grammar: &Grammar,
        source: &str,
        observer: Option<&mut Factorizer>,
    ) -> FormulaResult<Formula> {
        let mut arena = ExprArena::with_capacity(source.len());
        let observer = observer.map(|f| f as &mut dyn verdict_parse::Observer);
        let root = parse_into(&mut arena, grammar, observer, source)?;
        let out_name = grammar.type_name(arena.out_type(root));
        debug!(source, out = %out_name, nodes = arena.len(), "compiled formula");
        Ok(Formula {
            arena,
            root,
            source: source.to_string(),
            out_name,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn root(&self) -> ExprId {
        self.root
    }

    pub fn arena(&self) -> &ExprArena {
        &self.arena
    }

    pub fn out_type(&self) -> TypeId {
        self.arena.out_type(self.root)
    }

    pub fn evaluate<'a>(&'a self, ctx: &mut Context<'a>) -> FormulaResult<Value<'a>> {
        evaluate(&self.arena, self.root, ctx)
    }

    fn check(&self, expected: TypeId, expected_name: &str) -> FormulaResult<()> {
        if self.out_type() == expected {
            return Ok(());
        }
        Err(FormulaError::TypeMismatch {
            expr: display(&self.arena, self.root),
            expected: expected_name.to_string(),
            actual: self.out_name.clone(),
        })
    }

    pub fn eval_bool<'a>(&'a self, ctx: &mut Context<'a>) -> FormulaResult<bool> {
        self.check(TypeId::BOOL, "bool")?;
        self.evaluate(ctx)?
            .as_bool()
            .ok_or_else(|| FormulaError::Internal("bool result expected".to_string()))
    }

    pub fn eval_int<'a>(&'a self, ctx: &mut Context<'a>) -> FormulaResult<i64> {
        self.check(TypeId::INT, "int")?;
        self.evaluate(ctx)?
            .as_int()
            .ok_or_else(|| FormulaError::Internal("int result expected".to_string()))
    }

    pub fn eval_double<'a>(&'a self, ctx: &mut Context<'a>) -> FormulaResult<f64> {
        self.check(TypeId::DOUBLE, "double")?;
        self.evaluate(ctx)?
            .as_double()
            .ok_or_else(|| FormulaError::Internal("double result expected".to_string()))
    }

    pub fn eval_str<'a>(&'a self, ctx: &mut Context<'a>) -> FormulaResult<String> {
        self.check(TypeId::STRING, "string")?;
        let value = self.evaluate(ctx)?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| FormulaError::Internal("string result expected".to_string()))
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&display(&self.arena, self.root))
    }
}

/// Handle to a formula compiled through a [`Compiler`].
#[derive(Copy, Clone, Debug)]
pub struct Compiled {
    root: ExprId,
    out: TypeId,
}

impl Compiled {
    pub fn root(self) -> ExprId {
        self.root
    }

    pub fn out_type(self) -> TypeId {
        self.out
    }
}

/// A compilation session: one arena, one persistent factorizer, any
/// number of formulas. Identical subtrees are shared across formulas,
/// and memoized results are shared by every formula that contains the
/// factored subtree.
pub struct Compiler {
    arena: ExprArena,
    factorizer: Rc<RefCell<Factorizer>>,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    pub fn new() -> Self {
        Compiler {
            arena: ExprArena::new(),
            factorizer: Rc::new(RefCell::new(Factorizer::new())),
        }
    }

    /// The shared factorizer; attach it to a grammar with
    /// `grammar.add_observer(compiler.factorizer())` so host types
    /// become eligible for folding and memoization.
    pub fn factorizer(&self) -> Rc<RefCell<Factorizer>> {
        self.factorizer.clone()
    }

    pub fn compile(&mut self, grammar: &Grammar, source: &str) -> FormulaResult<Compiled> {
        let factorizer = self.factorizer.clone();
        let mut factorizer = factorizer.borrow_mut();
        let root = parse_into(
            &mut self.arena,
            grammar,
            Some(&mut *factorizer),
            source,
        )?;
        Ok(Compiled {
            root,
            out: self.arena.out_type(root),
        })
    }

    pub fn arena(&self) -> &ExprArena {
        &self.arena
    }

    pub fn display(&self, formula: Compiled) -> String {
        display(&self.arena, formula.root)
    }

    pub fn evaluate<'a>(
        &'a self,
        formula: Compiled,
        ctx: &mut Context<'a>,
    ) -> FormulaResult<Value<'a>> {
        evaluate(&self.arena, formula.root, ctx)
    }

    /// Discard every compiled formula and the factorizer's records.
    pub fn reset(&mut self) {
        self.factorizer.borrow_mut().reset();
        self.arena.clean();
    }
}
