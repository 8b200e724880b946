//! Verdict - an embeddable formula engine.
//!
//! Compile a textual expression once against a [`Grammar`] (the set
//! of known types, operators and fact resolvers), then evaluate the
//! immutable typed tree repeatedly against [`Context`]s supplying
//! values for named facts. Built for rule engines, feature-flag
//! predicates and row-level filters where a formula is parsed rarely
//! and evaluated millions of times.
//!
//! ```
//! use verdict::{register_fact, set_fact, Context, Formula, Grammar};
//!
//! let mut grammar = Grammar::with_standard_ops();
//! register_fact::<f64>(&mut grammar, "Load").unwrap();
//!
//! let formula = Formula::parse(&grammar, "$Load <= 0.5 ? 'open' : 'full'").unwrap();
//!
//! let load = 0.46;
//! let mut ctx = Context::new();
//! set_fact(&grammar, &mut ctx, "Load", &load).unwrap();
//! assert_eq!(formula.eval_str(&mut ctx).unwrap(), "open");
//! ```

mod formula;

pub use formula::{Compiled, Compiler, Formula};

pub use verdict_expr::{
    display, evaluate, fact_object, Context, Element, EvalCx, ExprArena, ExprId, FactValue,
    FilterValue, OwnedValue, Value,
};
pub use verdict_factor::Factorizer;
pub use verdict_grammar::{
    register_attribute, register_fact, register_iterable, register_optional_attribute,
    register_random_access, register_string_cast, set_fact, Grammar, SizeHint,
};
pub use verdict_ir::{FormulaError, FormulaResult, TypeId, TypeRegistry};
pub use verdict_lexer::{lex, Token};
pub use verdict_parse::{parse_into, AdditionalFacts, Observer, ParseDriver};
