//! Verdict Grammar - the type-aware operator registry.
//!
//! A [`Grammar`] maps `(left type, right type, symbol)` keys to
//! operator instantiators and chains to an optional parent grammar.
//! This crate also ships the standard operator set, the cast matrix,
//! fact/attribute registration and the iterable sub-system.

mod casts;
mod facts;
mod grammar;
mod iterable;
mod standard;

pub use casts::{
    double_literal, double_to_int, parse_double_prefix, parse_int_prefix, register_string_cast,
};
pub use facts::{
    register_attribute, register_fact, register_optional_attribute, set_fact,
    DefaultFactInstantiator, LocalFactInstantiator,
};
pub use grammar::{
    ArrowOpInstantiator, BinaryOpInstantiator, FactInstantiator, Grammar, GrammarObserver,
    UnaryOpInstantiator,
};
pub use iterable::{register_iterable, register_random_access, SizeHint};
pub use standard::{register_standard_ops, StandardBinary, StandardUnary};

#[cfg(test)]
mod tests;
