//! Cast conversions.
//!
//! `double -> int` rounds half away from zero instead of letting a
//! bare truncation turn 0.99999995 into 0. The string parses follow C
//! `atoi`/`atof`: locale-independent, optional leading sign, longest
//! valid prefix, 0 when no digits are found.

use std::any::Any;
use std::marker::PhantomData;
use std::rc::Rc;

use verdict_expr::{
    unary_fn, ExprArena, ExprId, ObjRef, ObjValue, UnaryStyle, Value,
};
use verdict_ir::{FormulaError, FormulaResult, TypeId};

use crate::grammar::{Grammar, UnaryOpInstantiator};

/// Half-away-from-zero rounding for the `(int)` cast.
pub fn double_to_int(value: f64) -> i64 {
    let shifted = if value >= 0.0 { value + 0.5 } else { value - 0.5 };
    shifted as i64
}

/// C `atoi`: optional whitespace, optional sign, decimal digits.
pub fn parse_int_prefix(text: &str) -> i64 {
    let trimmed = text.trim_start();
    let bytes = trimmed.as_bytes();
    let mut pos = 0;
    let negative = match bytes.first() {
        Some(b'-') => {
            pos = 1;
            true
        }
        Some(b'+') => {
            pos = 1;
            false
        }
        _ => false,
    };
    let mut value: i64 = 0;
    let mut any = false;
    while let Some(digit) = bytes.get(pos).filter(|b| b.is_ascii_digit()) {
        value = value
            .wrapping_mul(10)
            .wrapping_add(i64::from(digit - b'0'));
        any = true;
        pos += 1;
    }
    if !any {
        return 0;
    }
    if negative {
        value.wrapping_neg()
    } else {
        value
    }
}

/// C `atof`: longest prefix of the form `[+-]digits[.digits][e[+-]digits]`.
pub fn parse_double_prefix(text: &str) -> f64 {
    let trimmed = text.trim_start();
    let bytes = trimmed.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        end = 1;
    }
    let mut digits = 0;
    while bytes.get(end).is_some_and(|b| b.is_ascii_digit()) {
        end += 1;
        digits += 1;
    }
    if bytes.get(end) == Some(&b'.') {
        end += 1;
        while bytes.get(end).is_some_and(|b| b.is_ascii_digit()) {
            end += 1;
            digits += 1;
        }
    }
    if digits == 0 {
        return 0.0;
    }
    if matches!(bytes.get(end), Some(b'e') | Some(b'E')) {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'+') | Some(b'-')) {
            exp_end += 1;
        }
        let mut exp_digits = 0;
        while bytes.get(exp_end).is_some_and(|b| b.is_ascii_digit()) {
            exp_end += 1;
            exp_digits += 1;
        }
        if exp_digits > 0 {
            end = exp_end;
        }
    }
    trimmed[..end].parse::<f64>().unwrap_or(0.0)
}

/// Canonical textual form used by `(string)` casts and by double
/// constants; doubles always carry a decimal point.
pub fn double_literal(value: f64) -> String {
    format!("{value:?}")
}

/// Host-supplied cast from a string literal to a registered object
/// type, e.g. `(Service)'PETC'`. The produced object is owned by the
/// resulting value.
pub struct StringCastInstantiator<T, F> {
    out: TypeId,
    build: Rc<F>,
    _marker: PhantomData<fn() -> T>,
}

impl<T, F> UnaryOpInstantiator for StringCastInstantiator<T, F>
where
    T: Any,
    F: Fn(&str) -> T + 'static,
{
    fn instantiate(
        &self,
        arena: &mut ExprArena,
        _grammar: &Grammar,
        symbol: &Rc<str>,
        child: ExprId,
    ) -> FormulaResult<ExprId> {
        let out = self.out;
        let build = self.build.clone();
        let op = unary_fn(move |_cx, value| {
            let text = value.as_str().ok_or_else(|| {
                FormulaError::Internal("string cast applied to a non-string".to_string())
            })?;
            Ok(Value::Obj(ObjValue {
                type_id: out,
                obj: ObjRef::Shared(Rc::new((*build)(text))),
            }))
        });
        Ok(arena.unary_expr(child, symbol.clone(), out, UnaryStyle::Prefix, 1, op))
    }
}

/// Register `(Name)string_expr` for a host type already registered
/// under `Name`.
pub fn register_string_cast<T, F>(grammar: &mut Grammar, build: F) -> FormulaResult<()>
where
    T: Any,
    F: Fn(&str) -> T + 'static,
{
    let out = grammar.expect_type::<T>()?;
    let symbol = format!("({})", grammar.type_name(out));
    grammar.register_unary_op(
        TypeId::STRING,
        out,
        &symbol,
        Rc::new(StringCastInstantiator::<T, F> {
            out,
            build: Rc::new(build),
            _marker: PhantomData,
        }),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn int_cast_rounds_half_away_from_zero() {
        assert_eq!(double_to_int(65.89), 66);
        assert_eq!(double_to_int(65.49), 65);
        assert_eq!(double_to_int(-65.89), -66);
        assert_eq!(double_to_int(-65.49), -65);
        assert_eq!(double_to_int(0.99999995), 1);
    }

    #[test]
    fn atoi_semantics() {
        assert_eq!(parse_int_prefix("-23"), -23);
        assert_eq!(parse_int_prefix("+42"), 42);
        assert_eq!(parse_int_prefix("  17x"), 17);
        assert_eq!(parse_int_prefix("x17"), 0);
        assert_eq!(parse_int_prefix(""), 0);
    }

    #[test]
    fn atof_semantics() {
        assert_eq!(parse_double_prefix("-23."), -23.0);
        assert_eq!(parse_double_prefix("0.684"), 0.684);
        assert_eq!(parse_double_prefix("1e3"), 1000.0);
        assert_eq!(parse_double_prefix("1e"), 1.0);
        assert_eq!(parse_double_prefix("abc"), 0.0);
    }

    #[test]
    fn double_literals_keep_a_decimal_point() {
        assert_eq!(double_literal(87.0), "87.0");
        assert_eq!(double_literal(-23.5), "-23.5");
    }
}
