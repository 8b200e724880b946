//! The standard operator set over int, double, bool and string.
//!
//! Two dispatching instantiators cover the whole matrix: one for
//! unary operators and casts, one for binary operators. Integer
//! arithmetic wraps on i64 (2's complement); division and modulo by
//! zero raise a recoverable missing value.

use std::rc::Rc;

use verdict_expr::{
    binary_fn, expect_bool, expect_double, expect_int, unary_fn, BinaryStyle, ExprArena, ExprId,
    StrRef, UnaryStyle, Value,
};
use verdict_ir::{FormulaError, FormulaResult, TypeId};

use crate::casts::{double_literal, double_to_int, parse_double_prefix, parse_int_prefix};
use crate::grammar::{BinaryOpInstantiator, Grammar, UnaryOpInstantiator};

fn str_of<'v>(value: &'v Value<'_>) -> FormulaResult<&'v str> {
    value
        .as_str()
        .ok_or_else(|| FormulaError::Internal("string operand expected".to_string()))
}

/// Unary operators and casts on the built-in types.
pub struct StandardUnary;

impl UnaryOpInstantiator for StandardUnary {
    fn instantiate(
        &self,
        arena: &mut ExprArena,
        grammar: &Grammar,
        symbol: &Rc<str>,
        child: ExprId,
    ) -> FormulaResult<ExprId> {
        let input = arena.out_type(child);
        let sym = symbol.clone();
        let node = match (input, &**symbol) {
            (TypeId::INT, "-") => arena.unary_expr(
                child,
                sym,
                TypeId::INT,
                UnaryStyle::Prefix,
                1,
                unary_fn(|_cx, v| Ok(Value::Int(expect_int(&v)?.wrapping_neg()))),
            ),
            (TypeId::INT, "(double)") => arena.unary_expr(
                child,
                sym,
                TypeId::DOUBLE,
                UnaryStyle::Prefix,
                1,
                unary_fn(|_cx, v| Ok(Value::Double(expect_int(&v)? as f64))),
            ),
            (TypeId::INT, "(bool)") => arena.unary_expr(
                child,
                sym,
                TypeId::BOOL,
                UnaryStyle::Prefix,
                1,
                unary_fn(|_cx, v| Ok(Value::Bool(expect_int(&v)? != 0))),
            ),
            (TypeId::INT, "(string)") => arena.unary_expr(
                child,
                sym,
                TypeId::STRING,
                UnaryStyle::Prefix,
                1,
                unary_fn(|_cx, v| {
                    Ok(Value::Str(StrRef::Shared(Rc::from(
                        expect_int(&v)?.to_string(),
                    ))))
                }),
            ),
            (TypeId::DOUBLE, "-") => arena.unary_expr(
                child,
                sym,
                TypeId::DOUBLE,
                UnaryStyle::Prefix,
                1,
                unary_fn(|_cx, v| Ok(Value::Double(-expect_double(&v)?))),
            ),
            (TypeId::DOUBLE, "(int)") => arena.unary_expr(
                child,
                sym,
                TypeId::INT,
                UnaryStyle::Prefix,
                1,
                unary_fn(|_cx, v| Ok(Value::Int(double_to_int(expect_double(&v)?)))),
            ),
            (TypeId::DOUBLE, "(string)") => arena.unary_expr(
                child,
                sym,
                TypeId::STRING,
                UnaryStyle::Prefix,
                1,
                unary_fn(|_cx, v| {
                    Ok(Value::Str(StrRef::Shared(Rc::from(double_literal(
                        expect_double(&v)?,
                    )))))
                }),
            ),
            (TypeId::BOOL, "!") => arena.unary_expr(
                child,
                sym,
                TypeId::BOOL,
                UnaryStyle::Prefix,
                1,
                unary_fn(|_cx, v| Ok(Value::Bool(!expect_bool(&v)?))),
            ),
            (TypeId::BOOL, "(int)") => arena.unary_expr(
                child,
                sym,
                TypeId::INT,
                UnaryStyle::Prefix,
                1,
                unary_fn(|_cx, v| Ok(Value::Int(i64::from(expect_bool(&v)?)))),
            ),
            (TypeId::STRING, "(int)") => arena.unary_expr(
                child,
                sym,
                TypeId::INT,
                UnaryStyle::Prefix,
                1,
                unary_fn(|_cx, v| Ok(Value::Int(parse_int_prefix(str_of(&v)?)))),
            ),
            (TypeId::STRING, "(double)") => arena.unary_expr(
                child,
                sym,
                TypeId::DOUBLE,
                UnaryStyle::Prefix,
                1,
                unary_fn(|_cx, v| {
                    Ok(Value::Double(parse_double_prefix(str_of(&v)?)))
                }),
            ),
            (TypeId::STRING, "count") => arena.unary_expr(
                child,
                sym,
                TypeId::INT,
                UnaryStyle::Attribute,
                1,
                unary_fn(|_cx, v| Ok(Value::Int(str_of(&v)?.len() as i64))),
            ),
            (TypeId::STRING, "empty") => arena.unary_expr(
                child,
                sym,
                TypeId::BOOL,
                UnaryStyle::Attribute,
                1,
                unary_fn(|_cx, v| Ok(Value::Bool(str_of(&v)?.is_empty()))),
            ),
            _ => {
                return Err(FormulaError::OperatorNotFound {
                    symbol: symbol.to_string(),
                    left: grammar.type_name(input),
                    right: "void".to_string(),
                })
            }
        };
        Ok(node)
    }
}

/// Binary operators on the built-in types.
pub struct StandardBinary;

macro_rules! int_arith {
    ($arena:ident, $l:ident, $r:ident, $sym:ident, $method:ident) => {
        $arena.binary_expr(
            $l,
            $r,
            $sym,
            TypeId::INT,
            BinaryStyle::Infix,
            1,
            binary_fn(|_cx, a, b| {
                Ok(Value::Int(expect_int(&a)?.$method(expect_int(&b)?)))
            }),
        )
    };
}

macro_rules! int_rel {
    ($arena:ident, $l:ident, $r:ident, $sym:ident, $op:tt) => {
        $arena.binary_expr(
            $l,
            $r,
            $sym,
            TypeId::BOOL,
            BinaryStyle::Infix,
            1,
            binary_fn(|_cx, a, b| Ok(Value::Bool(expect_int(&a)? $op expect_int(&b)?))),
        )
    };
}

macro_rules! double_rel {
    ($arena:ident, $l:ident, $r:ident, $sym:ident, $op:tt) => {
        $arena.binary_expr(
            $l,
            $r,
            $sym,
            TypeId::BOOL,
            BinaryStyle::Infix,
            1,
            binary_fn(|_cx, a, b| Ok(Value::Bool(expect_double(&a)? $op expect_double(&b)?))),
        )
    };
}

macro_rules! double_arith {
    ($arena:ident, $l:ident, $r:ident, $sym:ident, $op:tt) => {
        $arena.binary_expr(
            $l,
            $r,
            $sym,
            TypeId::DOUBLE,
            BinaryStyle::Infix,
            1,
            binary_fn(|_cx, a, b| Ok(Value::Double(expect_double(&a)? $op expect_double(&b)?))),
        )
    };
}

macro_rules! str_rel {
    ($arena:ident, $l:ident, $r:ident, $sym:ident, $op:tt) => {
        $arena.binary_expr(
            $l,
            $r,
            $sym,
            TypeId::BOOL,
            BinaryStyle::Infix,
            1,
            binary_fn(|_cx, a, b| {
                let left = a
                    .as_str()
                    .ok_or_else(|| FormulaError::Internal("string operand expected".into()))?;
                let right = b
                    .as_str()
                    .ok_or_else(|| FormulaError::Internal("string operand expected".into()))?;
                Ok(Value::Bool(left $op right))
            }),
        )
    };
}

impl BinaryOpInstantiator for StandardBinary {
    fn instantiate(
        &self,
        arena: &mut ExprArena,
        grammar: &Grammar,
        symbol: &Rc<str>,
        left: ExprId,
        right: ExprId,
    ) -> FormulaResult<ExprId> {
        let lt = arena.out_type(left);
        let rt = arena.out_type(right);
        let sym = symbol.clone();
        let l = left;
        let r = right;
        let node = match (lt, rt, &**symbol) {
            (TypeId::INT, TypeId::INT, "+") => int_arith!(arena, l, r, sym, wrapping_add),
            (TypeId::INT, TypeId::INT, "-") => int_arith!(arena, l, r, sym, wrapping_sub),
            (TypeId::INT, TypeId::INT, "*") => int_arith!(arena, l, r, sym, wrapping_mul),
            (TypeId::INT, TypeId::INT, "/") => arena.binary_expr(
                l,
                r,
                sym,
                TypeId::INT,
                BinaryStyle::Infix,
                1,
                binary_fn(|_cx, a, b| {
                    let divisor = expect_int(&b)?;
                    if divisor == 0 {
                        return Err(FormulaError::ValueMissing("division by zero".into()));
                    }
                    Ok(Value::Int(expect_int(&a)?.wrapping_div(divisor)))
                }),
            ),
            (TypeId::INT, TypeId::INT, "%") => arena.binary_expr(
                l,
                r,
                sym,
                TypeId::INT,
                BinaryStyle::Infix,
                1,
                binary_fn(|_cx, a, b| {
                    let divisor = expect_int(&b)?;
                    if divisor == 0 {
                        return Err(FormulaError::ValueMissing("modulo by zero".into()));
                    }
                    Ok(Value::Int(expect_int(&a)?.wrapping_rem(divisor)))
                }),
            ),
            (TypeId::INT, TypeId::INT, ">") => int_rel!(arena, l, r, sym, >),
            (TypeId::INT, TypeId::INT, ">=") => int_rel!(arena, l, r, sym, >=),
            (TypeId::INT, TypeId::INT, "<") => int_rel!(arena, l, r, sym, <),
            (TypeId::INT, TypeId::INT, "<=") => int_rel!(arena, l, r, sym, <=),
            (TypeId::INT, TypeId::INT, "==") => int_rel!(arena, l, r, sym, ==),
            (TypeId::INT, TypeId::INT, "!=") => int_rel!(arena, l, r, sym, !=),
            (TypeId::DOUBLE, TypeId::DOUBLE, "+") => double_arith!(arena, l, r, sym, +),
            (TypeId::DOUBLE, TypeId::DOUBLE, "-") => double_arith!(arena, l, r, sym, -),
            (TypeId::DOUBLE, TypeId::DOUBLE, "*") => double_arith!(arena, l, r, sym, *),
            (TypeId::DOUBLE, TypeId::DOUBLE, "/") => double_arith!(arena, l, r, sym, /),
            (TypeId::DOUBLE, TypeId::DOUBLE, ">") => double_rel!(arena, l, r, sym, >),
            (TypeId::DOUBLE, TypeId::DOUBLE, ">=") => double_rel!(arena, l, r, sym, >=),
            (TypeId::DOUBLE, TypeId::DOUBLE, "<") => double_rel!(arena, l, r, sym, <),
            (TypeId::DOUBLE, TypeId::DOUBLE, "<=") => double_rel!(arena, l, r, sym, <=),
            (TypeId::DOUBLE, TypeId::DOUBLE, "==") => double_rel!(arena, l, r, sym, ==),
            (TypeId::DOUBLE, TypeId::DOUBLE, "!=") => double_rel!(arena, l, r, sym, !=),
            (TypeId::BOOL, TypeId::BOOL, "&&") => arena.and_expr(l, r),
            (TypeId::BOOL, TypeId::BOOL, "||") => arena.or_expr(l, r),
            (TypeId::BOOL, TypeId::BOOL, "==") => arena.binary_expr(
                l,
                r,
                sym,
                TypeId::BOOL,
                BinaryStyle::Infix,
                1,
                binary_fn(|_cx, a, b| Ok(Value::Bool(expect_bool(&a)? == expect_bool(&b)?))),
            ),
            (TypeId::BOOL, TypeId::BOOL, "!=") => arena.binary_expr(
                l,
                r,
                sym,
                TypeId::BOOL,
                BinaryStyle::Infix,
                1,
                binary_fn(|_cx, a, b| Ok(Value::Bool(expect_bool(&a)? != expect_bool(&b)?))),
            ),
            (TypeId::STRING, TypeId::STRING, "==") => str_rel!(arena, l, r, sym, ==),
            (TypeId::STRING, TypeId::STRING, "!=") => str_rel!(arena, l, r, sym, !=),
            (TypeId::STRING, TypeId::STRING, ">") => str_rel!(arena, l, r, sym, >),
            (TypeId::STRING, TypeId::STRING, ">=") => str_rel!(arena, l, r, sym, >=),
            (TypeId::STRING, TypeId::STRING, "<") => str_rel!(arena, l, r, sym, <),
            (TypeId::STRING, TypeId::STRING, "<=") => str_rel!(arena, l, r, sym, <=),
            (TypeId::STRING, TypeId::INT, "[]") => arena.binary_expr(
                l,
                r,
                sym,
                TypeId::INT,
                BinaryStyle::Index,
                1,
                binary_fn(|_cx, a, b| {
                    let index = expect_int(&b)?;
                    let text = a
                        .as_str()
                        .ok_or_else(|| FormulaError::Internal("string operand expected".into()))?;
                    if index < 0 {
                        return Err(FormulaError::ValueMissing(format!(
                            "negative string index {index}"
                        )));
                    }
                    text.as_bytes()
                        .get(index as usize)
                        .map(|byte| Value::Int(i64::from(*byte)))
                        .ok_or_else(|| {
                            FormulaError::ValueMissing(format!(
                                "string index {index} out of range"
                            ))
                        })
                }),
            ),
            _ => {
                return Err(FormulaError::OperatorNotFound {
                    symbol: symbol.to_string(),
                    left: grammar.type_name(lt),
                    right: grammar.type_name(rt),
                })
            }
        };
        Ok(node)
    }
}

/// Install the standard matrix on a grammar.
pub fn register_standard_ops(grammar: &mut Grammar) {
    let unary = Rc::new(StandardUnary);
    let u = |g: &mut Grammar, input, out, symbol: &str| {
        g.register_unary_op(input, out, symbol, unary.clone());
    };
    u(grammar, TypeId::INT, TypeId::INT, "-");
    u(grammar, TypeId::DOUBLE, TypeId::DOUBLE, "-");
    u(grammar, TypeId::BOOL, TypeId::BOOL, "!");
    u(grammar, TypeId::INT, TypeId::DOUBLE, "(double)");
    u(grammar, TypeId::INT, TypeId::BOOL, "(bool)");
    u(grammar, TypeId::INT, TypeId::STRING, "(string)");
    u(grammar, TypeId::DOUBLE, TypeId::INT, "(int)");
    u(grammar, TypeId::DOUBLE, TypeId::STRING, "(string)");
    u(grammar, TypeId::BOOL, TypeId::INT, "(int)");
    u(grammar, TypeId::STRING, TypeId::INT, "(int)");
    u(grammar, TypeId::STRING, TypeId::DOUBLE, "(double)");
    u(grammar, TypeId::STRING, TypeId::INT, "count");
    u(grammar, TypeId::STRING, TypeId::BOOL, "empty");

    let binary = Rc::new(StandardBinary);
    let b = |g: &mut Grammar, lhs, rhs, out, symbol: &str| {
        g.register_binary_op(lhs, rhs, out, symbol, binary.clone());
    };
    for symbol in ["+", "-", "*", "/", "%"] {
        b(grammar, TypeId::INT, TypeId::INT, TypeId::INT, symbol);
    }
    for symbol in [">", ">=", "<", "<=", "==", "!="] {
        b(grammar, TypeId::INT, TypeId::INT, TypeId::BOOL, symbol);
    }
    for symbol in ["+", "-", "*", "/"] {
        b(grammar, TypeId::DOUBLE, TypeId::DOUBLE, TypeId::DOUBLE, symbol);
    }
    for symbol in [">", ">=", "<", "<=", "==", "!="] {
        b(grammar, TypeId::DOUBLE, TypeId::DOUBLE, TypeId::BOOL, symbol);
    }
    for symbol in ["&&", "||", "==", "!="] {
        b(grammar, TypeId::BOOL, TypeId::BOOL, TypeId::BOOL, symbol);
    }
    for symbol in ["==", "!=", ">", ">=", "<", "<="] {
        b(grammar, TypeId::STRING, TypeId::STRING, TypeId::BOOL, symbol);
    }
    b(grammar, TypeId::STRING, TypeId::INT, TypeId::INT, "[]");
}
