//! Verdict Lexer - tokens of the formula surface syntax.
//!
//! A `logos`-derived token set covering literals, identifiers, the
//! operator symbols, keyword AND/OR, `in`, `$` fact references, the
//! `->` arrow and the `? :` ternary pair. String literals take single
//! or double quotes with backslash escapes.

use std::ops::Range;

use logos::Logos;
use verdict_ir::{FormulaError, FormulaResult};

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n]+")]
pub enum Token {
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("?")]
    Question,
    #[token(":")]
    Colon,
    #[token("->")]
    Arrow,
    #[token(".")]
    Dot,
    #[token("$")]
    Dollar,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("<=")]
    Le,
    #[token("<")]
    Lt,
    #[token(">=")]
    Ge,
    #[token(">")]
    Gt,
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("!")]
    Bang,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("AND")]
    AndKw,
    #[token("OR")]
    OrKw,
    #[token("in")]
    InKw,
    #[token("true")]
    True,
    #[token("false")]
    False,
    /// Decimal with a point, optionally leading or trailing.
    #[regex(r"[0-9]+\.[0-9]*|\.[0-9]+")]
    Double,
    #[regex(r"[0-9]+")]
    Int,
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*")]
    Ident,
    #[regex(r"'(?:[^'\\]|\\.)*'")]
    SingleQuoted,
    #[regex(r#""(?:[^"\\]|\\.)*""#)]
    DoubleQuoted,
}

/// A token with its source slice and byte span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LexedToken<'s> {
    pub token: Token,
    pub text: &'s str,
    pub start: usize,
}

/// Tokenize a whole formula up front.
pub fn lex(source: &str) -> FormulaResult<Vec<LexedToken<'_>>> {
    let mut lexer = Token::lexer(source);
    let mut tokens = Vec::new();
    while let Some(item) = lexer.next() {
        let Range { start, .. } = lexer.span();
        match item {
            Ok(token) => tokens.push(LexedToken {
                token,
                text: lexer.slice(),
                start,
            }),
            Err(()) => {
                return Err(FormulaError::ParseFailed(format!(
                    "unexpected character {:?} at byte {start}",
                    lexer.slice()
                )))
            }
        }
    }
    Ok(tokens)
}

/// Strip the quotes off a string literal and process `\x` escapes.
pub fn unquote(text: &str) -> String {
    let inner = &text[1..text.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                out.push(escaped);
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds(source: &str) -> Vec<Token> {
        lex(source).unwrap().into_iter().map(|t| t.token).collect()
    }

    #[test]
    fn numbers_split_int_and_double() {
        assert_eq!(kinds("64"), vec![Token::Int]);
        assert_eq!(kinds(".684"), vec![Token::Double]);
        assert_eq!(kinds("23."), vec![Token::Double]);
        assert_eq!(kinds("65.89"), vec![Token::Double]);
        assert_eq!(kinds("-64"), vec![Token::Minus, Token::Int]);
    }

    #[test]
    fn keywords_beat_identifiers_only_on_exact_match() {
        assert_eq!(kinds("AND"), vec![Token::AndKw]);
        assert_eq!(kinds("ANDroid"), vec![Token::Ident]);
        assert_eq!(kinds("in"), vec![Token::InKw]);
        assert_eq!(kinds("inside"), vec![Token::Ident]);
        assert_eq!(kinds("true false"), vec![Token::True, Token::False]);
    }

    #[test]
    fn operators_lex_greedily() {
        assert_eq!(kinds("<="), vec![Token::Le]);
        assert_eq!(kinds(">="), vec![Token::Ge]);
        assert_eq!(kinds("->"), vec![Token::Arrow]);
        assert_eq!(kinds("- >"), vec![Token::Minus, Token::Gt]);
        assert_eq!(kinds("a&&b"), vec![Token::Ident, Token::AndAnd, Token::Ident]);
    }

    #[test]
    fn strings_take_either_quote() {
        let tokens = lex("'Pouet' \"Y\"").unwrap();
        assert_eq!(tokens[0].token, Token::SingleQuoted);
        assert_eq!(unquote(tokens[0].text), "Pouet");
        assert_eq!(tokens[1].token, Token::DoubleQuoted);
        assert_eq!(unquote(tokens[1].text), "Y");
        assert_eq!(unquote(r"'it\'s'"), "it's");
    }

    #[test]
    fn fact_and_attribute_shapes() {
        assert_eq!(
            kinds("$Customer.Services[2]"),
            vec![
                Token::Dollar,
                Token::Ident,
                Token::Dot,
                Token::Ident,
                Token::LBracket,
                Token::Int,
                Token::RBracket
            ]
        );
    }

    #[test]
    fn bad_characters_fail_with_position() {
        let err = lex("1 # 2").unwrap_err();
        assert!(err.to_string().contains("byte 2"));
    }
}
