//! Hand-rolled precedence-climbing parser over the lexed token
//! stream, driving the [`ParseDriver`] callbacks.
//!
//! Precedence, loosest first: `->`, `? :`, `||`/OR, `&&`/AND,
//! relations and `in`, `+ -`, `* / %`, prefix `! -` and casts, then
//! postfix `[]` and `.name`. Keyword and symbolic AND/OR both map to
//! the `&&`/`||` operator keys. `(Ident)` is a cast when `Ident`
//! names a registered type.

use tracing::debug;

use verdict_expr::{ExprArena, ExprId, OwnedValue};
use verdict_grammar::Grammar;
use verdict_ir::{FormulaError, FormulaResult};
use verdict_lexer::{lex, unquote, LexedToken, Token};

use crate::driver::{Observer, ParseDriver};

/// Parse a formula into `arena`, returning the root node.
pub fn parse_into(
    arena: &mut ExprArena,
    grammar: &Grammar,
    observer: Option<&mut dyn Observer>,
    source: &str,
) -> FormulaResult<ExprId> {
    debug!(source, "parsing formula");
    let tokens = lex(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        driver: ParseDriver::new(arena, grammar, observer),
    };
    let root = parser.parse_arrow()?;
    parser.expect_end()?;
    Ok(root)
}

struct Parser<'s, 'a, 'g, 'o> {
    tokens: Vec<LexedToken<'s>>,
    pos: usize,
    driver: ParseDriver<'a, 'g, 'o>,
}

impl<'s> Parser<'s, '_, '_, '_> {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).map(|t| t.token)
    }

    fn peek_at(&self, offset: usize) -> Option<Token> {
        self.tokens.get(self.pos + offset).map(|t| t.token)
    }

    fn text(&self) -> &'s str {
        self.tokens.get(self.pos).map_or("", |t| t.text)
    }

    fn text_at(&self, offset: usize) -> &'s str {
        self.tokens.get(self.pos + offset).map_or("", |t| t.text)
    }

    fn bump(&mut self) -> Option<LexedToken<'s>> {
        let token = self.tokens.get(self.pos).copied();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn at(&self, token: Token) -> bool {
        self.peek() == Some(token)
    }

    fn eat(&mut self, token: Token) -> bool {
        if self.at(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token, what: &str) -> FormulaResult<LexedToken<'s>> {
        match self.bump() {
            Some(found) if found.token == token => Ok(found),
            Some(_) => {
                self.pos -= 1;
                Err(self.unexpected(what))
            }
            None => Err(FormulaError::ParseFailed(format!(
                "unexpected end of formula, expected {what}"
            ))),
        }
    }

    fn expect_ident(&mut self, what: &str) -> FormulaResult<&'s str> {
        let token = self.expect(Token::Ident, what)?;
        Ok(token.text)
    }

    fn expect_end(&mut self) -> FormulaResult<()> {
        if self.pos == self.tokens.len() {
            Ok(())
        } else {
            Err(self.unexpected("end of formula"))
        }
    }

    fn unexpected(&self, what: &str) -> FormulaError {
        match self.tokens.get(self.pos) {
            Some(token) => FormulaError::ParseFailed(format!(
                "unexpected {:?} at byte {}, expected {what}",
                token.text, token.start
            )),
            None => {
                FormulaError::ParseFailed(format!("unexpected end of formula, expected {what}"))
            }
        }
    }

    // `->` binds loosest; the binding is declared before the
    // predicate is parsed and popped by `on_arrow`.
    fn parse_arrow(&mut self) -> FormulaResult<ExprId> {
        let mut lhs = self.parse_ternary()?;
        while self.eat(Token::Arrow) {
            let name = self.expect_ident("a binding name after '->'")?;
            self.expect(Token::Question, "'?' introducing the filter predicate")?;
            self.driver.declare_local(lhs, name)?;
            let predicate = self.parse_or()?;
            lhs = self.driver.on_arrow(lhs, predicate, name)?;
        }
        Ok(lhs)
    }

    fn parse_ternary(&mut self) -> FormulaResult<ExprId> {
        let cond = self.parse_or()?;
        if !self.eat(Token::Question) {
            return Ok(cond);
        }
        let then = self.parse_ternary()?;
        self.expect(Token::Colon, "':' of the conditional")?;
        let otherwise = self.parse_ternary()?;
        self.driver.on_choice(cond, then, otherwise)
    }

    fn parse_or(&mut self) -> FormulaResult<ExprId> {
        let mut lhs = self.parse_and()?;
        while matches!(self.peek(), Some(Token::OrOr | Token::OrKw)) {
            self.pos += 1;
            let rhs = self.parse_and()?;
            lhs = self.driver.on_binary(lhs, rhs, "||")?;
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> FormulaResult<ExprId> {
        let mut lhs = self.parse_relation()?;
        while matches!(self.peek(), Some(Token::AndAnd | Token::AndKw)) {
            self.pos += 1;
            let rhs = self.parse_relation()?;
            lhs = self.driver.on_binary(lhs, rhs, "&&")?;
        }
        Ok(lhs)
    }

    fn parse_relation(&mut self) -> FormulaResult<ExprId> {
        let mut lhs = self.parse_additive()?;
        loop {
            let symbol = match self.peek() {
                Some(Token::Lt) => "<",
                Some(Token::Le) => "<=",
                Some(Token::Gt) => ">",
                Some(Token::Ge) => ">=",
                Some(Token::EqEq) => "==",
                Some(Token::NotEq) => "!=",
                Some(Token::InKw) => "in",
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.parse_additive()?;
            lhs = self.driver.on_binary(lhs, rhs, symbol)?;
        }
    }

    fn parse_additive(&mut self) -> FormulaResult<ExprId> {
        let mut lhs = self.parse_term()?;
        loop {
            let symbol = match self.peek() {
                Some(Token::Plus) => "+",
                Some(Token::Minus) => "-",
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.parse_term()?;
            lhs = self.driver.on_binary(lhs, rhs, symbol)?;
        }
    }

    fn parse_term(&mut self) -> FormulaResult<ExprId> {
        let mut lhs = self.parse_unary()?;
        loop {
            let symbol = match self.peek() {
                Some(Token::Star) => "*",
                Some(Token::Slash) => "/",
                Some(Token::Percent) => "%",
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.parse_unary()?;
            lhs = self.driver.on_binary(lhs, rhs, symbol)?;
        }
    }

    /// `(Ident)` is a cast iff `Ident` names a registered type;
    /// otherwise the parenthesis opens a grouped expression.
    fn at_cast(&self) -> bool {
        self.peek() == Some(Token::LParen)
            && self.peek_at(1) == Some(Token::Ident)
            && self.peek_at(2) == Some(Token::RParen)
            && self
                .driver
                .grammar()
                .find_type_name(self.text_at(1))
                .is_some()
    }

    fn parse_unary(&mut self) -> FormulaResult<ExprId> {
        match self.peek() {
            Some(Token::Bang) => {
                self.pos += 1;
                let child = self.parse_unary()?;
                self.driver.on_unary(child, "!")
            }
            Some(Token::Minus) => {
                self.pos += 1;
                let child = self.parse_unary()?;
                self.driver.on_unary(child, "-")
            }
            Some(Token::LParen) if self.at_cast() => {
                self.pos += 1;
                let name = self.expect_ident("a type name")?;
                self.expect(Token::RParen, "')' closing the cast")?;
                let child = self.parse_unary()?;
                self.driver.on_cast(child, name)
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> FormulaResult<ExprId> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.eat(Token::Dot) {
                let name = self.expect_ident("an attribute name after '.'")?;
                expr = self.driver.on_attribute(expr, name)?;
            } else if self.eat(Token::LBracket) {
                let index = self.parse_arrow()?;
                self.expect(Token::RBracket, "']' closing the index")?;
                expr = self.driver.on_binary(expr, index, "[]")?;
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_primary(&mut self) -> FormulaResult<ExprId> {
        match self.peek() {
            Some(Token::Int) => {
                let text = self.text();
                self.pos += 1;
                let value = text.parse::<i64>().map_err(|_| {
                    FormulaError::ParseFailed(format!("integer literal {text} out of range"))
                })?;
                self.driver.on_constant(OwnedValue::Int(value))
            }
            Some(Token::Double) => {
                let text = self.text();
                self.pos += 1;
                let value = text.parse::<f64>().map_err(|_| {
                    FormulaError::ParseFailed(format!("malformed number {text}"))
                })?;
                self.driver.on_constant(OwnedValue::Double(value))
            }
            Some(Token::True) => {
                self.pos += 1;
                self.driver.on_constant(OwnedValue::Bool(true))
            }
            Some(Token::False) => {
                self.pos += 1;
                self.driver.on_constant(OwnedValue::Bool(false))
            }
            Some(Token::SingleQuoted | Token::DoubleQuoted) => {
                let text = self.text();
                self.pos += 1;
                let unquoted = unquote(text);
                let interned = self.driver.intern(&unquoted);
                self.driver.on_constant(OwnedValue::Str(interned))
            }
            Some(Token::Dollar) => {
                self.pos += 1;
                let name = self.expect_ident("a fact name after '$'")?;
                self.driver.on_fact(name)
            }
            Some(Token::LParen) => {
                self.pos += 1;
                let inner = self.parse_arrow()?;
                self.expect(Token::RParen, "')'")?;
                Ok(inner)
            }
            _ => Err(self.unexpected("an expression")),
        }
    }
}
