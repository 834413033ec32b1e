//! Recursive-descent parser producing the condition AST.
//!
//! Precedence, loosest first: `||`, `&&`, equality, relational, additive,
//! multiplicative, unary, then member access and calls.
//!
//! Every node counts towards [`MAX_DEPTH`], so a long operator chain such
//! as `t + t + t ...` or a long member chain is refused just like deeply
//! parenthesized input. The interpreter recurses once per tree level and
//! relies on this bound.

use std::fmt;

use super::lexer::{Token, TokenKind};
use crate::error::EvaluationError;

/// Deepest tree the parser accepts.
pub const MAX_DEPTH: usize = 64;

/// Literal values.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// `null`
    Null,
    /// `true` / `false`
    Bool(bool),
    /// Numeric literal.
    Number(f64),
    /// String literal.
    Str(String),
}

/// Prefix operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `!`
    Not,
    /// `-`
    Neg,
    /// `+`
    Plus,
}

/// Infix operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `||`
    Or,
    /// `&&`
    And,
    /// `==` or `===`
    Eq,
    /// `!=` or `!==`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Rem,
}

impl BinaryOp {
    const fn symbol(self) -> &'static str {
        match self {
            Self::Or => "||",
            Self::And => "&&",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
        }
    }
}

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A literal.
    Literal(Literal),
    /// A bare identifier.
    Ident(String),
    /// `object.property`
    Member {
        /// Receiver.
        object: Box<Expr>,
        /// Member name.
        property: String,
    },
    /// `callee(args...)`
    Call {
        /// Called expression.
        callee: Box<Expr>,
        /// Arguments in order.
        args: Vec<Expr>,
    },
    /// Prefix operation.
    Unary {
        /// Operator.
        op: UnaryOp,
        /// Operand.
        operand: Box<Expr>,
    },
    /// Infix operation.
    Binary {
        /// Operator.
        op: BinaryOp,
        /// Left operand.
        left: Box<Expr>,
        /// Right operand.
        right: Box<Expr>,
    },
}

impl Expr {
    /// Height of the tree; a lone literal or identifier is 1.
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut pending = vec![(self, 1_usize)];
        while let Some((expr, level)) = pending.pop() {
            deepest = deepest.max(level);
            let below = level.saturating_add(1);
            match expr {
                Self::Literal(_) | Self::Ident(_) => {}
                Self::Member { object, .. } => pending.push((object, below)),
                Self::Call { callee, args } => {
                    pending.push((callee, below));
                    pending.extend(args.iter().map(|arg| (arg, below)));
                }
                Self::Unary { operand, .. } => pending.push((operand, below)),
                Self::Binary { left, right, .. } => {
                    pending.push((left, below));
                    pending.push((right, below));
                }
            }
        }
        deepest
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(Literal::Null) => f.write_str("null"),
            Self::Literal(Literal::Bool(b)) => write!(f, "{b}"),
            Self::Literal(Literal::Number(n)) => write!(f, "{n}"),
            Self::Literal(Literal::Str(s)) => write!(f, "'{s}'"),
            Self::Ident(name) => f.write_str(name),
            Self::Member { object, property } => write!(f, "{object}.{property}"),
            Self::Call { callee, args } => {
                write!(f, "{callee}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
            Self::Unary { op, operand } => {
                let symbol = match op {
                    UnaryOp::Not => "!",
                    UnaryOp::Neg => "-",
                    UnaryOp::Plus => "+",
                };
                write!(f, "{symbol}{operand}")
            }
            Self::Binary { op, left, right } => {
                write!(f, "({left} {} {right})", op.symbol())
            }
        }
    }
}

/// Parse a token stream into a single expression.
///
/// # Errors
///
/// Returns [`EvaluationError::Syntax`] on unexpected tokens, trailing input
/// or a tree deeper than [`MAX_DEPTH`].
pub fn parse(tokens: &[Token]) -> Result<Expr, EvaluationError> {
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.or()?;
    let trailing = parser.peek();
    if trailing.kind != TokenKind::Eof {
        return Err(EvaluationError::syntax(
            trailing.offset,
            format!("unexpected {} after expression", describe(&trailing.kind)),
        ));
    }
    if expr.depth() > MAX_DEPTH {
        return Err(EvaluationError::syntax(
            0,
            format!("expression nested deeper than {MAX_DEPTH}"),
        ));
    }
    Ok(expr)
}

static EOF: Token = Token {
    kind: TokenKind::Eof,
    offset: 0,
};

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    depth: usize,
}

impl Parser<'_> {
    fn peek(&self) -> &Token {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .unwrap_or(&EOF)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.pos = self.pos.saturating_add(1);
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if &self.peek().kind == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<(), EvaluationError> {
        if self.eat(kind) {
            return Ok(());
        }
        let found = self.peek();
        Err(EvaluationError::syntax(
            found.offset,
            format!("expected {what}, found {}", describe(&found.kind)),
        ))
    }

    fn enter(&mut self) -> Result<(), EvaluationError> {
        self.depth = self.depth.saturating_add(1);
        if self.depth > MAX_DEPTH {
            return Err(EvaluationError::syntax(
                self.peek().offset,
                format!("expression nested deeper than {MAX_DEPTH}"),
            ));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    fn leave_n(&mut self, levels: usize) {
        self.depth = self.depth.saturating_sub(levels);
    }

    /// Parse a left-associative chain. Each operator adds a tree level and
    /// is charged against the depth budget until the chain is complete.
    fn binary_level(
        &mut self,
        ops: fn(&TokenKind) -> Option<BinaryOp>,
        next: fn(&mut Self) -> Result<Expr, EvaluationError>,
    ) -> Result<Expr, EvaluationError> {
        let mut levels = 0_usize;
        let chain = self.binary_chain(ops, next, &mut levels);
        self.leave_n(levels);
        chain
    }

    fn binary_chain(
        &mut self,
        ops: fn(&TokenKind) -> Option<BinaryOp>,
        next: fn(&mut Self) -> Result<Expr, EvaluationError>,
        levels: &mut usize,
    ) -> Result<Expr, EvaluationError> {
        let mut left = next(self)?;
        while let Some(op) = ops(&self.peek().kind) {
            self.enter()?;
            *levels = levels.saturating_add(1);
            self.advance();
            let right = next(self)?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn or(&mut self) -> Result<Expr, EvaluationError> {
        self.enter()?;
        let expr = self.binary_level(
            |k| matches!(k, TokenKind::OrOr).then_some(BinaryOp::Or),
            Self::and,
        );
        self.leave();
        expr
    }

    fn and(&mut self) -> Result<Expr, EvaluationError> {
        self.binary_level(
            |k| matches!(k, TokenKind::AndAnd).then_some(BinaryOp::And),
            Self::equality,
        )
    }

    fn equality(&mut self) -> Result<Expr, EvaluationError> {
        self.binary_level(
            |k| match k {
                TokenKind::EqEq | TokenKind::StrictEq => Some(BinaryOp::Eq),
                TokenKind::NotEq | TokenKind::StrictNotEq => Some(BinaryOp::Ne),
                _ => None,
            },
            Self::relational,
        )
    }

    fn relational(&mut self) -> Result<Expr, EvaluationError> {
        self.binary_level(
            |k| match k {
                TokenKind::Lt => Some(BinaryOp::Lt),
                TokenKind::Le => Some(BinaryOp::Le),
                TokenKind::Gt => Some(BinaryOp::Gt),
                TokenKind::Ge => Some(BinaryOp::Ge),
                _ => None,
            },
            Self::additive,
        )
    }

    fn additive(&mut self) -> Result<Expr, EvaluationError> {
        self.binary_level(
            |k| match k {
                TokenKind::Plus => Some(BinaryOp::Add),
                TokenKind::Minus => Some(BinaryOp::Sub),
                _ => None,
            },
            Self::multiplicative,
        )
    }

    fn multiplicative(&mut self) -> Result<Expr, EvaluationError> {
        self.binary_level(
            |k| match k {
                TokenKind::Star => Some(BinaryOp::Mul),
                TokenKind::Slash => Some(BinaryOp::Div),
                TokenKind::Percent => Some(BinaryOp::Rem),
                _ => None,
            },
            Self::unary,
        )
    }

    fn unary(&mut self) -> Result<Expr, EvaluationError> {
        let op = match self.peek().kind {
            TokenKind::Bang => UnaryOp::Not,
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Plus => UnaryOp::Plus,
            _ => return self.postfix(),
        };
        self.advance();
        self.enter()?;
        let operand = self.unary();
        self.leave();
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand?),
        })
    }

    fn postfix(&mut self) -> Result<Expr, EvaluationError> {
        let mut levels = 0_usize;
        let chain = self.postfix_chain(&mut levels);
        self.leave_n(levels);
        chain
    }

    fn postfix_chain(&mut self, levels: &mut usize) -> Result<Expr, EvaluationError> {
        let mut expr = self.primary()?;
        loop {
            if matches!(self.peek().kind, TokenKind::Dot | TokenKind::LParen) {
                self.enter()?;
                *levels = levels.saturating_add(1);
            }
            if self.eat(&TokenKind::Dot) {
                let token = self.advance();
                let property = match token.kind {
                    TokenKind::Ident(name) => name,
                    other => {
                        return Err(EvaluationError::syntax(
                            token.offset,
                            format!("expected member name, found {}", describe(&other)),
                        ));
                    }
                };
                expr = Expr::Member {
                    object: Box::new(expr),
                    property,
                };
            } else if self.eat(&TokenKind::LParen) {
                let args = self.arguments()?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                };
            } else {
                return Ok(expr);
            }
        }
    }

    fn arguments(&mut self) -> Result<Vec<Expr>, EvaluationError> {
        let mut args = Vec::new();
        if self.eat(&TokenKind::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.or()?);
            if self.eat(&TokenKind::RParen) {
                return Ok(args);
            }
            self.expect(&TokenKind::Comma, "`,` or `)`")?;
        }
    }

    fn primary(&mut self) -> Result<Expr, EvaluationError> {
        let token = self.advance();
        match token.kind {
            TokenKind::Number(n) => Ok(Expr::Literal(Literal::Number(n))),
            TokenKind::Str(s) => Ok(Expr::Literal(Literal::Str(s))),
            TokenKind::Ident(name) => Ok(match name.as_str() {
                "true" => Expr::Literal(Literal::Bool(true)),
                "false" => Expr::Literal(Literal::Bool(false)),
                "null" => Expr::Literal(Literal::Null),
                _ => Expr::Ident(name),
            }),
            TokenKind::LParen => {
                let inner = self.or()?;
                self.expect(&TokenKind::RParen, "`)`")?;
                Ok(inner)
            }
            other => Err(EvaluationError::syntax(
                token.offset,
                format!("expected expression, found {}", describe(&other)),
            )),
        }
    }
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Number(n) => format!("number {n}"),
        TokenKind::Str(s) => format!("string '{s}'"),
        TokenKind::Ident(name) => format!("`{name}`"),
        TokenKind::Eof => "end of expression".to_owned(),
        other => format!("{other:?}"),
    }
}
