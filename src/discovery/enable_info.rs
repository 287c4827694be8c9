//! Enable-info expressions.
//!
//! Filters may carry an expression deciding whether they are offered for
//! the current document, e.g.
//!
//! ```text
//! in (PSHOP_ImageMode, RGBMode, GrayScaleMode) && PSHOP_ImageDepth == 8
//! ```
//!
//! Identifiers the host does not know evaluate to "unknown", and an unknown
//! result enables the filter.

use crate::plugin::ImageMode;
use thiserror::Error;
use winnow::Parser;
use winnow::ascii::{digit1, multispace0};
use winnow::combinator::{alt, opt, separated};
use winnow::error::ContextError;
use winnow::token::take_while;

type WResult<T> = std::result::Result<T, ContextError>;

/// An expression that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid enable expression: {0}")]
pub struct EnableParseError(String);

/// Document state an expression is evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnableContext {
    /// Document image mode.
    pub image_mode: ImageMode,
    /// Bits per channel.
    pub image_depth: u32,
    /// Whether a selection is active.
    pub has_selection: bool,
    /// Whether the target layer has transparency.
    pub has_transparency: bool,
    /// Number of target channels.
    pub target_channels: u32,
}

impl Default for EnableContext {
    fn default() -> Self {
        Self {
            image_mode: ImageMode::Rgb,
            image_depth: 8,
            has_selection: false,
            has_transparency: true,
            target_channels: 4,
        }
    }
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

/// Parsed enable-info expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnableExpr {
    /// `true` or `false`.
    Bool(bool),
    /// Integer literal.
    Int(i64),
    /// Variable or constant name.
    Ident(String),
    /// `!expr`
    Not(Box<EnableExpr>),
    /// Binary comparison.
    Compare(CompareOp, Box<EnableExpr>, Box<EnableExpr>),
    /// `a && b`
    And(Box<EnableExpr>, Box<EnableExpr>),
    /// `a || b`
    Or(Box<EnableExpr>, Box<EnableExpr>),
    /// `in (subject, candidate, ...)`
    In(Box<EnableExpr>, Vec<EnableExpr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Value {
    Int(i64),
    Bool(bool),
}

impl Value {
    fn truthy(self) -> bool {
        match self {
            Value::Int(n) => n != 0,
            Value::Bool(b) => b,
        }
    }

    fn as_int(self) -> i64 {
        match self {
            Value::Int(n) => n,
            Value::Bool(b) => i64::from(b),
        }
    }
}

impl EnableExpr {
    /// Parse an expression.
    pub fn parse(source: &str) -> Result<Self, EnableParseError> {
        expression_complete
            .parse(source.trim())
            .map_err(|e| EnableParseError(e.to_string()))
    }

    /// Whether the filter is enabled in `ctx`.
    pub fn is_enabled(&self, ctx: &EnableContext) -> bool {
        self.eval(ctx).is_none_or(Value::truthy)
    }

    fn eval(&self, ctx: &EnableContext) -> Option<Value> {
        match self {
            Self::Bool(b) => Some(Value::Bool(*b)),
            Self::Int(n) => Some(Value::Int(*n)),
            Self::Ident(name) => resolve(name, ctx),
            Self::Not(inner) => inner.eval(ctx).map(|v| Value::Bool(!v.truthy())),
            Self::Compare(op, lhs, rhs) => {
                let (l, r) = (lhs.eval(ctx)?.as_int(), rhs.eval(ctx)?.as_int());
                Some(Value::Bool(match op {
                    CompareOp::Eq => l == r,
                    CompareOp::Ne => l != r,
                    CompareOp::Lt => l < r,
                    CompareOp::Le => l <= r,
                    CompareOp::Gt => l > r,
                    CompareOp::Ge => l >= r,
                }))
            }
            Self::And(lhs, rhs) => match (lhs.eval(ctx).map(Value::truthy), rhs.eval(ctx).map(Value::truthy)) {
                (Some(false), _) | (_, Some(false)) => Some(Value::Bool(false)),
                (Some(true), Some(true)) => Some(Value::Bool(true)),
                _ => None,
            },
            Self::Or(lhs, rhs) => match (lhs.eval(ctx).map(Value::truthy), rhs.eval(ctx).map(Value::truthy)) {
                (Some(true), _) | (_, Some(true)) => Some(Value::Bool(true)),
                (Some(false), Some(false)) => Some(Value::Bool(false)),
                _ => None,
            },
            Self::In(subject, candidates) => {
                let subject = subject.eval(ctx)?.as_int();
                let mut unknown = false;
                for candidate in candidates {
                    match candidate.eval(ctx) {
                        Some(v) if v.as_int() == subject => return Some(Value::Bool(true)),
                        Some(_) => {}
                        None => unknown = true,
                    }
                }
                (!unknown).then_some(Value::Bool(false))
            }
        }
    }
}

fn resolve(name: &str, ctx: &EnableContext) -> Option<Value> {
    match name {
        "PSHOP_ImageMode" => Some(Value::Int(ctx.image_mode as i64)),
        "PSHOP_ImageDepth" => Some(Value::Int(i64::from(ctx.image_depth))),
        "PSHOP_NumTargetChannels" => Some(Value::Int(i64::from(ctx.target_channels))),
        "PSHOP_HasSelection" => Some(Value::Bool(ctx.has_selection)),
        "PSHOP_HasTransparency" => Some(Value::Bool(ctx.has_transparency)),
        other => ImageMode::from_name(other).map(|mode| Value::Int(mode as i64)),
    }
}

fn expression_complete(input: &mut &str) -> WResult<EnableExpr> {
    let expr = or_expr.parse_next(input)?;
    multispace0.parse_next(input)?;
    if !input.is_empty() {
        return Err(ContextError::new());
    }
    Ok(expr)
}

fn or_expr(input: &mut &str) -> WResult<EnableExpr> {
    let mut lhs = and_expr.parse_next(input)?;
    while opt(operator("||")).parse_next(input)?.is_some() {
        let rhs = and_expr.parse_next(input)?;
        lhs = EnableExpr::Or(Box::new(lhs), Box::new(rhs));
    }
    Ok(lhs)
}

fn and_expr(input: &mut &str) -> WResult<EnableExpr> {
    let mut lhs = comparison.parse_next(input)?;
    while opt(operator("&&")).parse_next(input)?.is_some() {
        let rhs = comparison.parse_next(input)?;
        lhs = EnableExpr::And(Box::new(lhs), Box::new(rhs));
    }
    Ok(lhs)
}

fn comparison(input: &mut &str) -> WResult<EnableExpr> {
    let lhs = unary.parse_next(input)?;
    let op = opt(alt((
        operator("==").value(CompareOp::Eq),
        operator("!=").value(CompareOp::Ne),
        operator("<=").value(CompareOp::Le),
        operator(">=").value(CompareOp::Ge),
        operator("<").value(CompareOp::Lt),
        operator(">").value(CompareOp::Gt),
    )))
    .parse_next(input)?;
    match op {
        Some(op) => {
            let rhs = unary.parse_next(input)?;
            Ok(EnableExpr::Compare(op, Box::new(lhs), Box::new(rhs)))
        }
        None => Ok(lhs),
    }
}

fn unary(input: &mut &str) -> WResult<EnableExpr> {
    multispace0.parse_next(input)?;
    if input.starts_with('!') && !input.starts_with("!=") {
        '!'.parse_next(input)?;
        let inner = unary.parse_next(input)?;
        return Ok(EnableExpr::Not(Box::new(inner)));
    }
    primary.parse_next(input)
}

fn primary(input: &mut &str) -> WResult<EnableExpr> {
    multispace0.parse_next(input)?;
    alt((parenthesized, in_list, integer, word)).parse_next(input)
}

fn parenthesized(input: &mut &str) -> WResult<EnableExpr> {
    '('.parse_next(input)?;
    let expr = or_expr.parse_next(input)?;
    operator(")").parse_next(input)?;
    Ok(expr)
}

fn in_list(input: &mut &str) -> WResult<EnableExpr> {
    "in".parse_next(input)?;
    operator("(").parse_next(input)?;
    let mut items: Vec<EnableExpr> = separated(1.., or_expr, operator(",")).parse_next(input)?;
    operator(")").parse_next(input)?;
    let subject = items.remove(0);
    Ok(EnableExpr::In(Box::new(subject), items))
}

fn integer(input: &mut &str) -> WResult<EnableExpr> {
    let text: &str = (opt('-'), digit1).take().parse_next(input)?;
    text.parse::<i64>()
        .map(EnableExpr::Int)
        .map_err(|_| ContextError::new())
}

fn word(input: &mut &str) -> WResult<EnableExpr> {
    let name: &str = (
        take_while(1, |c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(0.., |c: char| c.is_ascii_alphanumeric() || c == '_'),
    )
        .take()
        .parse_next(input)?;
    Ok(match name {
        "true" => EnableExpr::Bool(true),
        "false" => EnableExpr::Bool(false),
        _ => EnableExpr::Ident(name.to_string()),
    })
}

/// A token surrounded by optional whitespace.
fn operator<'a>(mut token: &'static str) -> impl Parser<&'a str, &'a str, ContextError> {
    move |input: &mut &'a str| {
        multispace0.parse_next(input)?;
        let matched = token.parse_next(input)?;
        multispace0.parse_next(input)?;
        Ok(matched)
    }
}
