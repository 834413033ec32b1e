//! Tree-walking interpreter for parsed conditions.
//!
//! Values borrow from the step being evaluated; nothing is copied out of
//! the entity map except the lazily-built JSON view of `state`.

use std::borrow::Cow;
use std::cell::OnceCell;
use std::cmp::Ordering;

use chronoscope_types::Step;
use serde_json::Value as Json;

use super::parser::{BinaryOp, Expr, Literal, UnaryOp};
use crate::aggregate;
use crate::error::EvaluationError;

/// Runtime value of a sub-expression.
#[derive(Debug, Clone)]
enum Value<'a> {
    Null,
    Bool(bool),
    Number(f64),
    Str(Cow<'a, str>),
    /// A JSON object or array from the step.
    Json(&'a Json),
    /// Returned by `country()` for an unknown id.
    EmptyObject,
}

impl<'a> Value<'a> {
    fn from_json(json: &'a Json) -> Self {
        match json {
            Json::Null => Self::Null,
            Json::Bool(b) => Self::Bool(*b),
            Json::Number(n) => n.as_f64().map_or(Self::Null, Self::Number),
            Json::String(s) => Self::Str(Cow::Borrowed(s)),
            Json::Array(_) | Json::Object(_) => Self::Json(json),
        }
    }

    fn truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::Str(s) => !s.is_empty(),
            Self::Json(_) | Self::EmptyObject => true,
        }
    }

    fn to_number(&self) -> f64 {
        match self {
            Self::Null | Self::Json(_) | Self::EmptyObject => f64::NAN,
            Self::Bool(b) => f64::from(u8::from(*b)),
            Self::Number(n) => *n,
            Self::Str(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    0.0
                } else {
                    trimmed.parse().unwrap_or(f64::NAN)
                }
            }
        }
    }

    fn render(&self) -> String {
        match self {
            Self::Null => "null".to_owned(),
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => format_number(*n),
            Self::Str(s) => s.to_string(),
            Self::Json(Json::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Json::Null => String::new(),
                    other => Value::from_json(other).render(),
                })
                .collect::<Vec<_>>()
                .join(","),
            Self::Json(_) | Self::EmptyObject => "[object Object]".to_owned(),
        }
    }

    #[allow(clippy::float_cmp)]
    fn strict_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Json(a), Self::Json(b)) => std::ptr::eq(*a, *b),
            _ => false,
        }
    }
}

/// Render a number the way ids and concatenation expect: integral values
/// without a fractional part.
fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_owned()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_owned()
    } else if n == 0.0 {
        "0".to_owned()
    } else {
        format!("{n}")
    }
}

/// Bound environment for one step.
struct Env<'s> {
    step: &'s Step,
    state: OnceCell<Json>,
}

impl<'s> Env<'s> {
    const fn new(step: &'s Step) -> Self {
        Self {
            step,
            state: OnceCell::new(),
        }
    }

    fn state(&self) -> &Json {
        self.state
            .get_or_init(|| serde_json::to_value(&self.step.state).unwrap_or(Json::Null))
    }

    #[allow(clippy::cast_precision_loss)]
    fn timestep(&self) -> f64 {
        self.step.timestep as f64
    }

    fn eval<'e>(&'e self, expr: &Expr) -> Result<Value<'e>, EvaluationError> {
        match expr {
            Expr::Literal(literal) => Ok(match literal {
                Literal::Null => Value::Null,
                Literal::Bool(b) => Value::Bool(*b),
                Literal::Number(n) => Value::Number(*n),
                Literal::Str(s) => Value::Str(Cow::Owned(s.clone())),
            }),
            Expr::Ident(name) => match name.as_str() {
                "t" => Ok(Value::Number(self.timestep())),
                "state" => Ok(Value::from_json(self.state())),
                "country" | "avg" => Err(EvaluationError::runtime(format!(
                    "`{name}` is a function and must be called"
                ))),
                _ => Err(EvaluationError::runtime(format!("`{name}` is not defined"))),
            },
            Expr::Member { object, property } => {
                let target = self.eval(object)?;
                member(&target, property).ok_or_else(|| {
                    EvaluationError::runtime(format!(
                        "cannot read `{property}` of null (`{object}`)"
                    ))
                })
            }
            Expr::Call { callee, args } => self.call(callee, args),
            Expr::Unary { op, operand } => {
                let value = self.eval(operand)?;
                Ok(match op {
                    UnaryOp::Not => Value::Bool(!value.truthy()),
                    UnaryOp::Neg => Value::Number(-value.to_number()),
                    UnaryOp::Plus => Value::Number(value.to_number()),
                })
            }
            Expr::Binary { op, left, right } => self.binary(*op, left, right),
        }
    }

    fn call<'e>(&'e self, callee: &Expr, args: &[Expr]) -> Result<Value<'e>, EvaluationError> {
        let Expr::Ident(name) = callee else {
            return Err(EvaluationError::runtime(format!("`{callee}` is not a function")));
        };
        let [arg] = args else {
            return Err(EvaluationError::runtime(format!(
                "`{name}` expects 1 argument, got {}",
                args.len()
            )));
        };
        let arg = self.eval(arg)?;

        match name.as_str() {
            "country" => {
                let id = match &arg {
                    Value::Str(s) => s.to_string(),
                    Value::Number(n) => format_number(*n),
                    _ => return Ok(Value::EmptyObject),
                };
                Ok(self
                    .step
                    .state
                    .entities
                    .get(id.as_str())
                    .map_or(Value::EmptyObject, Value::from_json))
            }
            "avg" => {
                let Value::Str(path) = &arg else {
                    return Err(EvaluationError::runtime(format!(
                        "`avg` expects a field path string, got {}",
                        arg.render()
                    )));
                };
                Ok(Value::Number(aggregate::mean(
                    &self.step.state.entities,
                    path,
                )))
            }
            _ => Err(EvaluationError::runtime(format!("`{name}` is not a function"))),
        }
    }

    fn binary<'e>(
        &'e self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
    ) -> Result<Value<'e>, EvaluationError> {
        let lhs = self.eval(left)?;
        match op {
            BinaryOp::And if !lhs.truthy() => return Ok(lhs),
            BinaryOp::Or if lhs.truthy() => return Ok(lhs),
            BinaryOp::And | BinaryOp::Or => return self.eval(right),
            _ => {}
        }
        let rhs = self.eval(right)?;

        Ok(match op {
            BinaryOp::Eq => Value::Bool(lhs.strict_eq(&rhs)),
            BinaryOp::Ne => Value::Bool(!lhs.strict_eq(&rhs)),
            BinaryOp::Lt => Value::Bool(compare(&lhs, &rhs) == Some(Ordering::Less)),
            BinaryOp::Le => Value::Bool(matches!(
                compare(&lhs, &rhs),
                Some(Ordering::Less | Ordering::Equal)
            )),
            BinaryOp::Gt => Value::Bool(compare(&lhs, &rhs) == Some(Ordering::Greater)),
            BinaryOp::Ge => Value::Bool(matches!(
                compare(&lhs, &rhs),
                Some(Ordering::Greater | Ordering::Equal)
            )),
            BinaryOp::Add => match (&lhs, &rhs) {
                (Value::Str(_), _) | (_, Value::Str(_)) => {
                    Value::Str(Cow::Owned(format!("{}{}", lhs.render(), rhs.render())))
                }
                _ => Value::Number(lhs.to_number() + rhs.to_number()),
            },
            BinaryOp::Sub => Value::Number(lhs.to_number() - rhs.to_number()),
            BinaryOp::Mul => Value::Number(lhs.to_number() * rhs.to_number()),
            BinaryOp::Div => Value::Number(lhs.to_number() / rhs.to_number()),
            BinaryOp::Rem => Value::Number(lhs.to_number() % rhs.to_number()),
            BinaryOp::And | BinaryOp::Or => lhs,
        })
    }
}

/// Member lookup. `None` means the receiver was null.
fn member<'e>(target: &Value<'e>, property: &str) -> Option<Value<'e>> {
    match target {
        Value::Null => None,
        &Value::Json(json) => Some(json_member(json, property)),
        Value::Str(s) if property == "length" => Some(length(s.chars().count())),
        _ => Some(Value::Null),
    }
}

fn json_member<'e>(json: &'e Json, property: &str) -> Value<'e> {
    match json {
        Json::Object(map) => map.get(property).map_or(Value::Null, Value::from_json),
        Json::Array(items) if property == "length" => length(items.len()),
        _ => Value::Null,
    }
}

#[allow(clippy::cast_precision_loss)]
const fn length(len: usize) -> Value<'static> {
    Value::Number(len as f64)
}

fn compare(lhs: &Value<'_>, rhs: &Value<'_>) -> Option<Ordering> {
    match (lhs, rhs) {
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        _ => lhs.to_number().partial_cmp(&rhs.to_number()),
    }
}

/// Evaluate a parsed expression against a step, coercing the result to a
/// boolean by truthiness.
pub(crate) fn evaluate(expr: &Expr, step: &Step) -> Result<bool, EvaluationError> {
    let env = Env::new(step);
    env.eval(expr).map(|value| value.truthy())
}
