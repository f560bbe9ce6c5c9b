//! Purpose: Build property filter expressions for feature queries.
//! Exports: `Property`, `Expression`, `RangeOp`.
//! Role: Client-side expression tree serialized into the service's `query_expr` JSON.
//! Invariants: Combining two `and` (or two `or`) expressions flattens their parts.
//! Invariants: Serialization is the only evaluation; filters run server-side.
use super::error::{Error, ErrorKind};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value, json};
use std::ops::{BitAnd, BitOr};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RangeOp {
    Lt,
    Lte,
    Gt,
    Gte,
}

impl RangeOp {
    fn as_str(self) -> &'static str {
        match self {
            RangeOp::Lt => "lt",
            RangeOp::Lte => "lte",
            RangeOp::Gt => "gt",
            RangeOp::Gte => "gte",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expression {
    Eq { name: String, value: Value },
    Ne { name: String, value: Value },
    Range { name: String, bounds: Vec<(RangeOp, Value)> },
    Like { name: String, pattern: String },
    And(Vec<Expression>),
    Or(Vec<Expression>),
}

/// Named feature property used to start an expression, e.g. `Property::new("temperature").ge(50)`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Property {
    name: String,
}

impl Property {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn eq(&self, value: impl Into<Value>) -> Expression {
        Expression::Eq {
            name: self.name.clone(),
            value: value.into(),
        }
    }

    pub fn ne(&self, value: impl Into<Value>) -> Expression {
        Expression::Ne {
            name: self.name.clone(),
            value: value.into(),
        }
    }

    pub fn lt(&self, value: impl Into<Value>) -> Expression {
        self.range(RangeOp::Lt, value.into())
    }

    pub fn le(&self, value: impl Into<Value>) -> Expression {
        self.range(RangeOp::Lte, value.into())
    }

    pub fn gt(&self, value: impl Into<Value>) -> Expression {
        self.range(RangeOp::Gt, value.into())
    }

    pub fn ge(&self, value: impl Into<Value>) -> Expression {
        self.range(RangeOp::Gte, value.into())
    }

    /// Half-open range: `low <= property < high`.
    pub fn between(&self, low: impl Into<Value>, high: impl Into<Value>) -> Expression {
        Expression::Range {
            name: self.name.clone(),
            bounds: vec![(RangeOp::Gte, low.into()), (RangeOp::Lt, high.into())],
        }
    }

    /// SQL-style pattern match; `%` matches any run of characters.
    pub fn like(&self, pattern: impl Into<String>) -> Expression {
        Expression::Like {
            name: self.name.clone(),
            pattern: pattern.into(),
        }
    }

    pub fn any_of<I, V>(&self, values: I) -> Expression
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Expression::Or(values.into_iter().map(|value| self.eq(value)).collect())
    }

    fn range(&self, op: RangeOp, value: Value) -> Expression {
        Expression::Range {
            name: self.name.clone(),
            bounds: vec![(op, value)],
        }
    }
}

impl Expression {
    pub fn and(self, other: Expression) -> Expression {
        let mut parts = match self {
            Expression::And(parts) => parts,
            other => vec![other],
        };
        match other {
            Expression::And(more) => parts.extend(more),
            other => parts.push(other),
        }
        Expression::And(parts)
    }

    pub fn or(self, other: Expression) -> Expression {
        let mut parts = match self {
            Expression::Or(parts) => parts,
            other => vec![other],
        };
        match other {
            Expression::Or(more) => parts.extend(more),
            other => parts.push(other),
        }
        Expression::Or(parts)
    }

    pub fn to_json(&self) -> Value {
        match self {
            Expression::Eq { name, value } => json!({ "eq": { name.as_str(): value } }),
            Expression::Ne { name, value } => json!({ "ne": { name.as_str(): value } }),
            Expression::Range { name, bounds } => {
                let mut parts = Map::new();
                for (op, value) in bounds {
                    parts.insert(op.as_str().to_string(), value.clone());
                }
                json!({ "range": { name.as_str(): parts } })
            }
            Expression::Like { name, pattern } => json!({ "like": { name.as_str(): pattern } }),
            Expression::And(parts) => {
                json!({ "and": parts.iter().map(Expression::to_json).collect::<Vec<_>>() })
            }
            Expression::Or(parts) => {
                json!({ "or": parts.iter().map(Expression::to_json).collect::<Vec<_>>() })
            }
        }
    }

    /// Parses a single `name<op>value` clause as accepted by the CLI `--where` flag.
    ///
    /// Operators: `=`, `!=`, `<`, `<=`, `>`, `>=`, `~` (like). The value is read as
    /// JSON when it parses, otherwise as a bare string.
    pub fn parse_clause(clause: &str) -> Result<Expression, Error> {
        const OPERATORS: [&str; 7] = ["!=", "<=", ">=", "=", "<", ">", "~"];

        let Some((index, op)) = clause
            .char_indices()
            .find_map(|(index, _)| {
                OPERATORS
                    .iter()
                    .find(|op| clause[index..].starts_with(**op))
                    .map(|op| (index, *op))
            })
        else {
            return Err(clause_error(clause, "missing comparison operator"));
        };

        let name = clause[..index].trim();
        let raw = clause[index + op.len()..].trim();
        if name.is_empty() {
            return Err(clause_error(clause, "missing property name"));
        }
        if raw.is_empty() {
            return Err(clause_error(clause, "missing value"));
        }

        let value = serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::from(raw));
        let property = Property::new(name);
        let expression = match op {
            "=" => property.eq(value),
            "!=" => property.ne(value),
            "<" => property.lt(value),
            "<=" => property.le(value),
            ">" => property.gt(value),
            ">=" => property.ge(value),
            _ => match value {
                Value::String(pattern) => property.like(pattern),
                other => property.like(other.to_string()),
            },
        };
        Ok(expression)
    }
}

fn clause_error(clause: &str, reason: &str) -> Error {
    Error::new(ErrorKind::Usage)
        .with_message(format!("invalid filter clause {clause:?}: {reason}"))
        .with_hint("Use name<op>value with one of =, !=, <, <=, >, >=, ~ (e.g. population>=1000).")
}

impl BitAnd for Expression {
    type Output = Expression;

    fn bitand(self, rhs: Expression) -> Expression {
        self.and(rhs)
    }
}

impl BitOr for Expression {
    type Output = Expression;

    fn bitor(self, rhs: Expression) -> Expression {
        self.or(rhs)
    }
}

impl Serialize for Expression {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}
