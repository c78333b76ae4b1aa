//! Condition expressions over earlier node outputs

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    #[default]
    String,
    Number,
    Boolean,
}

/// Points at a named output of an earlier node
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Selector {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub value_type: ValueType,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CompareOperator {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogicalOperator {
    And,
    Or,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Expr {
    Const {
        value: String,
        #[serde(rename = "valueType", default)]
        value_type: ValueType,
    },
    Var {
        selector: Selector,
    },
    Comparison {
        left: Box<Expr>,
        operator: CompareOperator,
        right: Box<Expr>,
    },
    Logical {
        left: Box<Expr>,
        operator: LogicalOperator,
        right: Box<Expr>,
    },
    Not {
        expr: Box<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprValue {
    String(String),
    Number(f64),
    Boolean(bool),
}

impl ExprValue {
    fn parse(raw: &str, value_type: ValueType) -> Result<Self, DomainError> {
        match value_type {
            ValueType::String => Ok(Self::String(raw.to_string())),
            ValueType::Number => raw
                .trim()
                .parse::<f64>()
                .map(Self::Number)
                .map_err(|_| DomainError::Expression(format!("`{raw}` is not a number"))),
            ValueType::Boolean => match raw.trim() {
                "true" => Ok(Self::Boolean(true)),
                "false" => Ok(Self::Boolean(false)),
                _ => Err(DomainError::Expression(format!("`{raw}` is not a boolean"))),
            },
        }
    }

    fn as_bool(&self) -> Result<bool, DomainError> {
        match self {
            Self::Boolean(b) => Ok(*b),
            other => Err(DomainError::Expression(format!(
                "expected a boolean, got {other:?}"
            ))),
        }
    }
}

impl Expr {
    /// Evaluate with `resolve(node_id, output_name)` supplying variable values
    pub fn eval<F>(&self, resolve: &F) -> Result<ExprValue, DomainError>
    where
        F: Fn(&str, &str) -> Option<String>,
    {
        match self {
            Expr::Const { value, value_type } => ExprValue::parse(value, *value_type),
            Expr::Var { selector } => {
                let raw = resolve(&selector.id, &selector.name).ok_or_else(|| {
                    DomainError::Expression(format!(
                        "variable {}#{} not found",
                        selector.id, selector.name
                    ))
                })?;
                ExprValue::parse(&raw, selector.value_type)
            }
            Expr::Comparison {
                left,
                operator,
                right,
            } => {
                let l = left.eval(resolve)?;
                let r = right.eval(resolve)?;
                compare(&l, *operator, &r).map(ExprValue::Boolean)
            }
            Expr::Logical {
                left,
                operator,
                right,
            } => {
                let l = left.eval(resolve)?.as_bool()?;
                let result = match operator {
                    LogicalOperator::And => l && right.eval(resolve)?.as_bool()?,
                    LogicalOperator::Or => l || right.eval(resolve)?.as_bool()?,
                };
                Ok(ExprValue::Boolean(result))
            }
            Expr::Not { expr } => Ok(ExprValue::Boolean(!expr.eval(resolve)?.as_bool()?)),
        }
    }

    pub fn eval_bool<F>(&self, resolve: &F) -> Result<bool, DomainError>
    where
        F: Fn(&str, &str) -> Option<String>,
    {
        self.eval(resolve)?.as_bool()
    }
}

fn compare(l: &ExprValue, op: CompareOperator, r: &ExprValue) -> Result<bool, DomainError> {
    use CompareOperator::*;
    match (l, r) {
        (ExprValue::Number(a), ExprValue::Number(b)) => Ok(match op {
            Eq => a == b,
            Neq => a != b,
            Gt => a > b,
            Gte => a >= b,
            Lt => a < b,
            Lte => a <= b,
        }),
        (ExprValue::String(a), ExprValue::String(b)) => match op {
            Eq => Ok(a == b),
            Neq => Ok(a != b),
            _ => Err(DomainError::Expression(
                "strings only support eq and neq".into(),
            )),
        },
        (ExprValue::Boolean(a), ExprValue::Boolean(b)) => match op {
            Eq => Ok(a == b),
            Neq => Ok(a != b),
            _ => Err(DomainError::Expression(
                "booleans only support eq and neq".into(),
            )),
        },
        _ => Err(DomainError::Expression(format!(
            "cannot compare {l:?} with {r:?}"
        ))),
    }
}
