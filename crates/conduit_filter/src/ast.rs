//! Filter expression tree.
//!
//! The tree is produced by an external expression parser. Only four node
//! shapes matter to the compiler; everything else is carried as an opaque
//! [`Expr::Other`] node and treated as complex.

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error returned when an operator symbol is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown operator: {0}")]
pub struct UnknownOperator(pub String);

/// A comparison operator that can appear in a filter condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComparisonOperator {
    /// `==`
    #[serde(rename = "==")]
    Eq,
    /// `!=`
    #[serde(rename = "!=")]
    NotEq,
    /// `>`
    #[serde(rename = ">")]
    Gt,
    /// `<`
    #[serde(rename = "<")]
    Lt,
    /// `>=`
    #[serde(rename = ">=")]
    Ge,
    /// `<=`
    #[serde(rename = "<=")]
    Le,
}

impl ComparisonOperator {
    /// Returns the operator symbol.
    pub fn as_str(&self) -> &'static str {
        match self {
            ComparisonOperator::Eq => "==",
            ComparisonOperator::NotEq => "!=",
            ComparisonOperator::Gt => ">",
            ComparisonOperator::Lt => "<",
            ComparisonOperator::Ge => ">=",
            ComparisonOperator::Le => "<=",
        }
    }

    /// Returns true for `>`, `<`, `>=` and `<=`.
    pub fn is_range(&self) -> bool {
        matches!(
            self,
            ComparisonOperator::Gt
                | ComparisonOperator::Lt
                | ComparisonOperator::Ge
                | ComparisonOperator::Le
        )
    }
}

impl fmt::Display for ComparisonOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operator of a binary expression node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    /// A field comparison.
    Compare(ComparisonOperator),
    /// Logical `&&`.
    And,
    /// Logical `||`.
    Or,
}

impl FromStr for BinaryOperator {
    type Err = UnknownOperator;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let op = match s {
            "==" | "===" => BinaryOperator::Compare(ComparisonOperator::Eq),
            "!=" | "!==" => BinaryOperator::Compare(ComparisonOperator::NotEq),
            ">" => BinaryOperator::Compare(ComparisonOperator::Gt),
            "<" => BinaryOperator::Compare(ComparisonOperator::Lt),
            ">=" => BinaryOperator::Compare(ComparisonOperator::Ge),
            "<=" => BinaryOperator::Compare(ComparisonOperator::Le),
            "&&" => BinaryOperator::And,
            "||" => BinaryOperator::Or,
            other => return Err(UnknownOperator(other.to_string())),
        };
        Ok(op)
    }
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinaryOperator::Compare(op) => f.write_str(op.as_str()),
            BinaryOperator::And => f.write_str("&&"),
            BinaryOperator::Or => f.write_str("||"),
        }
    }
}

/// A field reference.
///
/// Nested paths are expressed as a back-reference chain: the identifier for
/// `address.city` is `city` whose `from` is `address`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identifier {
    /// Name of this path segment.
    pub name: String,
    /// The enclosing segment, if any.
    pub from: Option<Box<Identifier>>,
}

impl Identifier {
    /// Creates a top-level identifier.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            from: None,
        }
    }

    /// Creates an identifier nested under `parent`.
    pub fn nested(parent: Identifier, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            from: Some(Box::new(parent)),
        }
    }

    /// Builds an identifier chain from a dotted path such as `"a.b.c"`.
    pub fn from_path(path: &str) -> Self {
        let mut segments = path.split('.');
        let first = Identifier::new(segments.next().unwrap_or_default());
        segments.fold(first, |parent, name| Identifier::nested(parent, name))
    }

    /// Reconstructs the dotted path by walking the `from` chain root-to-leaf.
    pub fn field_path(&self) -> String {
        let mut segments = vec![self.name.as_str()];
        let mut current = self.from.as_deref();
        while let Some(ident) = current {
            segments.push(ident.name.as_str());
            current = ident.from.as_deref();
        }
        segments.reverse();
        segments.join(".")
    }

    /// Returns true if this identifier denotes the constant `null`.
    pub fn is_null_constant(&self) -> bool {
        self.from.is_none() && matches!(self.name.as_str(), "null" | "undefined")
    }

    fn from_estree(node: &Value) -> Option<Self> {
        match node.get("type").and_then(Value::as_str)? {
            "Identifier" => {
                let name = node.get("name").and_then(Value::as_str)?;
                match node.get("from") {
                    None | Some(Value::Null) => Some(Identifier::new(name)),
                    Some(parent) => Some(Identifier::nested(Self::from_estree(parent)?, name)),
                }
            }
            "MemberExpression" => {
                if node.get("computed").and_then(Value::as_bool).unwrap_or(false) {
                    return None;
                }
                let object = Self::from_estree(node.get("object")?)?;
                let property = node.get("property")?;
                if property.get("type").and_then(Value::as_str) != Some("Identifier") {
                    return None;
                }
                let name = property.get("name").and_then(Value::as_str)?;
                Some(Identifier::nested(object, name))
            }
            _ => None,
        }
    }
}

/// A literal operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// `null`.
    Null,
    /// A boolean.
    Bool(bool),
    /// A number.
    Number(Number),
    /// A string.
    String(String),
}

impl Literal {
    /// Converts the literal to a JSON value.
    pub fn to_value(&self) -> Value {
        match self {
            Literal::Null => Value::Null,
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Number(n) => Value::Number(n.clone()),
            Literal::String(s) => Value::String(s.clone()),
        }
    }

    /// Converts a scalar JSON value to a literal. Arrays and objects are not literals.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(Literal::Null),
            Value::Bool(b) => Some(Literal::Bool(*b)),
            Value::Number(n) => Some(Literal::Number(n.clone())),
            Value::String(s) => Some(Literal::String(s.clone())),
            Value::Array(_) | Value::Object(_) => None,
        }
    }
}

impl From<&str> for Literal {
    fn from(value: &str) -> Self {
        Literal::String(value.to_string())
    }
}

impl From<String> for Literal {
    fn from(value: String) -> Self {
        Literal::String(value)
    }
}

impl From<i64> for Literal {
    fn from(value: i64) -> Self {
        Literal::Number(value.into())
    }
}

impl From<i32> for Literal {
    fn from(value: i32) -> Self {
        Literal::Number(value.into())
    }
}

impl From<f64> for Literal {
    fn from(value: f64) -> Self {
        Number::from_f64(value).map_or(Literal::Null, Literal::Number)
    }
}

impl From<bool> for Literal {
    fn from(value: bool) -> Self {
        Literal::Bool(value)
    }
}

/// A filter expression node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A binary expression (comparison or logical).
    Binary {
        /// The operator.
        operator: BinaryOperator,
        /// Left operand.
        left: Box<Expr>,
        /// Right operand.
        right: Box<Expr>,
    },
    /// A field reference.
    Identifier(Identifier),
    /// A literal value.
    Literal(Literal),
    /// Any other node kind (calls, conditionals, unary expressions, ...).
    Other {
        /// The node kind reported by the parser.
        kind: String,
    },
}

impl Expr {
    /// Creates a binary expression.
    pub fn binary(operator: BinaryOperator, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            operator,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Creates `left && right`.
    pub fn and(left: Expr, right: Expr) -> Self {
        Self::binary(BinaryOperator::And, left, right)
    }

    /// Creates `left || right`.
    pub fn or(left: Expr, right: Expr) -> Self {
        Self::binary(BinaryOperator::Or, left, right)
    }

    /// Creates `<field path> <op> <literal>`.
    pub fn compare(path: &str, operator: ComparisonOperator, value: impl Into<Literal>) -> Self {
        Self::binary(
            BinaryOperator::Compare(operator),
            Expr::ident(path),
            Expr::Literal(value.into()),
        )
    }

    /// Creates an identifier from a dotted path.
    pub fn ident(path: &str) -> Self {
        Expr::Identifier(Identifier::from_path(path))
    }

    /// Creates a literal node.
    pub fn literal(value: impl Into<Literal>) -> Self {
        Expr::Literal(value.into())
    }

    /// Creates an opaque node of the given kind.
    pub fn other(kind: impl Into<String>) -> Self {
        Expr::Other { kind: kind.into() }
    }

    /// Converts an ESTree-shaped JSON tree into an expression.
    ///
    /// The conversion is total: malformed or unsupported nodes become
    /// [`Expr::Other`], which the compiler treats as complex.
    pub fn from_estree(node: &Value) -> Self {
        let Some(kind) = node.get("type").and_then(Value::as_str) else {
            return Expr::other("Unknown");
        };

        match kind {
            "BinaryExpression" | "LogicalExpression" => {
                let operator = node
                    .get("operator")
                    .and_then(Value::as_str)
                    .and_then(|s| s.parse::<BinaryOperator>().ok());
                match (operator, node.get("left"), node.get("right")) {
                    (Some(operator), Some(left), Some(right)) => {
                        Self::binary(operator, Self::from_estree(left), Self::from_estree(right))
                    }
                    _ => Expr::other(kind),
                }
            }
            "Identifier" | "MemberExpression" => Identifier::from_estree(node)
                .map(Expr::Identifier)
                .unwrap_or_else(|| Expr::other(kind)),
            "Literal" => node
                .get("value")
                .and_then(Literal::from_value)
                .map(Expr::Literal)
                .unwrap_or_else(|| Expr::other(kind)),
            other => Expr::other(other),
        }
    }
}
