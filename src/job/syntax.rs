// src/job/syntax.rs

//! Already-parsed logical expression of a job.
//!
//! There is no textual grammar here: the expression arrives as a tree, for
//! example straight out of TOML:
//!
//! ```toml
//! logical = { op = "AND", operands = ["disk", { op = "NOT", operands = ["Maint"] }] }
//! ```

use std::fmt;

use serde::Deserialize;
use serde_json::Value;

use crate::types::ValueKind;

/// One element of a parsed expression.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum SyntaxNode {
    /// `{ op = "AND", operands = [...] }`
    Operator { op: String, operands: Vec<SyntaxNode> },
    /// `{ modifier = "int", operand = "free_space" }`
    Modifier {
        modifier: ValueKind,
        operand: Box<SyntaxNode>,
    },
    /// `{ value = "text constant" }`
    Literal { value: Value },
    /// Name of a checker or of another job.
    Reference(String),
    /// Bare `true`, `false` or number.
    Bare(Value),
}

impl SyntaxNode {
    pub fn op(op: &str, operands: Vec<SyntaxNode>) -> Self {
        SyntaxNode::Operator {
            op: op.to_string(),
            operands,
        }
    }

    pub fn reference(name: &str) -> Self {
        SyntaxNode::Reference(name.to_string())
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        SyntaxNode::Literal {
            value: value.into(),
        }
    }

    pub fn modifier(kind: ValueKind, operand: SyntaxNode) -> Self {
        SyntaxNode::Modifier {
            modifier: kind,
            operand: Box::new(operand),
        }
    }

    /// Constant value carried by this element, if it is one.
    pub fn constant_value(&self) -> Option<&Value> {
        match self {
            SyntaxNode::Literal { value } | SyntaxNode::Bare(value) => Some(value),
            _ => None,
        }
    }

    /// All operand names referenced anywhere below this element.
    pub fn references(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            SyntaxNode::Reference(name) => out.push(name.as_str()),
            SyntaxNode::Operator { operands, .. } => {
                for operand in operands {
                    operand.collect_references(out);
                }
            }
            SyntaxNode::Modifier { operand, .. } => operand.collect_references(out),
            SyntaxNode::Literal { .. } | SyntaxNode::Bare(_) => {}
        }
    }
}

impl fmt::Display for SyntaxNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyntaxNode::Reference(name) => write!(f, "{name}"),
            SyntaxNode::Literal { value } | SyntaxNode::Bare(value) => write!(f, "{value}"),
            SyntaxNode::Modifier { modifier, operand } => write!(f, "{modifier}({operand})"),
            SyntaxNode::Operator { op, operands } => {
                let op = op.to_uppercase();
                if operands.len() == 1 {
                    return write!(f, "{op} {}", operands[0]);
                }
                write!(f, "(")?;
                for (i, operand) in operands.iter().enumerate() {
                    if i > 0 {
                        write!(f, " {op} ")?;
                    }
                    write!(f, "{operand}")?;
                }
                write!(f, ")")
            }
        }
    }
}
