use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tri-state value of a node: decided true, decided false, or still pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Logical {
    True,
    False,
    #[default]
    Unknown,
}

impl Logical {
    pub fn from_bool(value: bool) -> Self {
        if value { Logical::True } else { Logical::False }
    }

    pub fn as_bool(self) -> Option<bool> {
        match self {
            Logical::True => Some(true),
            Logical::False => Some(false),
            Logical::Unknown => None,
        }
    }

    /// `true` for a decided value.
    pub fn is_known(self) -> bool {
        self != Logical::Unknown
    }

    pub fn negate(self) -> Self {
        match self {
            Logical::True => Logical::False,
            Logical::False => Logical::True,
            Logical::Unknown => Logical::Unknown,
        }
    }
}

impl From<bool> for Logical {
    fn from(value: bool) -> Self {
        Logical::from_bool(value)
    }
}

impl From<Option<bool>> for Logical {
    fn from(value: Option<bool>) -> Self {
        value.map(Logical::from_bool).unwrap_or(Logical::Unknown)
    }
}

impl fmt::Display for Logical {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Logical::True => write!(f, "true"),
            Logical::False => write!(f, "false"),
            Logical::Unknown => write!(f, "unknown"),
        }
    }
}

bitflags::bitflags! {
    /// Processing state of a node.
    ///
    /// The empty set is the "None" state (never started or reset). Composite
    /// masks describe the groups the scheduler asks about.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct ProcessState: u8 {
        const WAITING        = 1 << 0;
        const WORKING        = 1 << 1;
        const FINISHED       = 1 << 2;
        const TRIGGERED      = 1 << 3;
        const INTERNAL_ERROR = 1 << 4;

        const BUSY  = Self::WAITING.bits() | Self::WORKING.bits();
        const READY = Self::FINISHED.bits() | Self::TRIGGERED.bits();
    }
}

impl ProcessState {
    pub const NONE: ProcessState = ProcessState::empty();

    pub fn is_none(self) -> bool {
        self.is_empty()
    }

    pub fn is_busy(self) -> bool {
        self.intersects(ProcessState::BUSY)
    }

    pub fn is_ready(self) -> bool {
        self.intersects(ProcessState::READY)
    }

    /// `CanStart = None | Finished | Triggered`.
    pub fn can_start(self) -> bool {
        self.is_none() || (self.is_ready() && !self.is_busy())
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            return write!(f, "None");
        }
        let names: Vec<&str> = self.iter_names().map(|(name, _)| name).collect();
        write!(f, "{}", names.join("|"))
    }
}

/// Outcome state of the last (or current) run of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LogicalState {
    #[default]
    None,
    Start,
    Done,
    Fault,
    Timeout,
    UserAbort,
}

impl fmt::Display for LogicalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Element kinds of the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeType {
    None,
    NodeConnector,
    ValueModifier,
    JobConnector,
    Constant,
    Checker,
    NodeList,
    JobList,
    Snapshot,
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Operators an internal node may combine its children with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operator {
    And,
    Or,
    Not,
    Xor,
    Is,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Operator {
    /// Comparison operators decide on the operands' return payloads and need
    /// every operand resolved first.
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            Operator::Lt | Operator::Le | Operator::Gt | Operator::Ge | Operator::Eq | Operator::Ne
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Operator::And => "AND",
            Operator::Or => "OR",
            Operator::Not => "NOT",
            Operator::Xor => "XOR",
            Operator::Is => "IS",
            Operator::Lt => "LT",
            Operator::Le => "LE",
            Operator::Gt => "GT",
            Operator::Ge => "GE",
            Operator::Eq => "EQ",
            Operator::Ne => "NE",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "AND" => Ok(Operator::And),
            "OR" => Ok(Operator::Or),
            "NOT" => Ok(Operator::Not),
            "XOR" => Ok(Operator::Xor),
            "IS" => Ok(Operator::Is),
            "LT" | "<" => Ok(Operator::Lt),
            "LE" | "<=" => Ok(Operator::Le),
            "GT" | ">" => Ok(Operator::Gt),
            "GE" | ">=" => Ok(Operator::Ge),
            "EQ" | "=" | "==" => Ok(Operator::Eq),
            "NE" | "!=" | "<>" => Ok(Operator::Ne),
            other => Err(format!("unknown operator '{other}'")),
        }
    }
}

/// Target kind of a value modifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Int,
    Float,
    Bool,
    Text,
    Datetime,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::Bool => "bool",
            ValueKind::Text => "text",
            ValueKind::Datetime => "datetime",
        };
        f.write_str(name)
    }
}

/// Parse `"250ms"`, `"10s"`, `"2m"` or `"1h"`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| format!("duration '{s}' is missing a unit suffix"))?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{num_part}': {e}"))?;

    let scaled = |factor: u64| {
        value
            .checked_mul(factor)
            .map(Duration::from_secs)
            .ok_or_else(|| format!("duration '{s}' is too large"))
    };
    match unit_part.trim().to_lowercase().as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => scaled(60),
        "h" => scaled(60 * 60),
        unit => Err(format!(
            "unsupported duration unit '{unit}'; expected ms, s, m, or h"
        )),
    }
}
