//! Evidence expression syntax tree

use serde::{Deserialize, Serialize};
use std::fmt;

/// One step of a path into a record payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PathSegment {
    /// Object key (`.field` or `['field']`)
    Key(String),
    /// Array position (`[n]` after the record index)
    Index(usize),
}

/// `records[index]` followed by a payload path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRef {
    pub index: usize,
    pub path: Vec<PathSegment>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Aggregate {
    Average,
    Sum,
    Count,
    Min,
    Max,
}

impl Aggregate {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "average" | "avg" | "mean" => Some(Self::Average),
            "sum" => Some(Self::Sum),
            "count" | "len" => Some(Self::Count),
            "min" => Some(Self::Min),
            "max" => Some(Self::Max),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Average => "average",
            Self::Sum => "sum",
            Self::Count => "count",
            Self::Min => "min",
            Self::Max => "max",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl CompareOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Eq => "==",
            Self::Ne => "!=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl ArithOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
        }
    }
}

/// Closed expression grammar. Nothing outside these variants can be expressed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Number(f64),
    Str(String),
    Bool(bool),
    Field(FieldRef),
    Neg(Box<Expr>),
    Arith {
        op: ArithOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// `a < b <= c` means `a < b and b <= c`
    Compare {
        first: Box<Expr>,
        rest: Vec<(CompareOp, Expr)>,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Call {
        func: Aggregate,
        args: Vec<Expr>,
    },
}

impl Expr {
    /// Every record field referenced, in source order
    pub fn field_refs(&self) -> Vec<&FieldRef> {
        let mut refs = Vec::new();
        self.collect_refs(&mut refs);
        refs
    }

    fn collect_refs<'a>(&'a self, out: &mut Vec<&'a FieldRef>) {
        match self {
            Expr::Number(_) | Expr::Str(_) | Expr::Bool(_) => {}
            Expr::Field(field) => out.push(field),
            Expr::Neg(inner) | Expr::Not(inner) => inner.collect_refs(out),
            Expr::Arith { lhs, rhs, .. } | Expr::And(lhs, rhs) | Expr::Or(lhs, rhs) => {
                lhs.collect_refs(out);
                rhs.collect_refs(out);
            }
            Expr::Compare { first, rest } => {
                first.collect_refs(out);
                for (_, operand) in rest {
                    operand.collect_refs(out);
                }
            }
            Expr::Call { args, .. } => {
                for arg in args {
                    arg.collect_refs(out);
                }
            }
        }
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "records[{}]", self.index)?;
        for segment in &self.path {
            match segment {
                PathSegment::Key(key) if is_identifier(key) => write!(f, ".{}", key)?,
                PathSegment::Key(key) => write!(f, "[{}]", quote(key))?,
                PathSegment::Index(i) => write!(f, "[{}]", i)?,
            }
        }
        Ok(())
    }
}

/// Fully parenthesized rendering; reparses to the same tree
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(n) => write!(f, "{}", format_number(*n)),
            Expr::Str(s) => write!(f, "{}", quote(s)),
            Expr::Bool(b) => write!(f, "{}", b),
            Expr::Field(field) => write!(f, "{}", field),
            Expr::Neg(inner) => write!(f, "-({})", inner),
            Expr::Arith { op, lhs, rhs } => write!(f, "({} {} {})", lhs, op.symbol(), rhs),
            Expr::Compare { first, rest } => {
                write_operand(f, first)?;
                for (op, operand) in rest {
                    write!(f, " {} ", op.symbol())?;
                    write_operand(f, operand)?;
                }
                Ok(())
            }
            Expr::And(lhs, rhs) => write!(f, "({} and {})", lhs, rhs),
            Expr::Or(lhs, rhs) => write!(f, "({} or {})", lhs, rhs),
            Expr::Not(inner) => write!(f, "not ({})", inner),
            Expr::Call { func, args } => {
                write!(f, "{}(", func.name())?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}

fn write_operand(f: &mut fmt::Formatter<'_>, operand: &Expr) -> fmt::Result {
    match operand {
        Expr::Compare { .. } | Expr::Not(_) => write!(f, "({})", operand),
        _ => write!(f, "{}", operand),
    }
}

pub(crate) fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'"))
}
