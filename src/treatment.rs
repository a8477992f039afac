//! Treatment rules
//!
//! A treatment rule assigns a treatment value in {0, 1} to every record. The
//! built-in regimes treat everyone or no one; custom regimes are either typed
//! predicates over a [`Row`] or small expressions built from [`Expr`].
use crate::data::{Dataset, Row};
use crate::errors::CausalError;
use std::fmt;
use std::str::FromStr;

type RuleFn = dyn Fn(&Row<'_>) -> Result<bool, CausalError> + Send + Sync;

/// A treatment regime.
pub enum TreatmentRule {
    /// Everyone treated.
    All,
    /// No one treated.
    None,
    /// Treated where the predicate holds.
    Custom(Box<RuleFn>),
    /// Treated where the expression evaluates to 1.
    Expression(Expr),
}

impl TreatmentRule {
    /// Wrap a predicate over records.
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&Row<'_>) -> Result<bool, CausalError> + Send + Sync + 'static,
    {
        TreatmentRule::Custom(Box::new(f))
    }

    /// Treatment value assigned to a single record.
    pub fn assign_row(&self, row: &Row<'_>) -> Result<f64, CausalError> {
        match self {
            TreatmentRule::All => Ok(1.0),
            TreatmentRule::None => Ok(0.0),
            TreatmentRule::Custom(f) => f(row)
                .map(|b| if b { 1.0 } else { 0.0 })
                .map_err(|e| match e {
                    CausalError::UnknownColumn(c) => {
                        CausalError::InvalidTreatmentRule(format!("unknown column {}", c))
                    }
                    other => other,
                }),
            TreatmentRule::Expression(expr) => {
                let v = expr.evaluate(row)?;
                if v == 0.0 || v == 1.0 {
                    Ok(v)
                } else {
                    Err(CausalError::InvalidTreatmentRule(format!(
                        "{} evaluated to {} for record {}, expected 0 or 1",
                        expr,
                        v,
                        row.index()
                    )))
                }
            }
        }
    }

    /// Treatment values for every record.
    pub fn assign(&self, data: &Dataset) -> Result<Vec<f64>, CausalError> {
        data.iter_rows().map(|row| self.assign_row(&row)).collect()
    }
}

impl FromStr for TreatmentRule {
    type Err = CausalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(TreatmentRule::All),
            "none" => Ok(TreatmentRule::None),
            _ => Err(CausalError::InvalidTreatmentRule(format!(
                "{} is not a built-in rule (all, none); build custom rules with TreatmentRule::custom or Expr",
                s
            ))),
        }
    }
}

impl fmt::Display for TreatmentRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreatmentRule::All => write!(f, "all"),
            TreatmentRule::None => write!(f, "none"),
            TreatmentRule::Custom(_) => write!(f, "custom"),
            TreatmentRule::Expression(e) => write!(f, "{}", e),
        }
    }
}

impl fmt::Debug for TreatmentRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TreatmentRule({})", self)
    }
}

impl From<Expr> for TreatmentRule {
    fn from(expr: Expr) -> Self {
        TreatmentRule::Expression(expr)
    }
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl CmpOp {
    fn apply(&self, a: f64, b: f64) -> bool {
        match self {
            CmpOp::Lt => a < b,
            CmpOp::Le => a <= b,
            CmpOp::Gt => a > b,
            CmpOp::Ge => a >= b,
            CmpOp::Eq => a == b,
            CmpOp::Ne => a != b,
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
        }
    }
}

/// Safe expression over the columns of a record.
///
/// Comparisons and logical operators evaluate to 0 or 1; a bare column or
/// constant evaluates to its value.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column(String),
    Const(f64),
    Compare(Box<Expr>, CmpOp, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
}

/// Reference a column.
pub fn col(name: &str) -> Expr {
    Expr::Column(name.to_string())
}

/// A numeric literal.
pub fn lit(v: f64) -> Expr {
    Expr::Const(v)
}

fn truthy(v: f64) -> bool {
    v != 0.0
}

fn flag(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

impl Expr {
    fn compare(self, op: CmpOp, rhs: impl Into<Expr>) -> Expr {
        Expr::Compare(Box::new(self), op, Box::new(rhs.into()))
    }

    pub fn lt(self, rhs: impl Into<Expr>) -> Expr {
        self.compare(CmpOp::Lt, rhs)
    }
    pub fn le(self, rhs: impl Into<Expr>) -> Expr {
        self.compare(CmpOp::Le, rhs)
    }
    pub fn gt(self, rhs: impl Into<Expr>) -> Expr {
        self.compare(CmpOp::Gt, rhs)
    }
    pub fn ge(self, rhs: impl Into<Expr>) -> Expr {
        self.compare(CmpOp::Ge, rhs)
    }
    pub fn eq(self, rhs: impl Into<Expr>) -> Expr {
        self.compare(CmpOp::Eq, rhs)
    }
    pub fn ne(self, rhs: impl Into<Expr>) -> Expr {
        self.compare(CmpOp::Ne, rhs)
    }

    pub fn and(self, rhs: Expr) -> Expr {
        Expr::And(Box::new(self), Box::new(rhs))
    }

    pub fn or(self, rhs: Expr) -> Expr {
        Expr::Or(Box::new(self), Box::new(rhs))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Expr {
        Expr::Not(Box::new(self))
    }

    /// Evaluate against a record.
    pub fn evaluate(&self, row: &Row<'_>) -> Result<f64, CausalError> {
        match self {
            Expr::Column(name) => row
                .get(name)
                .map_err(|_| CausalError::InvalidTreatmentRule(format!("unknown column {}", name))),
            Expr::Const(v) => Ok(*v),
            Expr::Compare(a, op, b) => Ok(flag(op.apply(a.evaluate(row)?, b.evaluate(row)?))),
            Expr::And(a, b) => Ok(flag(truthy(a.evaluate(row)?) && truthy(b.evaluate(row)?))),
            Expr::Or(a, b) => Ok(flag(truthy(a.evaluate(row)?) || truthy(b.evaluate(row)?))),
            Expr::Not(a) => Ok(flag(!truthy(a.evaluate(row)?))),
        }
    }
}

impl From<f64> for Expr {
    fn from(v: f64) -> Self {
        Expr::Const(v)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(name) => write!(f, "{}", name),
            Expr::Const(v) => write!(f, "{}", v),
            Expr::Compare(a, op, b) => write!(f, "({} {} {})", a, op.symbol(), b),
            Expr::And(a, b) => write!(f, "({} & {})", a, b),
            Expr::Or(a, b) => write!(f, "({} | {})", a, b),
            Expr::Not(a) => write!(f, "!{}", a),
        }
    }
}
