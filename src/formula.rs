//! Model specification
//!
//! The right-hand side of a regression equation as a list of resolved terms,
//! plus the logic turning dataset records into design matrix rows.
use crate::data::{Dataset, Matrix, Row};
use crate::errors::CausalError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A single right-hand side term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Term {
    /// A dataset column used as is.
    Column(String),
    /// Product of two or more columns, `a:b`.
    Interaction(Vec<String>),
    /// A column raised to an integer power, `a^2`.
    Power(String, u32),
}

impl Term {
    fn evaluate(&self, row: &Row<'_>) -> Result<f64, CausalError> {
        match self {
            Term::Column(name) => row.get(name),
            Term::Interaction(names) => names.iter().try_fold(1.0, |acc, n| Ok(acc * row.get(n)?)),
            Term::Power(name, k) => Ok(row.get(name)?.powi(*k as i32)),
        }
    }

    fn columns(&self) -> Vec<&str> {
        match self {
            Term::Column(name) | Term::Power(name, _) => vec![name.as_str()],
            Term::Interaction(names) => names.iter().map(|n| n.as_str()).collect(),
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Column(name) => write!(f, "{}", name),
            Term::Interaction(names) => write!(f, "{}", names.join(":")),
            Term::Power(name, k) => write!(f, "{}^{}", name, k),
        }
    }
}

/// Resolved right-hand side of a regression model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub terms: Vec<Term>,
    pub intercept: bool,
}

fn invalid(spec: &str, reason: &str) -> CausalError {
    CausalError::InvalidParameter("model specification".to_string(), reason.to_string(), spec.to_string())
}

fn parse_name(name: &str, spec: &str) -> Result<String, CausalError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
        }
        _ => false,
    };
    if valid {
        Ok(name.to_string())
    } else {
        Err(invalid(spec, "terms of the form name, a:b or a^k"))
    }
}

fn parse_term(token: &str, spec: &str) -> Result<Term, CausalError> {
    if token.contains(':') {
        let names = token
            .split(':')
            .map(|n| parse_name(n.trim(), spec))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Term::Interaction(names))
    } else if let Some((name, power)) = token.split_once('^') {
        let k = power
            .trim()
            .parse::<u32>()
            .ok()
            .filter(|&k| k >= 1)
            .ok_or_else(|| invalid(spec, "a positive integer power"))?;
        Ok(Term::Power(parse_name(name.trim(), spec)?, k))
    } else {
        Ok(Term::Column(parse_name(token, spec)?))
    }
}

impl ModelSpec {
    /// Specification with an intercept and the given terms.
    pub fn new(terms: Vec<Term>) -> Self {
        ModelSpec { terms, intercept: true }
    }

    /// Intercept-only specification.
    pub fn intercept_only() -> Self {
        ModelSpec::new(Vec::new())
    }

    /// Main-effects specification from plain column names.
    pub fn from_columns<S: AsRef<str>>(columns: &[S]) -> Self {
        ModelSpec::new(columns.iter().map(|c| Term::Column(c.as_ref().to_string())).collect())
    }

    /// Parse a specification such as `"art + male + age0 + art:male + cd40^2"`.
    ///
    /// `1` may be written for an intercept-only model and `- 1` drops the
    /// intercept.
    pub fn parse(spec: &str) -> Result<Self, CausalError> {
        if spec.trim().is_empty() {
            return Err(invalid(spec, "at least one term or 1"));
        }
        let mut terms = Vec::new();
        let mut intercept = true;
        for chunk in spec.split('+') {
            let mut parts = chunk.split('-');
            let head = parts.next().unwrap_or("").trim();
            match head {
                "" if chunk.trim_start().starts_with('-') => {}
                "" => return Err(invalid(spec, "a term between '+' signs")),
                "1" => {}
                "0" => intercept = false,
                t => terms.push(parse_term(t, spec)?),
            }
            for removed in parts {
                match removed.trim() {
                    "1" => intercept = false,
                    _ => return Err(invalid(spec, "only '- 1' to remove the intercept")),
                }
            }
        }
        Ok(ModelSpec { terms, intercept })
    }

    /// Raw dataset columns referenced by the specification, deduplicated.
    pub fn columns(&self) -> Vec<&str> {
        let mut cols: Vec<&str> = Vec::new();
        for c in self.terms.iter().flat_map(|t| t.columns()) {
            if !cols.contains(&c) {
                cols.push(c);
            }
        }
        cols
    }

    /// Does any term read `column`?
    pub fn references(&self, column: &str) -> bool {
        self.columns().contains(&column)
    }

    /// Number of design matrix columns.
    pub fn n_params(&self) -> usize {
        self.terms.len() + usize::from(self.intercept)
    }

    /// Display labels of the design matrix columns.
    pub fn column_labels(&self) -> Vec<String> {
        let mut labels = Vec::with_capacity(self.n_params());
        if self.intercept {
            labels.push("Intercept".to_string());
        }
        labels.extend(self.terms.iter().map(|t| t.to_string()));
        labels
    }

    /// Design matrix row for a record. Any value forced on the row flows into
    /// every term that reads that column.
    pub fn design_row(&self, row: &Row<'_>) -> Result<Vec<f64>, CausalError> {
        let mut x = Vec::with_capacity(self.n_params());
        if self.intercept {
            x.push(1.0);
        }
        for t in &self.terms {
            x.push(t.evaluate(row)?);
        }
        Ok(x)
    }

    /// Column-major design matrix over every record of `data`.
    pub fn design_matrix(&self, data: &Dataset) -> Result<DesignMatrix, CausalError> {
        let rows = data.n_rows();
        let cols = self.n_params();
        let mut values = vec![0.0; rows * cols];
        for row in data.iter_rows() {
            let i = row.index();
            for (j, v) in self.design_row(&row)?.into_iter().enumerate() {
                values[j * rows + i] = v;
            }
        }
        Ok(DesignMatrix {
            values,
            rows,
            cols,
            labels: self.column_labels(),
        })
    }
}

impl FromStr for ModelSpec {
    type Err = CausalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModelSpec::parse(s)
    }
}

impl fmt::Display for ModelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.terms.is_empty() {
            return write!(f, "{}", if self.intercept { "1" } else { "0" });
        }
        let terms: Vec<String> = self.terms.iter().map(|t| t.to_string()).collect();
        write!(f, "{}", terms.join(" + "))?;
        if !self.intercept {
            write!(f, " - 1")?;
        }
        Ok(())
    }
}

/// Owned column-major design matrix with its column labels.
#[derive(Debug, Clone)]
pub struct DesignMatrix {
    pub values: Vec<f64>,
    pub rows: usize,
    pub cols: usize,
    pub labels: Vec<String>,
}

impl DesignMatrix {
    /// Borrow as a [`Matrix`].
    pub fn as_matrix(&self) -> Matrix<'_, f64> {
        Matrix::new(&self.values, self.rows, self.cols)
    }
}
