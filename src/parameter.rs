//! Symbolic parameters for analog programs.
//!
//! Waveform values, durations and phases may reference named parameters.
//! Their values are supplied at run time through [`ParameterValues`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ProviderError, ProviderResult};

/// A symbolic or concrete parameter expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParameterExpression {
    /// A constant numeric value.
    Constant(f64),
    /// A named parameter.
    Symbol(String),
    /// Negation.
    Neg(Box<ParameterExpression>),
    /// Addition.
    Add(Box<ParameterExpression>, Box<ParameterExpression>),
    /// Subtraction.
    Sub(Box<ParameterExpression>, Box<ParameterExpression>),
    /// Multiplication.
    Mul(Box<ParameterExpression>, Box<ParameterExpression>),
    /// Division.
    Div(Box<ParameterExpression>, Box<ParameterExpression>),
}

/// Create a named parameter.
///
/// ```
/// use pasqal_provider::parameter;
///
/// let t = parameter("t");
/// let half = t.clone() * 0.5;
/// assert!(half.is_symbolic());
/// ```
pub fn parameter(name: impl Into<String>) -> ParameterExpression {
    ParameterExpression::Symbol(name.into())
}

impl ParameterExpression {
    /// Create a constant.
    pub fn constant(value: f64) -> Self {
        ParameterExpression::Constant(value)
    }

    /// Check if this expression contains any symbols.
    pub fn is_symbolic(&self) -> bool {
        match self {
            ParameterExpression::Symbol(_) => true,
            ParameterExpression::Constant(_) => false,
            ParameterExpression::Neg(e) => e.is_symbolic(),
            ParameterExpression::Add(a, b)
            | ParameterExpression::Sub(a, b)
            | ParameterExpression::Mul(a, b)
            | ParameterExpression::Div(a, b) => a.is_symbolic() || b.is_symbolic(),
        }
    }

    /// The symbol name if this expression is a bare parameter.
    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            ParameterExpression::Symbol(name) => Some(name),
            _ => None,
        }
    }

    /// Try to evaluate as a concrete value.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParameterExpression::Constant(v) => Some(*v),
            ParameterExpression::Symbol(_) => None,
            ParameterExpression::Neg(e) => e.as_f64().map(|v| -v),
            ParameterExpression::Add(a, b) => Some(a.as_f64()? + b.as_f64()?),
            ParameterExpression::Sub(a, b) => Some(a.as_f64()? - b.as_f64()?),
            ParameterExpression::Mul(a, b) => Some(a.as_f64()? * b.as_f64()?),
            ParameterExpression::Div(a, b) => {
                let divisor = b.as_f64()?;
                if divisor == 0.0 {
                    return None;
                }
                Some(a.as_f64()? / divisor)
            }
        }
    }

    /// All symbol names in this expression, sorted.
    pub fn symbols(&self) -> BTreeSet<String> {
        let mut set = BTreeSet::new();
        self.collect_symbols(&mut set);
        set
    }

    pub(crate) fn collect_symbols(&self, set: &mut BTreeSet<String>) {
        match self {
            ParameterExpression::Constant(_) => {}
            ParameterExpression::Symbol(name) => {
                set.insert(name.clone());
            }
            ParameterExpression::Neg(e) => e.collect_symbols(set),
            ParameterExpression::Add(a, b)
            | ParameterExpression::Sub(a, b)
            | ParameterExpression::Mul(a, b)
            | ParameterExpression::Div(a, b) => {
                a.collect_symbols(set);
                b.collect_symbols(set);
            }
        }
    }

    /// Evaluate the expression with the given parameter values.
    pub fn evaluate(&self, values: &ParameterValues) -> ProviderResult<f64> {
        match self {
            ParameterExpression::Constant(v) => Ok(*v),
            ParameterExpression::Symbol(name) => values
                .get(name)
                .ok_or_else(|| ProviderError::UnboundParameter(name.clone())),
            ParameterExpression::Neg(e) => Ok(-e.evaluate(values)?),
            ParameterExpression::Add(a, b) => Ok(a.evaluate(values)? + b.evaluate(values)?),
            ParameterExpression::Sub(a, b) => Ok(a.evaluate(values)? - b.evaluate(values)?),
            ParameterExpression::Mul(a, b) => Ok(a.evaluate(values)? * b.evaluate(values)?),
            ParameterExpression::Div(a, b) => {
                let divisor = b.evaluate(values)?;
                if divisor == 0.0 {
                    return Err(ProviderError::InvalidWaveform(format!(
                        "division by zero while evaluating {self}"
                    )));
                }
                Ok(a.evaluate(values)? / divisor)
            }
        }
    }

    /// Fold constant subexpressions.
    pub fn simplify(&self) -> Self {
        if let Some(v) = self.as_f64() {
            return ParameterExpression::Constant(v);
        }
        let fold = |a: &Self, b: &Self, op: fn(Box<Self>, Box<Self>) -> Self| {
            op(Box::new(a.simplify()), Box::new(b.simplify()))
        };
        match self {
            ParameterExpression::Neg(e) => ParameterExpression::Neg(Box::new(e.simplify())),
            ParameterExpression::Add(a, b) => fold(a, b, ParameterExpression::Add),
            ParameterExpression::Sub(a, b) => fold(a, b, ParameterExpression::Sub),
            ParameterExpression::Mul(a, b) => fold(a, b, ParameterExpression::Mul),
            ParameterExpression::Div(a, b) => fold(a, b, ParameterExpression::Div),
            _ => self.clone(),
        }
    }
}

impl fmt::Display for ParameterExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterExpression::Constant(v) => write!(f, "{v}"),
            ParameterExpression::Symbol(name) => write!(f, "{name}"),
            ParameterExpression::Neg(e) => write!(f, "-({e})"),
            ParameterExpression::Add(a, b) => write!(f, "({a} + {b})"),
            ParameterExpression::Sub(a, b) => write!(f, "({a} - {b})"),
            ParameterExpression::Mul(a, b) => write!(f, "({a} * {b})"),
            ParameterExpression::Div(a, b) => write!(f, "({a} / {b})"),
        }
    }
}

impl From<f64> for ParameterExpression {
    fn from(value: f64) -> Self {
        ParameterExpression::Constant(value)
    }
}

impl From<i32> for ParameterExpression {
    fn from(value: i32) -> Self {
        ParameterExpression::Constant(f64::from(value))
    }
}

impl From<u32> for ParameterExpression {
    fn from(value: u32) -> Self {
        ParameterExpression::Constant(f64::from(value))
    }
}

macro_rules! impl_binary_op {
    ($trait:ident, $method:ident, $variant:ident) => {
        impl std::ops::$trait for ParameterExpression {
            type Output = Self;

            fn $method(self, rhs: Self) -> Self::Output {
                ParameterExpression::$variant(Box::new(self), Box::new(rhs))
            }
        }

        impl std::ops::$trait<f64> for ParameterExpression {
            type Output = Self;

            fn $method(self, rhs: f64) -> Self::Output {
                ParameterExpression::$variant(Box::new(self), Box::new(rhs.into()))
            }
        }

        impl std::ops::$trait<ParameterExpression> for f64 {
            type Output = ParameterExpression;

            fn $method(self, rhs: ParameterExpression) -> Self::Output {
                ParameterExpression::$variant(Box::new(self.into()), Box::new(rhs))
            }
        }
    };
}

impl_binary_op!(Add, add, Add);
impl_binary_op!(Sub, sub, Sub);
impl_binary_op!(Mul, mul, Mul);
impl_binary_op!(Div, div, Div);

impl std::ops::Neg for ParameterExpression {
    type Output = Self;

    fn neg(self) -> Self::Output {
        ParameterExpression::Neg(Box::new(self))
    }
}

/// Values bound to named parameters for one execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterValues {
    values: BTreeMap<String, f64>,
}

impl ParameterValues {
    /// Create an empty binding set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create bindings from (name, value) pairs. Later pairs win.
    pub fn from_pairs(iter: impl IntoIterator<Item = (impl Into<String>, f64)>) -> Self {
        let mut values = Self::new();
        for (name, value) in iter {
            values.insert(name, value);
        }
        values
    }

    /// Bind a value to a parameter name.
    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        self.values.insert(name.into(), value);
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
        self.insert(name, value);
        self
    }

    /// Get the value bound to a parameter.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    /// Iterate over (name, value) pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &f64)> {
        self.values.iter()
    }

    /// Number of bound parameters.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if no parameter is bound.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for ParameterValues {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        Self::from_pairs(iter)
    }
}
