//! Hyperparameter metadata shared by kernels and models.
//!
//! Each tunable quantity is a [`Param`] carrying its current value, a fixed flag
//! and a [`Constraint`]. Optimizers work on the free parameters only, in a search
//! space where positive parameters are log-transformed.

use crate::errors::{GpError, Result};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::fmt;

/// Domain restriction of a hyperparameter
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub enum Constraint {
    /// Value must be strictly positive (variances, lengthscales, periods, ...)
    Positive,
    /// Any finite value
    Unconstrained,
}

impl Constraint {
    fn validate(&self, value: f64) -> Result<()> {
        if !value.is_finite() {
            return Err(GpError::InvalidParameter(format!(
                "hyperparameter value should be finite, got {value}"
            )));
        }
        if *self == Constraint::Positive && value <= 0. {
            return Err(GpError::InvalidParameter(format!(
                "hyperparameter value should be strictly positive, got {value}"
            )));
        }
        Ok(())
    }
}

/// A single hyperparameter: value, fixed flag and constraint
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct Param {
    value: f64,
    fixed: bool,
    constraint: Constraint,
}

impl Param {
    /// A strictly positive parameter
    pub fn positive(value: f64) -> Result<Self> {
        Constraint::Positive.validate(value)?;
        Ok(Param {
            value,
            fixed: false,
            constraint: Constraint::Positive,
        })
    }

    /// A parameter taking any finite value
    pub fn unconstrained(value: f64) -> Result<Self> {
        Constraint::Unconstrained.validate(value)?;
        Ok(Param {
            value,
            fixed: false,
            constraint: Constraint::Unconstrained,
        })
    }

    pub(crate) fn unchecked(value: f64, constraint: Constraint) -> Self {
        Param {
            value,
            fixed: false,
            constraint,
        }
    }

    /// Current value
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Set the value, checking it against the parameter constraint
    pub fn set_value(&mut self, value: f64) -> Result<()> {
        self.constraint.validate(value)?;
        self.value = value;
        Ok(())
    }

    /// Constraint of the parameter
    pub fn constraint(&self) -> Constraint {
        self.constraint
    }

    /// Whether the parameter is excluded from optimization
    pub fn is_fixed(&self) -> bool {
        self.fixed
    }

    /// Exclude the parameter from optimization
    pub fn fix(&mut self) {
        self.fixed = true;
    }

    /// Include the parameter in optimization
    pub fn unfix(&mut self) {
        self.fixed = false;
    }

    /// Builder style [`Param::fix`]
    pub fn fixed(mut self) -> Self {
        self.fixed = true;
        self
    }
}

impl Default for Param {
    /// A free positive parameter equal to 1
    fn default() -> Self {
        Param {
            value: 1.,
            fixed: false,
            constraint: Constraint::Positive,
        }
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.fixed {
            write!(f, "{} (fixed)", self.value)
        } else {
            write!(f, "{}", self.value)
        }
    }
}

/// Named snapshot of a model hyperparameter
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct Hyperparameter {
    /// Qualified name, e.g. `sum.rbf.lengthscale`
    pub name: String,
    /// Current value
    pub value: f64,
    /// Whether the value is held constant during optimization
    pub fixed: bool,
    /// Constraint on the value
    pub constraint: Constraint,
}

impl Hyperparameter {
    pub(crate) fn new(name: String, param: &Param) -> Self {
        Hyperparameter {
            name,
            value: param.value(),
            fixed: param.is_fixed(),
            constraint: param.constraint(),
        }
    }

    /// Value in optimizer search space: `ln(value)` when positive, `value` otherwise
    pub fn search_value(&self) -> f64 {
        match self.constraint {
            Constraint::Positive => self.value.ln(),
            Constraint::Unconstrained => self.value,
        }
    }
}

/// Map a search space coordinate back to the natural parameter space
pub(crate) fn from_search(constraint: Constraint, u: f64) -> f64 {
    match constraint {
        Constraint::Positive => u.exp(),
        Constraint::Unconstrained => u,
    }
}

/// Derivative of the natural value wrt its search space coordinate
pub(crate) fn search_jacobian(constraint: Constraint, value: f64) -> f64 {
    match constraint {
        Constraint::Positive => value,
        Constraint::Unconstrained => 1.,
    }
}

/// Look up a hyperparameter position by name
pub(crate) fn position(hypers: &[Hyperparameter], name: &str) -> Result<usize> {
    hypers.iter().position(|h| h.name == name).ok_or_else(|| {
        GpError::InvalidParameter(format!(
            "unknown hyperparameter '{}', expected one of [{}]",
            name,
            hypers
                .iter()
                .map(|h| h.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_positive_param_rejects_invalid_values() {
        assert!(matches!(
            Param::positive(0.),
            Err(GpError::InvalidParameter(_))
        ));
        assert!(matches!(
            Param::positive(-1.),
            Err(GpError::InvalidParameter(_))
        ));
        assert!(matches!(
            Param::positive(f64::NAN),
            Err(GpError::InvalidParameter(_))
        ));

        let mut p = Param::positive(2.).unwrap();
        assert!(p.set_value(-0.5).is_err());
        assert_abs_diff_eq!(p.value(), 2.);
        p.set_value(0.5).unwrap();
        assert_abs_diff_eq!(p.value(), 0.5);
    }

    #[test]
    fn test_unconstrained_param() {
        let mut p = Param::unconstrained(-3.).unwrap();
        p.set_value(0.).unwrap();
        assert_abs_diff_eq!(p.value(), 0.);
        assert!(p.set_value(f64::INFINITY).is_err());
    }

    #[test]
    fn test_search_space_mapping() {
        let p = Param::positive(3.).unwrap().fixed();
        let h = Hyperparameter::new("variance".to_string(), &p);
        assert!(h.fixed);
        assert_abs_diff_eq!(h.search_value(), 3f64.ln());
        assert_abs_diff_eq!(from_search(h.constraint, h.search_value()), 3., epsilon = 1e-12);
        assert_abs_diff_eq!(search_jacobian(Constraint::Positive, 3.), 3.);
        assert_abs_diff_eq!(search_jacobian(Constraint::Unconstrained, 3.), 1.);
    }

    #[test]
    fn test_unknown_name() {
        let hypers = vec![Hyperparameter::new(
            "rbf.variance".to_string(),
            &Param::positive(1.).unwrap(),
        )];
        assert_eq!(position(&hypers, "rbf.variance").unwrap(), 0);
        assert!(matches!(
            position(&hypers, "rbf.period"),
            Err(GpError::InvalidParameter(_))
        ));
    }
}
