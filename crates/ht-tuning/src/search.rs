//! Search space definitions for remote hyperparameter tuning.

use ht_types::{validation_error, HtResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// How the tuning service samples a numeric range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ScalingType {
    /// Let the service pick a scale.
    #[default]
    Auto,
    Linear,
    /// Sample in log-space; the range must be strictly positive.
    Logarithmic,
    /// Sample `1 - x` in log-space; continuous ranges within [0, 1) only.
    ReverseLogarithmic,
}

/// Continuous range [min_value, max_value].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContinuousRange {
    pub name: String,
    pub min_value: f64,
    pub max_value: f64,
    #[serde(default)]
    pub scaling_type: ScalingType,
}

/// Integer range [min_value, max_value], inclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegerRange {
    pub name: String,
    pub min_value: i64,
    pub max_value: i64,
    #[serde(default)]
    pub scaling_type: ScalingType,
}

/// Categorical choices, passed to the algorithm as strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalRange {
    pub name: String,
    pub values: Vec<String>,
}

/// The full search space, grouped by parameter kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterRanges {
    #[serde(default)]
    pub categorical: Vec<CategoricalRange>,
    #[serde(default)]
    pub continuous: Vec<ContinuousRange>,
    #[serde(default)]
    pub integer: Vec<IntegerRange>,
}

impl ParameterRanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_float(mut self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.continuous.push(ContinuousRange {
            name: name.into(),
            min_value: low,
            max_value: high,
            scaling_type: ScalingType::Auto,
        });
        self
    }

    pub fn add_log_float(mut self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.continuous.push(ContinuousRange {
            name: name.into(),
            min_value: low,
            max_value: high,
            scaling_type: ScalingType::Logarithmic,
        });
        self
    }

    pub fn add_int(mut self, name: impl Into<String>, low: i64, high: i64) -> Self {
        self.integer.push(IntegerRange {
            name: name.into(),
            min_value: low,
            max_value: high,
            scaling_type: ScalingType::Auto,
        });
        self
    }

    pub fn add_choice<S: Into<String>>(mut self, name: impl Into<String>, values: Vec<S>) -> Self {
        self.categorical.push(CategoricalRange {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Total number of tuned parameters across all kinds.
    pub fn len(&self) -> usize {
        self.categorical.len() + self.continuous.len() + self.integer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Parameter names in kind order: categorical, continuous, integer.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.categorical
            .iter()
            .map(|p| p.name.as_str())
            .chain(self.continuous.iter().map(|p| p.name.as_str()))
            .chain(self.integer.iter().map(|p| p.name.as_str()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names().any(|n| n == name)
    }

    /// Check the ranges the way the tuning service would.
    ///
    /// Each name may appear once across all kinds, bounds must be ordered,
    /// and the scaling type has to suit the range.
    pub fn validate(&self) -> HtResult<()> {
        if self.is_empty() {
            return Err(validation_error!("search space has no parameters"));
        }

        let mut seen = HashSet::new();
        for name in self.names() {
            if name.is_empty() {
                return Err(validation_error!("parameter name must not be empty"));
            }
            if !seen.insert(name) {
                return Err(validation_error!(
                    "parameter '{}' is defined more than once",
                    name
                ));
            }
        }

        for p in &self.continuous {
            if !(p.min_value.is_finite() && p.max_value.is_finite()) {
                return Err(validation_error!("parameter '{}' has non-finite bounds", p.name));
            }
            if p.min_value > p.max_value {
                return Err(validation_error!(
                    "parameter '{}': min {} exceeds max {}",
                    p.name,
                    p.min_value,
                    p.max_value
                ));
            }
            match p.scaling_type {
                ScalingType::Logarithmic if p.min_value <= 0.0 => {
                    return Err(validation_error!(
                        "parameter '{}': logarithmic scaling needs min > 0",
                        p.name
                    ));
                }
                ScalingType::ReverseLogarithmic if p.min_value < 0.0 || p.max_value >= 1.0 => {
                    return Err(validation_error!(
                        "parameter '{}': reverse logarithmic scaling needs a range within [0, 1)",
                        p.name
                    ));
                }
                _ => {}
            }
        }

        for p in &self.integer {
            if p.min_value > p.max_value {
                return Err(validation_error!(
                    "parameter '{}': min {} exceeds max {}",
                    p.name,
                    p.min_value,
                    p.max_value
                ));
            }
            match p.scaling_type {
                ScalingType::Logarithmic if p.min_value <= 0 => {
                    return Err(validation_error!(
                        "parameter '{}': logarithmic scaling needs min > 0",
                        p.name
                    ));
                }
                ScalingType::ReverseLogarithmic => {
                    return Err(validation_error!(
                        "parameter '{}': reverse logarithmic scaling is only valid for continuous ranges",
                        p.name
                    ));
                }
                _ => {}
            }
        }

        for p in &self.categorical {
            if p.values.is_empty() {
                return Err(validation_error!("parameter '{}' has no values", p.name));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_space() -> ParameterRanges {
        ParameterRanges::new()
            .add_float("eta", 0.1, 0.5)
            .add_int("max_depth", 2, 5)
            .add_choice("booster", vec!["gbtree", "dart"])
    }

    #[test]
    fn builder_chain() {
        let space = sample_space().add_log_float("lambda", 1e-3, 10.0);
        assert_eq!(space.len(), 4);
        assert_eq!(space.continuous.len(), 2);
        assert_eq!(space.continuous[1].scaling_type, ScalingType::Logarithmic);
        assert!(space.contains("booster"));
        assert!(!space.contains("gamma"));
        assert!(space.validate().is_ok());
    }

    #[test]
    fn names_are_grouped_by_kind() {
        let space = sample_space();
        let names: Vec<&str> = space.names().collect();
        assert_eq!(names, vec!["booster", "eta", "max_depth"]);
    }

    #[test]
    fn name_in_two_kinds_is_rejected() {
        let space = ParameterRanges::new()
            .add_float("max_depth", 1.0, 2.0)
            .add_int("max_depth", 2, 5);
        let err = space.validate().unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn inverted_bounds_are_rejected() {
        let err = ParameterRanges::new()
            .add_int("max_depth", 5, 2)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("exceeds max"));

        let err = ParameterRanges::new()
            .add_float("eta", 0.5, 0.1)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("exceeds max"));
    }

    #[test]
    fn scaling_constraints() {
        assert!(ParameterRanges::new()
            .add_log_float("alpha", 0.0, 1.0)
            .validate()
            .is_err());

        let mut space = ParameterRanges::new().add_float("subsample", 0.5, 0.99);
        space.continuous[0].scaling_type = ScalingType::ReverseLogarithmic;
        assert!(space.validate().is_ok());
        space.continuous[0].max_value = 1.0;
        assert!(space.validate().is_err());

        let mut ints = ParameterRanges::new().add_int("num_round", 10, 100);
        ints.integer[0].scaling_type = ScalingType::ReverseLogarithmic;
        assert!(ints.validate().is_err());
    }

    #[test]
    fn empty_space_and_empty_choices() {
        assert!(ParameterRanges::new().validate().is_err());
        let empty_choice = ParameterRanges::new().add_choice::<&str>("booster", vec![]);
        assert!(empty_choice.validate().is_err());
    }

    #[test]
    fn scaling_defaults_when_missing() {
        let space: ParameterRanges = serde_json::from_str(
            r#"{"continuous": [{"name": "eta", "min_value": 0.1, "max_value": 0.5}]}"#,
        )
        .unwrap();
        assert_eq!(space.continuous[0].scaling_type, ScalingType::Auto);
        assert!(space.integer.is_empty());
        assert!(space.categorical.is_empty());
    }
}
