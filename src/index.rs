//! Affordability index: higher salary, lower rent and lower crime score a city higher.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Row-level reasons an index cannot be computed. These never abort a run;
/// the row is excluded and counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IndexError {
    #[error("{0} must be positive and finite")]
    InvalidComponent(&'static str),

    #[error("computed index is not finite")]
    NonFinite,
}

/// Weighting of the affordability index:
///
/// `index = round(scale * salary^salary_weight / (rent^rent_weight * crime^crime_weight), precision)`
///
/// The defaults reproduce `(salary / rent) * (1 / crime) * 1000` rounded to cents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexWeights {
    pub scale: f64,
    pub salary_weight: f64,
    pub rent_weight: f64,
    pub crime_weight: f64,
    pub precision: u32,
}

impl Default for IndexWeights {
    fn default() -> Self {
        Self {
            scale: 1000.0,
            salary_weight: 1.0,
            rent_weight: 1.0,
            crime_weight: 1.0,
            precision: 2,
        }
    }
}

impl IndexWeights {
    pub fn validate(&self) -> Result<(), String> {
        let params = [
            ("scale", self.scale),
            ("salary_weight", self.salary_weight),
            ("rent_weight", self.rent_weight),
            ("crime_weight", self.crime_weight),
        ];
        for (name, value) in params {
            if !value.is_finite() {
                return Err(format!("index.{name} must be finite"));
            }
        }
        if self.scale <= 0.0 {
            return Err("index.scale must be positive".to_string());
        }
        if self.salary_weight < 0.0 || self.rent_weight < 0.0 || self.crime_weight < 0.0 {
            return Err("index weights must not be negative".to_string());
        }
        if self.precision > 6 {
            return Err("index.precision must be at most 6".to_string());
        }
        Ok(())
    }

    /// Computes the index for one city. Every component must be positive and
    /// finite; nothing is ever substituted for a bad input.
    pub fn compute(&self, salary: f64, rent: f64, crime_score: f64) -> Result<f64, IndexError> {
        check_component("salary", salary)?;
        check_component("rent", rent)?;
        check_component("crime score", crime_score)?;

        let denominator = rent.powf(self.rent_weight) * crime_score.powf(self.crime_weight);
        if denominator <= 0.0 || !denominator.is_finite() {
            return Err(IndexError::NonFinite);
        }

        let raw = self.scale * salary.powf(self.salary_weight) / denominator;
        if !raw.is_finite() {
            return Err(IndexError::NonFinite);
        }

        Ok(round_to(raw, self.precision))
    }

    /// Human-readable formula for result footers.
    pub fn describe(&self) -> String {
        if *self == Self::default() {
            return "Composite Index = (Salary / Rent) * (1 / Crime Score) * 1000".to_string();
        }
        format!(
            "Composite Index = {} * Salary^{} / (Rent^{} * Crime Score^{})",
            self.scale, self.salary_weight, self.rent_weight, self.crime_weight
        )
    }
}

fn check_component(name: &'static str, value: f64) -> Result<(), IndexError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(IndexError::InvalidComponent(name))
    }
}

pub fn round_to(value: f64, precision: u32) -> f64 {
    let factor = 10f64.powi(precision as i32);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_formula() {
        let weights = IndexWeights::default();
        let index = weights.compute(95_000.0, 1_500.0, 40.0).unwrap();
        assert_eq!(index, 1583.33);
    }

    #[test]
    fn test_higher_salary_scores_higher() {
        let weights = IndexWeights::default();
        let low = weights.compute(80_000.0, 1_500.0, 40.0).unwrap();
        let high = weights.compute(120_000.0, 1_500.0, 40.0).unwrap();
        assert!(high > low);
    }

    #[test]
    fn test_rejects_zero_and_missing_components() {
        let weights = IndexWeights::default();
        assert_eq!(
            weights.compute(95_000.0, 0.0, 40.0),
            Err(IndexError::InvalidComponent("rent"))
        );
        assert_eq!(
            weights.compute(95_000.0, 1_500.0, 0.0),
            Err(IndexError::InvalidComponent("crime score"))
        );
        assert_eq!(
            weights.compute(f64::NAN, 1_500.0, 40.0),
            Err(IndexError::InvalidComponent("salary"))
        );
    }

    #[test]
    fn test_custom_weights() {
        let weights = IndexWeights {
            scale: 1.0,
            salary_weight: 1.0,
            rent_weight: 1.0,
            crime_weight: 0.0,
            precision: 3,
        };
        assert_eq!(weights.compute(90_000.0, 1_000.0, 55.0).unwrap(), 90.0);
        assert!(weights.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_params() {
        let mut weights = IndexWeights::default();
        weights.scale = 0.0;
        assert!(weights.validate().is_err());

        let mut weights = IndexWeights::default();
        weights.rent_weight = f64::INFINITY;
        assert!(weights.validate().is_err());
    }
}
