use serde::{Deserialize, Serialize};
use crate::error::{RegistrationError, Result};
use crate::metric::MetricKind;

/// Iterations and learning rates of the two alignment stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationSchedule {
    pub metric: MetricKind,
    pub affine_iterations: usize,
    pub affine_learning_rate: f64,
    pub bspline_iterations: usize,
    pub bspline_learning_rate: f64,
    /// Control points per axis `(x, y, z)`; at least 4 each.
    pub bspline_grid_size: [usize; 3],
}

impl Default for RegistrationSchedule {
    fn default() -> Self {
        Self {
            metric: MetricKind::Ncc,
            affine_iterations: 200,
            affine_learning_rate: 5e-2,
            bspline_iterations: 100,
            bspline_learning_rate: 1e-1,
            bspline_grid_size: [6, 6, 6],
        }
    }
}

impl RegistrationSchedule {
    pub fn with_metric(mut self, metric: MetricKind) -> Self {
        self.metric = metric;
        self
    }

    pub fn with_iterations(mut self, affine: usize, bspline: usize) -> Self {
        self.affine_iterations = affine;
        self.bspline_iterations = bspline;
        self
    }

    pub fn with_learning_rates(mut self, affine: f64, bspline: f64) -> Self {
        self.affine_learning_rate = affine;
        self.bspline_learning_rate = bspline;
        self
    }

    pub fn with_bspline_grid_size(mut self, grid_size: [usize; 3]) -> Self {
        self.bspline_grid_size = grid_size;
        self
    }

    pub fn validate(&self) -> Result<()> {
        for (name, lr) in [
            ("affine_learning_rate", self.affine_learning_rate),
            ("bspline_learning_rate", self.bspline_learning_rate),
        ] {
            if !(lr.is_finite() && lr > 0.0) {
                return Err(RegistrationError::invalid_configuration(format!(
                    "{name} must be positive, got {lr}"
                )));
            }
        }
        if self.bspline_grid_size.iter().any(|&n| n < 4) {
            return Err(RegistrationError::invalid_configuration(format!(
                "bspline_grid_size needs at least 4 control points per axis, got {:?}",
                self.bspline_grid_size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schedule_is_valid() {
        assert!(RegistrationSchedule::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_small_grid_and_bad_rate() {
        let err = RegistrationSchedule::default().with_bspline_grid_size([3, 6, 6]).validate().unwrap_err();
        assert!(err.to_string().contains("bspline_grid_size"));
        let err = RegistrationSchedule::default().with_learning_rates(0.0, 0.1).validate().unwrap_err();
        assert!(err.to_string().contains("affine_learning_rate"));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let schedule: RegistrationSchedule = serde_json::from_str(r#"{"metric": "mse", "affine_iterations": 10}"#).unwrap();
        assert_eq!(schedule.metric, MetricKind::Mse);
        assert_eq!(schedule.affine_iterations, 10);
        assert_eq!(schedule.bspline_grid_size, [6, 6, 6]);
    }
}
