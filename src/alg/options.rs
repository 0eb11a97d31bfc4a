use crate::error::InferenceError;

pub const DEFAULT_MAX_ITERATIONS: usize = 20;
pub const DEFAULT_EPS: f64 = 0.001;
pub const DEFAULT_WORKER_COUNT: usize = 4;

#[derive(Debug, Clone, PartialEq)]
pub struct SolverOptions {
    max_iterations: usize,
    eps: f64,            // convergence threshold on the largest message change
    worker_count: usize, // threads in the worker pool
}

impl Default for SolverOptions {
    fn default() -> Self {
        SolverOptions {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            eps: DEFAULT_EPS,
            worker_count: DEFAULT_WORKER_COUNT,
        }
    }
}

impl SolverOptions {
    pub fn set_max_iterations(&mut self, value: usize) -> &mut Self {
        self.max_iterations = value;
        self
    }

    pub fn set_eps(&mut self, value: f64) -> &mut Self {
        self.eps = value;
        self
    }

    pub fn set_worker_count(&mut self, value: usize) -> &mut Self {
        self.worker_count = value;
        self
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    pub fn eps(&self) -> f64 {
        self.eps
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn validate(&self) -> Result<(), InferenceError> {
        if self.max_iterations == 0 {
            return Err(InferenceError::InvalidOptions(
                "max_iterations must be positive".to_string(),
            ));
        }
        if !self.eps.is_finite() || self.eps <= 0. {
            return Err(InferenceError::InvalidOptions(format!(
                "eps must be positive and finite, got {}",
                self.eps
            )));
        }
        if self.worker_count == 0 {
            return Err(InferenceError::InvalidOptions(
                "worker_count must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let options = SolverOptions::default();
        assert_eq!(options.max_iterations(), 20);
        assert_eq!(options.eps(), 0.001);
        assert_eq!(options.worker_count(), 4);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn setters_chain() {
        let mut options = SolverOptions::default();
        options.set_max_iterations(5).set_eps(1e-6).set_worker_count(1);
        assert_eq!(options.max_iterations(), 5);
        assert_eq!(options.eps(), 1e-6);
        assert_eq!(options.worker_count(), 1);
    }

    #[test]
    fn invalid_values_are_rejected() {
        for options in [
            SolverOptions::default().set_max_iterations(0).clone(),
            SolverOptions::default().set_eps(0.).clone(),
            SolverOptions::default().set_eps(f64::NAN).clone(),
            SolverOptions::default().set_worker_count(0).clone(),
        ] {
            assert!(matches!(
                options.validate(),
                Err(InferenceError::InvalidOptions(_))
            ));
        }
    }
}
