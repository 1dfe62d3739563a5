//! Nelder-Mead minimisation of model likelihoods
//!
//! Both customer-value models keep their parameters strictly positive by
//! searching over log-parameters. Objectives implement [`LogLikelihood`] on
//! the natural-scale parameters; [`minimize`] handles the transform.

use crate::error::AnalysisError;
use argmin::core::{CostFunction, Error, Executor, State};
use argmin::solver::neldermead::NelderMead;
use tracing::debug;

/// Penalised mean negative log-likelihood over natural-scale parameters
pub trait LogLikelihood {
    fn negative_log_likelihood(&self, params: &[f64]) -> f64;
}

/// Best point found by the search
#[derive(Debug, Clone)]
pub struct Minimum {
    pub params: Vec<f64>,
    pub cost: f64,
    pub iterations: u64,
}

struct LogSpace<'a, L> {
    objective: &'a L,
}

impl<L: LogLikelihood> CostFunction for LogSpace<'_, L> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, log_params: &Self::Param) -> Result<Self::Output, Error> {
        let params: Vec<f64> = log_params.iter().map(|p| p.exp()).collect();
        let value = self.objective.negative_log_likelihood(&params);
        Ok(if value.is_finite() { value } else { f64::INFINITY })
    }
}

/// Minimise `objective` starting from natural-scale `initial` parameters.
pub fn minimize<L: LogLikelihood>(
    objective: &L,
    initial: &[f64],
    max_iterations: u64,
) -> crate::Result<Minimum> {
    let start: Vec<f64> = initial.iter().map(|p| p.ln()).collect();
    let solver = NelderMead::new(initial_simplex(&start)).with_sd_tolerance(1e-10)?;

    let result = Executor::new(LogSpace { objective }, solver)
        .configure(|state| state.max_iters(max_iterations))
        .run()?;

    let state = result.state();
    let best = state
        .get_best_param()
        .cloned()
        .ok_or_else(|| AnalysisError::FitFailed("optimizer produced no parameters".into()))?;
    let cost = state.get_best_cost();
    let iterations = state.get_iter();

    if !cost.is_finite() {
        return Err(AnalysisError::FitFailed(format!(
            "likelihood is not finite at the optimum ({cost})"
        ))
        .into());
    }

    let params: Vec<f64> = best.iter().map(|p| p.exp()).collect();
    if params.iter().any(|p| !p.is_finite() || *p <= 0.0) {
        return Err(AnalysisError::FitFailed(format!("non-positive parameters {params:?}")).into());
    }

    debug!(iterations, cost, ?params, "Nelder-Mead finished");
    Ok(Minimum {
        params,
        cost,
        iterations,
    })
}

/// Start vertex plus one vertex per coordinate nudged by 5%, or 0.00025 when the coordinate is zero.
fn initial_simplex(start: &[f64]) -> Vec<Vec<f64>> {
    let mut simplex = Vec::with_capacity(start.len() + 1);
    simplex.push(start.to_vec());
    for i in 0..start.len() {
        let mut vertex = start.to_vec();
        vertex[i] = if vertex[i] != 0.0 {
            vertex[i] * 1.05
        } else {
            0.00025
        };
        simplex.push(vertex);
    }
    simplex
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Quadratic;

    impl LogLikelihood for Quadratic {
        fn negative_log_likelihood(&self, params: &[f64]) -> f64 {
            (params[0] - 2.0).powi(2) + (params[1] - 0.5).powi(2)
        }
    }

    #[test]
    fn test_minimize_recovers_positive_optimum() {
        let minimum = minimize(&Quadratic, &[1.0, 1.0], 2_000).unwrap();
        assert!((minimum.params[0] - 2.0).abs() < 1e-3);
        assert!((minimum.params[1] - 0.5).abs() < 1e-3);
        assert!(minimum.cost < 1e-6);
    }

    #[test]
    fn test_initial_simplex_shape() {
        let simplex = initial_simplex(&[0.0, -2.0]);
        assert_eq!(simplex.len(), 3);
        assert_eq!(simplex[1], vec![0.00025, -2.0]);
        assert_eq!(simplex[2], vec![0.0, -2.1]);
    }
}
