use crate::minimizer::{MinimizeResult, Minimizer};
use ndarray::prelude::*;

/// A minimizer that takes steps of a fixed size against the gradient until its norm falls below `tolerance`.
pub struct FixedStepMinimizer {
	pub max_iterations: usize,
	pub step_size: f64,
	pub tolerance: f64,
}

impl Minimizer for FixedStepMinimizer {
	fn name(&self) -> &str {
		"fixed_step"
	}

	fn minimize(
		&mut self,
		_objective: &dyn Fn(ArrayView1<f64>) -> f64,
		gradient: &dyn Fn(ArrayView1<f64>) -> Array1<f64>,
		initial_point: Array1<f64>,
	) -> MinimizeResult {
		let mut point = initial_point;
		for iteration in 0..self.max_iterations {
			let direction = gradient(point.view());
			if direction.dot(&direction).sqrt() < self.tolerance {
				return MinimizeResult {
					point,
					success: true,
					message: format!("converged after {} iterations", iteration),
				};
			}
			point.scaled_add(-self.step_size, &direction);
		}
		MinimizeResult {
			point,
			success: false,
			message: format!(
				"gradient norm did not fall below {} in {} iterations",
				self.tolerance, self.max_iterations
			),
		}
	}
}
