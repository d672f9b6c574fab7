use ndarray::prelude::*;

/**
A `Minimizer` is a general purpose nonlinear optimizer, such as a quasi-Newton method with a line search, that the classifier can hand its training problem to.

The classifier provides the loss and its gradient as functions of the flattened weights, along with a starting point. The minimizer returns the final point and whether it considers the run a success. An unsuccessful run is reported to the caller of `fit` as [`Error::ConvergenceFailure`](enum.Error.html#variant.ConvergenceFailure) carrying `message`.
*/
pub trait Minimizer {
	/// The name the classifier's config refers to this minimizer by.
	fn name(&self) -> &str;

	fn minimize(
		&mut self,
		objective: &dyn Fn(ArrayView1<f64>) -> f64,
		gradient: &dyn Fn(ArrayView1<f64>) -> Array1<f64>,
		initial_point: Array1<f64>,
	) -> MinimizeResult;
}

/// The outcome of [`Minimizer::minimize`](trait.Minimizer.html#tymethod.minimize).
#[derive(Clone, Debug)]
pub struct MinimizeResult {
	/// The final point, which must have the same length as the initial point.
	pub point: Array1<f64>,
	pub success: bool,
	/// A human readable description of why the minimizer stopped.
	pub message: String,
}
