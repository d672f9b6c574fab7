use crate::{
	loss::{check_shapes, loss, resolve_targets, LossMode, Objective},
	minimizer::Minimizer,
	progress::{Progress, ProgressCounter},
	transforms::softmax,
	Error,
};
use log::{debug, log_enabled, trace, Level};
use ndarray::prelude::*;
use rand_distr::{Distribution, StandardNormal};
use rand_xoshiro::Xoshiro256Plus;
use std::cell::RefCell;

/// The external minimizer starts near zero, at standard normal draws scaled by this factor.
const EXTERNAL_INITIAL_SCALE: f64 = 1e-5;

/// This enum selects the strategy [`WeakMulticlassClassifier::fit`](struct.WeakMulticlassClassifier.html#method.fit) uses to find the weights.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum OptimizerKind {
	/// Gradient descent on the flattened weights, stepping against the gradient computed by [`Objective::gradient`](struct.Objective.html#method.gradient).
	#[serde(rename = "gradient_descent_accumulated")]
	GradientDescentAccumulated,
	/// Gradient descent written directly as `W += learning_rate * X^T (targets - probabilities)`. This follows the same trajectory as `GradientDescentAccumulated`.
	#[serde(rename = "gradient_descent_closed_form")]
	GradientDescentClosedForm,
	/// Hand the problem to the attached [`Minimizer`](trait.Minimizer.html) with this name.
	#[serde(rename = "external")]
	External(String),
}

impl Default for OptimizerKind {
	fn default() -> Self {
		OptimizerKind::GradientDescentAccumulated
	}
}

impl std::fmt::Display for OptimizerKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			OptimizerKind::GradientDescentAccumulated => write!(f, "gradient descent (accumulated)"),
			OptimizerKind::GradientDescentClosedForm => write!(f, "gradient descent (closed form)"),
			OptimizerKind::External(name) => write!(f, "external minimizer {}", name),
		}
	}
}

/// These are the options used by the built-in gradient descent optimizers.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TrainOptions {
	/// Exactly this many steps are taken. There is no convergence check.
	pub n_iterations: usize,
	/// The step size.
	pub learning_rate: f64,
	/// If true, the loss at the start of every iteration is recorded and available from [`WeakMulticlassClassifier::losses`](struct.WeakMulticlassClassifier.html#method.losses).
	#[serde(default)]
	pub record_losses: bool,
}

impl Default for TrainOptions {
	fn default() -> Self {
		Self {
			n_iterations: 100,
			learning_rate: 0.01,
			record_losses: false,
		}
	}
}

#[derive(Debug)]
pub(crate) struct TrainOutput {
	/// (n_features, n_classes)
	pub weights: Array2<f64>,
	pub losses: Vec<f64>,
}

pub(crate) fn standard_normal_weights(
	n_features: usize,
	n_classes: usize,
	rng: &mut Xoshiro256Plus,
) -> Array2<f64> {
	Array2::from_shape_simple_fn((n_features, n_classes), || {
		StandardNormal.sample(&mut *rng)
	})
}

/// Run gradient descent on the flattened weights through `Objective`.
pub(crate) fn gradient_descent_accumulated(
	features: ArrayView2<f64>,
	targets: ArrayView2<f64>,
	mode: LossMode,
	options: &TrainOptions,
	rng: &mut Xoshiro256Plus,
	update_progress: &mut dyn FnMut(Progress),
) -> Result<TrainOutput, Error> {
	let objective = Objective::new(features.view(), targets.view(), mode)?;
	let n_features = objective.n_features();
	let n_classes = objective.n_classes();
	let mut weights: Array1<f64> = standard_normal_weights(n_features, n_classes, rng)
		.iter()
		.copied()
		.collect();
	let mut losses = Vec::new();
	let progress_counter = ProgressCounter::new(options.n_iterations as u64);
	update_progress(Progress::Training(progress_counter.clone()));
	for iteration in 0..options.n_iterations {
		if options.record_losses || log_enabled!(Level::Trace) {
			let loss = objective.loss(weights.view())?;
			trace!("iteration {} loss {}", iteration, loss);
			if options.record_losses {
				losses.push(loss);
			}
		}
		let gradient = objective.gradient(weights.view())?;
		weights.scaled_add(-options.learning_rate, &gradient);
		progress_counter.advance();
	}
	let weights = objective.unflatten(weights.view())?.to_owned();
	Ok(TrainOutput { weights, losses })
}

/// Run gradient descent on the `(n_features, n_classes)` weights, recomputing the probabilities at every iteration.
pub(crate) fn gradient_descent_closed_form(
	features: ArrayView2<f64>,
	targets: ArrayView2<f64>,
	mode: LossMode,
	options: &TrainOptions,
	rng: &mut Xoshiro256Plus,
	update_progress: &mut dyn FnMut(Progress),
) -> Result<TrainOutput, Error> {
	let mut weights = standard_normal_weights(features.ncols(), targets.ncols(), rng);
	check_shapes(weights.dim(), features, targets)?;
	let mut losses = Vec::new();
	let progress_counter = ProgressCounter::new(options.n_iterations as u64);
	update_progress(Progress::Training(progress_counter.clone()));
	for iteration in 0..options.n_iterations {
		if options.record_losses || log_enabled!(Level::Trace) {
			let loss = loss(weights.view(), features, targets, mode)?;
			trace!("iteration {} loss {}", iteration, loss);
			if options.record_losses {
				losses.push(loss);
			}
		}
		let probabilities = softmax(features.dot(&weights).view());
		let resolved_targets = resolve_targets(probabilities.view(), targets, mode);
		let step = features.t().dot(&(&resolved_targets - &probabilities));
		weights.scaled_add(options.learning_rate, &step);
		progress_counter.advance();
	}
	Ok(TrainOutput { weights, losses })
}

/**
Hand the loss and gradient on the flattened weights to `minimizer`, starting from a point near zero.

If the loss or gradient is evaluated at a point of the wrong length, that evaluation returns NaN and the shape error is returned once the minimizer finishes.
*/
pub(crate) fn minimize_external(
	features: ArrayView2<f64>,
	targets: ArrayView2<f64>,
	mode: LossMode,
	minimizer: &mut dyn Minimizer,
	rng: &mut Xoshiro256Plus,
	update_progress: &mut dyn FnMut(Progress),
) -> Result<Array2<f64>, Error> {
	let objective = Objective::new(features.view(), targets.view(), mode)?;
	let n_parameters = objective.n_parameters();
	let initial_point: Array1<f64> = (0..n_parameters)
		.map(|_| {
			let sample: f64 = StandardNormal.sample(&mut *rng);
			EXTERNAL_INITIAL_SCALE * sample
		})
		.collect();
	update_progress(Progress::Minimizing(minimizer.name().to_owned()));
	let evaluation_error: RefCell<Option<Error>> = RefCell::new(None);
	let record_error = |error: Error| {
		let mut evaluation_error = evaluation_error.borrow_mut();
		if evaluation_error.is_none() {
			*evaluation_error = Some(error);
		}
	};
	let result = minimizer.minimize(
		&|weights| match objective.loss(weights) {
			Ok(loss) => loss,
			Err(error) => {
				record_error(error);
				std::f64::NAN
			}
		},
		&|weights| match objective.gradient(weights) {
			Ok(gradient) => gradient,
			Err(error) => {
				let n = weights.len();
				record_error(error);
				Array1::from_elem(n, std::f64::NAN)
			}
		},
		initial_point,
	);
	if let Some(error) = evaluation_error.into_inner() {
		return Err(error);
	}
	debug!(
		"minimizer {} finished with success = {}: {}",
		minimizer.name(),
		result.success,
		result.message
	);
	if !result.success {
		return Err(Error::ConvergenceFailure(result.message));
	}
	if result.point.len() != n_parameters {
		return Err(Error::ShapeMismatch(format!(
			"minimizer {} returned {} weights but {} were expected",
			minimizer.name(),
			result.point.len(),
			n_parameters
		)));
	}
	Array2::from_shape_vec(
		(objective.n_features(), objective.n_classes()),
		result.point.to_vec(),
	)
	.map_err(|error| Error::ShapeMismatch(error.to_string()))
}

#[cfg(test)]
use crate::{minimizer::MinimizeResult, test::FixedStepMinimizer};
#[cfg(test)]
use ndarray::s;
#[cfg(test)]
use rand::SeedableRng;

#[test]
fn test_accumulated_and_closed_form_follow_the_same_trajectory() {
	let features = arr2(&[[1.0, 0.5], [-0.5, 2.0], [1.5, -1.0], [-1.0, -1.0]]);
	let candidates = arr2(&[
		[1.0, 1.0, 0.0],
		[0.0, 1.0, 1.0],
		[1.0, 0.0, 1.0],
		[0.0, 1.0, 0.0],
	]);
	let options = TrainOptions {
		n_iterations: 50,
		learning_rate: 0.05,
		record_losses: true,
	};
	for mode in &[LossMode::StandardWeak, LossMode::OptimisticSupersetLoss] {
		let accumulated = gradient_descent_accumulated(
			features.view(),
			candidates.view(),
			*mode,
			&options,
			&mut Xoshiro256Plus::seed_from_u64(42),
			&mut |_| {},
		)
		.unwrap();
		let closed_form = gradient_descent_closed_form(
			features.view(),
			candidates.view(),
			*mode,
			&options,
			&mut Xoshiro256Plus::seed_from_u64(42),
			&mut |_| {},
		)
		.unwrap();
		// The closed form step is the exact negation of the accumulated one, so the weights agree bit for bit.
		assert_eq!(accumulated.weights, closed_form.weights);
		assert_eq!(accumulated.losses.len(), 50);
		assert_eq!(accumulated.losses, closed_form.losses);
	}
}

#[test]
fn test_gradient_descent_reports_progress() {
	let features = arr2(&[[1.0, 0.0], [0.0, 1.0]]);
	let targets = arr2(&[[1.0, 0.0], [0.0, 1.0]]);
	let options = TrainOptions {
		n_iterations: 7,
		..Default::default()
	};
	let mut counters = Vec::new();
	gradient_descent_closed_form(
		features.view(),
		targets.view(),
		LossMode::StandardWeak,
		&options,
		&mut Xoshiro256Plus::seed_from_u64(0),
		&mut |progress| {
			if let Progress::Training(counter) = progress {
				counters.push(counter)
			}
		},
	)
	.unwrap();
	assert_eq!(counters.len(), 1);
	assert_eq!(counters[0].completed(), 7);
	assert_eq!(counters[0].fraction(), 1.0);
	assert_eq!(counters[0].total(), 7);
}

#[test]
fn test_external_minimizer_starts_near_zero() {
	struct Recorder(Option<Array1<f64>>);
	impl Minimizer for Recorder {
		fn name(&self) -> &str {
			"recorder"
		}
		fn minimize(
			&mut self,
			_objective: &dyn Fn(ArrayView1<f64>) -> f64,
			_gradient: &dyn Fn(ArrayView1<f64>) -> Array1<f64>,
			initial_point: Array1<f64>,
		) -> MinimizeResult {
			self.0 = Some(initial_point.clone());
			MinimizeResult {
				point: initial_point,
				success: true,
				message: "done".to_owned(),
			}
		}
	}
	let features = arr2(&[[1.0, 0.0, 2.0], [0.0, 1.0, 1.0]]);
	let targets = arr2(&[[1.0, 0.0], [0.0, 1.0]]);
	let mut recorder = Recorder(None);
	let weights = minimize_external(
		features.view(),
		targets.view(),
		LossMode::StandardWeak,
		&mut recorder,
		&mut Xoshiro256Plus::seed_from_u64(1),
		&mut |_| {},
	)
	.unwrap();
	let initial_point = recorder.0.unwrap();
	assert_eq!(initial_point.len(), 6);
	assert!(initial_point.iter().all(|value| value.abs() < 1e-3));
	assert_eq!(weights.dim(), (3, 2));
	assert_eq!(weights.row(1), initial_point.slice(s![2..4]));
}

#[test]
fn test_external_minimizer_failure_is_a_convergence_failure() {
	let features = arr2(&[[1.0, 0.0], [0.0, 1.0]]);
	let targets = arr2(&[[1.0, 0.0], [0.0, 1.0]]);
	let mut minimizer = FixedStepMinimizer {
		max_iterations: 3,
		step_size: 0.1,
		tolerance: 0.0,
	};
	let result = minimize_external(
		features.view(),
		targets.view(),
		LossMode::StandardWeak,
		&mut minimizer,
		&mut Xoshiro256Plus::seed_from_u64(1),
		&mut |_| {},
	);
	insta::assert_snapshot!(result.unwrap_err().to_string(), @"the minimizer failed to converge: gradient norm did not fall below 0 in 3 iterations");
}

#[test]
fn test_external_minimizer_wrong_length_point_is_a_shape_mismatch() {
	struct Truncating;
	impl Minimizer for Truncating {
		fn name(&self) -> &str {
			"truncating"
		}
		fn minimize(
			&mut self,
			objective: &dyn Fn(ArrayView1<f64>) -> f64,
			_gradient: &dyn Fn(ArrayView1<f64>) -> Array1<f64>,
			initial_point: Array1<f64>,
		) -> MinimizeResult {
			let point = initial_point.slice(s![1..]).to_owned();
			let loss = objective(point.view());
			MinimizeResult {
				point,
				success: true,
				message: format!("loss {}", loss),
			}
		}
	}
	let features = arr2(&[[1.0, 0.0], [0.0, 1.0]]);
	let targets = arr2(&[[1.0, 0.0], [0.0, 1.0]]);
	let result = minimize_external(
		features.view(),
		targets.view(),
		LossMode::StandardWeak,
		&mut Truncating,
		&mut Xoshiro256Plus::seed_from_u64(1),
		&mut |_| {},
	);
	assert!(matches!(result, Err(Error::ShapeMismatch(_))));
}
