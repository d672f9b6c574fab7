use crate::{
	transforms::{hardmax, log_softmax, softmax},
	Error,
};
use ndarray::prelude::*;
use ndarray::CowArray;

/// This enum selects how the rows of a target matrix are interpreted by [`loss`](fn.loss.html) and [`gradient`](fn.gradient.html).
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum LossMode {
	/// Each target row weights the log probability of every class, so a one-hot row gives the ordinary log loss and a fractional row gives the soft-label cross entropy.
	#[serde(rename = "standard_weak")]
	StandardWeak,
	/// Each target row marks a set of candidate classes. At every evaluation the row is resolved to the candidates the current model finds most probable, splitting ties evenly. This loss is not convex in the weights.
	#[serde(rename = "osl")]
	OptimisticSupersetLoss,
}

impl Default for LossMode {
	fn default() -> Self {
		LossMode::StandardWeak
	}
}

impl std::fmt::Display for LossMode {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let s = match self {
			LossMode::StandardWeak => "standard weak",
			LossMode::OptimisticSupersetLoss => "optimistic superset loss",
		};
		write!(f, "{}", s)
	}
}

/// The loss and its gradient with respect to the weights, computed from a single evaluation of the scores.
#[derive(Clone, Debug)]
pub struct LossAndGradient {
	pub loss: f64,
	/// (n_features, n_classes)
	pub gradient: Array2<f64>,
}

/// Compute the loss of the `(n_features, n_classes)` `weights` on `features` and `targets`.
pub fn loss(
	weights: ArrayView2<f64>,
	features: ArrayView2<f64>,
	targets: ArrayView2<f64>,
	mode: LossMode,
) -> Result<f64, Error> {
	check_shapes(weights.dim(), features, targets)?;
	let scores = features.dot(&weights);
	let log_probabilities = log_softmax(scores.view());
	let resolved_targets = match mode {
		LossMode::StandardWeak => CowArray::from(targets),
		LossMode::OptimisticSupersetLoss => {
			let probabilities = log_probabilities.mapv(f64::exp);
			CowArray::from(resolve_candidates(probabilities.view(), targets))
		}
	};
	Ok(-(&resolved_targets * &log_probabilities).sum())
}

/// Compute the gradient of [`loss`](fn.loss.html) with respect to `weights`, as an `(n_features, n_classes)` matrix.
pub fn gradient(
	weights: ArrayView2<f64>,
	features: ArrayView2<f64>,
	targets: ArrayView2<f64>,
	mode: LossMode,
) -> Result<Array2<f64>, Error> {
	check_shapes(weights.dim(), features, targets)?;
	let probabilities = softmax(features.dot(&weights).view());
	let resolved_targets = resolve_targets(probabilities.view(), targets, mode);
	Ok(features.t().dot(&(probabilities - &resolved_targets)))
}

/// Compute [`loss`](fn.loss.html) and [`gradient`](fn.gradient.html) together, sharing the scores and the resolved targets.
pub fn loss_and_gradient(
	weights: ArrayView2<f64>,
	features: ArrayView2<f64>,
	targets: ArrayView2<f64>,
	mode: LossMode,
) -> Result<LossAndGradient, Error> {
	check_shapes(weights.dim(), features, targets)?;
	let scores = features.dot(&weights);
	let log_probabilities = log_softmax(scores.view());
	let probabilities = softmax(scores.view());
	let resolved_targets = resolve_targets(probabilities.view(), targets, mode);
	let loss = -(&resolved_targets * &log_probabilities).sum();
	let gradient = features.t().dot(&(probabilities - &resolved_targets));
	Ok(LossAndGradient { loss, gradient })
}

/// Return the targets the loss is computed against. For the optimistic superset loss this is `hardmax(targets * probabilities)`, which depends on the current weights.
pub(crate) fn resolve_targets<'a>(
	probabilities: ArrayView2<f64>,
	targets: ArrayView2<'a, f64>,
	mode: LossMode,
) -> CowArray<'a, f64, Ix2> {
	match mode {
		LossMode::StandardWeak => CowArray::from(targets),
		LossMode::OptimisticSupersetLoss => CowArray::from(resolve_candidates(probabilities, targets)),
	}
}

fn resolve_candidates(probabilities: ArrayView2<f64>, candidates: ArrayView2<f64>) -> Array2<f64> {
	hardmax((&candidates * &probabilities).view())
}

/// Check that `(n_features, n_classes)` weights can be applied to `features` and compared with `targets`.
pub(crate) fn check_shapes(
	weights_dim: (usize, usize),
	features: ArrayView2<f64>,
	targets: ArrayView2<f64>,
) -> Result<(), Error> {
	let (n_features, n_classes) = weights_dim;
	if features.nrows() != targets.nrows() {
		return Err(Error::ShapeMismatch(format!(
			"features have {} rows but targets have {} rows",
			features.nrows(),
			targets.nrows()
		)));
	}
	if features.ncols() != n_features {
		return Err(Error::ShapeMismatch(format!(
			"weights have {} features but features have {} columns",
			n_features,
			features.ncols()
		)));
	}
	if targets.ncols() != n_classes {
		return Err(Error::ShapeMismatch(format!(
			"weights have {} classes but targets have {} columns",
			n_classes,
			targets.ncols()
		)));
	}
	Ok(())
}

/**
An `Objective` binds features, targets, and a loss mode so the loss and gradient can be evaluated on flattened weights.

The flattened weights have length `n_features * n_classes` and are laid out feature-major and class-minor, so `w[i * n_classes + j]` is the weight of feature `i` for class `j`. This is the form handed to a [`Minimizer`](trait.Minimizer.html).
*/
#[derive(Clone, Copy, Debug)]
pub struct Objective<'a> {
	features: ArrayView2<'a, f64>,
	targets: ArrayView2<'a, f64>,
	mode: LossMode,
}

impl<'a> Objective<'a> {
	pub fn new(
		features: ArrayView2<'a, f64>,
		targets: ArrayView2<'a, f64>,
		mode: LossMode,
	) -> Result<Self, Error> {
		check_shapes((features.ncols(), targets.ncols()), features, targets)?;
		Ok(Self {
			features,
			targets,
			mode,
		})
	}

	pub fn n_features(&self) -> usize {
		self.features.ncols()
	}

	pub fn n_classes(&self) -> usize {
		self.targets.ncols()
	}

	/// The length of the flattened weights.
	pub fn n_parameters(&self) -> usize {
		self.n_features() * self.n_classes()
	}

	pub fn loss(&self, weights: ArrayView1<f64>) -> Result<f64, Error> {
		let weights = self.unflatten(weights)?;
		loss(weights, self.features, self.targets, self.mode)
	}

	/// Compute the gradient at the flattened `weights`, flattened the same way.
	pub fn gradient(&self, weights: ArrayView1<f64>) -> Result<Array1<f64>, Error> {
		let weights = self.unflatten(weights)?;
		let gradient = gradient(weights, self.features, self.targets, self.mode)?;
		Ok(gradient.iter().copied().collect())
	}

	pub(crate) fn unflatten<'w>(&self, weights: ArrayView1<'w, f64>) -> Result<ArrayView2<'w, f64>, Error> {
		if weights.len() != self.n_parameters() {
			return Err(Error::ShapeMismatch(format!(
				"expected {} flattened weights but got {}",
				self.n_parameters(),
				weights.len()
			)));
		}
		weights
			.into_shape((self.n_features(), self.n_classes()))
			.map_err(|error| Error::ShapeMismatch(error.to_string()))
	}
}

#[cfg(test)]
use crate::transforms::one_hot;
#[cfg(test)]
use rand::SeedableRng;
#[cfg(test)]
use rand_distr::{Distribution, StandardNormal};
#[cfg(test)]
use rand_xoshiro::Xoshiro256Plus;

#[cfg(test)]
fn random_matrix(shape: (usize, usize), seed: u64) -> Array2<f64> {
	let mut rng = Xoshiro256Plus::seed_from_u64(seed);
	Array2::from_shape_simple_fn(shape, || StandardNormal.sample(&mut rng))
}

#[cfg(test)]
fn numerical_gradient(objective: &Objective, weights: ArrayView1<f64>) -> Array1<f64> {
	let epsilon = 1e-6;
	let mut estimate = Array1::zeros(weights.len());
	for index in 0..weights.len() {
		let mut forward = weights.to_owned();
		forward[index] += epsilon;
		let mut backward = weights.to_owned();
		backward[index] -= epsilon;
		estimate[index] = (objective.loss(forward.view()).unwrap()
			- objective.loss(backward.view()).unwrap())
			/ (2.0 * epsilon);
	}
	estimate
}

#[test]
fn test_standard_weak_gradient_matches_numerical_estimate() {
	let features = arr2(&[[0.5, -1.0, 2.0]]);
	let targets = one_hot(arr1(&[2]).view(), 4).unwrap();
	let objective = Objective::new(features.view(), targets.view(), LossMode::StandardWeak).unwrap();
	let weights = Array1::from_iter(random_matrix((3, 4), 7).iter().copied());
	let analytic = objective.gradient(weights.view()).unwrap();
	let numerical = numerical_gradient(&objective, weights.view());
	for (a, n) in analytic.iter().zip(numerical.iter()) {
		assert!((a - n).abs() < 1e-4, "analytic {} numerical {}", a, n);
	}
}

#[test]
fn test_soft_target_gradient_matches_numerical_estimate() {
	let features = random_matrix((5, 3), 11);
	let targets = arr2(&[
		[0.2, 0.8, 0.0],
		[1.0, 0.0, 0.0],
		[0.0, 0.5, 0.5],
		[0.3, 0.3, 0.4],
		[0.0, 0.0, 1.0],
	]);
	let objective = Objective::new(features.view(), targets.view(), LossMode::StandardWeak).unwrap();
	let weights = Array1::from_iter(random_matrix((3, 3), 13).iter().copied());
	let analytic = objective.gradient(weights.view()).unwrap();
	let numerical = numerical_gradient(&objective, weights.view());
	for (a, n) in analytic.iter().zip(numerical.iter()) {
		assert!((a - n).abs() < 1e-4, "analytic {} numerical {}", a, n);
	}
}

#[test]
fn test_osl_gradient_matches_numerical_estimate_away_from_ties() {
	let features = arr2(&[[1.0, 0.5], [-0.5, 2.0], [1.5, -1.0]]);
	let candidates = arr2(&[[1.0, 1.0, 0.0], [0.0, 1.0, 1.0], [1.0, 0.0, 1.0]]);
	let objective =
		Objective::new(features.view(), candidates.view(), LossMode::OptimisticSupersetLoss)
			.unwrap();
	let weights = Array1::from_iter(random_matrix((2, 3), 3).iter().copied());
	let analytic = objective.gradient(weights.view()).unwrap();
	let numerical = numerical_gradient(&objective, weights.view());
	for (a, n) in analytic.iter().zip(numerical.iter()) {
		assert!((a - n).abs() < 1e-4, "analytic {} numerical {}", a, n);
	}
}

#[test]
fn test_one_hot_loss_is_log_loss() {
	let weights = arr2(&[[1.0, -1.0], [0.5, 0.0]]);
	let features = arr2(&[[1.0, 2.0], [0.0, 1.0]]);
	let targets = arr2(&[[1.0, 0.0], [0.0, 1.0]]);
	let value = loss(weights.view(), features.view(), targets.view(), LossMode::StandardWeak).unwrap();
	let probabilities = softmax(features.dot(&weights).view());
	let expected = -probabilities[[0, 0]].ln() - probabilities[[1, 1]].ln();
	assert!((value - expected).abs() < 1e-12);
}

#[test]
fn test_osl_resolves_to_most_probable_candidate() {
	// Class 1 is the most probable overall, but only classes 0 and 2 are candidates.
	let probabilities = arr2(&[[0.3, 0.6, 0.1]]);
	let candidates = arr2(&[[1.0, 0.0, 1.0]]);
	let resolved = resolve_targets(
		probabilities.view(),
		candidates.view(),
		LossMode::OptimisticSupersetLoss,
	);
	assert_eq!(resolved, arr2(&[[1.0, 0.0, 0.0]]));
}

#[test]
fn test_loss_and_gradient_agree_with_separate_calls() {
	let weights = random_matrix((3, 3), 5);
	let features = random_matrix((6, 3), 6);
	let candidates = arr2(&[
		[1.0, 1.0, 0.0],
		[0.0, 1.0, 1.0],
		[1.0, 0.0, 1.0],
		[1.0, 1.0, 0.0],
		[0.0, 0.0, 1.0],
		[1.0, 1.0, 1.0],
	]);
	for mode in &[LossMode::StandardWeak, LossMode::OptimisticSupersetLoss] {
		let both =
			loss_and_gradient(weights.view(), features.view(), candidates.view(), *mode).unwrap();
		let value = loss(weights.view(), features.view(), candidates.view(), *mode).unwrap();
		let gradient = gradient(weights.view(), features.view(), candidates.view(), *mode).unwrap();
		assert!((both.loss - value).abs() < 1e-10);
		for (a, b) in both.gradient.iter().zip(gradient.iter()) {
			assert!((a - b).abs() < 1e-10);
		}
	}
}

#[test]
fn test_shape_mismatch() {
	let weights = Array2::zeros((2, 3));
	let features = Array2::zeros((4, 2));
	let targets = Array2::zeros((5, 3));
	let result = loss(weights.view(), features.view(), targets.view(), LossMode::StandardWeak);
	insta::assert_snapshot!(result.unwrap_err().to_string(), @"shape mismatch: features have 4 rows but targets have 5 rows");
	let features = Array2::zeros((5, 3));
	let result = gradient(weights.view(), features.view(), targets.view(), LossMode::StandardWeak);
	assert!(matches!(result, Err(Error::ShapeMismatch(_))));
	let features = Array2::zeros((5, 2));
	let targets = Array2::zeros((5, 4));
	let result = gradient(weights.view(), features.view(), targets.view(), LossMode::StandardWeak);
	assert!(matches!(result, Err(Error::ShapeMismatch(_))));
}

#[test]
fn test_objective_rejects_wrong_length_weights() {
	let features = Array2::zeros((4, 2));
	let targets = Array2::zeros((4, 3));
	let objective = Objective::new(features.view(), targets.view(), LossMode::StandardWeak).unwrap();
	assert_eq!(objective.n_parameters(), 6);
	let result = objective.gradient(Array1::zeros(5).view());
	assert!(matches!(result, Err(Error::ShapeMismatch(_))));
}
