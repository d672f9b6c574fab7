use crate::{
	config::Config,
	loss::{check_shapes, loss},
	minimizer::Minimizer,
	optimizer::{
		gradient_descent_accumulated, gradient_descent_closed_form, minimize_external,
		OptimizerKind, TrainOptions, TrainOutput,
	},
	progress::Progress,
	transforms::{argmax, one_hot, softmax_in_place},
	Error,
};
use itertools::izip;
use log::{info, warn};
use ndarray::prelude::*;
use ndarray::CowArray;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;
use wlc_metrics::{Accuracy, CrossEntropy, CrossEntropyInput, StreamingMetric};

/// The labels passed to [`WeakMulticlassClassifier::fit`](struct.WeakMulticlassClassifier.html#method.fit).
#[derive(Clone, Copy, Debug)]
pub enum Labels<'a> {
	/// (n_examples) Class indices in `[0, n_classes)`, which are one-hot encoded.
	Indices(ArrayView1<'a, usize>),
	/// (n_examples, n_classes) Weak targets, used as given.
	Targets(ArrayView2<'a, f64>),
}

impl<'a> From<ArrayView1<'a, usize>> for Labels<'a> {
	fn from(value: ArrayView1<'a, usize>) -> Self {
		Labels::Indices(value)
	}
}

impl<'a> From<ArrayView2<'a, f64>> for Labels<'a> {
	fn from(value: ArrayView2<'a, f64>) -> Self {
		Labels::Targets(value)
	}
}

impl<'a> Labels<'a> {
	pub fn len(&self) -> usize {
		match self {
			Labels::Indices(indices) => indices.len(),
			Labels::Targets(targets) => targets.nrows(),
		}
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Produce the `(n_examples, n_classes)` target matrix for these labels.
	pub fn to_targets(&self, n_classes: usize) -> Result<CowArray<'a, f64, Ix2>, Error> {
		match self {
			Labels::Indices(indices) => Ok(CowArray::from(one_hot(*indices, n_classes)?)),
			Labels::Targets(targets) => {
				if targets.ncols() != n_classes {
					return Err(Error::ShapeMismatch(format!(
						"targets have {} columns but the classifier has {} classes",
						targets.ncols(),
						n_classes
					)));
				}
				Ok(CowArray::from(*targets))
			}
		}
	}
}

/**
A multiclass linear classifier trained from hard or weak labels.

A classifier starts out untrained. [`fit`](#method.fit) trains it and replaces any weights from a previous fit. [`predict`](#method.predict) and [`predict_proba`](#method.predict_proba) return [`Error::NotFitted`](enum.Error.html#variant.NotFitted) until the first successful fit.
*/
pub struct WeakMulticlassClassifier {
	config: Config,
	minimizer: Option<Box<dyn Minimizer>>,
	model: Option<Model>,
}

#[derive(Clone, Debug, PartialEq)]
struct Model {
	/// (n_features, n_classes)
	weights: Array2<f64>,
	/// the loss at the start of every iteration, if `record_losses` was set
	losses: Vec<f64>,
}

impl std::fmt::Debug for WeakMulticlassClassifier {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("WeakMulticlassClassifier")
			.field("config", &self.config)
			.field(
				"minimizer",
				&self.minimizer.as_ref().map(|minimizer| minimizer.name()),
			)
			.field("model", &self.model)
			.finish()
	}
}

impl WeakMulticlassClassifier {
	pub fn new(config: Config) -> Self {
		Self {
			config,
			minimizer: None,
			model: None,
		}
	}

	/// Create a classifier that uses `minimizer` when its config selects an external optimizer.
	pub fn with_minimizer(config: Config, minimizer: Box<dyn Minimizer>) -> Self {
		Self {
			config,
			minimizer: Some(minimizer),
			model: None,
		}
	}

	/// Return the config this classifier was constructed with.
	pub fn get_params(&self) -> &Config {
		&self.config
	}

	pub fn is_fitted(&self) -> bool {
		self.model.is_some()
	}

	/// (n_features, n_classes)
	pub fn weights(&self) -> Option<ArrayView2<'_, f64>> {
		self.model.as_ref().map(|model| model.weights.view())
	}

	/// The loss at the start of every training iteration of the last fit. This is empty unless `record_losses` was set.
	pub fn losses(&self) -> &[f64] {
		self.model
			.as_ref()
			.map(|model| model.losses.as_slice())
			.unwrap_or(&[])
	}

	/// Train on `features` and `labels`, which are either class indices or an `(n_examples, n_classes)` matrix of weak targets.
	pub fn fit<'a>(
		&mut self,
		features: ArrayView2<f64>,
		labels: impl Into<Labels<'a>>,
	) -> Result<&mut Self, Error> {
		self.fit_with_progress(features, labels, &mut |_| {})
	}

	/// Train like [`fit`](#method.fit), calling `update_progress` as training proceeds.
	pub fn fit_with_progress<'a>(
		&mut self,
		features: ArrayView2<f64>,
		labels: impl Into<Labels<'a>>,
		update_progress: &mut dyn FnMut(Progress),
	) -> Result<&mut Self, Error> {
		self.config.validate()?;
		let n_classes = self.config.n_classes;
		let mode = self.config.method;
		let labels: Labels = labels.into();
		let targets = labels.to_targets(n_classes)?;
		check_shapes((features.ncols(), n_classes), features, targets.view())?;
		info!(
			"training with {} loss and {} on {} examples with {} features and {} classes",
			mode,
			self.config.optimizer,
			features.nrows(),
			features.ncols(),
			n_classes
		);
		let mut rng = Xoshiro256Plus::seed_from_u64(self.config.seed);
		let TrainOutput { weights, losses } = match &self.config.optimizer {
			OptimizerKind::GradientDescentAccumulated => gradient_descent_accumulated(
				features,
				targets.view(),
				mode,
				train_options(&self.config)?,
				&mut rng,
				update_progress,
			)?,
			OptimizerKind::GradientDescentClosedForm => gradient_descent_closed_form(
				features,
				targets.view(),
				mode,
				train_options(&self.config)?,
				&mut rng,
				update_progress,
			)?,
			OptimizerKind::External(name) => {
				let minimizer = self
					.minimizer
					.as_mut()
					.ok_or_else(|| Error::MissingMinimizer(name.clone()))?;
				if minimizer.name() != name.as_str() {
					warn!(
						"the config names the external optimizer {} but the attached minimizer is {}",
						name,
						minimizer.name()
					);
				}
				let weights = minimize_external(
					features,
					targets.view(),
					mode,
					minimizer.as_mut(),
					&mut rng,
					update_progress,
				)?;
				TrainOutput {
					weights,
					losses: Vec::new(),
				}
			}
		};
		let final_loss = loss(weights.view(), features, targets.view(), mode)?;
		info!("finished training with loss {}", final_loss);
		self.model = Some(Model { weights, losses });
		Ok(self)
	}

	/// Compute the `(n_examples, n_classes)` class probabilities `softmax(features . weights)`.
	pub fn predict_proba(&self, features: ArrayView2<f64>) -> Result<Array2<f64>, Error> {
		let model = self.model.as_ref().ok_or(Error::NotFitted)?;
		if features.ncols() != model.weights.nrows() {
			return Err(Error::ShapeMismatch(format!(
				"the classifier was trained on {} features but features have {} columns",
				model.weights.nrows(),
				features.ncols()
			)));
		}
		let mut probabilities = features.dot(&model.weights);
		softmax_in_place(probabilities.view_mut());
		Ok(probabilities)
	}

	/// Predict the most probable class for each example. Ties go to the lowest class index.
	pub fn predict(&self, features: ArrayView2<f64>) -> Result<Array1<usize>, Error> {
		let probabilities = self.predict_proba(features)?;
		Ok(probabilities.axis_iter(Axis(0)).map(argmax).collect())
	}

	/// Compute the accuracy of [`predict`](#method.predict) against class index `labels`. Returns `None` when there are no examples.
	pub fn score(
		&self,
		features: ArrayView2<f64>,
		labels: ArrayView1<usize>,
	) -> Result<Option<f64>, Error> {
		if features.nrows() != labels.len() {
			return Err(Error::ShapeMismatch(format!(
				"features have {} rows but labels have {} entries",
				features.nrows(),
				labels.len()
			)));
		}
		let predictions = self.predict(features)?;
		let mut accuracy = Accuracy::new();
		for (prediction, label) in izip!(predictions.iter(), labels.iter()) {
			accuracy.update((*prediction, *label));
		}
		Ok(accuracy.finalize())
	}

	/// Compute the mean cross entropy of the predicted probabilities against `labels`, which may be class indices or weak targets. Returns `None` when there are no examples.
	pub fn log_loss<'a>(
		&self,
		features: ArrayView2<f64>,
		labels: impl Into<Labels<'a>>,
	) -> Result<Option<f64>, Error> {
		let probabilities = self.predict_proba(features)?;
		let labels: Labels = labels.into();
		let targets = labels.to_targets(self.config.n_classes)?;
		check_shapes(
			(features.ncols(), self.config.n_classes),
			features,
			targets.view(),
		)?;
		let mut metric = CrossEntropy::default();
		for (probabilities, targets) in izip!(probabilities.rows(), targets.rows()) {
			metric.update(CrossEntropyInput {
				probabilities,
				targets,
			});
		}
		Ok(metric.finalize())
	}
}

fn train_options(config: &Config) -> Result<&TrainOptions, Error> {
	config.params.as_ref().ok_or_else(|| {
		Error::InvalidConfig(format!("params are required for {}", config.optimizer))
	})
}

#[cfg(test)]
use crate::{
	loss::LossMode,
	synthetic::{candidate_sets, gaussian_blobs},
	test::FixedStepMinimizer,
};

#[cfg(test)]
fn separable_blobs(n_per_class: usize, seed: u64) -> (Array2<f64>, Array1<usize>) {
	let mut rng = Xoshiro256Plus::seed_from_u64(seed);
	let centers = arr2(&[[-2.0, -2.0], [2.0, 2.0]]);
	gaussian_blobs(centers.view(), n_per_class, 0.5, &mut rng)
}

#[cfg(test)]
fn gradient_descent_config(
	n_classes: usize,
	method: LossMode,
	n_iterations: usize,
	learning_rate: f64,
	seed: u64,
) -> Config {
	Config {
		n_classes,
		method,
		optimizer: OptimizerKind::GradientDescentAccumulated,
		params: Some(TrainOptions {
			n_iterations,
			learning_rate,
			record_losses: true,
		}),
		seed,
	}
}

#[test]
fn test_predict_before_fit() {
	let classifier = WeakMulticlassClassifier::new(Config::default());
	let features = arr2(&[[1.0, 2.0]]);
	assert!(!classifier.is_fitted());
	assert!(matches!(
		classifier.predict(features.view()),
		Err(Error::NotFitted)
	));
	assert!(matches!(
		classifier.predict_proba(features.view()),
		Err(Error::NotFitted)
	));
	assert!(classifier.weights().is_none());
	assert!(classifier.losses().is_empty());
}

#[test]
fn test_separable_blobs() {
	let (features, labels) = separable_blobs(50, 0);
	let mut classifier = WeakMulticlassClassifier::new(gradient_descent_config(
		2,
		LossMode::StandardWeak,
		500,
		0.01,
		0,
	));
	let accuracy = classifier
		.fit(features.view(), labels.view())
		.unwrap()
		.score(features.view(), labels.view())
		.unwrap()
		.unwrap();
	assert!(accuracy >= 0.95, "accuracy {}", accuracy);
	let probabilities = classifier.predict_proba(features.view()).unwrap();
	assert_eq!(probabilities.dim(), (100, 2));
	for row in probabilities.rows() {
		assert!((row.sum() - 1.0).abs() < 1e-12);
	}
	assert_eq!(classifier.weights().unwrap().dim(), (2, 2));
	assert_eq!(classifier.losses().len(), 500);
}

#[test]
fn test_closed_form_separable_blobs() {
	let (features, labels) = separable_blobs(50, 1);
	let config = Config {
		optimizer: OptimizerKind::GradientDescentClosedForm,
		..gradient_descent_config(2, LossMode::StandardWeak, 500, 0.01, 3)
	};
	let mut classifier = WeakMulticlassClassifier::new(config);
	classifier.fit(features.view(), labels.view()).unwrap();
	let accuracy = classifier
		.score(features.view(), labels.view())
		.unwrap()
		.unwrap();
	assert!(accuracy >= 0.95, "accuracy {}", accuracy);
}

#[test]
fn test_fit_is_deterministic_for_a_seed() {
	let (features, labels) = separable_blobs(20, 2);
	let config = gradient_descent_config(2, LossMode::StandardWeak, 50, 0.01, 17);
	let mut first = WeakMulticlassClassifier::new(config.clone());
	first.fit(features.view(), labels.view()).unwrap();
	let mut second = WeakMulticlassClassifier::new(config);
	second.fit(features.view(), labels.view()).unwrap();
	assert_eq!(first.weights().unwrap(), second.weights().unwrap());
	// Refitting the same instance replaces the weights with the same result.
	let before = first.weights().unwrap().to_owned();
	first.fit(features.view(), labels.view()).unwrap();
	assert_eq!(first.weights().unwrap(), before);
}

#[test]
fn test_different_seeds_start_from_different_weights() {
	let (features, labels) = separable_blobs(20, 2);
	let mut first =
		WeakMulticlassClassifier::new(gradient_descent_config(2, LossMode::StandardWeak, 1, 0.01, 1));
	first.fit(features.view(), labels.view()).unwrap();
	let mut second =
		WeakMulticlassClassifier::new(gradient_descent_config(2, LossMode::StandardWeak, 1, 0.01, 2));
	second.fit(features.view(), labels.view()).unwrap();
	assert_ne!(first.weights().unwrap(), second.weights().unwrap());
}

#[test]
fn test_loss_does_not_increase_with_a_small_learning_rate() {
	let (features, labels) = separable_blobs(10, 4);
	let mut classifier = WeakMulticlassClassifier::new(gradient_descent_config(
		2,
		LossMode::StandardWeak,
		100,
		0.0005,
		5,
	));
	classifier.fit(features.view(), labels.view()).unwrap();
	let losses = classifier.losses();
	assert_eq!(losses.len(), 100);
	for (previous, next) in losses.iter().zip(losses.iter().skip(1)) {
		assert!(next <= &(previous + 1e-9), "{} then {}", previous, next);
	}
	assert!(losses[99] < losses[0]);
}

#[test]
fn test_optimistic_superset_loss_beats_first_candidate() {
	let mut rng = Xoshiro256Plus::seed_from_u64(8);
	let centers = arr2(&[[3.0, 0.0], [-1.5, 2.6], [-1.5, -2.6]]);
	let (points, labels) = gaussian_blobs(centers.view(), 60, 0.5, &mut rng);
	// A constant column lets each class have its own bias.
	let mut features = Array2::ones((points.nrows(), 3));
	features.slice_mut(s![.., 0..2]).assign(&points);
	let candidates = candidate_sets(labels.view(), 3, 2, &mut rng).unwrap();
	for (row, label) in izip!(candidates.rows(), labels.iter()) {
		assert_eq!(row.sum(), 2.0);
		assert_eq!(row[*label], 1.0);
	}

	// Treat the first candidate of each set as the label.
	let first_candidates: Array1<usize> = candidates
		.rows()
		.into_iter()
		.map(|row| row.iter().position(|value| *value == 1.0).unwrap())
		.collect();
	let mut baseline = WeakMulticlassClassifier::new(gradient_descent_config(
		3,
		LossMode::StandardWeak,
		500,
		0.001,
		0,
	));
	baseline.fit(features.view(), first_candidates.view()).unwrap();
	let baseline_accuracy = baseline
		.score(features.view(), labels.view())
		.unwrap()
		.unwrap();

	// The optimistic superset loss is not convex. A start where a cluster's true class is the least probable candidate can settle on the wrong class, and this seed does not.
	let mut classifier = WeakMulticlassClassifier::new(gradient_descent_config(
		3,
		LossMode::OptimisticSupersetLoss,
		500,
		0.001,
		0,
	));
	classifier.fit(features.view(), candidates.view()).unwrap();
	let osl_accuracy = classifier
		.score(features.view(), labels.view())
		.unwrap()
		.unwrap();
	assert!(
		osl_accuracy > baseline_accuracy,
		"optimistic superset loss accuracy {} baseline accuracy {}",
		osl_accuracy,
		baseline_accuracy
	);
	assert!(osl_accuracy > 0.9, "accuracy {}", osl_accuracy);
}

#[test]
fn test_soft_targets_with_external_minimizer() {
	let features = arr2(&[[1.0, 0.0], [0.0, 1.0]]);
	let targets = arr2(&[[0.7, 0.3], [0.2, 0.8]]);
	let config = Config {
		optimizer: OptimizerKind::External("fixed_step".to_owned()),
		params: None,
		..Default::default()
	};
	let minimizer = FixedStepMinimizer {
		max_iterations: 10_000,
		step_size: 0.5,
		tolerance: 1e-8,
	};
	let mut classifier = WeakMulticlassClassifier::with_minimizer(config, Box::new(minimizer));
	let mut reported = Vec::new();
	classifier
		.fit_with_progress(features.view(), targets.view(), &mut |progress| {
			if let Progress::Minimizing(name) = progress {
				reported.push(name)
			}
		})
		.unwrap();
	assert_eq!(reported, vec!["fixed_step".to_owned()]);
	let probabilities = classifier.predict_proba(features.view()).unwrap();
	for (p, t) in probabilities.iter().zip(targets.iter()) {
		assert!((p - t).abs() < 1e-6, "{} != {}", p, t);
	}
	assert_eq!(classifier.predict(features.view()).unwrap(), arr1(&[0, 1]));
	assert!(classifier.losses().is_empty());
	let log_loss = classifier
		.log_loss(features.view(), targets.view())
		.unwrap()
		.unwrap();
	let entropy = -(0.7f64 * 0.7f64.ln() + 0.3 * 0.3f64.ln() + 0.2 * 0.2f64.ln() + 0.8 * 0.8f64.ln()) / 2.0;
	assert!((log_loss - entropy).abs() < 1e-6);
}

#[test]
fn test_external_optimizer_without_minimizer() {
	let config = Config {
		optimizer: OptimizerKind::External("lbfgs".to_owned()),
		..Default::default()
	};
	let mut classifier = WeakMulticlassClassifier::new(config);
	let features = arr2(&[[1.0, 0.0]]);
	let labels = arr1(&[0usize]);
	let error = classifier
		.fit(features.view(), labels.view())
		.unwrap_err();
	insta::assert_snapshot!(error.to_string(), @r###"no minimizer is attached for the external optimizer "lbfgs""###);
	assert!(!classifier.is_fitted());
}

#[test]
fn test_convergence_failure_is_reported() {
	let config = Config {
		optimizer: OptimizerKind::External("fixed_step".to_owned()),
		..Default::default()
	};
	let minimizer = FixedStepMinimizer {
		max_iterations: 2,
		step_size: 0.1,
		tolerance: 1e-12,
	};
	let mut classifier = WeakMulticlassClassifier::with_minimizer(config, Box::new(minimizer));
	let (features, labels) = separable_blobs(5, 0);
	let result = classifier.fit(features.view(), labels.view());
	assert!(matches!(result, Err(Error::ConvergenceFailure(_))));
	assert!(!classifier.is_fitted());
}

#[test]
fn test_label_errors() {
	let features = arr2(&[[1.0, 0.0], [0.0, 1.0]]);
	let mut classifier = WeakMulticlassClassifier::new(Config::default());
	let out_of_range = arr1(&[0usize, 2]);
	assert!(matches!(
		classifier.fit(features.view(), out_of_range.view()),
		Err(Error::IndexOutOfRange { index: 2, dim: 2 })
	));
	let too_few = arr1(&[0usize]);
	assert!(matches!(
		classifier.fit(features.view(), too_few.view()),
		Err(Error::ShapeMismatch(_))
	));
	let wrong_width = arr2(&[[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]);
	assert!(matches!(
		classifier.fit(features.view(), wrong_width.view()),
		Err(Error::ShapeMismatch(_))
	));
	classifier
		.fit(features.view(), arr1(&[0usize, 1]).view())
		.unwrap();
	assert!(matches!(
		classifier.predict(arr2(&[[1.0, 0.0, 0.0]]).view()),
		Err(Error::ShapeMismatch(_))
	));
}

#[test]
fn test_get_params_returns_the_config() {
	let config = Config {
		n_classes: 4,
		method: LossMode::OptimisticSupersetLoss,
		seed: 3,
		..Default::default()
	};
	let mut classifier = WeakMulticlassClassifier::new(config.clone());
	let features = arr2(&[[1.0, 0.0], [0.0, 1.0]]);
	let candidates = arr2(&[[1.0, 1.0, 0.0, 0.0], [0.0, 0.0, 1.0, 1.0]]);
	classifier.fit(features.view(), candidates.view()).unwrap();
	assert_eq!(classifier.get_params(), &config);
}
