/*!
This crate implements a multiclass linear classifier that can be trained from weak labels. The model is a single `n_features x n_classes` weight matrix whose scores are turned into class probabilities with the `softmax` function, the same parameterization as a multiclass logistic regression.

Labels can be given as class indices, which are one-hot encoded, or as an `n_examples x n_classes` matrix of weak targets. Weak targets are interpreted according to the [`LossMode`](enum.LossMode.html): [`LossMode::StandardWeak`](enum.LossMode.html#variant.StandardWeak) treats each row as soft cross entropy targets, and [`LossMode::OptimisticSupersetLoss`](enum.LossMode.html#variant.OptimisticSupersetLoss) treats each row as a set of candidate classes and, at every evaluation, trains toward whichever candidate the current model finds most probable.

Training runs fixed-step gradient descent for a fixed number of iterations, or hands the loss and its gradient to an external [`Minimizer`](trait.Minimizer.html).

```
use ndarray::prelude::*;
use wlc_linear::{Config, WeakMulticlassClassifier};

let features = arr2(&[[-2.0, -2.0], [-1.5, -2.5], [2.0, 2.0], [2.5, 1.5]]);
let labels = arr1(&[0usize, 0, 1, 1]);
let mut classifier = WeakMulticlassClassifier::new(Config::default());
classifier.fit(features.view(), labels.view()).unwrap();
let predictions = classifier.predict(features.view()).unwrap();
assert_eq!(predictions, labels);
```
*/

use thiserror::Error;

mod config;
mod loss;
mod minimizer;
mod multiclass_classifier;
mod optimizer;
mod progress;
pub mod synthetic;
#[cfg(test)]
mod test;
mod transforms;

pub use self::config::Config;
pub use self::loss::{gradient, loss, loss_and_gradient, LossAndGradient, LossMode, Objective};
pub use self::minimizer::{MinimizeResult, Minimizer};
pub use self::multiclass_classifier::{Labels, WeakMulticlassClassifier};
pub use self::optimizer::{OptimizerKind, TrainOptions};
pub use self::progress::{Progress, ProgressCounter};
pub use self::transforms::{hardmax, log_softmax, one_hot, softmax};

#[derive(Debug, Error)]
pub enum Error {
	#[error("shape mismatch: {0}")]
	ShapeMismatch(String),
	#[error("index {index} is out of range for dimension {dim}")]
	IndexOutOfRange { index: usize, dim: usize },
	#[error("the classifier has not been fit")]
	NotFitted,
	#[error("the minimizer failed to converge: {0}")]
	ConvergenceFailure(String),
	#[error("no minimizer is attached for the external optimizer \"{0}\"")]
	MissingMinimizer(String),
	#[error("invalid config: {0}")]
	InvalidConfig(String),
	#[error("a candidate set of size {set_size} cannot be drawn from {n_classes} classes")]
	InvalidSetSize { set_size: usize, n_classes: usize },
	#[error("failed to parse config")]
	Json(#[from] serde_json::Error),
	#[error("failed to read config")]
	Io(#[from] std::io::Error),
}
