use super::{mean::Mean, StreamingMetric};
use itertools::izip;
use ndarray::prelude::*;
use num_traits::clamp;

/// CrossEntropy is the loss function used in multiclass classification, generalized to soft and weak targets. [Learn more](https://en.wikipedia.org/wiki/Cross_entropy#Cross-entropy_loss_function_and_logistic_regression).
#[derive(Debug, Default)]
pub struct CrossEntropy(Mean);

/// The input to [CrossEntropy](struct.CrossEntropy.html).
pub struct CrossEntropyInput<'a> {
	/// (n_classes)
	pub probabilities: ArrayView1<'a, f64>,
	/// (n_classes) A one-hot row for a hard label, or any non-negative weighting of the classes for a weak label.
	pub targets: ArrayView1<'a, f64>,
}

impl<'a> StreamingMetric<'a> for CrossEntropy {
	type Input = CrossEntropyInput<'a>;
	type Output = Option<f64>;

	fn update(&mut self, value: CrossEntropyInput) {
		let mut total = 0.0;
		for (probability, target) in izip!(value.probabilities, value.targets) {
			if *target != 0.0 {
				// The log is undefined at 0, so probabilities are clamped away from 0 and 1.
				let probability = clamp(*probability, std::f64::EPSILON, 1.0 - std::f64::EPSILON);
				total += -target * probability.ln();
			}
		}
		self.0.update(total)
	}

	fn merge(&mut self, other: Self) {
		self.0.merge(other.0)
	}

	fn finalize(self) -> Option<f64> {
		self.0.finalize()
	}
}

#[test]
fn test_cross_entropy_one_hot() {
	let mut metric = CrossEntropy::default();
	let probabilities = arr1(&[0.25, 0.5, 0.25]);
	let targets = arr1(&[0.0, 1.0, 0.0]);
	metric.update(CrossEntropyInput {
		probabilities: probabilities.view(),
		targets: targets.view(),
	});
	let value = metric.finalize().unwrap();
	assert!((value - 2.0f64.ln()).abs() < 1e-12);
}

#[test]
fn test_cross_entropy_soft_targets() {
	let mut metric = CrossEntropy::default();
	let probabilities = arr2(&[[0.5, 0.5], [1.0, 0.0]]);
	let targets = arr2(&[[0.5, 0.5], [1.0, 0.0]]);
	for (probabilities, targets) in izip!(probabilities.rows(), targets.rows()) {
		metric.update(CrossEntropyInput {
			probabilities,
			targets,
		});
	}
	let value = metric.finalize().unwrap();
	insta::assert_snapshot!(format!("{:.6}", value), @"0.346574");
}
