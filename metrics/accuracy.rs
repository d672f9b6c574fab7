use super::StreamingMetric;

/// Accuracy is the fraction of examples whose predicted class equals the label.
#[derive(Clone, Debug, Default)]
pub struct Accuracy {
	n_correct: u64,
	n_examples: u64,
}

impl Accuracy {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn n_examples(&self) -> u64 {
		self.n_examples
	}
}

impl StreamingMetric<'_> for Accuracy {
	/// `(prediction, label)`
	type Input = (usize, usize);
	type Output = Option<f64>;

	fn update(&mut self, (prediction, label): (usize, usize)) {
		self.n_examples += 1;
		if prediction == label {
			self.n_correct += 1;
		}
	}

	fn merge(&mut self, other: Self) {
		self.n_correct += other.n_correct;
		self.n_examples += other.n_examples;
	}

	/// Returns `None` if no examples were seen.
	fn finalize(self) -> Option<f64> {
		if self.n_examples == 0 {
			None
		} else {
			Some(self.n_correct as f64 / self.n_examples as f64)
		}
	}
}

#[test]
fn test_accuracy() {
	let mut accuracy = Accuracy::new();
	for pair in &[(0, 0), (1, 1), (2, 1), (2, 2)] {
		accuracy.update(*pair);
	}
	assert_eq!(accuracy.n_examples(), 4);
	assert_eq!(accuracy.finalize(), Some(0.75));
}

#[test]
fn test_accuracy_merge() {
	let mut left = Accuracy::new();
	left.update((1, 1));
	let mut right = Accuracy::new();
	right.update((0, 1));
	right.update((2, 2));
	right.update((3, 3));
	left.merge(right);
	assert_eq!(left.finalize(), Some(0.75));
	assert_eq!(Accuracy::new().finalize(), None);
}
