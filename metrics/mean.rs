use super::StreamingMetric;
use num_traits::ToPrimitive;

/// The arithmetic mean of a stream of values, merged across chunks by weighting each side by its count.
#[derive(Clone, Debug, Default)]
pub struct Mean {
	n: u64,
	mean: f64,
}

impl StreamingMetric<'_> for Mean {
	type Input = f64;
	type Output = Option<f64>;

	fn update(&mut self, value: f64) {
		self.n += 1;
		self.mean += (value - self.mean) / self.n.to_f64().unwrap();
	}

	fn merge(&mut self, other: Self) {
		let n = self.n + other.n;
		if n == 0 {
			return;
		}
		let n_a = self.n.to_f64().unwrap();
		let n_b = other.n.to_f64().unwrap();
		self.mean = ((n_a * self.mean) + (n_b * other.mean)) / (n_a + n_b);
		self.n = n;
	}

	fn finalize(self) -> Option<f64> {
		if self.n > 0 {
			Some(self.mean)
		} else {
			None
		}
	}
}

#[test]
fn test_mean_empty() {
	assert_eq!(Mean::default().finalize(), None);
}

#[test]
fn test_mean_merge() {
	let mut left = Mean::default();
	for value in &[1.0, 2.0, 3.0] {
		left.update(*value);
	}
	let mut right = Mean::default();
	right.update(10.0);
	left.merge(right);
	assert_eq!(left.finalize(), Some(4.0));
}

#[test]
fn test_mean_merge_empty() {
	let mut left = Mean::default();
	left.merge(Mean::default());
	assert_eq!(left.finalize(), None);
}
