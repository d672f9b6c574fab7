use std::sync::{
	atomic::{AtomicU64, Ordering},
	Arc,
};

/// This is the training progress passed to the `update_progress` callback of [`WeakMulticlassClassifier::fit_with_progress`](struct.WeakMulticlassClassifier.html#method.fit_with_progress).
#[derive(Clone, Debug)]
pub enum Progress {
	/// A built-in gradient descent optimizer is running. The counter is incremented once per iteration.
	Training(ProgressCounter),
	/// The training problem was handed to the external minimizer with this name.
	Minimizing(String),
}

/// The number of finished gradient descent iterations out of `total`. Clones share the count, so a progress bar on another thread can poll it while training advances it.
#[derive(Clone, Debug)]
pub struct ProgressCounter {
	completed: Arc<AtomicU64>,
	total: u64,
}

impl ProgressCounter {
	pub fn new(total: u64) -> Self {
		Self {
			completed: Arc::new(AtomicU64::new(0)),
			total,
		}
	}

	pub fn total(&self) -> u64 {
		self.total
	}

	pub fn completed(&self) -> u64 {
		self.completed.load(Ordering::Relaxed)
	}

	/// The completed share of the work in `[0, 1]`. A counter with nothing to do is complete.
	pub fn fraction(&self) -> f64 {
		if self.total == 0 {
			1.0
		} else {
			self.completed() as f64 / self.total as f64
		}
	}

	/// Record one more finished iteration.
	pub(crate) fn advance(&self) {
		self.completed.fetch_add(1, Ordering::Relaxed);
	}
}

#[test]
fn test_progress_counter_clones_share_state() {
	let counter = ProgressCounter::new(4);
	let viewer = counter.clone();
	counter.advance();
	counter.advance();
	assert_eq!(viewer.completed(), 2);
	assert_eq!(viewer.total(), 4);
	assert_eq!(viewer.fraction(), 0.5);
	assert_eq!(ProgressCounter::new(0).fraction(), 1.0);
}
