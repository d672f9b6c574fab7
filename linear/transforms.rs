use crate::Error;
use ndarray::prelude::*;
use rayon::prelude::*;

/// Compute the row-wise softmax of `scores`. Each row's max is subtracted before exponentiating so large scores do not overflow.
pub fn softmax(scores: ArrayView2<f64>) -> Array2<f64> {
	let mut probabilities = scores.to_owned();
	softmax_in_place(probabilities.view_mut());
	probabilities
}

pub(crate) fn softmax_in_place(mut logits: ArrayViewMut2<f64>) {
	logits
		.axis_iter_mut(Axis(0))
		.into_par_iter()
		.for_each(|mut logits| {
			let max = row_max(logits.view());
			logits -= max;
			logits.mapv_inplace(|logit| logit.exp());
			let sum = logits.sum();
			logits /= sum;
		});
}

/// Compute the row-wise log of the softmax of `scores` directly as `(x - max) - ln(sum(exp(x - max)))`, which never takes the log of an underflowed probability.
pub fn log_softmax(scores: ArrayView2<f64>) -> Array2<f64> {
	let mut log_probabilities = scores.to_owned();
	log_probabilities
		.axis_iter_mut(Axis(0))
		.into_par_iter()
		.for_each(|mut row| {
			let max = row_max(row.view());
			row -= max;
			let log_sum = row.fold(0.0, |sum, value| sum + value.exp()).ln();
			row -= log_sum;
		});
	log_probabilities
}

/// Convert class indices into an `(indices.len(), dim)` matrix with a single 1 in each row.
pub fn one_hot(indices: ArrayView1<usize>, dim: usize) -> Result<Array2<f64>, Error> {
	let mut encoded = Array2::zeros((indices.len(), dim));
	for (mut row, &index) in encoded.axis_iter_mut(Axis(0)).zip(indices.iter()) {
		if index >= dim {
			return Err(Error::IndexOutOfRange { index, dim });
		}
		row[index] = 1.0;
	}
	Ok(encoded)
}

/**
Replace each row of `z` with a mask that is 0 at non-maximal entries and `1 / k` at each of the `k` entries equal to the row's maximum.

This is how ambiguous weak labels are resolved: ties split the mass uniformly, so a row with a unique maximum becomes the one-hot encoding of its arg-max.
*/
pub fn hardmax(z: ArrayView2<f64>) -> Array2<f64> {
	let mut mask = z.to_owned();
	mask.axis_iter_mut(Axis(0))
		.into_par_iter()
		.for_each(|mut row| {
			let max = row_max(row.view());
			let n_max = row.iter().filter(|value| **value == max).count();
			let weight = 1.0 / n_max as f64;
			row.mapv_inplace(|value| if value == max { weight } else { 0.0 });
		});
	mask
}

/// Return the index of the largest entry in `row`. Ties go to the lowest index.
pub(crate) fn argmax(row: ArrayView1<f64>) -> usize {
	let mut best_index = 0;
	let mut best_value = std::f64::NEG_INFINITY;
	for (index, &value) in row.iter().enumerate() {
		if value > best_value {
			best_index = index;
			best_value = value;
		}
	}
	best_index
}

fn row_max(row: ArrayView1<f64>) -> f64 {
	row.fold(std::f64::NEG_INFINITY, |max, &value| max.max(value))
}

#[cfg(test)]
const TOLERANCE: f64 = 1e-12;

#[test]
fn test_softmax_rows_sum_to_one() {
	let scores = arr2(&[[1.0, 2.0, 3.0], [-100.0, 0.0, 100.0], [0.0, 0.0, 0.0]]);
	let probabilities = softmax(scores.view());
	for row in probabilities.rows() {
		assert!((row.sum() - 1.0).abs() < TOLERANCE);
		assert!(row.iter().all(|p| *p >= 0.0 && *p <= 1.0));
	}
	assert!((probabilities[[2, 0]] - 1.0 / 3.0).abs() < TOLERANCE);
}

#[test]
fn test_softmax_does_not_overflow() {
	let scores = arr2(&[[1000.0, 1000.0], [1e300, 0.0]]);
	let probabilities = softmax(scores.view());
	assert_eq!(probabilities, arr2(&[[0.5, 0.5], [1.0, 0.0]]));
}

#[test]
fn test_softmax_translation_invariance() {
	let scores = arr2(&[[0.3, -1.2, 2.5, 0.0], [4.0, 4.5, -3.0, 1.0]]);
	let shifted = &scores + 17.25;
	let left = softmax(scores.view());
	let right = softmax(shifted.view());
	for (a, b) in left.iter().zip(right.iter()) {
		assert!((a - b).abs() < 1e-10);
	}
}

#[test]
fn test_log_softmax_matches_log_of_softmax() {
	let scores = arr2(&[[0.3, -1.2, 2.5, 0.0], [4.0, 4.5, -3.0, 1.0], [-7.0, 0.0, 7.0, 0.5]]);
	let log_probabilities = log_softmax(scores.view());
	let probabilities = softmax(scores.view());
	for (log_p, p) in log_probabilities.iter().zip(probabilities.iter()) {
		assert!(*log_p <= 0.0);
		assert!((log_p - p.ln()).abs() < 1e-10);
	}
}

#[test]
fn test_log_softmax_is_finite_where_softmax_underflows() {
	let scores = arr2(&[[0.0, 2000.0]]);
	let log_probabilities = log_softmax(scores.view());
	assert!((log_probabilities[[0, 0]] + 2000.0).abs() < TOLERANCE);
	assert!(log_probabilities[[0, 1]].abs() < TOLERANCE);
}

#[test]
fn test_one_hot() {
	let encoded = one_hot(arr1(&[2, 0, 1, 2]).view(), 3).unwrap();
	assert_eq!(
		encoded,
		arr2(&[
			[0.0, 0.0, 1.0],
			[1.0, 0.0, 0.0],
			[0.0, 1.0, 0.0],
			[0.0, 0.0, 1.0],
		])
	);
	for row in encoded.rows() {
		assert_eq!(row.sum(), 1.0);
	}
}

#[test]
fn test_one_hot_index_out_of_range() {
	let result = one_hot(arr1(&[0, 3]).view(), 3);
	assert!(matches!(
		result,
		Err(Error::IndexOutOfRange { index: 3, dim: 3 })
	));
}

#[test]
fn test_hardmax() {
	let z = arr2(&[[0.1, 0.7, 0.2], [0.4, 0.1, 0.4], [0.0, 0.0, 0.0], [0.0, 0.0, 0.9]]);
	let mask = hardmax(z.view());
	assert_eq!(mask.row(0), arr1(&[0.0, 1.0, 0.0]));
	assert_eq!(mask.row(1), arr1(&[0.5, 0.0, 0.5]));
	assert_eq!(mask.row(3), arr1(&[0.0, 0.0, 1.0]));
	for row in mask.rows() {
		assert!((row.sum() - 1.0).abs() < TOLERANCE);
		let nonzero: Vec<f64> = row.iter().copied().filter(|value| *value != 0.0).collect();
		assert!(nonzero.iter().all(|value| *value == 1.0 / nonzero.len() as f64));
	}
}

#[test]
fn test_argmax_ties_go_to_lowest_index() {
	assert_eq!(argmax(arr1(&[0.2, 0.4, 0.4]).view()), 1);
	assert_eq!(argmax(arr1(&[0.5, 0.5]).view()), 0);
	assert_eq!(argmax(arr1(&[0.1, 0.2, 0.7]).view()), 2);
}
