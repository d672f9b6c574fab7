/*!
This module generates synthetic datasets for benchmarks and tests: gaussian blobs with hard labels, and candidate sets that weaken those labels.
*/

use crate::Error;
use ndarray::prelude::*;
use rand::{seq::index::sample, Rng};
use rand_distr::{Distribution, StandardNormal};

/**
Draw `n_per_class` points around each row of `centers`, adding independent normal noise with standard deviation `noise` to every coordinate. Class `i` is the row index of its center. Points are ordered by class.
*/
pub fn gaussian_blobs<R: Rng + ?Sized>(
	centers: ArrayView2<f64>,
	n_per_class: usize,
	noise: f64,
	rng: &mut R,
) -> (Array2<f64>, Array1<usize>) {
	let (n_classes, n_features) = centers.dim();
	let mut features = Array2::zeros((n_classes * n_per_class, n_features));
	let mut labels = Array1::zeros(n_classes * n_per_class);
	for (class, center) in centers.axis_iter(Axis(0)).enumerate() {
		for i in 0..n_per_class {
			let row = class * n_per_class + i;
			labels[row] = class;
			for (feature, center) in features.row_mut(row).iter_mut().zip(center.iter()) {
				let sample: f64 = StandardNormal.sample(rng);
				*feature = center + noise * sample;
			}
		}
	}
	(features, labels)
}

/**
Build an `(n_examples, n_classes)` candidate matrix for `labels`. Every row marks the true label and `set_size - 1` other classes chosen uniformly at random with a 1, and every other class with a 0.
*/
pub fn candidate_sets<R: Rng + ?Sized>(
	labels: ArrayView1<usize>,
	n_classes: usize,
	set_size: usize,
	rng: &mut R,
) -> Result<Array2<f64>, Error> {
	if set_size == 0 || set_size > n_classes {
		return Err(Error::InvalidSetSize {
			set_size,
			n_classes,
		});
	}
	let mut candidates = Array2::zeros((labels.len(), n_classes));
	for (mut row, label) in candidates.axis_iter_mut(Axis(0)).zip(labels.iter()) {
		let label = *label;
		if label >= n_classes {
			return Err(Error::IndexOutOfRange {
				index: label,
				dim: n_classes,
			});
		}
		row[label] = 1.0;
		// Sample among the other classes by skipping over the label.
		for other in sample(rng, n_classes - 1, set_size - 1).iter() {
			let other = if other >= label { other + 1 } else { other };
			row[other] = 1.0;
		}
	}
	Ok(candidates)
}

#[cfg(test)]
use rand::SeedableRng;
#[cfg(test)]
use rand_xoshiro::Xoshiro256Plus;

#[test]
fn test_gaussian_blobs() {
	let mut rng = Xoshiro256Plus::seed_from_u64(0);
	let centers = arr2(&[[10.0, 0.0], [-10.0, 0.0], [0.0, 10.0]]);
	let (features, labels) = gaussian_blobs(centers.view(), 4, 0.1, &mut rng);
	assert_eq!(features.dim(), (12, 2));
	assert_eq!(labels, arr1(&[0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2]));
	for (point, label) in features.axis_iter(Axis(0)).zip(labels.iter()) {
		let center = centers.row(*label);
		let distance = (&point - &center).mapv(|x| x * x).sum().sqrt();
		assert!(distance < 1.0);
	}
}

#[test]
fn test_candidate_sets_contain_the_label() {
	let mut rng = Xoshiro256Plus::seed_from_u64(1);
	let labels = arr1(&[0, 1, 2, 3, 4, 0, 4, 2]);
	let candidates = candidate_sets(labels.view(), 5, 3, &mut rng).unwrap();
	assert_eq!(candidates.dim(), (8, 5));
	for (row, label) in candidates.axis_iter(Axis(0)).zip(labels.iter()) {
		assert_eq!(row[*label], 1.0);
		assert_eq!(row.sum(), 3.0);
		assert!(row.iter().all(|value| *value == 0.0 || *value == 1.0));
	}
	let singletons = candidate_sets(labels.view(), 5, 1, &mut rng).unwrap();
	assert_eq!(singletons, crate::one_hot(labels.view(), 5).unwrap());
}

#[test]
fn test_candidate_sets_errors() {
	let mut rng = Xoshiro256Plus::seed_from_u64(2);
	let labels = arr1(&[0, 3]);
	assert!(matches!(
		candidate_sets(labels.view(), 3, 2, &mut rng),
		Err(Error::IndexOutOfRange { index: 3, dim: 3 })
	));
	let error = candidate_sets(labels.view(), 3, 4, &mut rng).unwrap_err();
	insta::assert_snapshot!(error.to_string(), @"a candidate set of size 4 cannot be drawn from 3 classes");
	assert!(matches!(
		candidate_sets(labels.view(), 3, 0, &mut rng),
		Err(Error::InvalidSetSize {
			set_size: 0,
			n_classes: 3
		})
	));
}
