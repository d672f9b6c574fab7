use ndarray::prelude::*;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;
use wlc_linear::{
	synthetic::{candidate_sets, gaussian_blobs},
	Config, LossMode, OptimizerKind, TrainOptions, WeakMulticlassClassifier,
};

fn main() {
	env_logger::init();

	// generate the data
	let n_per_class_train = 200;
	let n_per_class_test = 50;
	let n_classes = 3;
	let centers = arr2(&[[3.0, 0.0, 1.0], [-1.5, 2.6, 1.0], [-1.5, -2.6, 1.0]]);
	let mut rng = Xoshiro256Plus::seed_from_u64(0);
	let (features_train, labels_train) =
		gaussian_blobs(centers.view(), n_per_class_train, 0.75, &mut rng);
	let (features_test, labels_test) =
		gaussian_blobs(centers.view(), n_per_class_test, 0.75, &mut rng);
	let candidates_train = candidate_sets(labels_train.view(), n_classes, 2, &mut rng).unwrap();

	for method in &[LossMode::StandardWeak, LossMode::OptimisticSupersetLoss] {
		// train the model
		let config = Config {
			n_classes,
			method: *method,
			optimizer: OptimizerKind::GradientDescentAccumulated,
			params: Some(TrainOptions {
				n_iterations: 1000,
				learning_rate: 0.0005,
				record_losses: false,
			}),
			seed: 0,
		};
		let mut classifier = WeakMulticlassClassifier::new(config);
		classifier
			.fit(features_train.view(), candidates_train.view())
			.unwrap();

		// compute metrics
		let accuracy = classifier
			.score(features_test.view(), labels_test.view())
			.unwrap();
		let log_loss = classifier
			.log_loss(features_test.view(), labels_test.view())
			.unwrap();
		println!(
			"{}: accuracy {:?} log loss {:?}",
			method, accuracy, log_loss
		);
	}
}
