/*!
This module defines the `Config` struct, which configures a [`WeakMulticlassClassifier`](../struct.WeakMulticlassClassifier.html).
*/

use crate::{loss::LossMode, optimizer::OptimizerKind, optimizer::TrainOptions, Error};
use std::path::Path;

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Config {
	/// The number of classes. Index labels must lie in `[0, n_classes)` and weak target matrices must have `n_classes` columns.
	#[serde(default = "default_n_classes")]
	pub n_classes: usize,
	#[serde(default)]
	pub method: LossMode,
	#[serde(default)]
	pub optimizer: OptimizerKind,
	/// Required by the built-in gradient descent optimizers, ignored by external ones. When omitted from JSON, the default `TrainOptions` are used.
	#[serde(default = "default_params")]
	pub params: Option<TrainOptions>,
	/// Seeds the random number generator used to initialize the weights.
	#[serde(default)]
	pub seed: u64,
}

fn default_n_classes() -> usize {
	2
}

fn default_params() -> Option<TrainOptions> {
	Some(TrainOptions::default())
}

impl Default for Config {
	fn default() -> Self {
		Self {
			n_classes: default_n_classes(),
			method: LossMode::default(),
			optimizer: OptimizerKind::default(),
			params: default_params(),
			seed: 0,
		}
	}
}

impl Config {
	pub fn from_json(json: &str) -> Result<Self, Error> {
		Ok(serde_json::from_str(json)?)
	}

	pub fn from_path(path: &Path) -> Result<Self, Error> {
		let json = std::fs::read_to_string(path)?;
		Self::from_json(&json)
	}

	pub fn to_json(&self) -> Result<String, Error> {
		Ok(serde_json::to_string_pretty(self)?)
	}

	/// Check that the config can be used to train. This is called at the start of every fit.
	pub fn validate(&self) -> Result<(), Error> {
		if self.n_classes == 0 {
			return Err(Error::InvalidConfig("n_classes must be positive".to_owned()));
		}
		match &self.optimizer {
			OptimizerKind::GradientDescentAccumulated | OptimizerKind::GradientDescentClosedForm => {
				let params = self.params.as_ref().ok_or_else(|| {
					Error::InvalidConfig(format!("params are required for {}", self.optimizer))
				})?;
				if params.n_iterations == 0 {
					return Err(Error::InvalidConfig("n_iterations must be positive".to_owned()));
				}
				if !(params.learning_rate.is_finite() && params.learning_rate > 0.0) {
					return Err(Error::InvalidConfig(format!(
						"learning_rate must be a positive number, got {}",
						params.learning_rate
					)));
				}
			}
			OptimizerKind::External(name) => {
				if name.is_empty() {
					return Err(Error::InvalidConfig(
						"the external optimizer needs a name".to_owned(),
					));
				}
			}
		}
		Ok(())
	}
}

#[test]
fn test_default_config_json() {
	let json = Config::default().to_json().unwrap();
	insta::assert_snapshot!(json, @r###"
 {
   "n_classes": 2,
   "method": "standard_weak",
   "optimizer": "gradient_descent_accumulated",
   "params": {
     "n_iterations": 100,
     "learning_rate": 0.01,
     "record_losses": false
   },
   "seed": 0
 }
 "###);
}

#[test]
fn test_config_from_json() {
	let config = Config::from_json(
		r#"{
			"n_classes": 3,
			"method": "osl",
			"optimizer": "gradient_descent_closed_form",
			"params": { "n_iterations": 500, "learning_rate": 0.001 },
			"seed": 9
		}"#,
	)
	.unwrap();
	assert_eq!(
		config,
		Config {
			n_classes: 3,
			method: LossMode::OptimisticSupersetLoss,
			optimizer: OptimizerKind::GradientDescentClosedForm,
			params: Some(TrainOptions {
				n_iterations: 500,
				learning_rate: 0.001,
				record_losses: false,
			}),
			seed: 9,
		}
	);
	config.validate().unwrap();
}

#[test]
fn test_external_config_from_json() {
	let config = Config::from_json(r#"{ "optimizer": { "external": "lbfgs" } }"#).unwrap();
	assert_eq!(config.n_classes, 2);
	assert_eq!(config.optimizer, OptimizerKind::External("lbfgs".to_owned()));
	config.validate().unwrap();
	let config = Config::from_json(r#"{ "optimizer": { "external": "lbfgs" }, "params": null }"#).unwrap();
	assert_eq!(config.params, None);
	config.validate().unwrap();
}

#[test]
fn test_validate() {
	let config = Config {
		params: None,
		..Default::default()
	};
	insta::assert_snapshot!(config.validate().unwrap_err().to_string(), @"invalid config: params are required for gradient descent (accumulated)");
	let config = Config {
		n_classes: 0,
		..Default::default()
	};
	assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
	let config = Config {
		params: Some(TrainOptions {
			learning_rate: -0.1,
			..Default::default()
		}),
		..Default::default()
	};
	assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
}

#[test]
fn test_unknown_method_is_rejected() {
	let result = Config::from_json(r#"{ "method": "bias_corrected" }"#);
	assert!(matches!(result, Err(Error::Json(_))));
}
