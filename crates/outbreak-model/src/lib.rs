#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/outbreak-risk/outbreak/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod checkpoint;
pub mod classifier;
pub mod error;
pub mod evaluator;
pub mod loss;
pub mod metrics;
pub mod optim;
pub mod trainer;

pub use checkpoint::{Checkpoint, ModelSchema};
pub use classifier::{LstmCache, LstmClassifier, LstmConfig, SequenceClassifier};
pub use error::{ModelError, Result};
pub use evaluator::{Evaluation, SequenceEvaluator};
pub use loss::{WeightedBce, pos_weight, sigmoid};
pub use metrics::{auc, auc_or_zero, roc_curve};
pub use optim::{Adam, PlateauScheduler};
pub use trainer::{ImbalancedSequenceTrainer, TrainOutcome, TrainerConfig};
