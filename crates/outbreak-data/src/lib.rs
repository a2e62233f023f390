#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/outbreak-risk/outbreak/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
pub mod frame;
pub mod io;
pub mod source;
pub mod time;

pub use error::{DataError, Result};
pub use frame::{ColumnNames, FeatureFrame, FrameSummary};
pub use io::{read_csv, write_csv};
pub use source::{CsvFeatureSource, FeatureSource, TimeRange, join_sources};
pub use time::{TimeBoundary, TimeKind};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
