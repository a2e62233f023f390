#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/outbreak-risk/outbreak/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
pub mod label;
pub mod lag;
pub mod registry;
pub mod scale;
pub mod split;
pub mod stage;
pub mod window;

pub use error::{FeatureError, Result};
pub use label::{LabelWindow, OutbreakLabeler};
pub use lag::LagFeatureBuilder;
pub use registry::{
    StageCategory, StageInfo, available_stages, count_by_category, get_stage_info,
    list_stage_names, stages_by_category,
};
pub use scale::FeatureScaler;
pub use split::{FrameSplit, TemporalSplitter};
pub use stage::FrameStage;
pub use window::{SequenceWindower, Window, WindowSet};
