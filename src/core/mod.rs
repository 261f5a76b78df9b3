pub mod etl;
pub mod sequence;

pub use crate::domain::model::{PipelineReport, StageResult};
pub use crate::domain::ports::{Pipeline, Storage};
pub use crate::utils::error::Result;
pub use etl::EtlEngine;
pub use sequence::{PipelineSequence, Stage};
