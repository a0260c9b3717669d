pub mod pipeline;

pub use pipeline::{PipelineError, PipelineOutput, QualityOutput, RiskPipeline};
