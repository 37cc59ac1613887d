pub mod hire_pipeline;

pub use hire_pipeline::{HirePipeline, InboundWebhook, PipelineResponse, PipelineSettings};
