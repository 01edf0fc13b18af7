pub mod logger;
pub mod volume_pipeline;
