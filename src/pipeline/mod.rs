// Flattening pipeline: the processing passes and the run driver

pub mod processing;
mod runner;

pub use runner::{Pipeline, PipelineOutput, PipelineResult};
