pub mod boundary_pipeline;
pub mod integrate_pipeline;
pub mod landcover_pipeline;
pub mod treatment_pipeline;

pub use boundary_pipeline::BoundaryPipeline;
pub use integrate_pipeline::IntegratePipeline;
pub use landcover_pipeline::LandcoverPipeline;
pub use treatment_pipeline::TreatmentPipeline;
