pub mod generator;
pub mod orchestrator;
pub mod refiner;

#[cfg(test)]
pub(crate) mod testing;

pub use generator::{build_parts, ImageGenerator};
pub use orchestrator::{validate_image, Orchestrator};
pub use refiner::PromptRefiner;
