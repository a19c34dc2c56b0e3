pub mod admission;
pub mod engine;
pub mod error;
pub mod locator;
pub mod plan;
pub mod store;
pub mod validate;
pub mod workflow;

pub use error::{NodeField, PlanError};
