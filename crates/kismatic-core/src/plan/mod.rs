//! The installation plan: entity types, legacy migration, defaults,
//! templates and the annotated YAML format.

pub mod comments;
pub mod defaults;
pub mod migrate;
pub mod model;
pub mod template;
pub mod yaml_format;

pub use defaults::apply_defaults;
pub use migrate::{MIGRATIONS, Migration, migrate};
pub use model::*;
pub use template::{PlanTemplateOptions, build_from_template};
pub use yaml_format::{normalize, read_plan, render_plan, write_plan};
