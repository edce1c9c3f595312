// src/config/mod.rs

//! Plan file loading and validation.
//!
//! A plan (`Codeloom.toml` by default) names the backends to run against and
//! either a free-form task description, pre-drafted subtasks, or both. The
//! raw TOML shape lives in [`model`]; [`validate`] turns it into a
//! [`PlanFile`](model::PlanFile) or a precise `PlanError`.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_plan_path, load_and_validate, load_from_path};
pub use model::{PlanFile, RawPlanFile};
