// src/route/mod.rs

//! Backend catalog and per-subtask routing.
//!
//! - [`catalog`] describes the candidate backends (tier, tags, cost,
//!   context window, availability) in ranked preference order.
//! - [`router`] assigns each subtask a backend from a catalog snapshot.

pub mod catalog;
pub mod router;

pub use catalog::{BackendCatalog, BackendDescriptor};
pub use router::{Assignment, RoutingTable, assign, route_graph};
