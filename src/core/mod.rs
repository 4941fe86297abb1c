//! Core logic: roster handling, templates, resolution, reconciliation and
//! the command registry.

pub mod config;
pub mod error;
pub mod params;
pub mod parser;
pub mod reconcile;
pub mod registry;
pub mod resolver;
pub mod submission;
pub mod template;
pub mod types;
