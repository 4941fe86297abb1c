//! gitlab-batch — batch operations on GitLab projects and accounts.
//!
//! Each command walks a CSV roster, derives a project path (or account) per
//! row from a template, and converges that project to a desired state.
//! Running a command twice changes nothing the second time.

pub mod cli;
pub mod core;
pub mod resources;
pub mod transport;
