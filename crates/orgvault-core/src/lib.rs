//! OrgVault Core — domain models, error taxonomy, repository traits and
//! the access resolver shared by every other crate.

pub mod access;
pub mod error;
pub mod models;
pub mod repository;
