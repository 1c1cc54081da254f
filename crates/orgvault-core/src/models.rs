//! Domain models for OrgVault.
//!
//! These are the core types shared across all crates.

pub mod credential;
pub mod division;
pub mod membership;
pub mod ou;
pub mod user;

/// Normalize a display name for uniqueness checks: trimmed and lowercased.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}
