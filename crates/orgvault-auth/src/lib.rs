//! OrgVault Auth — password login, identity resolution, and the
//! role- and scope-gated services that sit in front of the repositories.

pub mod config;
pub mod directory;
pub mod error;
pub mod password;
pub mod service;
pub mod vault;

pub use config::AuthConfig;
pub use directory::{HierarchyService, MembershipService};
pub use error::AuthError;
pub use service::{AuthService, LoginInput};
pub use vault::CredentialService;
