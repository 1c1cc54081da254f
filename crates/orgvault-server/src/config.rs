//! Server configuration from command-line flags, each backed by an
//! `ORGVAULT_*` environment variable.

use clap::Parser;
use orgvault_auth::AuthConfig;
use orgvault_db::{DbConfig, RootCredentials};

/// Credentials of the admin account ensured at startup.
#[derive(Debug, Clone)]
pub struct AdminBootstrap {
    pub email: String,
    pub password: String,
}

/// OrgVault server: shared credentials filed under OUs and divisions.
#[derive(Debug, Clone, Parser)]
#[command(name = "orgvault", version, long_about = None)]
pub struct ServerConfig {
    /// SurrealDB endpoint, `ws://host:port` or `mem://`
    #[arg(long, env = "ORGVAULT_DB_URL", default_value = "ws://127.0.0.1:8000")]
    pub db_url: String,

    #[arg(long, env = "ORGVAULT_DB_NAMESPACE", default_value = "orgvault")]
    pub db_namespace: String,

    #[arg(long, env = "ORGVAULT_DB_DATABASE", default_value = "main")]
    pub db_database: String,

    /// Root user to sign in as; leave unset for `mem://`
    #[arg(long, env = "ORGVAULT_DB_USERNAME", requires = "db_password")]
    pub db_username: Option<String>,

    #[arg(
        long,
        env = "ORGVAULT_DB_PASSWORD",
        requires = "db_username",
        hide_env_values = true
    )]
    pub db_password: Option<String>,

    /// Secret prepended to passwords before hashing
    #[arg(long, env = "ORGVAULT_PASSWORD_PEPPER", hide_env_values = true)]
    pub password_pepper: Option<String>,

    #[arg(
        long,
        env = "ORGVAULT_MIN_PASSWORD_LENGTH",
        default_value_t = AuthConfig::default().min_password_length
    )]
    pub min_password_length: usize,

    /// Register this account, or promote it, as admin at startup
    #[arg(long, env = "ORGVAULT_ADMIN_EMAIL", requires = "admin_password")]
    pub admin_email: Option<String>,

    #[arg(
        long,
        env = "ORGVAULT_ADMIN_PASSWORD",
        requires = "admin_email",
        hide_env_values = true
    )]
    pub admin_password: Option<String>,
}

impl ServerConfig {
    pub fn db_config(&self) -> DbConfig {
        let credentials = match (&self.db_username, &self.db_password) {
            (Some(username), Some(password)) => Some(RootCredentials {
                username: username.clone(),
                password: password.clone(),
            }),
            _ => None,
        };
        DbConfig {
            endpoint: self.db_url.clone(),
            namespace: self.db_namespace.clone(),
            database: self.db_database.clone(),
            credentials,
        }
    }

    /// An empty pepper counts as none.
    pub fn auth_config(&self) -> AuthConfig {
        AuthConfig {
            pepper: self.password_pepper.clone().filter(|p| !p.is_empty()),
            min_password_length: self.min_password_length,
        }
    }

    pub fn admin(&self) -> Option<AdminBootstrap> {
        match (&self.admin_email, &self.admin_password) {
            (Some(email), Some(password)) => Some(AdminBootstrap {
                email: email.clone(),
                password: password.clone(),
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    fn parse(args: &[&str]) -> Result<ServerConfig, clap::Error> {
        ServerConfig::try_parse_from(std::iter::once("orgvault").chain(args.iter().copied()))
    }

    #[test]
    fn command_definition_is_consistent() {
        ServerConfig::command().debug_assert();
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = parse(&[]).unwrap();

        let db = config.db_config();
        assert_eq!(db.endpoint, "ws://127.0.0.1:8000");
        assert_eq!(db.namespace, "orgvault");
        assert!(db.credentials.is_none());

        let auth = config.auth_config();
        assert!(auth.pepper.is_none());
        assert_eq!(auth.min_password_length, 8);
        assert!(config.admin().is_none());
    }

    #[test]
    fn reads_overrides() {
        let config = parse(&[
            "--db-url",
            "mem://",
            "--db-username",
            "root",
            "--db-password",
            "secret",
            "--password-pepper",
            "pep",
            "--min-password-length",
            "14",
            "--admin-email",
            "root@example.com",
            "--admin-password",
            "change me now",
        ])
        .unwrap();

        let db = config.db_config();
        assert_eq!(db.endpoint, "mem://");
        assert_eq!(db.credentials.map(|c| c.username).as_deref(), Some("root"));

        let auth = config.auth_config();
        assert_eq!(auth.pepper.as_deref(), Some("pep"));
        assert_eq!(auth.min_password_length, 14);
        assert_eq!(config.admin().map(|a| a.email).as_deref(), Some("root@example.com"));
    }

    #[test]
    fn empty_pepper_is_no_pepper() {
        let config = parse(&["--password-pepper", ""]).unwrap();
        assert!(config.auth_config().pepper.is_none());
    }

    #[test]
    fn half_configured_admin_is_an_error() {
        let err = parse(&["--admin-email", "root@example.com"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);

        let err = parse(&["--admin-password", "change me now"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn half_configured_db_credentials_are_an_error() {
        let err = parse(&["--db-username", "root"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn bad_password_length_is_an_error() {
        let err = parse(&["--min-password-length", "twelve"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }
}
