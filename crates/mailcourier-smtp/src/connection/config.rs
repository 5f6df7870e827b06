//! Connection configuration.

use crate::error::{Error, Result};
use crate::types::AuthMechanism;
use std::sync::Arc;
use std::time::Duration;

/// Reply and idle timeout applied when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Transport security mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Security {
    /// Plain TCP end to end (port 25). **Not recommended.**
    #[default]
    None,
    /// Plain TCP, upgraded with STARTTLS after EHLO (port 587).
    StartTls,
    /// TLS from the first byte (port 465).
    Implicit,
}

impl Security {
    /// The conventional port for this mode.
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Self::None => 25,
            Self::StartTls => 587,
            Self::Implicit => 465,
        }
    }
}

/// Configuration snapshot for an SMTP connection.
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    /// Server hostname.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Transport security mode.
    pub security: Security,
    /// Authentication username.
    pub user: Option<String>,
    /// Authentication password (or access token for XOAUTH2).
    pub password: Option<String>,
    /// Mechanisms the client is willing to use, in no particular order;
    /// selection follows [`AuthMechanism::PREFERENCE`].
    pub mechanisms: Vec<AuthMechanism>,
    /// Reply timeout, also the idle window before the connection is
    /// recycled.
    pub timeout: Duration,
    /// Hostname announced in EHLO/HELO.
    pub domain: String,
    /// TLS configuration override; system roots when absent.
    pub tls_config: Option<Arc<rustls::ClientConfig>>,
}

impl ConnectionOptions {
    /// Starts a builder targeting `host`.
    #[must_use]
    pub fn builder(host: impl Into<String>) -> ConnectionOptionsBuilder {
        ConnectionOptionsBuilder::new(host)
    }

    /// Whether credentials are configured.
    ///
    /// A lone password counts: that state is invalid (see
    /// [`validate`](Self::validate)), and treating it as credentialed
    /// keeps it from slipping through as an unauthenticated send.
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        self.user.is_some() || self.password.is_some()
    }

    /// Checks the options for constructor-time misuse.
    ///
    /// The fields are public, so this runs both in the builder and in
    /// every consumer that accepts a hand-assembled value.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] when a password is supplied without a
    /// user.
    pub fn validate(&self) -> Result<()> {
        if self.password.is_some() && self.user.is_none() {
            return Err(Error::Configuration(
                "password configured without a user".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: Security::None.default_port(),
            security: Security::None,
            user: None,
            password: None,
            mechanisms: AuthMechanism::PREFERENCE.to_vec(),
            timeout: DEFAULT_TIMEOUT,
            domain: "localhost".to_string(),
            tls_config: None,
        }
    }
}

/// Builder for [`ConnectionOptions`].
#[derive(Debug, Clone, Default)]
pub struct ConnectionOptionsBuilder {
    host: Option<String>,
    port: Option<u16>,
    security: Security,
    user: Option<String>,
    password: Option<String>,
    mechanisms: Option<Vec<AuthMechanism>>,
    timeout: Option<Duration>,
    domain: Option<String>,
    tls_config: Option<Arc<rustls::ClientConfig>>,
}

impl ConnectionOptionsBuilder {
    /// Creates a builder targeting `host`.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: Some(host.into()),
            ..Self::default()
        }
    }

    /// Sets the port; the security mode's conventional port otherwise.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the transport security mode.
    #[must_use]
    pub const fn security(mut self, security: Security) -> Self {
        self.security = security;
        self
    }

    /// Sets the authentication username.
    #[must_use]
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Sets the password (or XOAUTH2 access token).
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Restricts the allowed authentication mechanisms.
    #[must_use]
    pub fn mechanisms(mut self, mechanisms: impl Into<Vec<AuthMechanism>>) -> Self {
        self.mechanisms = Some(mechanisms.into());
        self
    }

    /// Sets the reply/idle timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the EHLO/HELO hostname.
    #[must_use]
    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Supplies a TLS configuration (custom roots, client certs).
    #[must_use]
    pub fn tls_config(mut self, config: Arc<rustls::ClientConfig>) -> Self {
        self.tls_config = Some(config);
        self
    }

    /// Builds the options.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] when a password is supplied without a
    /// user.
    pub fn build(self) -> Result<ConnectionOptions> {
        let defaults = ConnectionOptions::default();
        let options = ConnectionOptions {
            host: self.host.unwrap_or(defaults.host),
            port: self.port.unwrap_or_else(|| self.security.default_port()),
            security: self.security,
            user: self.user,
            password: self.password,
            mechanisms: self.mechanisms.unwrap_or(defaults.mechanisms),
            timeout: self.timeout.unwrap_or(DEFAULT_TIMEOUT),
            domain: self.domain.unwrap_or(defaults.domain),
            tls_config: self.tls_config,
        };
        options.validate()?;
        Ok(options)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn default_ports() {
        assert_eq!(Security::None.default_port(), 25);
        assert_eq!(Security::StartTls.default_port(), 587);
        assert_eq!(Security::Implicit.default_port(), 465);
    }

    #[test]
    fn defaults() {
        let options = ConnectionOptions::default();
        assert_eq!(options.host, "localhost");
        assert_eq!(options.port, 25);
        assert_eq!(options.timeout, DEFAULT_TIMEOUT);
        assert_eq!(options.timeout, Duration::from_millis(5000));
        assert_eq!(options.domain, "localhost");
        assert_eq!(options.mechanisms.len(), 4);
    }

    #[test]
    fn builder_port_follows_security() {
        let options = ConnectionOptions::builder("mail.example.com")
            .security(Security::Implicit)
            .build()
            .unwrap();
        assert_eq!(options.port, 465);

        let options = ConnectionOptions::builder("mail.example.com")
            .security(Security::Implicit)
            .port(2465)
            .build()
            .unwrap();
        assert_eq!(options.port, 2465);
    }

    #[test]
    fn password_without_user_rejected() {
        let err = ConnectionOptions::builder("mail.example.com")
            .password("hunter2")
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn user_and_password_accepted() {
        let options = ConnectionOptions::builder("mail.example.com")
            .user("alice")
            .password("hunter2")
            .build()
            .unwrap();
        assert!(options.has_credentials());
    }

    #[test]
    fn user_without_password_accepted() {
        let options = ConnectionOptions::builder("mail.example.com")
            .user("alice")
            .build()
            .unwrap();
        assert!(options.has_credentials());
    }

    #[test]
    fn hand_assembled_options_are_still_validated() {
        // The fields are public; a struct literal must not dodge the
        // builder's check.
        let options = ConnectionOptions {
            password: Some("hunter2".to_string()),
            ..ConnectionOptions::default()
        };
        assert!(matches!(options.validate(), Err(Error::Configuration(_))));
        // And the invalid state still reads as credentialed, so it can
        // never pass for an unauthenticated config.
        assert!(options.has_credentials());
    }
}
