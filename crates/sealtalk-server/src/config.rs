//! Server configuration.
//!
//! Every option can be given as a flag or an environment variable.

use std::{fmt, path::PathBuf, time::Duration};

use clap::Parser;
use sealtalk_core::ProtocolConfig;
use sealtalk_crypto::{MIN_PBKDF2_ITERATIONS, RSA_KEY_BITS};

use crate::error::ServerError;

/// Command-line configuration.
#[derive(Clone, Parser)]
#[command(name = "sealtalk-server", about = "End-to-end encrypted two-party relay")]
pub struct ServerConfig {
    /// Path to the database file
    #[arg(long, env = "SEALTALK_DATABASE", default_value = "sealtalk.redb")]
    pub database: PathBuf,

    /// Keep all state in memory instead of the database file
    #[arg(long)]
    pub in_memory: bool,

    /// Secret from which per-user key-sealing passphrases are derived
    #[arg(long, env = "SEALTALK_IDENTITY_SECRET", hide_env_values = true)]
    pub identity_secret: String,

    /// Invitation lifetime in seconds
    #[arg(long, env = "SEALTALK_INVITATION_TTL_SECS", default_value_t = 3600)]
    pub invitation_ttl_secs: u64,

    /// Cached ciphertext lifetime in seconds
    #[arg(long, env = "SEALTALK_CACHE_TTL_SECS", default_value_t = 600)]
    pub cache_ttl_secs: u64,

    /// Partner record lifetime in days
    #[arg(long, env = "SEALTALK_PARTNER_TTL_DAYS", default_value_t = 30)]
    pub partner_ttl_days: u64,

    /// Session key lifetime in seconds; unset keeps keys until the session ends
    #[arg(long, env = "SEALTALK_SESSION_KEY_TTL_SECS")]
    pub session_key_ttl_secs: Option<u64>,

    /// Interval between expiry sweeps in seconds
    #[arg(long, env = "SEALTALK_SWEEP_INTERVAL_SECS", default_value_t = 60)]
    pub sweep_interval_secs: u64,

    /// PBKDF2 iterations for sealing new identities
    #[arg(long, env = "SEALTALK_PBKDF2_ITERATIONS", default_value_t = MIN_PBKDF2_ITERATIONS)]
    pub pbkdf2_iterations: u32,
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("database", &self.database)
            .field("in_memory", &self.in_memory)
            .field("identity_secret", &"<redacted>")
            .field("invitation_ttl_secs", &self.invitation_ttl_secs)
            .field("cache_ttl_secs", &self.cache_ttl_secs)
            .field("partner_ttl_days", &self.partner_ttl_days)
            .field("session_key_ttl_secs", &self.session_key_ttl_secs)
            .field("sweep_interval_secs", &self.sweep_interval_secs)
            .field("pbkdf2_iterations", &self.pbkdf2_iterations)
            .finish()
    }
}

impl ServerConfig {
    /// Reject unusable settings.
    pub fn validate(&self) -> Result<(), ServerError> {
        if self.identity_secret.is_empty() {
            return Err(ServerError::Config("identity secret must not be empty".into()));
        }

        let ttls = [
            ("invitation-ttl-secs", self.invitation_ttl_secs),
            ("cache-ttl-secs", self.cache_ttl_secs),
            ("partner-ttl-days", self.partner_ttl_days),
            ("sweep-interval-secs", self.sweep_interval_secs),
        ];
        if let Some((name, _)) = ttls.iter().find(|(_, value)| *value == 0) {
            return Err(ServerError::Config(format!("{name} must be positive")));
        }
        if self.session_key_ttl_secs == Some(0) {
            return Err(ServerError::Config("session-key-ttl-secs must be positive".into()));
        }
        if self.pbkdf2_iterations < MIN_PBKDF2_ITERATIONS {
            return Err(ServerError::Config(format!(
                "pbkdf2-iterations must be at least {MIN_PBKDF2_ITERATIONS}"
            )));
        }
        Ok(())
    }

    /// Validated protocol settings.
    pub fn protocol_config(&self) -> Result<ProtocolConfig, ServerError> {
        self.validate()?;
        Ok(ProtocolConfig {
            invitation_ttl: Duration::from_secs(self.invitation_ttl_secs),
            cache_ttl: Duration::from_secs(self.cache_ttl_secs),
            partner_ttl: Duration::from_secs(self.partner_ttl_days.saturating_mul(24 * 3600)),
            session_key_ttl: self.session_key_ttl_secs.map(Duration::from_secs),
            rsa_bits: RSA_KEY_BITS,
            pbkdf2_iterations: self.pbkdf2_iterations,
        })
    }

    /// Interval between expiry sweeps.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}
