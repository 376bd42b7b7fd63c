use std::time::Duration;

use serde::Deserialize;

use crate::retry::BackoffPolicy;

/// Top-level configuration settings for the application.
///
/// Covers the broker endpoint both roles connect to, the shared retry policy,
/// connection timing, the order pipeline, the bundled broker server and
/// logging.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Settings {
    pub broker: BrokerSettings,
    pub retry: RetrySettings,
    pub connection: ConnectionSettings,
    pub processing: ProcessingSettings,
    pub server: ServerSettings,
    pub logging: LoggingSettings,
}

/// Endpoint and identity used when opening a broker connection.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct BrokerSettings {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: String,
    pub password: String,
    pub use_tls: bool,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ConnectionSettings {
    pub connect_timeout_ms: u64,
    pub reconnect_cooldown_ms: u64,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ProcessingSettings {
    pub delay_ms: u64,
    pub completion_timeout_secs: u64,
    pub health_interval_secs: u64,
}

/// Configuration settings for the bundled WebSocket broker.
///
/// Defines the host and port the server will bind to.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LoggingSettings {
    pub level: String,
}

impl RetrySettings {
    pub fn policy(&self) -> BackoffPolicy {
        BackoffPolicy::new(self.max_attempts, Duration::from_millis(self.base_delay_ms))
    }
}

impl ConnectionSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn reconnect_cooldown(&self) -> Duration {
        Duration::from_millis(self.reconnect_cooldown_ms)
    }
}

impl ProcessingSettings {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn completion_timeout(&self) -> Duration {
        Duration::from_secs(self.completion_timeout_secs)
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_interval_secs)
    }
}

/// Partial configuration settings loaded from files or environment.
///
/// Allows partial specification of settings. Missing values can be filled using defaults.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub broker: Option<PartialBrokerSettings>,
    pub retry: Option<PartialRetrySettings>,
    pub connection: Option<PartialConnectionSettings>,
    pub processing: Option<PartialProcessingSettings>,
    pub server: Option<PartialServerSettings>,
    pub logging: Option<PartialLoggingSettings>,
}

#[derive(Debug, Deserialize)]
pub struct PartialBrokerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub client_id: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub use_tls: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct PartialRetrySettings {
    pub max_attempts: Option<u32>,
    pub base_delay_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct PartialConnectionSettings {
    pub connect_timeout_ms: Option<u64>,
    pub reconnect_cooldown_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct PartialProcessingSettings {
    pub delay_ms: Option<u64>,
    pub completion_timeout_secs: Option<u64>,
    pub health_interval_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize)]
pub struct PartialLoggingSettings {
    pub level: Option<String>,
}

impl PartialSettings {
    /// Fill every missing value from `default`.
    pub fn merge(self, default: Settings) -> Settings {
        Settings {
            broker: match self.broker {
                Some(b) => BrokerSettings {
                    host: b.host.unwrap_or(default.broker.host),
                    port: b.port.unwrap_or(default.broker.port),
                    client_id: b.client_id.unwrap_or(default.broker.client_id),
                    username: b.username.unwrap_or(default.broker.username),
                    password: b.password.unwrap_or(default.broker.password),
                    use_tls: b.use_tls.unwrap_or(default.broker.use_tls),
                },
                None => default.broker,
            },
            retry: match self.retry {
                Some(r) => RetrySettings {
                    max_attempts: r.max_attempts.unwrap_or(default.retry.max_attempts),
                    base_delay_ms: r.base_delay_ms.unwrap_or(default.retry.base_delay_ms),
                },
                None => default.retry,
            },
            connection: match self.connection {
                Some(c) => ConnectionSettings {
                    connect_timeout_ms: c
                        .connect_timeout_ms
                        .unwrap_or(default.connection.connect_timeout_ms),
                    reconnect_cooldown_ms: c
                        .reconnect_cooldown_ms
                        .unwrap_or(default.connection.reconnect_cooldown_ms),
                },
                None => default.connection,
            },
            processing: match self.processing {
                Some(p) => ProcessingSettings {
                    delay_ms: p.delay_ms.unwrap_or(default.processing.delay_ms),
                    completion_timeout_secs: p
                        .completion_timeout_secs
                        .unwrap_or(default.processing.completion_timeout_secs),
                    health_interval_secs: p
                        .health_interval_secs
                        .unwrap_or(default.processing.health_interval_secs),
                },
                None => default.processing,
            },
            server: match self.server {
                Some(s) => ServerSettings {
                    host: s.host.unwrap_or(default.server.host),
                    port: s.port.unwrap_or(default.server.port),
                },
                None => default.server,
            },
            logging: match self.logging {
                Some(l) => LoggingSettings {
                    level: l.level.unwrap_or(default.logging.level),
                },
                None => default.logging,
            },
        }
    }
}

/// Provides default values for `Settings`.
///
/// Ensures the application has sensible defaults if no configuration is provided.
impl Default for Settings {
    fn default() -> Self {
        Self {
            broker: BrokerSettings {
                host: "127.0.0.1".to_string(),
                port: 8080,
                client_id: "orderflow".to_string(),
                username: String::new(),
                password: String::new(),
                use_tls: false,
            },
            retry: RetrySettings {
                max_attempts: 4,
                base_delay_ms: 5000,
            },
            connection: ConnectionSettings {
                connect_timeout_ms: 10_000,
                reconnect_cooldown_ms: 5000,
            },
            processing: ProcessingSettings {
                delay_ms: 2000,
                completion_timeout_secs: 30,
                health_interval_secs: 15,
            },
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            logging: LoggingSettings {
                level: "info".to_string(),
            },
        }
    }
}
