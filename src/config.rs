// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is loaded from the environment at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DATA_DIR` | Directory of the account database | `/data` |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `TLS_CERT_PATH` / `TLS_KEY_PATH` | PEM certificate chain and key; HTTPS when both set | unset |
//! | `FRONTEND_URL` | Base URL for activation links and CORS | Required |
//! | `DEPLOYER_URL` | Enclave deployer base URL | Required |
//! | `KEY_RESOLUTION` | `persisted` or `live` | `persisted` |
//! | `KEY_FETCH_TIMEOUT_SECS` | Timeout of a live verification key fetch | `5` |
//! | `EMAIL_FROM` | Sender address of outgoing mail | Required |
//! | `MAIL_RELAY_URL` | HTTP mail relay; unset logs mail instead | unset |
//! | `NOTIFICATION_IDLE_SECS` | Worker sleep after an empty batch | `600` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::collections::HashMap;
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const TLS_CERT_PATH_ENV: &str = "TLS_CERT_PATH";
pub const TLS_KEY_PATH_ENV: &str = "TLS_KEY_PATH";
pub const FRONTEND_URL_ENV: &str = "FRONTEND_URL";
pub const DEPLOYER_URL_ENV: &str = "DEPLOYER_URL";
pub const KEY_RESOLUTION_ENV: &str = "KEY_RESOLUTION";
pub const KEY_FETCH_TIMEOUT_ENV: &str = "KEY_FETCH_TIMEOUT_SECS";
pub const EMAIL_FROM_ENV: &str = "EMAIL_FROM";
pub const MAIL_RELAY_URL_ENV: &str = "MAIL_RELAY_URL";
pub const NOTIFICATION_IDLE_ENV: &str = "NOTIFICATION_IDLE_SECS";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_DATA_DIR: &str = "/data";
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

/// File name of the account database under `DATA_DIR`.
pub const DATABASE_FILE: &str = "elonwallet.redb";

const DEFAULT_KEY_FETCH_TIMEOUT_SECS: u64 = 5;
const DEFAULT_NOTIFICATION_IDLE_SECS: u64 = 600;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: String, reason: String },
}

fn invalid(name: &str, reason: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

/// How session verification keys are obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyResolution {
    /// Key stored at activation
    Persisted,
    /// Key fetched from the enclave per request
    Live,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone)]
pub struct TlsPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub bind_address: SocketAddr,
    pub tls: Option<TlsPaths>,
    pub frontend_url: Url,
    pub deployer_url: Url,
    pub key_resolution: KeyResolution,
    pub key_fetch_timeout: Duration,
    pub email_from: String,
    pub mail_relay_url: Option<Url>,
    pub notification_idle: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a map of variables.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let get = |name: &str| vars.get(name).map(|v| v.trim()).filter(|v| !v.is_empty());
        let required = |name: &str| get(name).ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()));

        let data_dir = PathBuf::from(get(DATA_DIR_ENV).unwrap_or(DEFAULT_DATA_DIR));

        let host = get(HOST_ENV).unwrap_or("0.0.0.0");
        let port: u16 = match get(PORT_ENV) {
            Some(port) => port.parse().map_err(|e| invalid(PORT_ENV, e))?,
            None => 8080,
        };
        let bind_address: SocketAddr = format!("{host}:{port}")
            .parse()
            .map_err(|e| invalid(HOST_ENV, e))?;

        let tls = match (get(TLS_CERT_PATH_ENV), get(TLS_KEY_PATH_ENV)) {
            (Some(cert), Some(key)) => Some(TlsPaths {
                cert: PathBuf::from(cert),
                key: PathBuf::from(key),
            }),
            (None, None) => None,
            _ => {
                return Err(invalid(
                    TLS_CERT_PATH_ENV,
                    "TLS_CERT_PATH and TLS_KEY_PATH must be set together",
                ))
            }
        };

        let frontend_url = Url::parse(required(FRONTEND_URL_ENV)?)
            .map_err(|e| invalid(FRONTEND_URL_ENV, e))?;
        let deployer_url = Url::parse(required(DEPLOYER_URL_ENV)?)
            .map_err(|e| invalid(DEPLOYER_URL_ENV, e))?;

        let key_resolution = match get(KEY_RESOLUTION_ENV).unwrap_or("persisted") {
            "persisted" => KeyResolution::Persisted,
            "live" => KeyResolution::Live,
            other => {
                return Err(invalid(
                    KEY_RESOLUTION_ENV,
                    format!("expected 'persisted' or 'live', got '{other}'"),
                ))
            }
        };

        let key_fetch_timeout = Duration::from_secs(parse_secs(
            get(KEY_FETCH_TIMEOUT_ENV),
            KEY_FETCH_TIMEOUT_ENV,
            DEFAULT_KEY_FETCH_TIMEOUT_SECS,
        )?);
        let notification_idle = Duration::from_secs(parse_secs(
            get(NOTIFICATION_IDLE_ENV),
            NOTIFICATION_IDLE_ENV,
            DEFAULT_NOTIFICATION_IDLE_SECS,
        )?);

        let email_from = required(EMAIL_FROM_ENV)?.to_string();
        let mail_relay_url = get(MAIL_RELAY_URL_ENV)
            .map(Url::parse)
            .transpose()
            .map_err(|e| invalid(MAIL_RELAY_URL_ENV, e))?;

        Ok(Self {
            data_dir,
            bind_address,
            tls,
            frontend_url,
            deployer_url,
            key_resolution,
            key_fetch_timeout,
            email_from,
            mail_relay_url,
            notification_idle,
        })
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }
}

fn parse_secs(value: Option<&str>, name: &str, default: u64) -> Result<u64, ConfigError> {
    match value {
        None => Ok(default),
        Some(v) => match v.parse::<u64>() {
            Ok(0) => Err(invalid(name, "must be greater than zero")),
            Ok(secs) => Ok(secs),
            Err(e) => Err(invalid(name, e)),
        },
    }
}

/// `LOG_FORMAT` from the environment; anything but `json` is pretty.
pub fn log_format_from_env() -> LogFormat {
    match env::var(LOG_FORMAT_ENV) {
        Ok(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
        _ => LogFormat::Pretty,
    }
}
