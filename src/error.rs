use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("failed to open script file {path:?}: {source}")]
    Open { path: String, source: io::Error },
    #[error("got bad {directive} in script: {line:?}; {reason}")]
    BadDuration {
        directive: &'static str,
        line: String,
        reason: String,
    },
    #[error("got unexpected byte-sleep: {0:?}")]
    UnknownByteSleep(String),
    #[error("script has no host line")]
    MissingHost,
}

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("could not resolve {host:?}: {source}")]
    Resolve { host: String, source: io::Error },
    #[error("{host:?} did not resolve to any address")]
    NoAddress { host: String },
    #[error("tcp connect to {host} failed: {source}")]
    Tcp { host: String, source: io::Error },
    #[error("invalid TLS server name {0:?}")]
    ServerName(String),
    #[error("TLS configuration failed: {0}")]
    TlsConfig(String),
    #[error("TLS handshake with {host} failed: {source}")]
    Handshake { host: String, source: io::Error },
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("script load failed: {0}")]
    Script(#[from] ScriptError),
    #[error("connection setup failed: {0}")]
    Connect(#[from] ConnectError),
}
