use crate::drainer::DEFAULT_STALL_WINDOW;
use crate::error::ConnectError;
use crate::waiter::DEFAULT_INCREMENT;
use log::debug;
use rustls::{OwnedTrustAnchor, RootCertStore};
use std::fs;
use std::io::BufReader;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Transport {
    /// TLS first, plaintext if the peer doesn't speak TLS.
    #[default]
    Auto,
    Tls,
    Plain,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub transport: Transport,
    pub insecure: bool,
    pub ca_cert_path: Option<String>,
    pub connect_timeout: Duration,
    pub handshake_timeout: Duration,
    pub stall_window: Duration,
    pub poll_increment: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            transport: Transport::Auto,
            insecure: false,
            ca_cert_path: None,
            connect_timeout: Duration::from_secs(3),
            handshake_timeout: Duration::from_secs(10),
            stall_window: DEFAULT_STALL_WINDOW,
            poll_increment: DEFAULT_INCREMENT,
        }
    }
}

impl SessionConfig {
    pub(crate) fn load_certs(&self) -> Result<Vec<rustls::Certificate>, ConnectError> {
        let Some(ca_cert_path) = &self.ca_cert_path else {
            return Ok(vec![]);
        };

        let cert_file = fs::File::open(ca_cert_path).map_err(|err| {
            ConnectError::TlsConfig(format!("could not open {ca_cert_path:?}: {err}"))
        })?;
        let mut reader = BufReader::new(cert_file);
        let certs = rustls_pemfile::certs(&mut reader).map_err(|err| {
            ConnectError::TlsConfig(format!("could not parse {ca_cert_path:?}: {err}"))
        })?;

        if certs.is_empty() {
            return Err(ConnectError::TlsConfig(format!(
                "no certificates found in {ca_cert_path:?}"
            )));
        }

        Ok(certs.into_iter().map(rustls::Certificate).collect())
    }

    fn root_store(&self) -> Result<RootCertStore, ConnectError> {
        let mut roots = RootCertStore::empty();
        roots.add_trust_anchors(webpki_roots::TLS_SERVER_ROOTS.iter().map(|ta| {
            OwnedTrustAnchor::from_subject_spki_name_constraints(
                ta.subject,
                ta.spki,
                ta.name_constraints,
            )
        }));

        for cert in self.load_certs()? {
            roots
                .add(&cert)
                .map_err(|err| ConnectError::TlsConfig(err.to_string()))?;
        }
        debug!("trusting {} root certificates", roots.len());

        Ok(roots)
    }

    pub(crate) fn tls_client_config(&self) -> Result<Arc<rustls::ClientConfig>, ConnectError> {
        let builder = rustls::ClientConfig::builder().with_safe_defaults();

        let tls_config = if self.insecure {
            builder
                .with_custom_certificate_verifier(SkipServerVerification::new())
                .with_no_client_auth()
        } else {
            builder
                .with_root_certificates(self.root_store()?)
                .with_no_client_auth()
        };

        Ok(Arc::new(tls_config))
    }
}

struct SkipServerVerification;

impl SkipServerVerification {
    fn new() -> Arc<Self> {
        Arc::new(Self)
    }
}

impl rustls::client::ServerCertVerifier for SkipServerVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::Certificate,
        _intermediates: &[rustls::Certificate],
        _server_name: &rustls::ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: std::time::SystemTime,
    ) -> Result<rustls::client::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::ServerCertVerified::assertion())
    }
}

pub struct SessionConfigBuilder {
    session_config: SessionConfig,
}

#[allow(clippy::new_without_default)]
impl SessionConfigBuilder {
    pub fn new() -> Self {
        SessionConfigBuilder {
            session_config: SessionConfig::default(),
        }
    }

    pub fn transport(mut self, transport: Transport) -> Self {
        self.session_config.transport = transport;

        self
    }

    pub fn insecure(mut self, insecure: bool) -> Self {
        self.session_config.insecure = insecure;

        self
    }

    pub fn ca_cert_path(mut self, ca_cert_path: &str) -> Self {
        self.session_config.ca_cert_path = Some(ca_cert_path.to_string());

        self
    }

    pub fn connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.session_config.connect_timeout = connect_timeout;

        self
    }

    pub fn handshake_timeout(mut self, handshake_timeout: Duration) -> Self {
        self.session_config.handshake_timeout = handshake_timeout;

        self
    }

    pub fn stall_window(mut self, stall_window: Duration) -> Self {
        self.session_config.stall_window = stall_window;

        self
    }

    pub fn poll_increment(mut self, poll_increment: Duration) -> Self {
        self.session_config.poll_increment = poll_increment;

        self
    }

    pub fn get(self) -> SessionConfig {
        self.session_config
    }
}
