use crate::error::ConnectError;
use crate::probe::{self, HealthProbe};
use crate::session_config::{SessionConfig, Transport};
use log::{debug, info, warn};
use rustls::{ClientConnection, StreamOwned};
use socket2::SockRef;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

pub type BoxedProbe = Box<dyn HealthProbe + Send + Sync>;

pub enum Stream {
    Plain(TcpStream),
    Tls(Box<StreamOwned<ClientConnection, TcpStream>>),
}

impl Stream {
    pub fn socket(&self) -> &TcpStream {
        match self {
            Stream::Plain(tcp) => tcp,
            Stream::Tls(tls) => &tls.sock,
        }
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Stream::Plain(tcp) => tcp.read(buf),
            // a TCP close without close_notify still ends the response
            Stream::Tls(tls) => match tls.read(buf) {
                Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
                    debug!("TLS peer closed without close_notify");
                    Ok(0)
                }
                res => res,
            },
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Stream::Plain(tcp) => tcp.write(buf),
            Stream::Tls(tls) => tls.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Stream::Plain(tcp) => tcp.flush(),
            Stream::Tls(tls) => tls.flush(),
        }
    }
}

/// The single connection of a run. Closed on drop if not closed before.
pub struct Connection {
    stream: Stream,
    probe: BoxedProbe,
    host: String,
    closed: bool,
}

enum TlsFailure {
    /// The peer answered with something that isn't a TLS record.
    NotTls(io::Error),
    Fatal(ConnectError),
}

impl Connection {
    pub fn open(host: &str, config: &SessionConfig) -> Result<Self, ConnectError> {
        let stream = match config.transport {
            Transport::Plain => Stream::Plain(dial(host, config.connect_timeout)?),
            Transport::Tls => connect_tls(host, config).map_err(|failure| match failure {
                TlsFailure::NotTls(source) => ConnectError::Handshake {
                    host: host.to_string(),
                    source,
                },
                TlsFailure::Fatal(err) => err,
            })?,
            Transport::Auto => match connect_tls(host, config) {
                Ok(stream) => stream,
                Err(TlsFailure::NotTls(err)) => {
                    info!("{host} does not look like a TLS server ({err}), retrying in plaintext");
                    Stream::Plain(dial(host, config.connect_timeout)?)
                }
                Err(TlsFailure::Fatal(err)) => return Err(err),
            },
        };

        configure_socket(stream.socket());

        Ok(Connection {
            probe: probe::for_socket(stream.socket()),
            stream,
            host: host.to_string(),
            closed: false,
        })
    }

    pub fn is_tls(&self) -> bool {
        matches!(self.stream, Stream::Tls(_))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// The stream and its probe, borrowed separately so one thread can read
    /// while another checks liveness.
    pub fn parts(&mut self) -> (&mut Stream, &BoxedProbe) {
        (&mut self.stream, &self.probe)
    }

    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if let Stream::Tls(tls) = &mut self.stream {
            tls.conn.send_close_notify();
            if let Err(err) = tls.conn.write_tls(&mut tls.sock) {
                debug!("could not send close_notify: {err}");
            }
        }

        if let Err(err) = self.stream.socket().shutdown(Shutdown::Both) {
            debug!("shutdown of {} failed: {err}", self.host);
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

fn dial(host: &str, timeout: Duration) -> Result<TcpStream, ConnectError> {
    let addrs: Vec<SocketAddr> = host
        .to_socket_addrs()
        .map_err(|source| ConnectError::Resolve {
            host: host.to_string(),
            source,
        })?
        .collect();

    let mut last_err = None;
    for addr in addrs {
        debug!("connecting to {addr}");
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(tcp) => return Ok(tcp),
            Err(err) => {
                debug!("connect to {addr} failed: {err}");
                last_err = Some(err);
            }
        }
    }

    match last_err {
        Some(source) => Err(ConnectError::Tcp {
            host: host.to_string(),
            source,
        }),
        None => Err(ConnectError::NoAddress {
            host: host.to_string(),
        }),
    }
}

/// `example.com:443` -> `example.com`, `[::1]:8443` -> `::1`.
pub fn server_name(host: &str) -> &str {
    let name = host.rsplit_once(':').map_or(host, |(name, _)| name);

    name.trim_start_matches('[').trim_end_matches(']')
}

fn is_not_tls(err: &io::Error) -> bool {
    err.get_ref()
        .and_then(|inner| inner.downcast_ref::<rustls::Error>())
        .map_or(false, |tls_err| {
            matches!(tls_err, rustls::Error::InvalidMessage(_))
        })
}

fn connect_tls(host: &str, config: &SessionConfig) -> Result<Stream, TlsFailure> {
    let tls_config: Arc<rustls::ClientConfig> =
        config.tls_client_config().map_err(TlsFailure::Fatal)?;
    let mut tcp = dial(host, config.connect_timeout).map_err(TlsFailure::Fatal)?;

    let name = server_name(host);
    let server_name = rustls::ServerName::try_from(name)
        .map_err(|_| TlsFailure::Fatal(ConnectError::ServerName(name.to_string())))?;
    let mut tls_connection = ClientConnection::new(tls_config, server_name)
        .map_err(|err| TlsFailure::Fatal(ConnectError::TlsConfig(err.to_string())))?;

    let handshake_failed = |source: io::Error| {
        TlsFailure::Fatal(ConnectError::Handshake {
            host: host.to_string(),
            source,
        })
    };

    tcp.set_read_timeout(Some(config.handshake_timeout))
        .map_err(handshake_failed)?;

    while tls_connection.is_handshaking() {
        if let Err(err) = tls_connection.complete_io(&mut tcp) {
            return Err(if is_not_tls(&err) {
                TlsFailure::NotTls(err)
            } else {
                handshake_failed(err)
            });
        }
    }

    tcp.set_read_timeout(None).map_err(handshake_failed)?;
    debug!(
        "TLS handshake with {host} done: {:?} {:?}",
        tls_connection.protocol_version(),
        tls_connection.negotiated_cipher_suite().map(|suite| suite.suite())
    );

    Ok(Stream::Tls(Box::new(StreamOwned::new(tls_connection, tcp))))
}

/// Keeps byte-level pacing visible on the wire: no Nagle coalescing and the
/// smallest socket buffers the kernel allows.
fn configure_socket(tcp: &TcpStream) {
    if let Err(err) = tcp.set_nodelay(true) {
        warn!("could not disable Nagle's algorithm: {err}");
    }

    let socket = SockRef::from(tcp);
    if let Err(err) = socket.set_recv_buffer_size(1) {
        warn!("could not shrink receive buffer: {err}");
    }
    if let Err(err) = socket.set_send_buffer_size(1) {
        warn!("could not shrink send buffer: {err}");
    }
}
