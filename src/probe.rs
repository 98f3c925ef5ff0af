//! Non-destructive liveness checks on the read side of a socket.
//!
//! A TCP write can succeed long after the peer stopped reading, so liveness
//! is judged from the incoming side: a one byte `MSG_PEEK | MSG_DONTWAIT`
//! receive tells an orderly close (zero bytes) apart from "nothing yet"
//! (would block) without taking anything off the read queue.

use log::{debug, warn};
use std::net::TcpStream;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Open,
    Closed,
    /// The platform can't tell; callers assume open.
    Unknown,
}

impl Liveness {
    pub fn is_broken(self) -> bool {
        self == Liveness::Closed
    }
}

pub trait HealthProbe {
    fn probe(&self) -> Liveness;

    fn is_broken(&self) -> bool {
        self.probe().is_broken()
    }
}

impl<P: HealthProbe + ?Sized> HealthProbe for &P {
    fn probe(&self) -> Liveness {
        (**self).probe()
    }
}

impl<P: HealthProbe + ?Sized> HealthProbe for Box<P> {
    fn probe(&self) -> Liveness {
        (**self).probe()
    }
}

/// Never interrupts anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProbe;

impl HealthProbe for NullProbe {
    fn probe(&self) -> Liveness {
        Liveness::Unknown
    }
}

/// Peeks at a cloned handle of the connection's socket, so it can be used
/// while another thread owns the stream for reading.
#[derive(Debug)]
pub struct PeekProbe {
    socket: TcpStream,
}

impl PeekProbe {
    pub fn new(socket: &TcpStream) -> std::io::Result<Self> {
        Ok(PeekProbe {
            socket: socket.try_clone()?,
        })
    }
}

#[cfg(unix)]
impl HealthProbe for PeekProbe {
    fn probe(&self) -> Liveness {
        use socket2::SockRef;
        use std::io::ErrorKind;
        use std::mem::MaybeUninit;

        let mut buf = [MaybeUninit::<u8>::uninit(); 1];
        let socket = SockRef::from(&self.socket);

        match socket.recv_with_flags(&mut buf, libc::MSG_PEEK | libc::MSG_DONTWAIT) {
            Ok(0) => {
                debug!("peek returned 0 bytes, peer closed");
                Liveness::Closed
            }
            Ok(_) => Liveness::Open,
            Err(err) if err.kind() == ErrorKind::WouldBlock => Liveness::Open,
            Err(err) if err.kind() == ErrorKind::Interrupted => Liveness::Open,
            Err(err) => {
                debug!("peek failed: {err}");
                Liveness::Closed
            }
        }
    }
}

#[cfg(not(unix))]
impl HealthProbe for PeekProbe {
    fn probe(&self) -> Liveness {
        Liveness::Unknown
    }
}

/// The best probe available for `socket` on this platform.
pub fn for_socket(socket: &TcpStream) -> Box<dyn HealthProbe + Send + Sync> {
    if cfg!(not(unix)) {
        warn!("connection liveness probing is unavailable on this platform");
        return Box::new(NullProbe);
    }

    match PeekProbe::new(socket) {
        Ok(probe) => Box::new(probe),
        Err(err) => {
            warn!("could not clone socket for probing, pauses won't be interrupted: {err}");
            Box::new(NullProbe)
        }
    }
}
