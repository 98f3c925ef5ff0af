use crate::connection::Connection;
use crate::drainer::{drain, DrainOptions};
use crate::error::ConnectError;
use crate::probe::HealthProbe;
use crate::report::{Event, Reporter};
use crate::script::TestScript;
use crate::session_config::SessionConfig;
use crate::waiter::Waiter;
use crate::writer::{send_body, send_headers};
use log::info;
use std::io::{Read, Write};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseTimestamps {
    /// Taken once the connection is ready to carry the request.
    pub connect_start: Instant,
    pub headers_sent: Instant,
    pub body_sent: Instant,
    pub last_byte: Option<Instant>,
    /// When the read side ended, by close or error.
    pub closed: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseDeltas {
    pub headers: Duration,
    pub body: Duration,
    /// Body sent to last response byte; absent when nothing was read.
    pub response: Option<Duration>,
    /// Last response byte (or body sent) to close.
    pub idle: Duration,
}

impl PhaseTimestamps {
    pub fn deltas(&self) -> PhaseDeltas {
        let idle_from = self.last_byte.unwrap_or(self.body_sent);

        PhaseDeltas {
            headers: self.headers_sent.saturating_duration_since(self.connect_start),
            body: self.body_sent.saturating_duration_since(self.headers_sent),
            response: self
                .last_byte
                .map(|last| last.saturating_duration_since(self.body_sent)),
            idle: self.closed.saturating_duration_since(idle_from),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOutcome {
    pub headers_completed: bool,
    pub body_completed: bool,
    pub response_completed: bool,
    pub bytes_read: usize,
    pub timestamps: PhaseTimestamps,
}

/// Connects to the script's host and plays the script against it. Only
/// connection setup can fail; everything after that is recorded in the
/// outcome.
pub fn run(
    script: &TestScript,
    config: &SessionConfig,
    reporter: &mut dyn Reporter,
) -> Result<RunOutcome, ConnectError> {
    let mut connection = Connection::open(&script.host, config)?;
    info!(
        "connected to {} ({})",
        connection.host(),
        if connection.is_tls() { "TLS" } else { "plaintext" }
    );
    reporter.report(Event::Connected {
        host: connection.host().to_string(),
        tls: connection.is_tls(),
    });

    let connect_start = Instant::now();
    let (stream, probe) = connection.parts();
    let outcome = exchange(stream, probe, script, config, connect_start, reporter);
    connection.close();

    Ok(outcome)
}

/// Writes the scripted request, then reads the response no matter how the
/// writing went: a server may still answer a truncated request.
pub fn exchange<S, P>(
    stream: &mut S,
    probe: &P,
    script: &TestScript,
    config: &SessionConfig,
    connect_start: Instant,
    reporter: &mut dyn Reporter,
) -> RunOutcome
where
    S: Read + Write + Send,
    P: HealthProbe + Sync,
{
    let waiter = Waiter::new(config.poll_increment);

    let headers = send_headers(stream, probe, &waiter, script, connect_start, reporter);
    let body = send_body(
        stream,
        script.body.as_bytes(),
        script.per_byte_body_delay,
        &headers,
        reporter,
    );

    let drain_options = DrainOptions {
        per_byte_delay: script.per_byte_read_delay,
        stall_window: config.stall_window,
        waiter,
    };
    let response = drain(stream, probe, drain_options, reporter);
    let closed = Instant::now();

    if !response.completed {
        reporter.report(Event::ResponseInterrupted);
    }

    let timestamps = PhaseTimestamps {
        connect_start,
        headers_sent: headers.finished_at,
        body_sent: body.finished_at,
        last_byte: response.last_byte,
        closed,
    };
    reporter.report(Event::Timings(timestamps.deltas()));

    RunOutcome {
        headers_completed: headers.completed,
        body_completed: body.completed,
        response_completed: response.completed,
        bytes_read: response.bytes_read,
        timestamps,
    }
}
