use crate::probe::HealthProbe;
use crate::report::{Event, Reporter};
use crate::waiter::Waiter;
use flume::{Receiver, Selector, Sender};
use log::{debug, trace};
use std::io::{ErrorKind, Read};
use std::thread;
use std::time::{Duration, Instant};

pub const DEFAULT_STALL_WINDOW: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy)]
pub struct DrainOptions {
    /// Requested pause between single-byte reads. Best effort: TLS and
    /// kernel buffering read ahead of this point.
    pub per_byte_delay: Duration,
    pub stall_window: Duration,
    pub waiter: Waiter,
}

impl Default for DrainOptions {
    fn default() -> Self {
        DrainOptions {
            per_byte_delay: Duration::ZERO,
            stall_window: DEFAULT_STALL_WINDOW,
            waiter: Waiter::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainOutcome {
    /// False only when the read ended with something other than end of stream.
    pub completed: bool,
    pub last_byte: Option<Instant>,
    pub bytes_read: usize,
}

#[derive(Debug)]
enum ReadEnd {
    Eof,
    Failed(std::io::Error),
}

enum Signal {
    Byte(u8),
    End(ReadEnd),
    WorkerGone,
}

fn read_loop<R: Read, P: HealthProbe>(
    stream: &mut R,
    probe: &P,
    options: DrainOptions,
    bytes: Sender<u8>,
    end: Sender<ReadEnd>,
) {
    let mut buf = [0u8; 1];
    let mut first = true;

    loop {
        if !first {
            options.waiter.wait(options.per_byte_delay, probe);
        }
        first = false;

        let terminal = match stream.read(&mut buf) {
            Ok(0) => ReadEnd::Eof,
            Ok(_) => {
                if bytes.send(buf[0]).is_err() {
                    return;
                }
                continue;
            }
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => ReadEnd::Failed(err),
        };

        trace!("read loop finished: {terminal:?}");
        let _ = end.send(terminal);
        return;
    }
}

fn next_signal(bytes: &Receiver<u8>, end: &Receiver<ReadEnd>, window: Duration) -> Option<Signal> {
    Selector::new()
        .recv(bytes, |res| res.map_or(Signal::WorkerGone, Signal::Byte))
        .recv(end, |res| {
            res.map_or(Signal::WorkerGone, Signal::End)
        })
        .wait_timeout(window)
        .ok()
}

/// Drains `stream` until end of stream or a read error. Blocks the calling
/// thread for the whole time; `stream` is read on a scoped worker thread.
pub fn drain<R, P>(
    stream: &mut R,
    probe: &P,
    options: DrainOptions,
    reporter: &mut dyn Reporter,
) -> DrainOutcome
where
    R: Read + Send,
    P: HealthProbe + Sync,
{
    let (byte_tx, byte_rx) = flume::bounded(0);
    let (end_tx, end_rx) = flume::bounded(0);
    let mut outcome = DrainOutcome {
        completed: false,
        last_byte: None,
        bytes_read: 0,
    };

    thread::scope(|scope| {
        debug!("starting response read worker");
        scope.spawn(move || read_loop(stream, probe, options, byte_tx, end_tx));

        loop {
            match next_signal(&byte_rx, &end_rx, options.stall_window) {
                Some(Signal::Byte(byte)) => {
                    outcome.last_byte = Some(Instant::now());
                    outcome.bytes_read += 1;
                    reporter.report(Event::ResponseByte(byte));
                }
                Some(Signal::End(ReadEnd::Eof)) => {
                    outcome.completed = true;
                    break;
                }
                Some(Signal::End(ReadEnd::Failed(err))) => {
                    reporter.report(Event::ReadFailed(err.to_string()));
                    break;
                }
                Some(Signal::WorkerGone) => {
                    reporter.report(Event::ReadFailed("response reader stopped".to_string()));
                    break;
                }
                None => reporter.report(Event::Stall(options.stall_window)),
            }
        }
    });

    debug!("response read worker finished after {} bytes", outcome.bytes_read);

    outcome
}
