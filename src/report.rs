use crate::duration::format_duration;
use crate::session::PhaseDeltas;
use colored::Colorize;
use std::io::{Stdout, Write};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Connected { host: String, tls: bool },
    Pausing(Duration),
    PauseInterrupted { elapsed: Duration },
    PauseSkipped(Duration),
    /// Bytes that went out on the wire.
    Sent(Vec<u8>),
    WriteSkipped(String),
    WriteFailed(String),
    HeadersSent(Duration),
    BodySkipped,
    BodyInterrupted,
    BodySent(Duration),
    ResponseByte(u8),
    Stall(Duration),
    ReadFailed(String),
    ResponseInterrupted,
    Timings(PhaseDeltas),
}

pub trait Reporter {
    fn report(&mut self, event: Event);
}

impl<R: Reporter + ?Sized> Reporter for &mut R {
    fn report(&mut self, event: Event) {
        (**self).report(event)
    }
}

/// Keeps every event, in order.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    pub events: Vec<Event>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, predicate: impl Fn(&Event) -> bool) -> usize {
        self.events.iter().filter(|event| predicate(event)).count()
    }

    /// Everything that was echoed as sent, concatenated.
    pub fn sent_bytes(&self) -> Vec<u8> {
        self.events
            .iter()
            .filter_map(|event| match event {
                Event::Sent(bytes) => Some(bytes.as_slice()),
                _ => None,
            })
            .flatten()
            .copied()
            .collect()
    }

    pub fn response_bytes(&self) -> Vec<u8> {
        self.events
            .iter()
            .filter_map(|event| match event {
                Event::ResponseByte(byte) => Some(*byte),
                _ => None,
            })
            .collect()
    }
}

impl Reporter for RecordingReporter {
    fn report(&mut self, event: Event) {
        self.events.push(event);
    }
}

/// Human-readable transcript: raw bytes echoed as they go by, notices and
/// timings on their own lines.
pub struct ConsoleReporter<W: Write = Stdout> {
    out: W,
    mid_line: bool,
}

impl ConsoleReporter<Stdout> {
    pub fn stdout() -> Self {
        ConsoleReporter::new(std::io::stdout())
    }
}

impl<W: Write> ConsoleReporter<W> {
    pub fn new(out: W) -> Self {
        ConsoleReporter {
            out,
            mid_line: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn echo(&mut self, bytes: &[u8]) {
        let Some(last) = bytes.last() else {
            return;
        };

        let _ = self.out.write_all(bytes);
        let _ = self.out.flush();
        self.mid_line = *last != b'\n';
    }

    fn line(&mut self, text: impl std::fmt::Display) {
        if self.mid_line {
            let _ = writeln!(self.out);
            self.mid_line = false;
        }

        let _ = writeln!(self.out, "{text}");
        let _ = self.out.flush();
    }

    fn timing(&mut self, label: &str, duration: Duration) {
        self.line(format!("{label}: {}", format_duration(duration)).cyan());
    }
}

impl<W: Write> Reporter for ConsoleReporter<W> {
    fn report(&mut self, event: Event) {
        match event {
            Event::Connected { host, tls } => {
                let kind = if tls { "TLS" } else { "non-TLS" };
                self.line(format!("{kind} connection to {host}\n"));
            }
            Event::Pausing(duration) => {
                self.line(format!("{} {}", "sleeping".yellow(), format_duration(duration)))
            }
            Event::PauseInterrupted { elapsed } => self.line(format!(
                "{} {}",
                "interrupted after".red(),
                format_duration(elapsed)
            )),
            Event::PauseSkipped(duration) => {
                self.line(format!("skipping sleep: {}", format_duration(duration)))
            }
            Event::Sent(bytes) => self.echo(&bytes),
            Event::WriteSkipped(text) => self.line(format!("skipping {text:?}")),
            Event::WriteFailed(reason) => self.line(reason.red()),
            Event::HeadersSent(elapsed) => {
                self.timing("time to send headers", elapsed);
                self.line("");
            }
            Event::BodySkipped => self.line("skipping body write"),
            Event::BodyInterrupted => self.line("body write interrupted".red()),
            Event::BodySent(elapsed) => {
                self.timing("time to send body", elapsed);
                self.line("");
            }
            Event::ResponseByte(byte) => self.echo(&[byte]),
            Event::Stall(window) => self.line(
                format!(
                    "{} with no bytes read (waiting for idle timeout?)",
                    format_duration(window)
                )
                .yellow(),
            ),
            Event::ReadFailed(reason) => self.line(format!("read error: {reason}")),
            Event::ResponseInterrupted => self.line("response read interrupted".red()),
            Event::Timings(deltas) => {
                match deltas.response {
                    Some(response) => self.timing("time to read response bytes", response),
                    None => self.line("no response bytes read".yellow()),
                }
                self.timing(
                    "time from last read until close/error (~idle timeout)",
                    deltas.idle,
                );
            }
        }
    }
}
