use crate::header::{content_length_line, is_content_length, CRLF};
use crate::probe::HealthProbe;
use crate::report::{Event, Reporter};
use crate::script::{HeaderEntry, TestScript};
use crate::waiter::Waiter;
use log::debug;
use std::io::{self, ErrorKind, Write};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseResult {
    pub completed: bool,
    pub finished_at: Instant,
}

struct LineWriter<'a, W: Write> {
    stream: &'a mut W,
    reporter: &'a mut dyn Reporter,
    failed: bool,
}

impl<'a, W: Write> LineWriter<'a, W> {
    fn write_line(&mut self, line: &str) {
        let text = format!("{line}{CRLF}");

        if self.failed {
            self.reporter.report(Event::WriteSkipped(text));
            return;
        }

        self.reporter.report(Event::Sent(text.as_bytes().to_vec()));

        match write_once(self.stream, text.as_bytes()) {
            Ok(n) if n == text.len() => {}
            Ok(n) => self.fail(format!("wrote wrong length: {n} vs {}", text.len())),
            Err(err) => self.fail(err.to_string()),
        }
    }

    fn fail(&mut self, reason: String) {
        debug!("header write failed: {reason}");
        self.reporter.report(Event::WriteFailed(reason));
        self.failed = true;
    }
}

/// A single `write` call, repeated only when a signal interrupted it.
fn write_once<W: Write>(stream: &mut W, buf: &[u8]) -> io::Result<usize> {
    loop {
        match stream.write(buf) {
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            res => return res,
        }
    }
}

/// Sends the header block. `started` is when the connection became ready.
pub fn send_headers<W: Write, P: HealthProbe>(
    stream: &mut W,
    probe: &P,
    waiter: &Waiter,
    script: &TestScript,
    started: Instant,
    reporter: &mut dyn Reporter,
) -> PhaseResult {
    let mut writer = LineWriter {
        stream,
        reporter,
        failed: false,
    };
    let mut got_content_length = false;

    for entry in &script.header_lines {
        match entry {
            HeaderEntry::Pause(duration) => {
                if writer.failed {
                    writer.reporter.report(Event::PauseSkipped(*duration));
                    continue;
                }

                writer.reporter.report(Event::Pausing(*duration));
                let elapsed = waiter.wait(*duration, probe);
                if elapsed < *duration {
                    writer.reporter.report(Event::PauseInterrupted { elapsed });
                    writer.failed = true;
                }
            }
            HeaderEntry::Line(line) => {
                got_content_length |= is_content_length(line);
                writer.write_line(line);
            }
        }
    }

    if !got_content_length {
        writer.write_line(&content_length_line(script.body.len()));
    }
    writer.write_line("");

    let finished_at = Instant::now();
    writer
        .reporter
        .report(Event::HeadersSent(finished_at.duration_since(started)));

    PhaseResult {
        completed: !writer.failed,
        finished_at,
    }
}

/// Writes `body` one byte at a time, sleeping `per_byte_delay` between bytes.
/// Gives up on the first failed or short write.
pub fn send_body<W: Write>(
    stream: &mut W,
    body: &[u8],
    per_byte_delay: Duration,
    headers: &PhaseResult,
    reporter: &mut dyn Reporter,
) -> PhaseResult {
    let completed = if headers.completed {
        write_paced(stream, body, per_byte_delay, reporter)
    } else {
        reporter.report(Event::BodySkipped);
        false
    };

    let finished_at = Instant::now();
    reporter.report(Event::BodySent(finished_at.duration_since(headers.finished_at)));

    PhaseResult {
        completed,
        finished_at,
    }
}

fn write_paced<W: Write>(
    stream: &mut W,
    body: &[u8],
    per_byte_delay: Duration,
    reporter: &mut dyn Reporter,
) -> bool {
    for (i, byte) in body.iter().enumerate() {
        // The probe only watches the read side, which says nothing about
        // whether this write can succeed, so a plain sleep is used here.
        if i != 0 && !per_byte_delay.is_zero() {
            std::thread::sleep(per_byte_delay);
        }

        reporter.report(Event::Sent(vec![*byte]));

        match write_once(stream, std::slice::from_ref(byte)) {
            Ok(1) => {}
            Ok(n) => {
                reporter.report(Event::WriteFailed(format!("wrote wrong length: {n} vs 1")));
                reporter.report(Event::BodyInterrupted);
                return false;
            }
            Err(err) => {
                reporter.report(Event::WriteFailed(err.to_string()));
                reporter.report(Event::BodyInterrupted);
                return false;
            }
        }
    }

    true
}
