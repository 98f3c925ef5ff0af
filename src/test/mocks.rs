use crate::probe::{HealthProbe, Liveness};
use std::io::{Error, ErrorKind, Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};

/// In-memory duplex stream. Reads drain `read_buf` then report end of
/// stream (or `read_error` if set); writes land in `write_buf` until
/// `write_limit` bytes were accepted, after which they fail. The first
/// `interrupted_writes` writes are interrupted before accepting anything.
#[derive(Default)]
pub struct MockStream {
    pub(crate) read_buf: Vec<u8>,
    pub(crate) read_error: Option<ErrorKind>,
    pub(crate) write_buf: Vec<u8>,
    pub(crate) write_limit: Option<usize>,
    pub(crate) write_calls: usize,
    pub(crate) interrupted_writes: usize,
}

impl MockStream {
    pub fn with_response(response: &[u8]) -> Self {
        MockStream {
            read_buf: response.to_vec(),
            ..Default::default()
        }
    }

    pub fn written(&self) -> &str {
        std::str::from_utf8(&self.write_buf).unwrap()
    }
}

impl Read for MockStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.read_buf.is_empty() {
            if let Some(kind) = self.read_error {
                return Err(Error::new(kind, "mock read failure"));
            }
        }

        let mut read_buf_slice = self.read_buf.as_slice();
        let res = read_buf_slice.read(buf);
        self.read_buf = read_buf_slice.to_vec();

        res
    }
}

impl Write for MockStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.write_calls += 1;

        if self.interrupted_writes > 0 {
            self.interrupted_writes -= 1;
            return Err(Error::new(ErrorKind::Interrupted, "mock interrupted write"));
        }

        let accepted = match self.write_limit {
            Some(limit) => {
                let room = limit.saturating_sub(self.write_buf.len());
                if room == 0 {
                    return Err(Error::new(ErrorKind::BrokenPipe, "mock write failure"));
                }
                room.min(buf.len())
            }
            None => buf.len(),
        };

        self.write_buf.extend_from_slice(&buf[..accepted]);

        Ok(accepted)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Reports open for the first `open_calls` probes, closed afterwards.
pub struct ScriptedProbe {
    open_calls: usize,
    calls: AtomicUsize,
}

impl ScriptedProbe {
    pub fn closed_after(open_calls: usize) -> Self {
        ScriptedProbe {
            open_calls,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl HealthProbe for ScriptedProbe {
    fn probe(&self) -> Liveness {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.open_calls {
            Liveness::Open
        } else {
            Liveness::Closed
        }
    }
}
