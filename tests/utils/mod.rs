use std::io::{ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::Duration;

pub fn panic_after<T, F>(d: Duration, f: F) -> T
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (done_tx, done_rx) = mpsc::channel();
    let handle = std::thread::spawn(move || {
        let val = f();
        done_tx.send(()).expect("Unable to send completion signal");
        val
    });

    match done_rx.recv_timeout(d) {
        Ok(_) => handle.join().expect("Thread panicked"),
        Err(_) => panic!("Thread took too long"),
    }
}

/// A one-shot peer on an ephemeral localhost port. The behaviour closure
/// gets the listener and returns whatever the test wants to inspect.
pub struct Peer<T> {
    pub host: String,
    handle: JoinHandle<T>,
}

impl<T: Send + 'static> Peer<T> {
    pub fn spawn(behaviour: impl FnOnce(TcpListener) -> T + Send + 'static) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let host = listener.local_addr().unwrap().to_string();

        Peer {
            host,
            handle: std::thread::spawn(move || behaviour(listener)),
        }
    }

    pub fn join(self) -> T {
        self.handle.join().unwrap()
    }
}

/// Reads one request: headers up to the blank line, then Content-Length
/// bytes of body.
pub fn read_request(stream: &mut impl Read) -> String {
    let mut bytes: Vec<u8> = vec![];
    let mut byte = [0u8; 1];

    while !bytes.ends_with(b"\r\n\r\n") {
        if stream.read(&mut byte).unwrap() == 0 {
            return String::from_utf8(bytes).unwrap();
        }
        bytes.push(byte[0]);
    }

    let head = String::from_utf8(bytes.clone()).unwrap();
    let content_length = head
        .split("\r\n")
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().unwrap())
        })
        .unwrap_or(0);

    let mut body = vec![0u8; content_length];
    stream.read_exact(&mut body).unwrap();
    bytes.extend_from_slice(&body);

    String::from_utf8(bytes).unwrap()
}

/// Reads everything the client sends until it goes quiet for `quiet`.
pub fn read_until_quiet(stream: &mut TcpStream, quiet: Duration) -> Vec<u8> {
    stream.set_read_timeout(Some(quiet)).unwrap();

    let mut bytes = vec![];
    let mut buf = [0u8; 4096];
    loop {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => bytes.extend_from_slice(&buf[..n]),
            Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => break,
            Err(err) => panic!("peer read failed: {err}"),
        }
    }

    stream.set_read_timeout(None).unwrap();
    bytes
}

/// Answers what a plaintext HTTP server answers to a TLS ClientHello.
pub fn reject_tls(listener: &TcpListener) {
    let (mut stream, _) = listener.accept().unwrap();
    read_until_quiet(&mut stream, Duration::from_millis(200));
    stream
        .write_all(b"HTTP/1.1 400 Bad Request\r\nConnection: close\r\n\r\n")
        .unwrap();
}

pub static OK_RESPONSE: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok";
