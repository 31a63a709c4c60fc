// In-memory server double for unit tests

use crate::{ConnectionConfig, Connector};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::rc::Rc;

pub(crate) const GREETING: &[u8] = b"+HI {\"v\":2}\r\n";
pub(crate) const OK: &[u8] = b"+OK\r\n";

#[derive(Default)]
struct Inner {
    incoming: VecDeque<u8>,
    written: Vec<u8>,
    chunk_size: usize,
    connects: usize,
    refuse: bool,
}

/// Replays scripted server bytes and records everything the client writes
#[derive(Clone, Default)]
pub(crate) struct ScriptedServer {
    inner: Rc<RefCell<Inner>>,
}

impl ScriptedServer {
    pub fn new() -> Self {
        let server = ScriptedServer::default();
        server.inner.borrow_mut().chunk_size = 4096;
        server
    }

    /// Server that has already completed the handshake reply sequence
    pub fn handshaken() -> Self {
        ScriptedServer::new().reply(GREETING).reply(OK)
    }

    pub fn reply(self, bytes: &[u8]) -> Self {
        self.inner.borrow_mut().incoming.extend(bytes.iter().copied());
        self
    }

    /// Deliver at most `size` bytes per read call
    pub fn chunked(self, size: usize) -> Self {
        self.inner.borrow_mut().chunk_size = size;
        self
    }

    pub fn refusing(self) -> Self {
        self.inner.borrow_mut().refuse = true;
        self
    }

    pub fn connects(&self) -> usize {
        self.inner.borrow().connects
    }

    pub fn written(&self) -> String {
        String::from_utf8_lossy(&self.inner.borrow().written).into_owned()
    }

    /// Written request lines, without their CRLF
    pub fn lines(&self) -> Vec<String> {
        self.written()
            .split("\r\n")
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()
    }
}

pub(crate) struct ScriptedStream {
    inner: Rc<RefCell<Inner>>,
}

impl Read for ScriptedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut inner = self.inner.borrow_mut();
        let count = buf.len().min(inner.chunk_size).min(inner.incoming.len());
        for slot in buf.iter_mut().take(count) {
            if let Some(byte) = inner.incoming.pop_front() {
                *slot = byte;
            }
        }
        Ok(count)
    }
}

impl Write for ScriptedStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.borrow_mut().written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Connector for ScriptedServer {
    type Stream = ScriptedStream;

    fn connect(&self, _config: &ConnectionConfig) -> io::Result<ScriptedStream> {
        let mut inner = self.inner.borrow_mut();
        if inner.refuse {
            return Err(io::Error::from(io::ErrorKind::ConnectionRefused));
        }
        inner.connects += 1;
        Ok(ScriptedStream {
            inner: Rc::clone(&self.inner),
        })
    }
}
