use crate::ConnectionConfig;
use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};

/// Opens the byte stream a [`Connection`](crate::Connection) talks over
pub trait Connector {
    type Stream: Read + Write;

    fn connect(&self, config: &ConnectionConfig) -> io::Result<Self::Stream>;
}

/// Plain TCP, honouring the configured socket timeouts
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    type Stream = TcpStream;

    fn connect(&self, config: &ConnectionConfig) -> io::Result<TcpStream> {
        let stream = match config.connect_timeout() {
            Some(timeout) => connect_with_timeout(config, timeout)?,
            None => TcpStream::connect((config.host(), config.port()))?,
        };

        stream.set_nodelay(true)?;
        stream.set_read_timeout(config.read_timeout())?;
        stream.set_write_timeout(config.write_timeout())?;

        Ok(stream)
    }
}

fn connect_with_timeout(config: &ConnectionConfig, timeout: std::time::Duration) -> io::Result<TcpStream> {
    let mut last_error = None;

    for address in (config.host(), config.port()).to_socket_addrs()? {
        match TcpStream::connect_timeout(&address, timeout) {
            Ok(stream) => return Ok(stream),
            Err(error) => last_error = Some(error),
        }
    }

    Err(last_error.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} did not resolve to any address", config.address()),
        )
    }))
}
