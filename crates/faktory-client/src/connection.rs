use crate::{ClientError, ConnectionConfig, Connector, HandshakeError, Result, TcpConnector};
use bytes::BytesMut;
use faktory_protocol::{Command, Hi, ReplyCodec, PROTOCOL_VERSION};
use serde_json::{Map, Value};
use std::io::{ErrorKind, Read, Write};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, info, warn};

const READ_CHUNK_SIZE: usize = 4096;

enum State<S> {
    Unconnected,
    Connected(S),
}

/// One blocking session with the server.
///
/// Strictly request/response: every command writes one request and reads
/// exactly one reply before returning. The socket is opened and the
/// handshake performed on the first command, or explicitly with
/// [`connect`](Connection::connect). A transport or framing failure drops
/// the socket; nothing is retried.
pub struct Connection<C: Connector = TcpConnector> {
    config: ConnectionConfig,
    connector: C,
    state: State<C::Stream>,
    codec: ReplyCodec,
    read_buffer: BytesMut,
    write_buffer: BytesMut,
}

impl Connection<TcpConnector> {
    pub fn new(config: ConnectionConfig) -> Self {
        Connection::with_connector(config, TcpConnector)
    }
}

impl<C: Connector> Connection<C> {
    pub fn with_connector(config: ConnectionConfig, connector: C) -> Self {
        Connection {
            config,
            connector,
            state: State::Unconnected,
            codec: ReplyCodec::new(),
            read_buffer: BytesMut::with_capacity(READ_CHUNK_SIZE),
            write_buffer: BytesMut::new(),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn worker_options(&self) -> &Map<String, Value> {
        self.config.worker_options()
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, State::Connected(_))
    }

    /// Open the socket and complete the handshake. No-op when connected.
    pub fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }

        let address = self.config.address();
        info!(%address, "Connecting to Faktory server");

        let stream = self.connector.connect(&self.config)?;
        self.read_buffer.clear();
        self.state = State::Connected(stream);

        if let Err(e) = self.handshake() {
            warn!(%address, error = %e, "Handshake failed");
            self.disconnect();
            return Err(e);
        }

        info!(%address, "Connected to Faktory server");
        Ok(())
    }

    pub fn ensure_connected(&mut self) -> Result<()> {
        match self.state {
            State::Connected(_) => Ok(()),
            State::Unconnected => self.connect(),
        }
    }

    fn handshake(&mut self) -> Result<()> {
        let greeting = match self.read_reply() {
            Ok(greeting) => greeting,
            Err(ClientError::Server(message)) => {
                return Err(HandshakeError::InvalidGreeting(message).into())
            }
            Err(e) => return Err(e),
        };

        let hi = Hi::parse(&greeting)
            .map_err(|e| HandshakeError::InvalidGreeting(e.to_string()))?;

        if !hi.is_supported() {
            return Err(HandshakeError::UnsupportedVersion {
                expected: PROTOCOL_VERSION,
                actual: hi.v,
            }
            .into());
        }
        debug!(version = hi.v, "Received server greeting");

        let options = self.config.worker_options().clone();
        match self.exchange(Command::Hello(&options)) {
            Ok(_) => Ok(()),
            Err(ClientError::Server(message)) => Err(HandshakeError::Rejected(message).into()),
            Err(e) => Err(e),
        }
    }

    /// Send one command and return its decoded reply
    pub fn send_command(&mut self, command: Command<'_>) -> Result<String> {
        self.ensure_connected()?;
        self.exchange(command)
    }

    /// Send any verb with an already-serialized payload
    pub fn send_raw(&mut self, verb: &str, payload: &str) -> Result<String> {
        self.send_command(Command::Raw { verb, payload })
    }

    /// Gracefully end the session.
    ///
    /// The server may close the socket before answering `END`; that is
    /// treated as success. Any other failure is returned.
    pub fn end(&mut self) -> Result<()> {
        if !self.is_connected() {
            return Ok(());
        }

        let result = self.exchange(Command::End);
        self.disconnect();

        match result {
            Ok(reply) if reply == "OK" => Ok(()),
            Ok(reply) => Err(ClientError::UnexpectedReply {
                command: "END",
                reply,
            }),
            Err(e) if e.is_connection_closed() => {
                warn!("Server closed the connection before acknowledging END");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Close the socket if open. Never fails.
    pub fn disconnect(&mut self) {
        if let State::Connected(_) = std::mem::replace(&mut self.state, State::Unconnected) {
            info!(address = %self.config.address(), "Disconnected from Faktory server");
        }
        self.read_buffer.clear();
    }

    fn exchange(&mut self, command: Command<'_>) -> Result<String> {
        let verb = command.verb();

        self.write_buffer.clear();
        self.codec.encode(command, &mut self.write_buffer)?;
        debug!(verb, bytes = self.write_buffer.len(), "Sending command");

        let result = self.write_request().and_then(|_| self.read_reply());

        if let Err(e) = &result {
            if !matches!(e, ClientError::Server(_)) {
                warn!(verb, error = %e, "Dropping connection after failed command");
                self.disconnect();
            }
        }

        result
    }

    fn write_request(&mut self) -> Result<()> {
        let stream = match &mut self.state {
            State::Connected(stream) => stream,
            State::Unconnected => return Err(ClientError::ConnectionClosed),
        };

        stream.write_all(&self.write_buffer)?;
        stream.flush()?;
        Ok(())
    }

    /// Read until one full reply frame is buffered, then decode it
    fn read_reply(&mut self) -> Result<String> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];

        loop {
            if let Some(reply) = self.codec.decode(&mut self.read_buffer)? {
                return Ok(reply);
            }

            let stream = match &mut self.state {
                State::Connected(stream) => stream,
                State::Unconnected => return Err(ClientError::ConnectionClosed),
            };

            let read = match stream.read(&mut chunk) {
                Ok(read) => read,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };

            if read == 0 {
                return Err(ClientError::ConnectionClosed);
            }

            self.read_buffer.extend_from_slice(&chunk[..read]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedServer, GREETING, OK};
    use crate::ErrorKind as ClientErrorKind;

    fn connection(server: &ScriptedServer) -> Connection<ScriptedServer> {
        let config = ConnectionConfig::new("localhost", 7419).with_wid("w-1");
        Connection::with_connector(config, server.clone())
    }

    #[test]
    fn test_handshake_sends_hello_with_version() {
        let server = ScriptedServer::handshaken();
        let mut conn = connection(&server);

        conn.connect().unwrap();

        assert!(conn.is_connected());
        let lines = server.lines();
        assert_eq!(lines.len(), 1);
        let hello: Value = serde_json::from_str(lines[0].strip_prefix("HELLO ").unwrap()).unwrap();
        assert_eq!(hello, serde_json::json!({"wid": "w-1", "v": 2}));
    }

    #[test]
    fn test_connect_is_idempotent() {
        let server = ScriptedServer::handshaken();
        let mut conn = connection(&server);

        conn.connect().unwrap();
        conn.connect().unwrap();

        assert_eq!(server.connects(), 1);
    }

    #[test]
    fn test_greeting_without_separator() {
        let server = ScriptedServer::new().reply(b"+HI{\"v\":2}\r\n").reply(OK);
        let mut conn = connection(&server);

        conn.connect().unwrap();
        assert!(conn.is_connected());
    }

    #[test]
    fn test_unsupported_versions_are_rejected() {
        for greeting in [&b"+HI {\"v\":1}\r\n"[..], &b"+HI {\"v\":3}\r\n"[..]] {
            let server = ScriptedServer::new().reply(greeting);
            let mut conn = connection(&server);

            match conn.connect() {
                Err(ClientError::Handshake(HandshakeError::UnsupportedVersion { expected: 2, .. })) => {}
                other => panic!("Expected UnsupportedVersion, got {:?}", other),
            }
            assert!(!conn.is_connected());
            assert!(server.lines().is_empty());
        }
    }

    #[test]
    fn test_missing_greeting() {
        let server = ScriptedServer::new().reply(b"+HELLO\r\n");
        let mut conn = connection(&server);

        let error = conn.connect().unwrap_err();
        assert_eq!(error.kind(), ClientErrorKind::Handshake);
        assert!(!conn.is_connected());
    }

    #[test]
    fn test_hello_rejected() {
        let server = ScriptedServer::new().reply(GREETING).reply(b"-ERR invalid wid\r\n");
        let mut conn = connection(&server);

        match conn.connect() {
            Err(ClientError::Handshake(HandshakeError::Rejected(message))) => {
                assert_eq!(message, "ERR invalid wid")
            }
            other => panic!("Expected Rejected, got {:?}", other),
        }
        assert!(!conn.is_connected());
    }

    #[test]
    fn test_connect_refused() {
        let server = ScriptedServer::new().refusing();
        let mut conn = connection(&server);

        let error = conn.connect().unwrap_err();
        assert_eq!(error.kind(), ClientErrorKind::Transport);
        assert!(!conn.is_connected());
    }

    #[test]
    fn test_send_command_connects_lazily() {
        let server = ScriptedServer::handshaken().reply(b"$5\r\nhello\r\n");
        let mut conn = connection(&server);
        assert!(!conn.is_connected());

        let reply = conn.send_raw("ECHO", "hello").unwrap();

        assert_eq!(reply, "hello");
        assert_eq!(server.connects(), 1);
        assert_eq!(server.lines()[1], "ECHO hello");
    }

    #[test]
    fn test_bulk_reply_over_partial_reads() {
        let server = ScriptedServer::handshaken()
            .reply(b"$12\r\nline1\r\nline2\r\n")
            .chunked(2);
        let mut conn = connection(&server);

        assert_eq!(conn.send_raw("FETCH", "default").unwrap(), "line1\r\nline2");
    }

    #[test]
    fn test_server_error_keeps_connection() {
        let server = ScriptedServer::handshaken()
            .reply(b"-ERR unknown command\r\n")
            .reply(b":3\r\n");
        let mut conn = connection(&server);

        match conn.send_raw("BOGUS", "") {
            Err(ClientError::Server(message)) => assert_eq!(message, "ERR unknown command"),
            other => panic!("Expected server error, got {:?}", other),
        }
        assert!(conn.is_connected());
        assert_eq!(conn.send_raw("SIZE", "").unwrap(), "3");
        assert_eq!(server.connects(), 1);
    }

    #[test]
    fn test_truncated_reply_drops_connection() {
        let server = ScriptedServer::handshaken().reply(b"$10\r\nabc");
        let mut conn = connection(&server);

        let error = conn.send_raw("FETCH", "default").unwrap_err();
        assert!(matches!(error, ClientError::ConnectionClosed));
        assert!(!conn.is_connected());
    }

    #[test]
    fn test_unknown_marker_is_protocol_violation() {
        let server = ScriptedServer::handshaken().reply(b"?unknown\r\n");
        let mut conn = connection(&server);

        let error = conn.send_raw("FETCH", "default").unwrap_err();
        assert_eq!(error.kind(), ClientErrorKind::ProtocolViolation);
        assert!(!conn.is_connected());
    }

    #[test]
    fn test_end_acknowledged() {
        let server = ScriptedServer::handshaken().reply(OK);
        let mut conn = connection(&server);
        conn.connect().unwrap();

        conn.end().unwrap();

        assert!(!conn.is_connected());
        assert_eq!(server.lines().last().map(String::as_str), Some("END"));
    }

    #[test]
    fn test_end_tolerates_early_close() {
        let server = ScriptedServer::handshaken();
        let mut conn = connection(&server);
        conn.connect().unwrap();

        conn.end().unwrap();
        assert!(!conn.is_connected());
    }

    #[test]
    fn test_end_rejects_unexpected_reply() {
        let server = ScriptedServer::handshaken().reply(b"+NOPE\r\n");
        let mut conn = connection(&server);
        conn.connect().unwrap();

        match conn.end() {
            Err(ClientError::UnexpectedReply { command: "END", reply }) => assert_eq!(reply, "NOPE"),
            other => panic!("Expected UnexpectedReply, got {:?}", other),
        }
        assert!(!conn.is_connected());
    }

    #[test]
    fn test_end_without_connection_is_noop() {
        let server = ScriptedServer::new();
        let mut conn = connection(&server);

        conn.end().unwrap();
        assert_eq!(server.connects(), 0);
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let server = ScriptedServer::handshaken();
        let mut conn = connection(&server);
        conn.connect().unwrap();

        conn.disconnect();
        conn.disconnect();
        assert!(!conn.is_connected());
    }
}
