use crate::{Command, ProtocolError, Result, MAX_LINE_LENGTH, MAX_REPLY_SIZE};
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

const CRLF: &[u8] = b"\r\n";

/// Leading byte of a reply frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReplyMarker {
    Simple = b'+',
    Integer = b':',
    Error = b'-',
    Bulk = b'$',
}

impl ReplyMarker {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            b'+' => Some(ReplyMarker::Simple),
            b':' => Some(ReplyMarker::Integer),
            b'-' => Some(ReplyMarker::Error),
            b'$' => Some(ReplyMarker::Bulk),
            _ => None,
        }
    }

    pub fn as_u8(&self) -> u8 {
        *self as u8
    }
}

/// Codec for the line-oriented request/reply protocol
///
/// Requests: `VERB payload\r\n`
/// Replies: `+line`, `:integer`, `-error`, `$len\r\n<len bytes>\r\n` or `$-1`
///
/// Each decoded reply is its logical payload as a string. A nil bulk
/// reply decodes to the empty string; an error reply decodes to
/// `ProtocolError::Server`. A frame is always consumed from the buffer
/// before its result is returned, so the next frame starts cleanly.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReplyCodec;

impl ReplyCodec {
    pub fn new() -> Self {
        ReplyCodec
    }

    /// Write `VERB payload\r\n`. The separator is omitted for an empty payload.
    pub fn encode_request(verb: &str, payload: &str, dst: &mut BytesMut) -> Result<()> {
        if payload.contains(['\r', '\n']) {
            return Err(ProtocolError::InvalidPayload(verb.to_string()));
        }

        dst.reserve(verb.len() + payload.len() + 3);
        dst.put_slice(verb.as_bytes());
        if !payload.is_empty() {
            dst.put_u8(b' ');
            dst.put_slice(payload.as_bytes());
        }
        dst.put_slice(CRLF);

        Ok(())
    }
}

fn find_crlf(src: &[u8]) -> Option<usize> {
    src.windows(2).position(|window| window == CRLF)
}

/// Consume a whole header line and return its text after the marker byte
fn take_line(src: &mut BytesMut, line_end: usize) -> Result<String> {
    let line = src.split_to(line_end + CRLF.len());
    Ok(String::from_utf8(line[1..line_end].to_vec())?)
}

impl Decoder for ReplyCodec {
    type Item = String;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        let line_end = match find_crlf(src) {
            Some(line_end) => line_end,
            None if src.len() > MAX_LINE_LENGTH => {
                return Err(ProtocolError::LineTooLong(MAX_LINE_LENGTH));
            }
            None => return Ok(None),
        };

        if line_end == 0 {
            src.advance(CRLF.len());
            return Err(ProtocolError::MalformedFrame("empty reply line".to_string()));
        }

        let marker = match ReplyMarker::from_u8(src[0]) {
            Some(marker) => marker,
            None => {
                let byte = src[0];
                src.advance(line_end + CRLF.len());
                return Err(ProtocolError::UnknownMarker(byte));
            }
        };

        match marker {
            ReplyMarker::Simple | ReplyMarker::Integer => take_line(src, line_end).map(Some),
            ReplyMarker::Error => Err(ProtocolError::Server(take_line(src, line_end)?)),
            ReplyMarker::Bulk => {
                let header = std::str::from_utf8(&src[1..line_end]).ok();
                let length = match header.and_then(|text| text.trim().parse::<i64>().ok()) {
                    Some(length) => length,
                    None => {
                        let header = take_line(src, line_end)?;
                        return Err(ProtocolError::MalformedFrame(format!(
                            "invalid bulk length {:?}",
                            header
                        )));
                    }
                };

                if length == -1 {
                    src.advance(line_end + CRLF.len());
                    return Ok(Some(String::new()));
                }

                let length = match usize::try_from(length) {
                    Ok(length) => length,
                    Err(_) => {
                        src.advance(line_end + CRLF.len());
                        return Err(ProtocolError::MalformedFrame(format!(
                            "negative bulk length {}",
                            length
                        )));
                    }
                };

                if length > MAX_REPLY_SIZE {
                    src.advance(line_end + CRLF.len());
                    return Err(ProtocolError::ReplyTooLarge(length));
                }

                // Header, payload, and the CRLF that follows the payload
                let frame_len = line_end + CRLF.len() + length + CRLF.len();
                if src.len() < frame_len {
                    src.reserve(frame_len - src.len());
                    return Ok(None);
                }

                src.advance(line_end + CRLF.len());
                let body = src.split_to(length + CRLF.len());

                if &body[length..] != CRLF {
                    return Err(ProtocolError::MalformedFrame(
                        "bulk payload not terminated by CRLF".to_string(),
                    ));
                }

                Ok(Some(String::from_utf8(body[..length].to_vec())?))
            }
        }
    }
}

impl<'a> Encoder<Command<'a>> for ReplyCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Command<'a>, dst: &mut BytesMut) -> Result<()> {
        let payload = item.payload()?;
        Self::encode_request(item.verb(), &payload, dst)
    }
}
