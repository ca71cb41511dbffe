// RDB - Replay Debugger
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Step-control channel
//!
//! The player process and a debugger front end talk over a strictly alternating
//! request/response channel: the front end sends one [`StepRequest`], the player
//! answers with exactly one [`FrameReport`], and nothing else travels on the
//! channel. Messages are framed with a 4-byte big-endian length and may not exceed
//! [`MAX_MESSAGE_SIZE`] bytes of payload.
//!
//! Payloads:
//! - a step request is the ASCII token `line` or `opcode`;
//! - a frame report is a tag byte followed by its body: `0` end of stream (body is
//!   the optional uncaught error text), `1` frame (body is the encoded snapshot,
//!   see [`crate::codec`]), `2` aborted (body is the diagnostic).
//!
//! [`ControlServer`] and [`ControlClient`] are the blocking endpoints. The async
//! helpers [`read_message_async`] and [`write_message_async`] speak the same framing
//! for tokio-based front ends.

use std::io::{self, Read, Write};

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

use crate::{
    codec::{decode_frame, encode_frame, CodecError},
    types::{FrameSnapshot, StepCommand, UnknownStepCommand},
};

/// Largest payload a single message may carry
pub const MAX_MESSAGE_SIZE: usize = 32 * 1024;

const TAG_END_OF_STREAM: u8 = 0;
const TAG_FRAME: u8 = 1;
const TAG_ABORTED: u8 = 2;

/// Errors raised on the control channel
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Underlying transport failure
    #[error("channel i/o failed: {0}")]
    Io(#[from] io::Error),

    /// A message exceeds the channel limit
    #[error("message of {size} bytes exceeds the {limit} byte channel limit")]
    MessageTooLarge {
        /// Payload size
        size: usize,
        /// Channel limit
        limit: usize,
    },

    /// The peer closed the channel
    #[error("channel closed by peer")]
    Closed,

    /// A step request carried an unknown token
    #[error(transparent)]
    UnknownCommand(#[from] UnknownStepCommand),

    /// A frame report body could not be decoded
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// A report payload is malformed
    #[error("malformed report: {0}")]
    Malformed(String),

    /// A message was sent out of turn
    #[error("out of turn: {0}")]
    OutOfTurn(&'static str),

    /// The player already reported the end of the stream
    #[error("player has terminated")]
    Terminated,
}

/// Client request: advance the replay by one step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepRequest {
    /// Granularity of the step
    pub granularity: StepCommand,
}

impl StepRequest {
    /// Create a request for one step of `granularity`
    pub fn new(granularity: StepCommand) -> Self {
        Self { granularity }
    }

    /// Payload bytes of the request
    pub fn encode(&self) -> Vec<u8> {
        self.granularity.token().as_bytes().to_vec()
    }

    /// Parse a request payload
    pub fn decode(payload: &[u8]) -> Result<Self, ChannelError> {
        let token = String::from_utf8_lossy(payload);
        Ok(Self { granularity: token.parse()? })
    }
}

/// Server response to a step request
#[derive(Debug, Clone, PartialEq)]
pub enum FrameReport {
    /// Execution paused at a boundary
    Frame(FrameSnapshot),
    /// The program finished; carries its uncaught error, if it raised one
    EndOfStream {
        /// Display form of the uncaught error
        uncaught: Option<String>,
    },
    /// Replay failed and the player is shutting down
    Aborted {
        /// Diagnostic describing the failure
        reason: String,
    },
}

impl FrameReport {
    /// Whether no further reports will follow this one
    pub fn is_final(&self) -> bool {
        !matches!(self, Self::Frame(_))
    }

    /// The snapshot carried by a `Frame` report
    pub fn frame(&self) -> Option<&FrameSnapshot> {
        match self {
            Self::Frame(frame) => Some(frame),
            _ => None,
        }
    }

    /// Payload bytes of the report
    pub fn encode(&self) -> Result<Vec<u8>, ChannelError> {
        let mut out = Vec::new();
        match self {
            Self::Frame(frame) => {
                out.push(TAG_FRAME);
                out.extend_from_slice(&encode_frame(frame)?);
            }
            Self::EndOfStream { uncaught } => {
                out.push(TAG_END_OF_STREAM);
                if let Some(text) = uncaught {
                    out.extend_from_slice(text.as_bytes());
                }
            }
            Self::Aborted { reason } => {
                out.push(TAG_ABORTED);
                out.extend_from_slice(reason.as_bytes());
            }
        }
        Ok(out)
    }

    /// Parse a report payload
    pub fn decode(payload: &[u8]) -> Result<Self, ChannelError> {
        let (&tag, body) =
            payload.split_first().ok_or_else(|| ChannelError::Malformed("empty report".into()))?;
        let text = || String::from_utf8_lossy(body).into_owned();
        match tag {
            TAG_FRAME => Ok(Self::Frame(decode_frame(body)?)),
            TAG_END_OF_STREAM => {
                Ok(Self::EndOfStream { uncaught: (!body.is_empty()).then(text) })
            }
            TAG_ABORTED => Ok(Self::Aborted { reason: text() }),
            other => Err(ChannelError::Malformed(format!("unknown report tag {other}"))),
        }
    }
}

fn check_size(size: usize) -> Result<(), ChannelError> {
    if size > MAX_MESSAGE_SIZE {
        return Err(ChannelError::MessageTooLarge { size, limit: MAX_MESSAGE_SIZE });
    }
    Ok(())
}

/// Write one framed message
pub fn write_message<W: Write>(writer: &mut W, payload: &[u8]) -> Result<(), ChannelError> {
    check_size(payload.len())?;
    writer.write_all(&(payload.len() as u32).to_be_bytes())?;
    writer.write_all(payload)?;
    writer.flush()?;
    Ok(())
}

/// Read one framed message; `None` when the peer closed the channel between messages
pub fn read_message<R: Read>(reader: &mut R) -> Result<Option<Vec<u8>>, ChannelError> {
    let mut header = [0u8; 4];
    let mut filled = 0;
    while filled < header.len() {
        match reader.read(&mut header[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into()),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }

    let size = u32::from_be_bytes(header) as usize;
    check_size(size)?;
    let mut payload = vec![0u8; size];
    reader.read_exact(&mut payload)?;
    Ok(Some(payload))
}

/// Async variant of [`write_message`]
pub async fn write_message_async<W: AsyncWrite + Unpin>(
    writer: &mut W,
    payload: &[u8],
) -> Result<(), ChannelError> {
    check_size(payload.len())?;
    writer.write_all(&(payload.len() as u32).to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Async variant of [`read_message`]
pub async fn read_message_async<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<Option<Vec<u8>>, ChannelError> {
    let mut header = [0u8; 4];
    let mut filled = 0;
    while filled < header.len() {
        match reader.read(&mut header[filled..]).await? {
            0 if filled == 0 => return Ok(None),
            0 => return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into()),
            n => filled += n,
        }
    }

    let size = u32::from_be_bytes(header) as usize;
    check_size(size)?;
    let mut payload = vec![0u8; size];
    reader.read_exact(&mut payload).await?;
    Ok(Some(payload))
}

/// Player side of the channel
#[derive(Debug)]
pub struct ControlServer<R, W> {
    reader: R,
    writer: W,
    pending: Option<StepRequest>,
}

impl<R: Read, W: Write> ControlServer<R, W> {
    /// Wrap a transport
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer, pending: None }
    }

    /// Block until the next step request; `None` once the client has closed the channel
    pub fn recv_request(&mut self) -> Result<Option<StepRequest>, ChannelError> {
        if self.pending.is_some() {
            return Err(ChannelError::OutOfTurn("previous request has not been answered"));
        }
        let Some(payload) = read_message(&mut self.reader)? else {
            debug!("control channel closed by client");
            return Ok(None);
        };
        let request = StepRequest::decode(&payload)?;
        trace!(granularity = %request.granularity, "received step request");
        self.pending = Some(request);
        Ok(Some(request))
    }

    /// Answer the pending request.
    ///
    /// A report that cannot be encoded or exceeds the size limit leaves the request
    /// pending so it can still be answered with an abort.
    pub fn send_report(&mut self, report: &FrameReport) -> Result<(), ChannelError> {
        if self.pending.is_none() {
            return Err(ChannelError::OutOfTurn("no request to answer"));
        }
        let payload = report.encode()?;
        check_size(payload.len())?;
        self.pending = None;
        write_message(&mut self.writer, &payload)
    }
}

/// Front-end side of the channel
#[derive(Debug)]
pub struct ControlClient<R, W> {
    reader: R,
    writer: W,
    terminated: bool,
}

impl<R: Read, W: Write> ControlClient<R, W> {
    /// Wrap a transport
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer, terminated: false }
    }

    /// Whether the player reported the end of the stream
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Send one step request and block for its report
    pub fn step(&mut self, granularity: StepCommand) -> Result<FrameReport, ChannelError> {
        if self.terminated {
            return Err(ChannelError::Terminated);
        }
        write_message(&mut self.writer, &StepRequest::new(granularity).encode())?;
        let payload = read_message(&mut self.reader)?.ok_or(ChannelError::Closed)?;
        let report = FrameReport::decode(&payload)?;
        self.terminated = report.is_final();
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CodeDescriptor, LineRange};
    use std::{io::Cursor, sync::Arc};

    fn frame(local_value: &str) -> FrameSnapshot {
        FrameSnapshot {
            line: Some(3),
            instruction_offset: 8,
            locals: [("x".to_string(), local_value.to_string())].into_iter().collect(),
            globals: Default::default(),
            code: Arc::new(CodeDescriptor {
                filename: "/work/prog.pyl".into(),
                name: "<module>".into(),
                instructions: vec![9, 0],
                constants: vec![],
                names: vec![],
                local_names: vec![],
                line_table: vec![LineRange { start: 0, end: 2, line: Some(3) }],
            }),
        }
    }

    #[test]
    fn test_framing_round_trip() {
        let mut buf = Vec::new();
        write_message(&mut buf, b"line").unwrap();
        write_message(&mut buf, b"").unwrap();
        assert_eq!(&buf[..4], &[0, 0, 0, 4]);

        let mut reader = Cursor::new(buf);
        assert_eq!(read_message(&mut reader).unwrap().as_deref(), Some(&b"line"[..]));
        assert_eq!(read_message(&mut reader).unwrap().as_deref(), Some(&b""[..]));
        assert!(read_message(&mut reader).unwrap().is_none());
    }

    #[test]
    fn test_truncated_message_is_an_error() {
        let mut reader = Cursor::new(vec![0, 0, 0, 9, b'x']);
        assert!(matches!(read_message(&mut reader), Err(ChannelError::Io(_))));

        let mut reader = Cursor::new(vec![0, 0]);
        assert!(matches!(read_message(&mut reader), Err(ChannelError::Io(_))));
    }

    #[test]
    fn test_size_limit() {
        let big = vec![0u8; MAX_MESSAGE_SIZE + 1];
        let mut sink = Vec::new();
        assert!(matches!(
            write_message(&mut sink, &big),
            Err(ChannelError::MessageTooLarge { size, .. }) if size == MAX_MESSAGE_SIZE + 1
        ));
        assert!(sink.is_empty());

        let mut reader = Cursor::new(((MAX_MESSAGE_SIZE + 1) as u32).to_be_bytes().to_vec());
        assert!(matches!(read_message(&mut reader), Err(ChannelError::MessageTooLarge { .. })));
    }

    #[test]
    fn test_report_payloads() {
        let reports = [
            FrameReport::Frame(frame("1")),
            FrameReport::EndOfStream { uncaught: None },
            FrameReport::EndOfStream { uncaught: Some("line 2: NameError".into()) },
            FrameReport::Aborted { reason: "record log underrun".into() },
        ];
        for report in reports {
            let decoded = FrameReport::decode(&report.encode().unwrap()).unwrap();
            assert_eq!(decoded, report);
        }
        assert!(FrameReport::decode(&[]).is_err());
        assert!(FrameReport::decode(&[7]).is_err());
    }

    #[test]
    fn test_step_request_tokens() {
        assert_eq!(StepRequest::new(StepCommand::Line).encode(), b"line");
        assert_eq!(
            StepRequest::decode(b"opcode").unwrap().granularity,
            StepCommand::Opcode
        );
        assert!(matches!(StepRequest::decode(b"jump"), Err(ChannelError::UnknownCommand(_))));
    }

    #[test]
    fn test_server_enforces_alternation() {
        let mut input = Vec::new();
        write_message(&mut input, b"line").unwrap();
        write_message(&mut input, b"line").unwrap();
        let mut server = ControlServer::new(Cursor::new(input), Vec::new());

        assert!(server.send_report(&FrameReport::EndOfStream { uncaught: None }).is_err());
        assert!(server.recv_request().unwrap().is_some());
        assert!(matches!(server.recv_request(), Err(ChannelError::OutOfTurn(_))));
        server.send_report(&FrameReport::Frame(frame("1"))).unwrap();
        assert!(server.recv_request().unwrap().is_some());
        server.send_report(&FrameReport::EndOfStream { uncaught: None }).unwrap();
        assert!(server.recv_request().unwrap().is_none());
    }

    #[test]
    fn test_client_stops_after_end_of_stream() {
        let mut responses = Vec::new();
        write_message(&mut responses, &FrameReport::Frame(frame("1")).encode().unwrap()).unwrap();
        write_message(
            &mut responses,
            &FrameReport::EndOfStream { uncaught: None }.encode().unwrap(),
        )
        .unwrap();

        let mut client = ControlClient::new(Cursor::new(responses), Vec::new());
        assert!(client.step(StepCommand::Line).unwrap().frame().is_some());
        assert!(client.step(StepCommand::Line).unwrap().is_final());
        assert!(client.is_terminated());
        assert!(matches!(client.step(StepCommand::Line), Err(ChannelError::Terminated)));
    }

    #[test]
    fn test_client_reports_closed_channel() {
        let mut client = ControlClient::new(Cursor::new(Vec::new()), Vec::new());
        assert!(matches!(client.step(StepCommand::Opcode), Err(ChannelError::Closed)));
    }

    #[tokio::test]
    async fn test_async_framing_matches_blocking() {
        let mut buf = Vec::new();
        write_message_async(&mut buf, b"opcode").await.unwrap();

        let mut blocking = Cursor::new(buf.clone());
        assert_eq!(read_message(&mut blocking).unwrap().as_deref(), Some(&b"opcode"[..]));

        let mut reader = &buf[..];
        assert_eq!(read_message_async(&mut reader).await.unwrap().as_deref(), Some(&b"opcode"[..]));
        assert!(read_message_async(&mut reader).await.unwrap().is_none());
    }
}
