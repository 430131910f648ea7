//! The framed message wire format.
//!
//! A message is a self-delimiting unit: a 4-byte big-endian body length, a 1-byte
//! status code, a 4-byte big-endian auth-material length, the auth-material bytes,
//! and the remaining bytes as payload. This framing is intentionally minimal — it
//! exists so the server has something concrete to read and write, not to be the
//! interesting part of this crate.

use std::io;

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// The status code carried by every framed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    Normal = 0,
    AuthRequired = 1,
    AuthSuccess = 2,
    AuthFailure = 3,
}

impl Status {
    fn from_byte(byte: u8) -> Option<Status> {
        match byte {
            0 => Some(Status::Normal),
            1 => Some(Status::AuthRequired),
            2 => Some(Status::AuthSuccess),
            3 => Some(Status::AuthFailure),
            _ => None,
        }
    }
}

/// A single framed message: a payload, a status, and optional authentication material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub status: Status,
    pub auth: Vec<u8>,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn normal(payload: impl Into<Vec<u8>>) -> Self {
        Message {
            status: Status::Normal,
            auth: Vec::new(),
            payload: payload.into(),
        }
    }

    pub fn status(status: Status, payload: impl Into<Vec<u8>>) -> Self {
        Message {
            status,
            auth: Vec::new(),
            payload: payload.into(),
        }
    }

    pub fn auth_request(auth: impl Into<Vec<u8>>) -> Self {
        Message {
            status: Status::AuthRequired,
            auth: auth.into(),
            payload: Vec::new(),
        }
    }

    /// Serialize this message to its wire representation.
    pub fn encode(&self) -> Vec<u8> {
        let body_len = 1 + 4 + self.auth.len() + self.payload.len();
        let mut out = Vec::with_capacity(4 + body_len);
        out.extend_from_slice(&(body_len as u32).to_be_bytes());
        out.push(self.status as u8);
        out.extend_from_slice(&(self.auth.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.auth);
        out.extend_from_slice(&self.payload);
        out
    }
}

/// Why a framed read failed.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("peer closed the connection")]
    Closed,
    #[error("malformed frame: {0}")]
    Malformed(&'static str),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Read exactly one framed message from `stream`, blocking until it is fully
/// available. Returns [`ReadError::Closed`] on an orderly EOF at a frame boundary,
/// which the caller treats as "peer closed," not as a failure to log loudly.
pub async fn read_message<S: tokio::io::AsyncRead + Unpin>(
    stream: &mut S,
) -> Result<Message, ReadError> {
    let mut len_buf = [0u8; 4];
    if read_exact_or_eof(stream, &mut len_buf).await? {
        return Err(ReadError::Closed);
    }
    let body_len = u32::from_be_bytes(len_buf) as usize;
    if body_len < 5 {
        return Err(ReadError::Malformed("body shorter than status+auth-length header"));
    }
    if body_len > crate::defaults::max_message_length() {
        return Err(ReadError::Malformed("body exceeds the maximum message length"));
    }

    let mut body = vec![0u8; body_len];
    stream.read_exact(&mut body).await?;

    let status = Status::from_byte(body[0])
        .ok_or(ReadError::Malformed("unrecognized status byte"))?;
    let auth_len = u32::from_be_bytes([body[1], body[2], body[3], body[4]]) as usize;
    if 5 + auth_len > body.len() {
        return Err(ReadError::Malformed("auth-material length exceeds body"));
    }
    let auth = body[5..5 + auth_len].to_vec();
    let payload = body[5 + auth_len..].to_vec();

    Ok(Message {
        status,
        auth,
        payload,
    })
}

/// Read into `buf`, returning `Ok(true)` if the stream was already at EOF (no bytes
/// read at all) and `Ok(false)` if `buf` was filled. An EOF partway through is a
/// genuine I/O error, not an orderly close.
async fn read_exact_or_eof<S: tokio::io::AsyncRead + Unpin>(
    stream: &mut S,
    buf: &mut [u8],
) -> Result<bool, io::Error> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = stream.read(&mut buf[filled..]).await?;
        if n == 0 {
            return if filled == 0 {
                Ok(true)
            } else {
                Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed mid-frame",
                ))
            };
        }
        filled += n;
    }
    Ok(false)
}

/// Write one framed message to `stream` and flush it.
pub async fn write_message<S: tokio::io::AsyncWrite + Unpin>(
    stream: &mut S,
    message: &Message,
) -> Result<(), io::Error> {
    stream.write_all(&message.encode()).await?;
    stream.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn round_trips_a_normal_message() {
        let message = Message::normal(vec![0x01, 0x02, 0x03]);
        let bytes = message.encode();
        let mut cursor = Cursor::new(bytes);
        let decoded = read_message(&mut cursor).await.unwrap();
        assert_eq!(decoded, message);
    }

    #[tokio::test]
    async fn round_trips_auth_material() {
        let message = Message::auth_request(b"s3cr3t".to_vec());
        let bytes = message.encode();
        let mut cursor = Cursor::new(bytes);
        let decoded = read_message(&mut cursor).await.unwrap();
        assert_eq!(decoded.auth, b"s3cr3t");
        assert_eq!(decoded.status, Status::AuthRequired);
    }

    #[tokio::test]
    async fn empty_stream_is_an_orderly_close() {
        let mut cursor = Cursor::new(Vec::<u8>::new());
        let err = read_message(&mut cursor).await.unwrap_err();
        assert!(matches!(err, ReadError::Closed));
    }

    #[tokio::test]
    async fn truncated_frame_is_an_error() {
        let message = Message::normal(vec![0xAA; 16]);
        let mut bytes = message.encode();
        bytes.truncate(bytes.len() - 4);
        let mut cursor = Cursor::new(bytes);
        let err = read_message(&mut cursor).await.unwrap_err();
        assert!(matches!(err, ReadError::Io(_)));
    }

    #[tokio::test]
    async fn oversized_length_prefix_is_rejected_before_allocating() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&u32::MAX.to_be_bytes());
        let mut cursor = Cursor::new(bytes);
        let err = read_message(&mut cursor).await.unwrap_err();
        assert!(matches!(err, ReadError::Malformed(_)));
    }
}
