//! Wire encoding of the telldusd socket protocol.
//!
//! Messages are a flat sequence of tokens with no framing beyond the
//! tokens themselves: strings are encoded as `<byte-length>:<bytes>`,
//! integers as `i<value>s`. A request starts with a string naming the
//! daemon function, followed by its arguments; responses and events use
//! the same token stream.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("unexpected byte {0:#04x} in token stream")]
    UnexpectedByte(u8),
    #[error("invalid integer in token stream")]
    InvalidInt,
    #[error("invalid string length prefix")]
    InvalidLength,
    #[error("string argument is not valid utf-8")]
    NonUtf8,
    #[error("expected {expected} token, found {found} token")]
    WrongType {
        expected: &'static str,
        found: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Int(i64),
    Str(String),
}

impl Token {
    fn kind(&self) -> &'static str {
        match self {
            Token::Int(_) => "integer",
            Token::Str(_) => "string",
        }
    }
}

/// Outgoing message builder.
#[derive(Debug, Clone)]
pub struct Message {
    bytes: Vec<u8>,
}

impl Message {
    pub fn new(function: &str) -> Self {
        let mut message = Message { bytes: Vec::new() };
        message.push_str(function);
        message
    }

    pub fn arg_str(mut self, value: &str) -> Self {
        self.push_str(value);
        self
    }

    pub fn arg_int(mut self, value: i64) -> Self {
        self.bytes.extend_from_slice(format!("i{value}s").as_bytes());
        self
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn push_str(&mut self, value: &str) {
        self.bytes
            .extend_from_slice(format!("{}:{}", value.len(), value).as_bytes());
    }
}

/// Non-consuming reader over a received byte buffer.
///
/// Token reads return `Ok(None)` when the buffer ends mid-token, leaving
/// the position untouched so the caller can retry after more bytes arrive.
#[derive(Debug)]
pub struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Cursor { data, pos: 0 }
    }

    /// Bytes consumed so far.
    pub fn consumed(&self) -> usize {
        self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    pub fn token(&mut self) -> Result<Option<Token>, ProtoError> {
        let rest = &self.data[self.pos..];
        let Some(&first) = rest.first() else {
            return Ok(None);
        };

        match first {
            b'i' => {
                let Some(end) = rest.iter().position(|&b| b == b's') else {
                    return Ok(None);
                };
                let digits =
                    std::str::from_utf8(&rest[1..end]).map_err(|_| ProtoError::InvalidInt)?;
                let value: i64 = digits.parse().map_err(|_| ProtoError::InvalidInt)?;
                self.pos += end + 1;
                Ok(Some(Token::Int(value)))
            }
            b'0'..=b'9' => {
                let Some(colon) = rest.iter().position(|&b| b == b':') else {
                    return Ok(None);
                };
                let digits =
                    std::str::from_utf8(&rest[..colon]).map_err(|_| ProtoError::InvalidLength)?;
                let len: usize = digits.parse().map_err(|_| ProtoError::InvalidLength)?;
                let start = colon + 1;
                if rest.len() < start + len {
                    return Ok(None);
                }
                let value = std::str::from_utf8(&rest[start..start + len])
                    .map_err(|_| ProtoError::NonUtf8)?
                    .to_owned();
                self.pos += start + len;
                Ok(Some(Token::Str(value)))
            }
            other => Err(ProtoError::UnexpectedByte(other)),
        }
    }

    pub fn int(&mut self) -> Result<Option<i64>, ProtoError> {
        let saved = self.pos;
        match self.token()? {
            Some(Token::Int(value)) => Ok(Some(value)),
            Some(token) => {
                self.pos = saved;
                Err(ProtoError::WrongType {
                    expected: "integer",
                    found: token.kind(),
                })
            }
            None => Ok(None),
        }
    }

    pub fn string(&mut self) -> Result<Option<String>, ProtoError> {
        let saved = self.pos;
        match self.token()? {
            Some(Token::Str(value)) => Ok(Some(value)),
            Some(token) => {
                self.pos = saved;
                Err(ProtoError::WrongType {
                    expected: "string",
                    found: token.kind(),
                })
            }
            None => Ok(None),
        }
    }
}
