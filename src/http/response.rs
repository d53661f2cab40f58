//! CGI response head.
//!
//! A CGI program answers on stdout with a header block followed by a blank
//! line and the body (RFC 3875 §6). The status travels in a `Status` header
//! field rather than an HTTP status line.

use bytes::{BufMut, BytesMut};

use super::{Headers, StatusCode};

/// The status and header fields of a CGI response, serialized ahead of the body.
///
/// # Examples
///
/// ```
/// use cgi_bridge::http::{ResponseHead, StatusCode};
///
/// let head = ResponseHead::new(StatusCode::OK).header("content-type", "application/json");
///
/// let bytes = head.to_bytes();
/// let text = std::str::from_utf8(&bytes).unwrap();
/// assert_eq!(text, "Status: 200 OK\r\ncontent-type: application/json\r\n\r\n");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    status: StatusCode,
    headers: Headers,
}

impl ResponseHead {
    /// Creates a head with the given status and no header fields.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
        }
    }

    /// Appends a header field. Multiple calls with the same name are additive.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Appends a header field in place.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name, value);
    }

    /// Replaces the status.
    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    /// Returns the status of this response.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the header fields in the order they will be written.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Serializes the head, including the terminating blank line.
    ///
    /// The `Status` field always comes first; the remaining fields follow in
    /// insertion order and are written verbatim.
    pub fn to_bytes(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(32 + self.headers.len() * 64);

        buf.put(format!("Status: {}\r\n{}\r\n", self.status, self.headers).as_bytes());
        buf
    }
}

impl Default for ResponseHead {
    fn default() -> Self {
        Self::new(StatusCode::OK)
    }
}
