//! The per-request I/O surface supplied by the hosting server.

use std::io;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, Stdin, Stdout};

use crate::http::{ResponseHead, StatusCode};

/// Request input and response output for one exchange.
///
/// The adapter calls the output methods in the order
/// `set_status` → `write_header`* → `write_body` → `finish`, each header once.
/// On failure it calls only `set_status` and `finish`.
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// Reads up to `len` bytes of request body. Returning fewer bytes means
    /// the input ended early.
    async fn read_body(&mut self, len: usize) -> io::Result<Bytes>;

    fn set_status(&mut self, status: StatusCode);

    fn write_header(&mut self, name: &str, value: &str);

    async fn write_body(&mut self, body: &[u8]) -> io::Result<()>;

    /// Emits anything still buffered and flushes the output.
    async fn finish(&mut self) -> io::Result<()>;
}

/// CGI transport: body on `input`, CGI response on `output`.
///
/// Status and header fields are buffered and written as one block right
/// before the first body byte, or at [`finish`](Transport::finish) when
/// there is no body.
///
/// # Examples
///
/// ```
/// use cgi_bridge::http::StatusCode;
/// use cgi_bridge::server::{CgiTransport, Transport};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> std::io::Result<()> {
/// let mut transport = CgiTransport::new(&b""[..], Vec::new());
/// transport.set_status(StatusCode::OK);
/// transport.write_header("content-type", "text/plain");
/// transport.write_body(b"hi").await?;
/// transport.finish().await?;
///
/// let output = transport.into_output();
/// assert_eq!(output, b"Status: 200 OK\r\ncontent-type: text/plain\r\n\r\nhi");
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct CgiTransport<R, W> {
    input: R,
    output: W,
    head: ResponseHead,
    head_written: bool,
}

impl CgiTransport<Stdin, Stdout> {
    /// The standard CGI wiring: request body on stdin, response on stdout.
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout())
    }
}

impl<R, W> CgiTransport<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            input,
            output,
            head: ResponseHead::default(),
            head_written: false,
        }
    }

    /// Consumes the transport, returning the output sink.
    pub fn into_output(self) -> W {
        self.output
    }
}

impl<R, W> CgiTransport<R, W>
where
    W: AsyncWrite + Unpin,
{
    async fn write_head(&mut self) -> io::Result<()> {
        if !self.head_written {
            self.output.write_all(&self.head.to_bytes()).await?;
            self.head_written = true;
        }
        Ok(())
    }
}

impl<R, W> Transport for CgiTransport<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    async fn read_body(&mut self, len: usize) -> io::Result<Bytes> {
        let mut buf = Vec::with_capacity(len);
        (&mut self.input).take(len as u64).read_to_end(&mut buf).await?;
        Ok(Bytes::from(buf))
    }

    fn set_status(&mut self, status: StatusCode) {
        self.head.set_status(status);
    }

    fn write_header(&mut self, name: &str, value: &str) {
        self.head.add_header(name, value);
    }

    async fn write_body(&mut self, body: &[u8]) -> io::Result<()> {
        self.write_head().await?;
        self.output.write_all(body).await
    }

    async fn finish(&mut self) -> io::Result<()> {
        self.write_head().await?;
        self.output.flush().await
    }
}
