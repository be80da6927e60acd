//! Async TCP transport using Tokio.
//!
//! Accepts connections and feeds parsed HTTP/1.1 requests to a handler
//! function — in practice [`App::handle`](crate::App::handle). Each accepted
//! socket becomes a [`Connection`] on its own Tokio task, which frames
//! requests out of a growable read buffer and writes responses back until
//! the peer hangs up or asks for `Connection: close`. Timeouts, TLS, and
//! cancellation are deliberately not handled here.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::error::Error;
use crate::http::{
    Request, Response, StatusCode,
    request::RequestError,
};

/// Largest request frame (headers plus body) a connection will buffer (8 MiB).
const MAX_REQUEST_BYTES: usize = 8 * 1024 * 1024;

/// Initial per-connection read buffer capacity.
const READ_CHUNK: usize = 4096;

/// The skiff TCP server.
///
/// Binds a TCP address and dispatches incoming HTTP/1.1 requests to a
/// handler function. The handler is the only state shared between connection
/// tasks, so it must be `Send + Sync`.
///
/// # Examples
///
/// ```rust,no_run
/// use skiff::server::Server;
/// use skiff::http::{Response, StatusCode};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let server = Server::bind("127.0.0.1:8080").await?;
///     server.run(|_req| async {
///         Response::new(StatusCode::Ok).body("Hello!")
///     }).await?;
///     Ok(())
/// }
/// ```
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Server {
    /// Binds the server to the given TCP address.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Bind`] if the address cannot be bound
    /// (e.g. port already in use, insufficient permissions).
    pub async fn bind(addr: impl AsRef<str>) -> Result<Self, Error> {
        let addr = addr.as_ref();
        let listener = TcpListener::bind(addr).await.map_err(|source| Error::Bind {
            addr: addr.to_owned(),
            source,
        })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Starts accepting connections and dispatching requests to `handler`.
    ///
    /// Runs until the process is terminated or an unrecoverable listener
    /// error occurs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the TCP listener itself fails.
    pub async fn run<H, F>(self, handler: H) -> Result<(), Error>
    where
        H: Fn(Request) -> F + Send + Sync + 'static,
        F: Future<Output = Response> + Send + 'static,
    {
        let handler = Arc::new(handler);
        info!(address = %self.local_addr, "skiff listening");

        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    debug!(peer = %peer, "connection accepted");
                    let handler = Arc::clone(&handler);
                    tokio::spawn(async move {
                        let connection = Connection::new(stream, peer);
                        if let Err(e) = connection.serve(handler).await {
                            warn!(peer = %peer, error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "failed to accept connection");
                }
            }
        }
    }
}

// One accepted TCP connection: the socket, its peer, and the read buffer
// requests are framed out of.
struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    buf: BytesMut,
}

// Outcome of trying to frame a request out of the buffered bytes.
enum Frame {
    // A complete request; `usize` is the frame length to drain from the buffer.
    Ready(Request, usize),
    // Headers or declared body not fully received yet.
    Partial,
    Malformed(RequestError),
}

impl Connection {
    fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            stream,
            peer,
            buf: BytesMut::with_capacity(READ_CHUNK),
        }
    }

    /// Serves requests on this connection until the peer closes it, a
    /// request asks for `Connection: close`, or a protocol error occurs.
    ///
    /// The response's `Connection` header is forced to agree with the
    /// request's keep-alive preference before it hits the wire.
    async fn serve<H, F>(mut self, handler: Arc<H>) -> Result<(), std::io::Error>
    where
        H: Fn(Request) -> F + Send + Sync + 'static,
        F: Future<Output = Response> + Send + 'static,
    {
        loop {
            // Frame from what is already buffered first: pipelined requests
            // must be served without waiting for more bytes from the peer.
            let (request, frame_len) = match self.next_frame() {
                Frame::Ready(request, frame_len) => (request, frame_len),
                Frame::Partial => {
                    if self.buf.len() > MAX_REQUEST_BYTES {
                        warn!(peer = %self.peer, "request too large — sending 413");
                        self.reject(
                            Response::new(StatusCode::PayloadTooLarge)
                                .body("Request entity too large"),
                        )
                        .await?;
                        break;
                    }
                    if self.stream.read_buf(&mut self.buf).await? == 0 {
                        debug!(peer = %self.peer, "connection closed by peer");
                        break;
                    }
                    continue;
                }
                Frame::Malformed(e) => {
                    warn!(peer = %self.peer, error = %e, "bad request — sending 400");
                    self.reject(Response::new(StatusCode::BadRequest).body(format!("Bad Request: {e}")))
                        .await?;
                    break;
                }
            };

            let keep_alive = request.is_keep_alive();

            debug!(
                peer = %self.peer,
                method = %request.method(),
                path = %request.path(),
                "dispatching request"
            );

            let response = handler(request).await.keep_alive(keep_alive);
            self.stream.write_all(&response.into_bytes()).await?;
            self.stream.flush().await?;

            // Drop the consumed frame; pipelined bytes stay for the next turn.
            let _ = self.buf.split_to(frame_len);

            if !keep_alive {
                debug!(peer = %self.peer, "Connection: close — shutting down");
                break;
            }
        }

        Ok(())
    }

    // Tries to frame one request out of the buffer: headers must parse and
    // the declared `Content-Length` body must be fully buffered.
    fn next_frame(&self) -> Frame {
        match Request::parse(&self.buf) {
            Ok((request, body_offset)) => {
                let frame_len = body_offset + request.content_length().unwrap_or(0);
                if self.buf.len() < frame_len {
                    Frame::Partial
                } else {
                    Frame::Ready(request, frame_len)
                }
            }
            Err(RequestError::Incomplete) => Frame::Partial,
            Err(e) => Frame::Malformed(e),
        }
    }

    // Writes a protocol-level rejection; these always close the connection.
    async fn reject(&mut self, response: Response) -> Result<(), std::io::Error> {
        let bytes = response.keep_alive(false).into_bytes();
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Echoes the path and body so tests can tell responses apart.
    async fn spawn_test_server() -> SocketAddr {
        let server = Server::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr();
        tokio::spawn(async move {
            let _ = server
                .run(|req: Request| async move {
                    let body = String::from_utf8_lossy(req.body()).into_owned();
                    Response::new(StatusCode::Ok)
                        .body(format!("path={} body={}", req.path(), body))
                })
                .await;
        });
        addr
    }

    fn headers_end(buf: &[u8]) -> Option<usize> {
        buf.windows(4).position(|w| w == b"\r\n\r\n").map(|p| p + 4)
    }

    // Reads exactly one response (headers + Content-Length body) out of the
    // stream, leaving any following bytes in `acc`.
    async fn read_response(stream: &mut TcpStream, acc: &mut Vec<u8>) -> String {
        loop {
            if let Some(end) = headers_end(acc) {
                let head = std::str::from_utf8(&acc[..end]).unwrap();
                let len = head
                    .lines()
                    .find_map(|l| l.strip_prefix("Content-Length: "))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if acc.len() >= end + len {
                    let bytes: Vec<u8> = acc.drain(..end + len).collect();
                    return String::from_utf8(bytes).unwrap();
                }
            }
            let mut chunk = [0u8; 1024];
            let n = stream.read(&mut chunk).await.unwrap();
            assert!(n > 0, "connection closed mid-response");
            acc.extend_from_slice(&chunk[..n]);
        }
    }

    #[tokio::test]
    async fn serves_requests_over_tcp() {
        let addr = spawn_test_server().await;
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /hello HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();

        let mut acc = Vec::new();
        let response = read_response(&mut stream, &mut acc).await;
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response.contains("Connection: close\r\n"));
        assert!(!response.contains("Connection: keep-alive"));
        assert!(response.ends_with("path=/hello body="));

        // A close request ends the connection after the response.
        let mut rest = [0u8; 16];
        assert_eq!(stream.read(&mut rest).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn pipelined_requests_get_separate_responses() {
        let addr = spawn_test_server().await;
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(
                b"POST /a HTTP/1.1\r\nHost: x\r\nContent-Length: 5\r\n\r\nhello\
                  GET /b HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n",
            )
            .await
            .unwrap();

        let mut acc = Vec::new();
        let first = read_response(&mut stream, &mut acc).await;
        assert!(first.contains("Connection: keep-alive\r\n"));
        assert!(first.ends_with("path=/a body=hello"));

        // The second request's bytes must not bleed into the first body.
        let second = read_response(&mut stream, &mut acc).await;
        assert!(second.ends_with("path=/b body="));
    }
}
