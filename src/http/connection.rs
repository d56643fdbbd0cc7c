use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

use crate::http::parser::{find_headers_end, parse_http_request, ParseError};
use crate::http::request::Request;
use crate::http::response::{Response, StatusCode};
use crate::http::writer::ResponseWriter;
use crate::proxy::Proxy;

pub struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    proxy: Arc<Proxy>,
    max_request_bytes: usize,
    buffer: Vec<u8>,
    state: ConnectionState,
}

pub enum ConnectionState {
    Reading,
    Processing(Request),
    Writing(ResponseWriter, bool), // bool = keep_alive?
    Closed,
}

/// What a read attempt produced.
pub enum ReadOutcome {
    Request(Request),
    /// The bytes cannot become a request; answer and close.
    Rejected(Response),
    /// Client closed the connection.
    Closed,
}

impl Connection {
    pub fn new(
        stream: TcpStream,
        peer: SocketAddr,
        proxy: Arc<Proxy>,
        max_request_bytes: usize,
    ) -> Self {
        Self {
            stream,
            peer,
            proxy,
            max_request_bytes,
            buffer: Vec::with_capacity(4096),
            state: ConnectionState::Reading,
        }
    }

    pub async fn run(&mut self) -> anyhow::Result<()> {
        loop {
            let state = std::mem::replace(&mut self.state, ConnectionState::Closed);

            self.state = match state {
                ConnectionState::Reading => match self.read_request().await? {
                    ReadOutcome::Request(req) => ConnectionState::Processing(req),
                    ReadOutcome::Rejected(mut response) => {
                        response.set_header("Connection", "close");
                        ConnectionState::Writing(ResponseWriter::new(&response), false)
                    }
                    ReadOutcome::Closed => ConnectionState::Closed,
                },

                ConnectionState::Processing(req) => {
                    let keep_alive = req.keep_alive();
                    let mut response = self.handle_request(req).await;

                    // Connection management belongs to this hop, not the upstream's.
                    response.remove_header("Keep-Alive");
                    response.set_header("Connection", if keep_alive { "keep-alive" } else { "close" });

                    ConnectionState::Writing(ResponseWriter::new(&response), keep_alive)
                }

                ConnectionState::Writing(mut writer, keep_alive) => {
                    writer.write_to_stream(&mut self.stream).await?;

                    if keep_alive {
                        ConnectionState::Reading // go back for next request
                    } else {
                        ConnectionState::Closed
                    }
                }

                ConnectionState::Closed => {
                    break;
                }
            };
        }

        Ok(())
    }

    pub async fn read_request(&mut self) -> anyhow::Result<ReadOutcome> {
        loop {
            // Try parsing whatever we already have
            match parse_http_request(&self.buffer) {
                Ok((mut request, consumed)) => {
                    self.buffer.drain(..consumed);
                    request.remote_addr = Some(self.peer);
                    return Ok(ReadOutcome::Request(request));
                }

                Err(ParseError::Incomplete) => {
                    if self.exceeds_limit() {
                        tracing::warn!(peer = %self.peer, limit = self.max_request_bytes, "Request too large");
                        return Ok(ReadOutcome::Rejected(Response::text(
                            StatusCode::PAYLOAD_TOO_LARGE,
                            "Request too large\n",
                        )));
                    }
                }

                Err(e) => {
                    tracing::warn!(peer = %self.peer, error = ?e, "Malformed request");
                    return Ok(ReadOutcome::Rejected(Response::text(
                        StatusCode::BAD_REQUEST,
                        format!("Malformed request: {:?}\n", e),
                    )));
                }
            }

            // Read more data
            let mut temp = [0u8; 4096];
            let n = self.stream.read(&mut temp).await?;

            if n == 0 {
                // Client closed connection
                return Ok(ReadOutcome::Closed);
            }

            self.buffer.extend_from_slice(&temp[..n]);
        }
    }

    /// Checks the buffered request against the size limit, counting the
    /// declared body length once the head is complete.
    fn exceeds_limit(&self) -> bool {
        if self.buffer.len() > self.max_request_bytes {
            return true;
        }

        let Some(headers_end) = find_headers_end(&self.buffer) else {
            return false;
        };

        let declared = String::from_utf8_lossy(&self.buffer[..headers_end])
            .lines()
            .filter_map(|line| line.split_once(':'))
            .filter(|(name, _)| name.trim().eq_ignore_ascii_case("Content-Length"))
            .filter_map(|(_, value)| value.trim().parse::<usize>().ok())
            .last()
            .unwrap_or(0);

        headers_end.saturating_add(4).saturating_add(declared) > self.max_request_bytes
    }

    async fn handle_request(&self, req: Request) -> Response {
        match self.proxy.execute(&req).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(
                    peer = %self.peer,
                    method = %req.method,
                    target = %req.target,
                    error = %e,
                    "Relay failed"
                );
                Response::text(e.status_code(), format!("{}\n", e))
            }
        }
    }
}
