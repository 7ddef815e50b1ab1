use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

use crate::http::parser::{ParseError, parse_http_request};
use crate::http::request::{Method, Request};
use crate::http::response::{Response, StatusCode};
use crate::http::writer::ResponseWriter;
use crate::server::gateway::Gateway;

/// Upper bound on buffered, not yet parsed request bytes.
const MAX_REQUEST_BYTES: usize = 16 * 1024 * 1024;

pub struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    gateway: Arc<Gateway>,
    buffer: Vec<u8>,
    state: ConnectionState,
}

pub enum ConnectionState {
    Reading,
    Processing(Request),
    Writing(ResponseWriter, bool), // bool = keep_alive?
    Closed,
}

impl Connection {
    pub fn new(stream: TcpStream, peer: SocketAddr, gateway: Arc<Gateway>) -> Self {
        Self {
            stream,
            peer,
            gateway,
            buffer: Vec::with_capacity(4096),
            state: ConnectionState::Reading,
        }
    }

    pub async fn run(&mut self) -> anyhow::Result<()> {
        loop {
            match &mut self.state {
                ConnectionState::Reading => match self.read_request().await {
                    Ok(Some(req)) => {
                        self.state = ConnectionState::Processing(req);
                    }
                    Ok(None) => {
                        self.state = ConnectionState::Closed;
                    }
                    Err(e) => {
                        tracing::debug!(peer = %self.peer, error = %e, "Rejecting malformed request");
                        let response = Response::error(StatusCode::BadRequest);
                        self.state =
                            ConnectionState::Writing(ResponseWriter::new(&response, true), false);
                    }
                },

                ConnectionState::Processing(req) => {
                    let response = self.gateway.handle(req, self.peer).await;
                    let keep_alive = req.keep_alive();
                    let include_body = req.method != Method::HEAD;

                    let writer = ResponseWriter::new(&response, include_body);
                    self.state = ConnectionState::Writing(writer, keep_alive);
                }

                ConnectionState::Writing(writer, keep_alive) => {
                    writer.write_to_stream(&mut self.stream).await?;

                    if *keep_alive {
                        self.state = ConnectionState::Reading; // go back for next request
                    } else {
                        self.state = ConnectionState::Closed;
                    }
                }

                ConnectionState::Closed => {
                    break;
                }
            }
        }

        Ok(())
    }

    pub async fn read_request(&mut self) -> anyhow::Result<Option<Request>> {
        loop {
            // Try parsing whatever we already have
            match parse_http_request(&self.buffer) {
                Ok((request, consumed)) => {
                    self.buffer.drain(..consumed);
                    return Ok(Some(request));
                }

                Err(ParseError::Incomplete) => {
                    // Need more data → fall through to read
                }

                Err(e) => {
                    return Err(anyhow::anyhow!("HTTP parse error: {:?}", e));
                }
            }

            if self.buffer.len() > MAX_REQUEST_BYTES {
                anyhow::bail!("request too large");
            }

            let mut temp = [0u8; 4096];
            let n = self.stream.read(&mut temp).await?;

            if n == 0 {
                // Client closed connection
                return Ok(None);
            }

            self.buffer.extend_from_slice(&temp[..n]);
        }
    }
}
