use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{lookup_host, TcpStream};
use tokio::time::timeout;

use shared_crawler_api::config::CrawlConfig;

const READ_BUFFER_SIZE: usize = 1024;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("could not resolve {host}")]
    Resolution {
        host: String,
        #[source]
        source: Option<io::Error>,
    },
    #[error("could not connect to {host}: {source}")]
    Socket {
        host: String,
        #[source]
        source: io::Error,
    },
    #[error("could not send request to {host}: {source}")]
    Send {
        host: String,
        #[source]
        source: io::Error,
    },
    #[error("{host} timed out while {stage}")]
    Timeout { host: String, stage: &'static str },
}

/// Raw response of one page request
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Status line, headers and body exactly as received
    pub body: Vec<u8>,
    /// From connect until the first byte arrived
    pub response_time: Duration,
}

/// Fetches one page of a host. The crawler only talks to the network through
/// this trait.
pub trait WebVisitor {
    fn fetch_page(
        &self,
        host: &str,
        path: &str,
    ) -> impl Future<Output = Result<FetchedPage, TransportError>> + Send;
}

/// Plain HTTP/1.1 over a fresh TCP connection per page.
/// No TLS, no redirects, no keep-alive.
#[derive(Debug, Clone)]
pub struct RawHttpVisitor {
    port: u16,
    connect_timeout: Option<Duration>,
    read_timeout: Option<Duration>,
}

impl RawHttpVisitor {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            connect_timeout: None,
            read_timeout: None,
        }
    }

    pub fn from_config(config: &CrawlConfig) -> Self {
        Self::new(config.port)
            .with_connect_timeout(config.connect_timeout())
            .with_read_timeout(config.read_timeout())
    }

    pub fn with_connect_timeout(mut self, limit: Option<Duration>) -> Self {
        self.connect_timeout = limit;
        self
    }

    pub fn with_read_timeout(mut self, limit: Option<Duration>) -> Self {
        self.read_timeout = limit;
        self
    }
}

impl WebVisitor for RawHttpVisitor {
    async fn fetch_page(&self, host: &str, path: &str) -> Result<FetchedPage, TransportError> {
        let started = Instant::now();
        let mut connection =
            HttpConnection::connect(host, self.port, self.connect_timeout).await?;

        if let Err(e) = connection.send_request(host, path).await {
            connection.close().await;
            return Err(e);
        }

        let received = connection.receive_all(self.read_timeout).await;
        // payload is already captured, a failing close does not matter
        connection.close().await;

        let (body, first_byte) = received?;
        Ok(FetchedPage {
            body,
            response_time: first_byte.saturating_duration_since(started),
        })
    }
}

/// Build the request line and headers for a single GET
pub fn create_http_request(host: &str, path: &str) -> String {
    format!("GET {path} HTTP/1.1\r\nHOST:{host}\r\nConnection: close\r\n\r\n")
}

/// An open connection to one host. Only exists once connected; `close`
/// consumes it.
pub struct HttpConnection {
    host: String,
    stream: TcpStream,
}

impl HttpConnection {
    /// Resolve `host` and connect to the first address that accepts.
    pub async fn connect(
        host: &str,
        port: u16,
        connect_timeout: Option<Duration>,
    ) -> Result<Self, TransportError> {
        let addrs: Vec<SocketAddr> = lookup_host((host, port))
            .await
            .map_err(|e| TransportError::Resolution {
                host: host.to_string(),
                source: Some(e),
            })?
            .collect();

        let stream = connect_any(host, &addrs, connect_timeout, TcpStream::connect).await?;

        Ok(Self {
            host: host.to_string(),
            stream,
        })
    }

    pub async fn send_request(&mut self, host: &str, path: &str) -> Result<(), TransportError> {
        let request = create_http_request(host, path);
        self.stream
            .write_all(request.as_bytes())
            .await
            .map_err(|source| TransportError::Send {
                host: self.host.clone(),
                source,
            })
    }

    /// Read until the peer closes the connection.
    ///
    /// Returns everything read together with the instant the first byte
    /// arrived (or the close was seen, for an empty response).
    pub async fn receive_all(
        &mut self,
        read_timeout: Option<Duration>,
    ) -> Result<(Vec<u8>, Instant), TransportError> {
        let mut response = Vec::new();
        let mut first_byte = None;
        let mut buf = [0u8; READ_BUFFER_SIZE];

        loop {
            match with_timeout(read_timeout, self.stream.read(&mut buf)).await {
                Some(Ok(0)) => break,
                Some(Ok(n)) => {
                    first_byte.get_or_insert_with(Instant::now);
                    response.extend_from_slice(&buf[..n]);
                }
                Some(Err(e)) => {
                    tracing::debug!("read from {} ended with error: {}", self.host, e);
                    break;
                }
                None if response.is_empty() => {
                    return Err(TransportError::Timeout {
                        host: self.host.clone(),
                        stage: "waiting for a response",
                    });
                }
                None => {
                    tracing::debug!(
                        "read from {} stalled after {} bytes, keeping what arrived",
                        self.host,
                        response.len()
                    );
                    break;
                }
            }
        }

        Ok((response, first_byte.unwrap_or_else(Instant::now)))
    }

    pub async fn close(mut self) {
        if let Err(e) = self.stream.shutdown().await {
            tracing::trace!("closing connection to {} failed: {}", self.host, e);
        }
    }
}

/// Try `addrs` in order, each under `connect_timeout`. The error of the last
/// attempt is returned when none of them connects.
async fn connect_any<T, F, Fut>(
    host: &str,
    addrs: &[SocketAddr],
    connect_timeout: Option<Duration>,
    mut connect: F,
) -> Result<T, TransportError>
where
    F: FnMut(SocketAddr) -> Fut,
    Fut: Future<Output = io::Result<T>>,
{
    let mut last_error = TransportError::Resolution {
        host: host.to_string(),
        source: None,
    };

    for &addr in addrs {
        match with_timeout(connect_timeout, connect(addr)).await {
            Some(Ok(stream)) => return Ok(stream),
            Some(Err(source)) => {
                tracing::debug!("connecting to {} at {} failed: {}", host, addr, source);
                last_error = TransportError::Socket {
                    host: host.to_string(),
                    source,
                };
            }
            None => {
                tracing::debug!("connecting to {} at {} timed out", host, addr);
                last_error = TransportError::Timeout {
                    host: host.to_string(),
                    stage: "connecting",
                };
            }
        }
    }

    Err(last_error)
}

/// Run `fut`, giving up after `limit` if one is set. `None` means the limit
/// elapsed.
async fn with_timeout<F: Future>(limit: Option<Duration>, fut: F) -> Option<F::Output> {
    match limit {
        Some(limit) => timeout(limit, fut).await.ok(),
        None => Some(fut.await),
    }
}
