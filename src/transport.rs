//! TCP Transport Layer
//!
//! Thin wrapper around a tokio `TcpStream` with a builder that applies the
//! connection timeout and socket options. TLS is accepted as configuration
//! but its negotiation is not performed here; a TLS-enabled connect reports
//! `NotImplemented`.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::connection::TlsOptions;
use crate::error::{AmqpError, AmqpResult};

/// An established transport.
#[derive(Debug)]
pub struct Transport {
    stream: TcpStream,
}

impl Transport {
    pub fn new(stream: TcpStream) -> Self {
        Transport { stream }
    }

    /// Write a fully serialized frame (or the protocol header).
    pub async fn send(&mut self, data: &[u8]) -> AmqpResult<()> {
        self.stream
            .write_all(data)
            .await
            .map_err(|e| AmqpError::transport(format!("failed to write: {}", e)))?;
        self.stream
            .flush()
            .await
            .map_err(|e| AmqpError::transport(format!("failed to flush: {}", e)))?;
        Ok(())
    }

    /// Read whatever bytes are available; 0 means the peer ended the stream.
    pub async fn recv(&mut self, buf: &mut [u8]) -> AmqpResult<usize> {
        self.stream
            .read(buf)
            .await
            .map_err(|e| AmqpError::transport(format!("failed to read: {}", e)))
    }

    pub async fn shutdown(&mut self) -> AmqpResult<()> {
        self.stream
            .shutdown()
            .await
            .map_err(|e| AmqpError::transport(format!("failed to shutdown: {}", e)))?;
        Ok(())
    }
}

/// Dial configuration.
#[derive(Debug, Clone)]
pub struct TransportBuilder {
    host: String,
    port: u16,
    timeout: std::time::Duration,
    no_delay: bool,
    tls: TlsOptions,
}

impl TransportBuilder {
    pub fn new() -> Self {
        TransportBuilder {
            host: "localhost".to_string(),
            port: 5672,
            timeout: std::time::Duration::from_millis(10_000),
            no_delay: true,
            tls: TlsOptions::default(),
        }
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Deadline for the initial TCP connect.
    pub fn timeout(mut self, timeout: std::time::Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Disable Nagle's algorithm on the socket.
    pub fn no_delay(mut self, no_delay: bool) -> Self {
        self.no_delay = no_delay;
        self
    }

    pub fn tls(mut self, tls: TlsOptions) -> Self {
        self.tls = tls;
        self
    }

    /// Connect and build the transport.
    pub async fn connect(self) -> AmqpResult<Transport> {
        if self.tls.enabled {
            return Err(AmqpError::not_implemented("TLS transport"));
        }
        let addr = format!("{}:{}", self.host, self.port);
        let stream = tokio::time::timeout(self.timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| AmqpError::timeout(format!("connect to {} timed out", addr)))?
            .map_err(|e| AmqpError::transport(format!("failed to connect to {}: {}", addr, e)))?;
        stream
            .set_nodelay(self.no_delay)
            .map_err(|e| AmqpError::transport(format!("failed to set nodelay: {}", e)))?;
        Ok(Transport::new(stream))
    }
}

impl Default for TransportBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let builder = TransportBuilder::new();
        assert_eq!(builder.host, "localhost");
        assert_eq!(builder.port, 5672);
        assert!(builder.no_delay);
        assert!(!builder.tls.enabled);
    }

    #[test]
    fn test_builder_fluent_api() {
        let builder = TransportBuilder::new()
            .host("broker.internal")
            .port(5673)
            .timeout(std::time::Duration::from_secs(3))
            .no_delay(false);
        assert_eq!(builder.host, "broker.internal");
        assert_eq!(builder.port, 5673);
        assert_eq!(builder.timeout, std::time::Duration::from_secs(3));
        assert!(!builder.no_delay);
    }

    #[tokio::test]
    async fn test_tls_connect_is_not_implemented() {
        let result = TransportBuilder::new()
            .tls(TlsOptions { enabled: true, ..Default::default() })
            .connect()
            .await;
        assert!(matches!(result, Err(AmqpError::NotImplemented(_))));
    }

    #[tokio::test]
    async fn test_connect_timeout() {
        // non-routable address per RFC 5737
        let result = TransportBuilder::new()
            .host("192.0.2.1")
            .port(5672)
            .timeout(std::time::Duration::from_millis(100))
            .connect()
            .await;
        let error = result.unwrap_err();
        assert!(
            matches!(error, AmqpError::Timeout(_)) || matches!(error, AmqpError::Transport(_))
        );
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let result = TransportBuilder::new()
            .host("127.0.0.1")
            .port(1)
            .timeout(std::time::Duration::from_secs(1))
            .connect()
            .await;
        assert!(matches!(result, Err(AmqpError::Transport(_))));
    }
}
