// src/proxy/upstream.rs
use std::fmt;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum UpstreamError {
    #[error("missing ':port' in upstream address '{0}'")]
    MissingPort(String),

    #[error("empty host in upstream address '{0}'")]
    EmptyHost(String),

    #[error("invalid port in upstream address '{0}'")]
    InvalidPort(String),
}

/// A backend address in `host:port` form.
///
/// The host is not resolved here; resolution happens at dial time so an
/// unreachable or unknown host only fails the sessions routed to it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Upstream {
    address: String,
}

impl Upstream {
    pub fn parse(address: &str) -> Result<Self, UpstreamError> {
        let (host, port) = address
            .rsplit_once(':')
            .ok_or_else(|| UpstreamError::MissingPort(address.to_string()))?;

        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(UpstreamError::EmptyHost(address.to_string()));
        }

        match port.parse::<u16>() {
            Ok(port) if port != 0 => Ok(Self {
                address: address.to_string(),
            }),
            _ => Err(UpstreamError::InvalidPort(address.to_string())),
        }
    }

    /// The address exactly as configured, suitable for `TcpStream::connect`.
    pub fn address(&self) -> &str {
        &self.address
    }
}

impl fmt::Display for Upstream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address)
    }
}
