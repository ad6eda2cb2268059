use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{ProtocolError, ProtocolResult};

/// Default TCP port for `sithub://` locations.
pub const DEFAULT_PORT: u16 = 9418;

/// Where a clone source lives.
///
/// Accepted forms:
/// - a bare filesystem path (`../repo`, `/srv/repo`)
/// - `file://<path>`
/// - `sithub://host[:port]` or `tcp://host[:port]`
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RemoteLocation {
    Local(PathBuf),
    Tcp { host: String, port: u16 },
}

impl RemoteLocation {
    pub fn parse(location: &str) -> ProtocolResult<Self> {
        let invalid = |reason: &str| ProtocolError::InvalidLocation {
            location: location.to_string(),
            reason: reason.to_string(),
        };
        let trimmed = location.trim();
        if trimmed.is_empty() {
            return Err(invalid("empty location"));
        }
        if let Some(path) = trimmed.strip_prefix("file://") {
            if path.is_empty() {
                return Err(invalid("missing path"));
            }
            return Ok(Self::Local(PathBuf::from(path)));
        }
        let remote = trimmed
            .strip_prefix("sithub://")
            .or_else(|| trimmed.strip_prefix("tcp://"));
        let Some(authority) = remote else {
            if trimmed.contains("://") {
                return Err(invalid("unsupported scheme"));
            }
            return Ok(Self::Local(PathBuf::from(trimmed)));
        };
        let authority = authority.trim_end_matches('/');
        if authority.contains('/') {
            return Err(invalid("a server hosts a single repository; drop the path"));
        }
        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse().map_err(|_| invalid("invalid port"))?;
                (host, port)
            }
            None => (authority, DEFAULT_PORT),
        };
        if host.is_empty() {
            return Err(invalid("missing host"));
        }
        Ok(Self::Tcp {
            host: host.to_string(),
            port,
        })
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local(_))
    }
}

impl FromStr for RemoteLocation {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for RemoteLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(path) => write!(f, "{}", path.display()),
            Self::Tcp { host, port } => write!(f, "sithub://{host}:{port}"),
        }
    }
}
