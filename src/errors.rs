use std::string::FromUtf8Error;

/// Errors surfaced by the LAN engine.
///
/// Only startup can fail from the caller's point of view. Once the engine is
/// running, transport and protocol failures are logged and recovered from
/// internally.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Failed to serialize data to JSON.
    #[error("failed to dump json: {0:?}")]
    JsonDump(serde_json::Error),

    /// Failed to deserialize JSON data.
    #[error("failed to load json: {0:?}")]
    JsonLoad(serde_json::Error),

    /// A network socket operation failed.
    #[error("socket {action} error: {err:?}")]
    Socket { action: String, err: std::io::Error },

    /// A datagram contained invalid UTF-8.
    #[error("utf8 decoding error: {0:?}")]
    Utf8Decode(FromUtf8Error),

    /// The host network interfaces could not be listed.
    #[error("failed to enumerate network interfaces: {0:?}")]
    Interfaces(std::io::Error),

    /// No non-loopback IPv4 interface is available to identify this process.
    #[error("no usable non-loopback IPv4 network interface")]
    NoInterface,
}

impl Error {
    /// Create a new socket error
    pub fn socket(action: &str, err: std::io::Error) -> Self {
        Error::Socket {
            action: action.to_string(),
            err,
        }
    }
}

/// Hacky implementation of PartialEq for testing
#[cfg(test)]
impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}
