/// Errors of the RPC access layer.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// The request never produced an HTTP response (connection, timeout, ...).
    #[error("transport error: {0}")]
    Transport(String),
    #[error("HTTP error {0}")]
    Http(u16),
    /// The node answered with something that is not a valid JSON-RPC response.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    /// The node answered with a JSON-RPC error envelope.
    #[error("node error {}: {}", .0.code.code(), .0.message)]
    Rpc(jsonrpc_core::Error),
    /// Every candidate endpoint failed.
    #[error("all {attempts} endpoints failed, last error: {last}")]
    Exhausted { attempts: usize, last: Box<Error> },
}

impl Error {
    /// Returns the underlying error of an [`Error::Exhausted`] error, or the
    /// error itself otherwise.
    pub fn root(&self) -> &Error {
        match self {
            Error::Exhausted { last, .. } => last.root(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_unwraps_exhausted() {
        let err = Error::Exhausted {
            attempts: 2,
            last: Box::new(Error::Http(429)),
        };
        assert!(matches!(err.root(), Error::Http(429)));
        assert_eq!(
            err.to_string(),
            "all 2 endpoints failed, last error: HTTP error 429"
        );
    }
}
