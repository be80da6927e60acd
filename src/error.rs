//! Framework error taxonomy.
//!
//! Every handler and middleware returns `Result<Response, Error>`. Any `Err`
//! aborts the chain and is delivered to the application's error handler
//! exactly once; the handler's response replaces whatever was in flight.

use std::path::PathBuf;

use thiserror::Error;

use crate::http::StatusCode;

/// Errors that can surface from routing, body parsing, or handlers.
#[derive(Debug, Error)]
pub enum Error {
    /// No registered route matched the request method and path.
    #[error("Cannot find route")]
    RouteNotFound,

    /// The request carried a `Content-Type` the body parser does not handle.
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),

    /// The request body did not decode under its declared content type.
    #[error("decode error: {0}")]
    Decode(String),

    /// A file requested for download does not exist.
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Filesystem or transport failure while producing a response.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The TCP listener could not bind its address.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Generic handler failure. `Display` is the bare message so error
    /// handlers can embed it directly in the response body.
    #[error("{0}")]
    Handler(String),
}

impl Error {
    /// Wraps an arbitrary message as a handler error.
    ///
    /// # Examples
    ///
    /// ```
    /// use skiff::Error;
    ///
    /// let err = Error::msg("Ups");
    /// assert_eq!(err.to_string(), "Ups");
    /// ```
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Handler(message.into())
    }

    /// The status code the default error handler responds with.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::RouteNotFound | Self::FileNotFound(_) => StatusCode::NotFound,
            Self::UnsupportedMediaType(_) => StatusCode::UnsupportedMediaType,
            Self::Decode(_) => StatusCode::BadRequest,
            Self::Io(_) | Self::Bind { .. } | Self::Handler(_) => {
                StatusCode::InternalServerError
            }
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

impl From<multer::Error> for Error {
    fn from(err: multer::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(Error::RouteNotFound.status(), StatusCode::NotFound);
        assert_eq!(
            Error::UnsupportedMediaType("text/plain".into()).status(),
            StatusCode::UnsupportedMediaType
        );
        assert_eq!(Error::Decode("bad".into()).status(), StatusCode::BadRequest);
        assert_eq!(
            Error::FileNotFound("x.txt".into()).status(),
            StatusCode::NotFound
        );
        assert_eq!(Error::msg("Ups").status(), StatusCode::InternalServerError);
    }

    #[test]
    fn handler_message_is_bare() {
        assert_eq!(Error::msg("Ups").to_string(), "Ups");
    }

    #[test]
    fn json_errors_become_decode() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(matches!(Error::from(err), Error::Decode(_)));
    }
}
