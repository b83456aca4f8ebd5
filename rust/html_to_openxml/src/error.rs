use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("xml error in {part}: {message}")]
    Xml { part: String, message: String },

    #[error("invalid package: {0}")]
    InvalidPackage(String),

    #[error("fetch of {uri} failed: {reason}")]
    Fetch { uri: String, reason: String },

    #[error("unsupported image format for {0}")]
    UnsupportedImage(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn xml(part: &str, err: impl std::fmt::Display) -> Self {
        Error::Xml {
            part: part.to_string(),
            message: err.to_string(),
        }
    }

    pub(crate) fn fetch(uri: &str, reason: impl std::fmt::Display) -> Self {
        Error::Fetch {
            uri: uri.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
