use std::{error, fmt, io};

/// Everything that can go wrong while reading or writing region data.
#[derive(Debug)]
pub enum Error {
    /// The bytes on disk do not describe a chunk this crate understands: unknown compression,
    /// a malformed tag tree, or a palette index that points past the palette.
    Format(String),
    /// A coordinate or on-disk offset outside the range the format can address.
    Bounds(String),
    /// Opening, reading, writing or seeking the region file failed.
    Io(io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn is_format(&self) -> bool {
        matches!(self, Error::Format(_))
    }

    pub fn is_bounds(&self) -> bool {
        matches!(self, Error::Bounds(_))
    }

    /// Prefixes the message of a format error with some context, other errors pass through.
    pub(crate) fn context(self, what: &str) -> Error {
        match self {
            Error::Format(msg) => Error::Format(format!("{}: {}", what, msg)),
            other => other,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Format(msg) => write!(f, "Format error: {}", msg),
            Error::Bounds(msg) => write!(f, "Out of bounds: {}", msg),
            Error::Io(err) => write!(f, "IO error: {}", err),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

/// Tag trees are only ever parsed from in-memory buffers, so any failure in there, even an
/// early end of input, means the payload itself is broken.
impl From<nbt::Error> for Error {
    fn from(err: nbt::Error) -> Self {
        Error::Format(err.to_string())
    }
}
