use core::fmt::{self, Display};

#[derive(Debug)]
pub enum Error {
    /// A value does not fit into its column.
    BadInput,
    /// Unrecoverable error.
    Fatal,
}

impl From<tokio_postgres::Error> for Error {
    fn from(_: tokio_postgres::Error) -> Self {
        Self::Fatal
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::BadInput => "Value out of range for storage.",
            Self::Fatal => "We encountered an unexpected database error on our end.",
        })
    }
}

pub type Result<T> = core::result::Result<T, Error>;
