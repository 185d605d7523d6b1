use core::fmt::{self, Display};

#[derive(Debug)]
pub enum Error {
    UnsupportedInteraction,
    UnknownUser,
    UnknownCommandName,
    InvalidParams,
    Forbidden,
    /// The prompt is no longer accepting answers.
    Expired,
    NotOwner,
    InvalidChoice,
    Refused(crate::error::Error),
    Fatal,
}

impl From<crate::error::Error> for Error {
    fn from(err: crate::error::Error) -> Self {
        Self::Refused(err)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::UnsupportedInteraction => "This interaction is not supported.",
            Self::UnknownUser => "We could not tell who you are.",
            Self::UnknownCommandName => "Unknown command.",
            Self::InvalidParams => "Invalid command parameters.",
            Self::Forbidden => "Only quiz administrators may do that.",
            Self::Expired => "This prompt has already closed.",
            Self::NotOwner => "This prompt belongs to someone else.",
            Self::InvalidChoice => "That is not one of the offered options.",
            Self::Refused(err) => return err.fmt(f),
            Self::Fatal => "Oops! We encountered a logic error on our end. This is a bug.",
        })
    }
}

pub type Result<T> = core::result::Result<T, Error>;
