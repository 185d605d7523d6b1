use core::fmt::{self, Display};

/// Reasons a session request is refused before it begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    UnknownQuiz,
    Inactive,
    AttemptsExhausted,
    /// The player is already queued for (or playing) this quiz.
    AlreadyPlaying,
    Storage,
}

impl From<db::error::Error> for Error {
    fn from(err: db::error::Error) -> Self {
        log::error!("storage failure: {err}");
        Self::Storage
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::UnknownQuiz => "Quiz not found.",
            Self::Inactive => "This quiz is not accepting new players right now.",
            Self::AttemptsExhausted => "You have used up all of your attempts for this quiz.",
            Self::AlreadyPlaying => "You are already in line for this quiz.",
            Self::Storage => "Oops! We encountered an unexpected database error on our end.",
        })
    }
}

pub type Result<T> = core::result::Result<T, Error>;
