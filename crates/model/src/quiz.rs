use alloc::{string::String, vec::Vec};
use serde::{Deserialize, Serialize};

/// Discord caps a message at five rows of five buttons.
pub const MAX_OPTIONS: usize = 25;

/// Acceptable schema for a single question.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Question {
    /// Prompt to be displayed in chat.
    pub question: String,
    /// Possible answers to select from.
    pub options: Vec<String>,
    /// Index of the option with the correct answer.
    pub answer_index: u8,
    /// How long the player may think before the question expires (in seconds).
    #[serde(default = "Question::default_timeout")]
    pub timeout: u16,
}

impl Question {
    const fn default_timeout() -> u16 {
        20
    }

    pub fn is_valid(&self) -> bool {
        (1..=MAX_OPTIONS).contains(&self.options.len())
            && usize::from(self.answer_index) < self.options.len()
            && self.timeout > 0
    }
}

/// Acceptable schema for a whole quiz along with its session settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Quiz {
    /// Maximum number of attempts per player.
    #[serde(default = "Quiz::default_attempts")]
    pub attempts: u32,
    /// Whether to tell the player if each answer was right.
    #[serde(default = "Quiz::default_feedback")]
    pub show_feedback: bool,
    /// Whether to clean up the session's direct messages afterwards.
    #[serde(default, rename = "auto_delete_dm")]
    pub auto_delete: bool,
    #[serde(default)]
    pub questions: Vec<Question>,
}

impl Quiz {
    const fn default_attempts() -> u32 {
        1
    }

    const fn default_feedback() -> bool {
        true
    }

    pub fn is_valid(&self) -> bool {
        !self.questions.is_empty() && self.questions.iter().all(Question::is_valid)
    }
}
