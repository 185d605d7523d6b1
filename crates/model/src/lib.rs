#![cfg_attr(not(test), no_std)]
extern crate alloc;

pub mod quiz;

pub use quiz::{Question, Quiz};

use alloc::boxed::Box;

/// One leaderboard row: a player's best final score for some quiz.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Standing {
    pub name: Box<str>,
    pub score: i32,
}

/// The persisted outcome of a single question within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Answer {
    /// Zero-based position of the question within its quiz.
    pub index: u16,
    /// Whole seconds between presentation and the answer (or the timeout).
    pub elapsed: u16,
    pub points: u32,
    pub correct: bool,
}
