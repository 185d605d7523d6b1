//! Per-quiz admission lines.
//!
//! Each quiz has one FIFO line. The user at the head of the line is the one
//! currently admitted; everybody behind waits for the head to leave. Releases
//! are broadcast per quiz, so waiters must compare the released user with
//! themselves.

use alloc::{boxed::Box, collections::VecDeque};
use core::num::NonZeroUsize;
use dashmap::{mapref::one::RefMut, DashMap};
use tokio::sync::watch;
use twilight_model::id::{marker::UserMarker, Id};

type UserId = Id<UserMarker>;

struct Line {
    waiting: VecDeque<UserId>,
    active: bool,
    /// Current head of the line. Every change is a release.
    head: watch::Sender<Option<UserId>>,
}

impl Default for Line {
    fn default() -> Self {
        Self { waiting: VecDeque::new(), active: true, head: watch::channel(None).0 }
    }
}

impl Line {
    fn position(&self, user: UserId) -> Option<NonZeroUsize> {
        let index = self.waiting.iter().position(|&other| other == user)?;
        NonZeroUsize::new(index + 1)
    }
}

/// Result of joining a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entry {
    /// The user was appended at this (1-based) position.
    Joined(NonZeroUsize),
    /// The user was already in line at this position. Nothing changed.
    Present(NonZeroUsize),
}

/// Stream of releases for one quiz.
pub struct Turns(watch::Receiver<Option<UserId>>);

impl Turns {
    /// Suspends until the next user is released from the head of the line.
    pub async fn next(&mut self) -> Option<UserId> {
        loop {
            self.0.changed().await.ok()?;
            if let Some(user) = *self.0.borrow_and_update() {
                return Some(user);
            }
        }
    }
}

#[derive(Default)]
pub struct Admission {
    lines: DashMap<Box<str>, Line>,
}

impl Admission {
    fn line_mut(&self, quiz: &str) -> RefMut<'_, Box<str>, Line> {
        if let Some(line) = self.lines.get_mut(quiz) {
            return line;
        }
        self.lines.entry(quiz.into()).or_default()
    }

    /// Quizzes accept new players unless explicitly deactivated.
    pub fn is_active(&self, quiz: &str) -> bool {
        self.lines.get(quiz).map_or(true, |line| line.active)
    }

    /// Only affects future admissions. Users already in line stay there.
    pub fn set_active(&self, quiz: &str, active: bool) {
        self.line_mut(quiz).active = active;
    }

    pub fn enqueue(&self, quiz: &str, user: UserId) -> Entry {
        let mut line = self.line_mut(quiz);
        if let Some(pos) = line.position(user) {
            return Entry::Present(pos);
        }

        line.waiting.push_back(user);
        if line.waiting.len() == 1 {
            line.head.send_replace(Some(user));
        }

        let pos = NonZeroUsize::new(line.waiting.len()).unwrap_or(NonZeroUsize::MIN);
        Entry::Joined(pos)
    }

    /// 1-based rank in the line, if present at all.
    pub fn position(&self, quiz: &str, user: UserId) -> Option<NonZeroUsize> {
        self.lines.get(quiz)?.position(user)
    }

    pub fn len(&self, quiz: &str) -> usize {
        self.lines.get(quiz).map_or(0, |line| line.waiting.len())
    }

    /// Subscribes to releases. Subscribe before checking the position to never miss one.
    pub fn turns(&self, quiz: &str) -> Turns {
        Turns(self.line_mut(quiz).head.subscribe())
    }

    pub async fn await_turn(&self, quiz: &str) -> Option<UserId> {
        self.turns(quiz).next().await
    }

    /// Removes the user from the line. If they were at the head, the next user is released.
    pub fn leave(&self, quiz: &str, user: UserId) -> bool {
        let Some(mut line) = self.lines.get_mut(quiz) else {
            return false;
        };
        let Some(index) = line.waiting.iter().position(|&other| other == user) else {
            return false;
        };

        line.waiting.remove(index);
        if index == 0 {
            let next = line.waiting.front().copied();
            line.head.send_replace(next);
            if let Some(next) = next {
                log::debug!("released user {next} for quiz {quiz}");
            }
        }
        true
    }
}
