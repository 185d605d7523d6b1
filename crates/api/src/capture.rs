//! Bounded-time single-answer collection for one prompt.
//!
//! A capture accepts the first qualifying selection from its owner, or settles
//! by itself once the timeout elapses. Whichever comes first wins; everything
//! after that is ignored.

use alloc::{boxed::Box, vec::Vec};
use core::time::Duration;
use dashmap::DashMap;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, OnceLock,
};
use tokio::{
    sync::Notify,
    time::{self, Instant},
};
use twilight_model::id::{
    marker::{MessageMarker, UserMarker},
    Id,
};

type UserId = Id<UserMarker>;
type MessageId = Id<MessageMarker>;

/// Points for a correct answer given instantly.
pub const MAX_POINTS: u32 = 100;

/// Awards points for an answer: full marks decay linearly with thinking time.
pub fn points(correct: bool, elapsed: u64, decay: u32) -> u32 {
    if !correct {
        return 0;
    }
    let penalty = elapsed.saturating_mul(decay.into());
    let penalty = u32::try_from(penalty).unwrap_or(u32::MAX);
    MAX_POINTS.saturating_sub(penalty)
}

/// Terminal state of a capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    /// Index of the selected option. `None` if the capture timed out.
    pub choice: Option<usize>,
    /// Whole seconds since presentation, never more than the timeout.
    pub elapsed: u64,
}

impl Outcome {
    pub fn is_correct(&self, answer: usize) -> bool {
        self.choice == Some(answer)
    }
}

/// Verdict on a single submission, plus the text that should replace the
/// prompt once an answer is accepted.
pub type Receipt = (Submission, Option<Box<str>>);

/// Verdict on a single submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    Accepted,
    /// Someone other than the owner clicked.
    NotOwner,
    /// The selection is not one of the offered options.
    Invalid,
    /// The capture has already settled (or never existed).
    Expired,
}

pub struct AnswerCapture {
    owner: UserId,
    options: usize,
    timeout: Duration,
    started: Instant,
    /// Per-option replacement text for the prompt after acceptance.
    receipts: Vec<Box<str>>,
    outcome: OnceLock<Outcome>,
    settled: Notify,
}

impl AnswerCapture {
    /// Starts the clock immediately.
    pub fn new(owner: UserId, options: usize, timeout: Duration) -> Self {
        Self {
            owner,
            options,
            timeout,
            started: Instant::now(),
            receipts: Vec::new(),
            outcome: OnceLock::new(),
            settled: Notify::new(),
        }
    }

    pub fn with_receipts(mut self, receipts: Vec<Box<str>>) -> Self {
        self.receipts = receipts;
        self
    }

    fn receipt(&self, choice: usize) -> Option<Box<str>> {
        self.receipts.get(choice).cloned()
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome.get().copied()
    }

    pub fn is_terminal(&self) -> bool {
        self.outcome.get().is_some()
    }

    fn elapsed(&self) -> u64 {
        self.started.elapsed().min(self.timeout).as_secs()
    }

    fn settle(&self, outcome: Outcome) -> bool {
        if self.outcome.set(outcome).is_err() {
            return false;
        }
        self.settled.notify_one();
        true
    }

    pub fn submit(&self, user: UserId, choice: usize) -> Submission {
        if self.is_terminal() {
            return Submission::Expired;
        }
        if user != self.owner {
            return Submission::NotOwner;
        }
        if choice >= self.options {
            return Submission::Invalid;
        }
        if self.settle(Outcome { choice: Some(choice), elapsed: self.elapsed() }) {
            Submission::Accepted
        } else {
            Submission::Expired
        }
    }

    /// Settles the capture with no selection. Returns `false` if it had already settled.
    pub fn on_timeout(&self) -> bool {
        self.settle(Outcome { choice: None, elapsed: self.timeout.as_secs() })
    }

    /// Suspends until the capture settles, enforcing the timeout along the way.
    pub async fn wait(&self) -> Outcome {
        let deadline = self.started + self.timeout;
        loop {
            if let Some(outcome) = self.outcome() {
                return outcome;
            }
            tokio::select! {
                _ = self.settled.notified() => {}
                _ = time::sleep_until(deadline) => {
                    self.on_timeout();
                }
            }
        }
    }
}

struct Live {
    /// The delivered prompt. Clicks on any other message are stale.
    message: MessageId,
    capture: Arc<AnswerCapture>,
}

/// Registry of live captures, addressed by the key embedded in button IDs.
///
/// Keys restart with the process, so a click only counts if it comes from the
/// very message the capture was armed for.
#[derive(Default)]
pub struct Captures {
    next: AtomicU64,
    live: DashMap<u64, Live>,
}

impl Captures {
    /// Routes a click from the transport layer to the matching capture.
    pub fn submit(&self, key: u64, message: MessageId, user: UserId, choice: usize) -> Receipt {
        let capture = match self.live.get(&key) {
            Some(live) if live.message == message => Arc::clone(&live.capture),
            _ => return (Submission::Expired, None),
        };
        match capture.submit(user, choice) {
            Submission::Accepted => (Submission::Accepted, capture.receipt(choice)),
            other => (other, None),
        }
    }

    /// Allocates a key for a prompt that has not been delivered yet.
    pub(crate) fn reserve(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// Makes the capture reachable until the returned guard is dropped.
    pub(crate) fn arm(self: &Arc<Self>, key: u64, message: MessageId, capture: AnswerCapture) -> Armed {
        let capture = Arc::new(capture);
        self.live.insert(key, Live { message, capture: Arc::clone(&capture) });
        Armed { key, capture, registry: Arc::clone(self) }
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }
}

pub(crate) struct Armed {
    key: u64,
    capture: Arc<AnswerCapture>,
    registry: Arc<Captures>,
}

impl Armed {
    pub async fn wait(&self) -> Outcome {
        self.capture.wait().await
    }
}

impl Drop for Armed {
    fn drop(&mut self) {
        self.registry.live.remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::{points, AnswerCapture, Captures, Outcome, Submission};
    use core::time::Duration;
    use std::sync::Arc;
    use tokio::time;
    use twilight_model::id::Id;

    #[test]
    fn scoring_follows_linear_decay() {
        assert_eq!(points(true, 10, 5), 50);
        assert_eq!(points(true, 0, 3), 100);
        assert_eq!(points(false, 0, 3), 0);
        assert_eq!(points(false, 7, 5), 0);
        assert_eq!(points(true, 40, 3), 0);
        assert_eq!(points(true, u64::MAX, u32::MAX), 0);
    }

    #[test]
    fn scoring_never_increases_with_time() {
        for decay in 2..=5 {
            let mut previous = points(true, 0, decay);
            for elapsed in 1..60 {
                let current = points(true, elapsed, decay);
                assert!(current <= previous);
                previous = current;
            }
        }
    }

    #[test]
    fn unset_selection_is_never_correct() {
        let outcome = Outcome { choice: None, elapsed: 20 };
        assert!(!outcome.is_correct(0));
        assert!(Outcome { choice: Some(2), elapsed: 3 }.is_correct(2));
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn first_qualifying_answer_wins() {
        let owner = Id::new(1);
        let capture = AnswerCapture::new(owner, 4, Duration::from_secs(20));
        time::advance(Duration::from_millis(7_400)).await;

        assert_eq!(capture.submit(Id::new(2), 1), Submission::NotOwner);
        assert_eq!(capture.submit(owner, 4), Submission::Invalid);
        assert!(!capture.is_terminal());

        assert_eq!(capture.submit(owner, 3), Submission::Accepted);
        assert_eq!(capture.submit(owner, 0), Submission::Expired);
        assert!(!capture.on_timeout());

        let outcome = capture.wait().await;
        assert_eq!(outcome, Outcome { choice: Some(3), elapsed: 7 });
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn timeout_clamps_elapsed() {
        let owner = Id::new(1);
        let capture = AnswerCapture::new(owner, 2, Duration::from_secs(20));
        let outcome = capture.wait().await;
        assert_eq!(outcome, Outcome { choice: None, elapsed: 20 });
        assert!(!outcome.is_correct(0) && !outcome.is_correct(1));

        // Late arrivals are ignored
        assert_eq!(capture.submit(owner, 0), Submission::Expired);
        assert_eq!(capture.outcome(), Some(outcome));
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn waiter_wakes_on_submission() {
        let owner = Id::new(9);
        let registry = Arc::new(Captures::default());
        let key = registry.reserve();
        let message = Id::new(100);
        let armed = registry.arm(key, message, AnswerCapture::new(owner, 2, Duration::from_secs(30)));

        let clicker = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                time::sleep(Duration::from_secs(4)).await;
                registry.submit(key, message, owner, 1)
            })
        };

        let outcome = armed.wait().await;
        assert_eq!(outcome, Outcome { choice: Some(1), elapsed: 4 });
        assert_eq!(clicker.await.unwrap(), (Submission::Accepted, None));

        drop(armed);
        assert!(registry.is_empty());
        assert_eq!(registry.submit(key, message, owner, 0).0, Submission::Expired);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn clicks_from_other_messages_are_stale() {
        let owner = Id::new(9);
        let registry = Arc::new(Captures::default());
        let key = registry.reserve();
        let armed = registry.arm(key, Id::new(200), AnswerCapture::new(owner, 2, Duration::from_secs(30)));

        // Same key and owner, but a button left over from an earlier prompt
        assert_eq!(registry.submit(key, Id::new(100), owner, 0), (Submission::Expired, None));
        assert!(armed.capture.outcome().is_none());

        assert_eq!(registry.submit(key, Id::new(200), owner, 1).0, Submission::Accepted);
        assert_eq!(armed.wait().await.choice, Some(1));
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn accepted_choices_carry_their_receipt() {
        let owner = Id::new(9);
        let registry = Arc::new(Captures::default());
        let key = registry.reserve();
        let message = Id::new(300);
        let receipts = vec![Box::from("yes"), Box::from("no")];
        let capture = AnswerCapture::new(owner, 2, Duration::from_secs(30)).with_receipts(receipts);
        let _armed = registry.arm(key, message, capture);

        assert_eq!(registry.submit(key, message, Id::new(10), 1), (Submission::NotOwner, None));
        assert_eq!(registry.submit(key, message, owner, 1), (Submission::Accepted, Some(Box::from("no"))));
        assert_eq!(registry.submit(key, message, owner, 0), (Submission::Expired, None));
    }
}
