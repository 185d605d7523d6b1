//! In-memory collaborators for tests.

use crate::{
    bot::Followup,
    delivery::{Delivery, DeliveryError, Letter, MessageHandle, Messenger},
    ledger::Ledger,
    session::Player,
    settings::AttemptPolicy,
};
use db::error::Result;
use model::{Answer, Standing};
use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Mutex,
    },
};
use tokio::{sync::mpsc, time::Instant};
use twilight_model::id::{marker::UserMarker, Id};

type UserId = Id<UserMarker>;

#[derive(Debug, Clone)]
pub struct Sent {
    pub recipient: UserId,
    pub letter: Letter,
    pub handle: MessageHandle,
    pub at: Instant,
}

/// Records every delivery. Optionally mirrors them into a channel.
#[derive(Default)]
pub struct Outbox {
    next: AtomicU64,
    sent: Mutex<Vec<Sent>>,
    deleted: Mutex<Vec<MessageHandle>>,
    denied: Mutex<HashSet<UserId>>,
    flaky: AtomicUsize,
    undeletable: AtomicBool,
    followups: Mutex<Vec<(Box<str>, Box<str>)>>,
    tap: Mutex<Option<mpsc::UnboundedSender<Sent>>>,
}

impl Outbox {
    pub fn tapped() -> (Self, mpsc::UnboundedReceiver<Sent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let outbox = Self::default();
        *outbox.tap.lock().unwrap() = Some(tx);
        (outbox, rx)
    }

    pub fn deny(&self, user: UserId) {
        self.denied.lock().unwrap().insert(user);
    }

    /// Fails the next `count` sends with [`DeliveryError::Transient`].
    pub fn fail_next(&self, count: usize) {
        self.flaky.store(count, Ordering::Relaxed);
    }

    /// Toggles whether deletions fail with [`DeliveryError::Denied`].
    pub fn refuse_deletes(&self, refuse: bool) {
        self.undeletable.store(refuse, Ordering::Relaxed);
    }

    /// Interaction follow-ups as `(token, content)` pairs.
    pub fn followups(&self) -> Vec<(Box<str>, Box<str>)> {
        self.followups.lock().unwrap().clone()
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, user: UserId) -> Vec<Sent> {
        self.sent().into_iter().filter(|sent| sent.recipient == user).collect()
    }

    pub fn deleted(&self) -> Vec<MessageHandle> {
        self.deleted.lock().unwrap().clone()
    }
}

impl Messenger for Outbox {
    async fn send(&self, recipient: UserId, letter: &Letter) -> Delivery {
        if self.denied.lock().unwrap().contains(&recipient) {
            return Err(DeliveryError::Denied);
        }
        let flaky = self.flaky.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |left| left.checked_sub(1));
        if flaky.is_ok() {
            return Err(DeliveryError::Transient);
        }

        let id = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        let handle = MessageHandle { channel: Id::new(recipient.get()), message: Id::new(id) };
        let sent = Sent { recipient, letter: letter.clone(), handle, at: Instant::now() };
        self.sent.lock().unwrap().push(sent.clone());
        if let Some(tap) = self.tap.lock().unwrap().as_ref() {
            let _ = tap.send(sent);
        }
        Ok(handle)
    }

    async fn delete(&self, handle: MessageHandle) -> core::result::Result<(), DeliveryError> {
        if self.undeletable.load(Ordering::Relaxed) {
            return Err(DeliveryError::Denied);
        }
        let known = self.sent.lock().unwrap().iter().any(|sent| sent.handle == handle);
        let mut deleted = self.deleted.lock().unwrap();
        if !known || deleted.contains(&handle) {
            return Err(DeliveryError::Gone);
        }
        deleted.push(handle);
        Ok(())
    }
}

impl Followup for Outbox {
    async fn follow_up(&self, token: &str, content: &str) {
        self.followups.lock().unwrap().push((token.into(), content.into()));
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Final {
    pub user: UserId,
    pub name: Box<str>,
    pub quiz: Box<str>,
    pub score: u32,
}

#[derive(Default)]
pub struct MemoryLedger {
    pub starts: Mutex<Vec<(UserId, Box<str>)>>,
    pub answers: Mutex<Vec<(UserId, Box<str>, Answer)>>,
    pub finals: Mutex<Vec<Final>>,
}

impl MemoryLedger {
    pub fn answers(&self) -> Vec<Answer> {
        self.answers.lock().unwrap().iter().map(|(_, _, answer)| *answer).collect()
    }

    pub fn finals(&self) -> Vec<Final> {
        self.finals.lock().unwrap().clone()
    }
}

impl Ledger for MemoryLedger {
    async fn attempts(&self, user: UserId, quiz: &str, policy: AttemptPolicy) -> Result<u32> {
        let count = match policy {
            AttemptPolicy::Completed => {
                self.finals.lock().unwrap().iter().filter(|row| row.user == user && &*row.quiz == quiz).count()
            }
            AttemptPolicy::Started => {
                self.starts.lock().unwrap().iter().filter(|(id, name)| *id == user && &**name == quiz).count()
            }
        };
        Ok(count as u32)
    }

    async fn record_start(&self, user: UserId, quiz: &str) -> Result<()> {
        self.starts.lock().unwrap().push((user, quiz.into()));
        Ok(())
    }

    async fn save_question(&self, user: UserId, quiz: &str, answer: Answer) -> Result<()> {
        self.answers.lock().unwrap().push((user, quiz.into(), answer));
        Ok(())
    }

    async fn save_final(&self, player: &Player, quiz: &str, score: u32) -> Result<()> {
        let row = Final { user: player.id, name: player.name.clone(), quiz: quiz.into(), score };
        self.finals.lock().unwrap().push(row);
        Ok(())
    }

    async fn top(&self, quiz: &str, limit: u32) -> Result<Vec<Standing>> {
        let mut best = std::collections::BTreeMap::<UserId, Standing>::new();
        for row in self.finals.lock().unwrap().iter().filter(|row| &*row.quiz == quiz) {
            let score = row.score as i32;
            let entry = best.entry(row.user).or_insert_with(|| Standing { name: row.name.clone(), score });
            entry.score = entry.score.max(score);
        }
        let mut rows: Vec<_> = best.into_values().collect();
        rows.sort_by(|a, b| b.score.cmp(&a.score));
        rows.truncate(limit as usize);
        Ok(rows)
    }
}
