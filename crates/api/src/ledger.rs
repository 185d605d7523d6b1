//! Result persistence.

use crate::{session::Player, settings::AttemptPolicy};
use alloc::vec::Vec;
use core::future::Future;
use db::{error::Result, Database};
use model::{Answer, Standing};
use twilight_model::id::{marker::UserMarker, Id};

type UserId = Id<UserMarker>;

/// Where session outcomes end up.
pub trait Ledger: Send + Sync + 'static {
    fn attempts(&self, user: UserId, quiz: &str, policy: AttemptPolicy) -> impl Future<Output = Result<u32>> + Send;
    fn record_start(&self, user: UserId, quiz: &str) -> impl Future<Output = Result<()>> + Send;
    fn save_question(&self, user: UserId, quiz: &str, answer: Answer) -> impl Future<Output = Result<()>> + Send;
    fn save_final(&self, player: &Player, quiz: &str, score: u32) -> impl Future<Output = Result<()>> + Send;
    fn top(&self, quiz: &str, limit: u32) -> impl Future<Output = Result<Vec<Standing>>> + Send;
}

impl Ledger for Database {
    async fn attempts(&self, user: UserId, quiz: &str, policy: AttemptPolicy) -> Result<u32> {
        match policy {
            AttemptPolicy::Completed => self.count_results(user.into_nonzero(), quiz).await,
            AttemptPolicy::Started => self.count_attempts(user.into_nonzero(), quiz).await,
        }
    }

    async fn record_start(&self, user: UserId, quiz: &str) -> Result<()> {
        self.record_attempt(user.into_nonzero(), quiz).await
    }

    async fn save_question(&self, user: UserId, quiz: &str, answer: Answer) -> Result<()> {
        self.save_question_result(user.into_nonzero(), quiz, &answer).await
    }

    async fn save_final(&self, player: &Player, quiz: &str, score: u32) -> Result<()> {
        self.save_result(player.id.into_nonzero(), &player.name, quiz, score).await
    }

    async fn top(&self, quiz: &str, limit: u32) -> Result<Vec<Standing>> {
        self.get_top_results(quiz, limit).await
    }
}
