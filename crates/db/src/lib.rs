#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod error;

use alloc::{string::String, vec::Vec};
use core::num::NonZeroU64;

pub use model::{Answer, Standing};
pub use tokio_postgres::{tls::NoTls, Client, Config};

const SCHEMA: &str = "\
CREATE TABLE IF NOT EXISTS results (
    id SERIAL PRIMARY KEY,
    user_id BIGINT NOT NULL,
    user_name TEXT NOT NULL,
    quiz_name TEXT NOT NULL,
    score INTEGER NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE TABLE IF NOT EXISTS question_results (
    id SERIAL PRIMARY KEY,
    user_id BIGINT NOT NULL,
    quiz_name TEXT NOT NULL,
    question_index SMALLINT NOT NULL,
    elapsed_seconds INTEGER NOT NULL,
    points INTEGER NOT NULL,
    is_correct BOOLEAN NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE TABLE IF NOT EXISTS attempts (
    id SERIAL PRIMARY KEY,
    user_id BIGINT NOT NULL,
    quiz_name TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);";

pub struct Database(Client);

impl From<Client> for Database {
    fn from(client: Client) -> Self {
        Self(client)
    }
}

fn deserialize_count(row: &tokio_postgres::Row) -> error::Result<u32> {
    let count: i64 = row.try_get(0)?;
    u32::try_from(count).map_err(|_| error::Error::Fatal)
}

fn deserialize_standing_from_row(row: &tokio_postgres::Row) -> error::Result<Standing> {
    let name: String = row.try_get("user_name")?;
    let score = row.try_get("best")?;
    Ok(Standing { name: name.into_boxed_str(), score })
}

impl Database {
    /// Creates the result tables if this is a fresh database.
    pub async fn init_schema(&self) -> error::Result<()> {
        self.0.batch_execute(SCHEMA).await?;
        Ok(())
    }

    /// Number of sessions of this quiz that the user has completed.
    pub async fn count_results(&self, user: NonZeroU64, quiz: &str) -> error::Result<u32> {
        let uid = user.get() as i64;
        let row =
            self.0.query_one("SELECT COUNT(*) FROM results WHERE user_id = $1 AND quiz_name = $2", &[&uid, &quiz]).await?;
        deserialize_count(&row)
    }

    /// Number of sessions of this quiz that the user has started.
    pub async fn count_attempts(&self, user: NonZeroU64, quiz: &str) -> error::Result<u32> {
        let uid = user.get() as i64;
        let row = self
            .0
            .query_one("SELECT COUNT(*) FROM attempts WHERE user_id = $1 AND quiz_name = $2", &[&uid, &quiz])
            .await?;
        deserialize_count(&row)
    }

    pub async fn record_attempt(&self, user: NonZeroU64, quiz: &str) -> error::Result<()> {
        let uid = user.get() as i64;
        match self.0.execute("INSERT INTO attempts (user_id, quiz_name) VALUES ($1, $2)", &[&uid, &quiz]).await? {
            1 => Ok(()),
            _ => Err(error::Error::Fatal),
        }
    }

    pub async fn save_question_result(&self, user: NonZeroU64, quiz: &str, answer: &Answer) -> error::Result<()> {
        let uid = user.get() as i64;
        let index = i16::try_from(answer.index).map_err(|_| error::Error::BadInput)?;
        let elapsed = i32::from(answer.elapsed);
        let points = i32::try_from(answer.points).map_err(|_| error::Error::BadInput)?;
        match self
            .0
            .execute(
                "INSERT INTO question_results (user_id, quiz_name, question_index, elapsed_seconds, points, is_correct) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
                &[&uid, &quiz, &index, &elapsed, &points, &answer.correct],
            )
            .await?
        {
            1 => Ok(()),
            _ => Err(error::Error::Fatal),
        }
    }

    pub async fn save_result(&self, user: NonZeroU64, name: &str, quiz: &str, score: u32) -> error::Result<()> {
        let uid = user.get() as i64;
        let score = i32::try_from(score).map_err(|_| error::Error::BadInput)?;
        match self
            .0
            .execute(
                "INSERT INTO results (user_id, user_name, quiz_name, score) VALUES ($1, $2, $3, $4)",
                &[&uid, &name, &quiz, &score],
            )
            .await?
        {
            1 => Ok(()),
            _ => Err(error::Error::Fatal),
        }
    }

    /// Best score per player, highest first.
    pub async fn get_top_results(&self, quiz: &str, limit: u32) -> error::Result<Vec<Standing>> {
        let limit = i64::from(limit);
        self.0
            .query(
                "SELECT MAX(user_name) AS user_name, MAX(score) AS best FROM results \
                 WHERE quiz_name = $1 GROUP BY user_id ORDER BY best DESC LIMIT $2",
                &[&quiz, &limit],
            )
            .await?
            .iter()
            .map(deserialize_standing_from_row)
            .collect()
    }
}
