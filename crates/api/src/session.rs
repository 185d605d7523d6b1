//! Drives one player through one quiz.
//!
//! ```text
//! Requested -> Queued -> Confirming -> InProgress(0..n) -> Completed
//! ```
//!
//! Early exits: `QuizInactive`, `AttemptsExhausted`, `AdmissionTimedOut`,
//! `CancelledByUser` and `DeliveryDenied`. Every message goes through the send
//! pipeline, one at a time, so a session's messages arrive in order even when
//! the pipeline has several workers.

use crate::{
    admission::{Admission, Entry, Turns},
    capture::{self, AnswerCapture, Captures, Outcome, Receipt},
    delivery::{Choice, DeliveryError, Letter, MessageHandle, Messenger, Pipeline, Tone},
    error::{Error, Result},
    ledger::Ledger,
    library::QuizSource,
    settings::Settings,
};
use alloc::{boxed::Box, format, string::String, sync::Arc, vec::Vec};
use core::{fmt::Write, num::NonZeroUsize, time::Duration};
use model::{Answer, Question, Quiz, Standing};
use tokio::time::{self, Instant};
use twilight_model::id::{
    marker::{MessageMarker, UserMarker},
    Id,
};

type UserId = Id<UserMarker>;
type MessageId = Id<MessageMarker>;

/// Option index of "Start" on the confirmation prompt.
const ACCEPT: usize = 0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub id: UserId,
    /// Shown on the leaderboard.
    pub name: Box<str>,
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    Completed { score: u32 },
    CancelledByUser,
    AdmissionTimedOut,
    AttemptsExhausted,
    QuizInactive,
    DeliveryDenied,
}

/// Encodes a button ID that routes a click back to its capture.
pub fn choice_id(key: u64, choice: usize) -> Box<str> {
    format!("{key}:{choice}").into_boxed_str()
}

pub fn parse_choice_id(id: &str) -> Option<(u64, usize)> {
    let (key, choice) = id.split_once(':')?;
    Some((key.parse().ok()?, choice.parse().ok()?))
}

fn option_label(index: usize) -> char {
    u8::try_from(index).ok().and_then(|i| b'A'.checked_add(i)).map_or('?', char::from)
}

fn render_question(key: u64, index: usize, total: usize, question: &Question) -> Letter {
    let mut content = format!("**Question {}/{total}**\n{}\n", index + 1, question.question);
    for (i, option) in question.options.iter().enumerate() {
        let _ = write!(content, "\n{}. {option}", option_label(i));
    }
    let _ = write!(content, "\n\n⏳ You have {} seconds.", question.timeout);

    let choices = (0..question.options.len())
        .map(|i| Choice {
            custom_id: choice_id(key, i),
            label: String::from(option_label(i)).into_boxed_str(),
            tone: Tone::Primary,
        })
        .collect();
    Letter::with_choices(content, choices)
}

fn render_feedback(outcome: Outcome, correct: bool, points: u32) -> Letter {
    if correct {
        Letter::text(format!("✅ Correct! +{points} points."))
    } else if outcome.choice.is_none() {
        Letter::text("⌛ Time's up!")
    } else {
        Letter::text("❌ Incorrect.")
    }
}

/// Removes the player from the admission line when dropped, whatever the exit path.
struct Ticket {
    admission: Arc<Admission>,
    quiz: Box<str>,
    user: UserId,
}

impl Drop for Ticket {
    fn drop(&mut self) {
        if self.admission.leave(&self.quiz, self.user) {
            log::debug!("user {} left the line for quiz {}", self.user, self.quiz);
        }
    }
}

/// A request that passed the admission checks and holds a place in line.
pub struct Pending {
    player: Player,
    quiz_id: Box<str>,
    quiz: Arc<Quiz>,
    position: NonZeroUsize,
    turns: Turns,
    ticket: Ticket,
}

impl Pending {
    /// 1-based rank at the time of joining the line.
    pub fn position(&self) -> NonZeroUsize {
        self.position
    }

    pub fn quiz_id(&self) -> &str {
        &self.quiz_id
    }
}

/// Progress of an admitted session. Dies with the session.
struct SessionState {
    question: usize,
    score: u32,
    transient: Vec<MessageHandle>,
    started: Instant,
    confirmed: bool,
}

impl SessionState {
    /// Starts the clock at admission. Earlier transient messages are carried over.
    fn admit(transient: Vec<MessageHandle>) -> Self {
        Self { question: 0, score: 0, transient, started: Instant::now(), confirmed: false }
    }

    fn stage(&self) -> String {
        if self.confirmed {
            format!("question #{}", self.question + 1)
        } else {
            String::from("confirmation")
        }
    }
}

pub struct Coordinator<L, S> {
    library: S,
    ledger: L,
    admission: Arc<Admission>,
    captures: Arc<Captures>,
    outbox: Pipeline,
    shredder: Pipeline,
    settings: Settings,
}

impl<L: Ledger, S: QuizSource> Coordinator<L, S> {
    /// Spawns both delivery pipelines, so this must be called from within a runtime.
    pub fn new<M: Messenger>(messenger: Arc<M>, ledger: L, library: S, settings: Settings) -> Self {
        let (outbox, _) = Pipeline::spawn("send", Arc::clone(&messenger), settings.send_workers, settings.send_delay);
        let (shredder, _) = Pipeline::spawn("delete", messenger, settings.delete_workers, settings.delete_delay);
        Self {
            library,
            ledger,
            admission: Arc::default(),
            captures: Arc::default(),
            outbox,
            shredder,
            settings,
        }
    }

    pub fn library(&self) -> &S {
        &self.library
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn admission(&self) -> &Admission {
        &self.admission
    }

    /// Administrative switch. Identity checks are up to the caller.
    pub fn toggle_quiz_active(&self, quiz: &str, active: bool) {
        log::info!("quiz {quiz} is now {}", if active { "active" } else { "inactive" });
        self.admission.set_active(quiz, active);
    }

    /// Entry point for the transport layer whenever a player clicks a choice
    /// on the given message.
    pub fn submit(&self, key: u64, message: MessageId, user: UserId, choice: usize) -> Receipt {
        self.captures.submit(key, message, user, choice)
    }

    pub async fn leaderboard(&self, quiz: &str) -> Result<Vec<Standing>> {
        if self.library.load(quiz).is_none() {
            return Err(Error::UnknownQuiz);
        }
        Ok(self.ledger.top(quiz, self.settings.leaderboard).await?)
    }

    /// Runs the whole session and reports how it ended.
    pub async fn start_session(&self, player: Player, quiz: &str) -> Result<Terminal> {
        match self.prepare(player, quiz).await {
            Ok(pending) => Ok(self.run(pending).await),
            Err(Error::Inactive) => Ok(Terminal::QuizInactive),
            Err(Error::AttemptsExhausted) => Ok(Terminal::AttemptsExhausted),
            Err(err) => Err(err),
        }
    }

    /// Performs the admission checks and takes a place in line. Nothing is
    /// sent to the player yet.
    pub async fn prepare(&self, player: Player, quiz_id: &str) -> Result<Pending> {
        let quiz = self.library.load(quiz_id).ok_or(Error::UnknownQuiz)?;
        if !self.admission.is_active(quiz_id) {
            return Err(Error::Inactive);
        }

        let attempts = self.ledger.attempts(player.id, quiz_id, self.settings.attempts).await?;
        if attempts >= quiz.attempts {
            log::debug!("user {} has no attempts left for quiz {quiz_id}", player.id);
            return Err(Error::AttemptsExhausted);
        }

        let turns = self.admission.turns(quiz_id);
        let position = match self.admission.enqueue(quiz_id, player.id) {
            Entry::Joined(position) => position,
            Entry::Present(_) => return Err(Error::AlreadyPlaying),
        };

        log::info!("user {} joined the line for quiz {quiz_id} at #{position}", player.id);
        let ticket = Ticket { admission: Arc::clone(&self.admission), quiz: quiz_id.into(), user: player.id };
        Ok(Pending { player, quiz_id: quiz_id.into(), quiz, position, turns, ticket })
    }

    /// Drives an admitted request to its terminal state.
    pub async fn run(&self, pending: Pending) -> Terminal {
        let Pending { player, quiz_id, quiz, position, mut turns, ticket } = pending;

        let mut queued = Vec::new();
        if position.get() > 1 {
            let notice = format!(
                "⏳ You are **#{position}** in line for **{quiz_id}**. Your session will begin once it is your turn."
            );
            match self.outbox.send(player.id, Letter::text(notice)).await {
                Ok(handle) => queued.push(handle),
                Err(DeliveryError::Denied) => return Terminal::DeliveryDenied,
                Err(err) => log::warn!("cannot deliver the rank notice to user {}: {err}", player.id),
            }

            if !self.wait_for_turn(&quiz_id, player.id, &mut turns).await {
                log::info!("user {} gave up waiting for quiz {quiz_id}", player.id);
                let notice = format!("⌛ You waited too long in line for **{quiz_id}**. Please try again later.");
                self.outbox.post(player.id, Letter::text(notice));
                return Terminal::AdmissionTimedOut;
            }
        }
        drop(turns);

        let mut state = SessionState::admit(queued);
        match self.confirm(&player, &quiz_id, &mut state).await {
            Ok(true) => state.confirmed = true,
            Ok(false) => {
                log::info!("user {} cancelled quiz {quiz_id}", player.id);
                return Terminal::CancelledByUser;
            }
            Err(err) => {
                log::warn!("aborting quiz {quiz_id} for user {} at {}: {err}", player.id, state.stage());
                return Terminal::DeliveryDenied;
            }
        }

        if let Err(err) = self.ledger.record_start(player.id, &quiz_id).await {
            log::error!("cannot record the attempt of user {} on quiz {quiz_id}: {err}", player.id);
        }

        let total = quiz.questions.len();
        for question in &quiz.questions {
            if let Err(err) = self.ask(&player, &quiz_id, &quiz, question, total, &mut state).await {
                log::warn!("aborting quiz {quiz_id} for user {} at {}: {err}", player.id, state.stage());
                return Terminal::DeliveryDenied;
            }
            state.question += 1;
        }

        let score = state.score;
        if let Err(err) = self.ledger.save_final(&player, &quiz_id, score).await {
            log::error!("cannot save the final score of user {} on quiz {quiz_id}: {err}", player.id);
        }

        // The next player may start while we wrap up.
        drop(ticket);

        let summary = format!("🏁 Quiz **{quiz_id}** complete! Your score: **{score}** points.");
        match self.outbox.send(player.id, Letter::text(summary)).await {
            Ok(handle) => state.transient.push(handle),
            Err(err) => log::warn!("cannot deliver the summary of quiz {quiz_id} to user {}: {err}", player.id),
        }

        log::info!(
            "user {} completed quiz {quiz_id} with {score} points in {}s",
            player.id,
            state.started.elapsed().as_secs()
        );

        if quiz.auto_delete {
            self.schedule_cleanup(state.transient);
        }
        Terminal::Completed { score }
    }

    async fn wait_for_turn(&self, quiz: &str, user: UserId, turns: &mut Turns) -> bool {
        let deadline = Instant::now() + self.settings.admission_ceiling;
        loop {
            if self.admission.position(quiz, user) == Some(NonZeroUsize::MIN) {
                return true;
            }
            match time::timeout_at(deadline, turns.next()).await {
                Ok(Some(released)) if released == user => return true,
                Ok(Some(_)) => continue,
                Ok(None) | Err(_) => return false,
            }
        }
    }

    /// Returns whether the player accepted.
    async fn confirm(
        &self,
        player: &Player,
        quiz_id: &str,
        state: &mut SessionState,
    ) -> core::result::Result<bool, DeliveryError> {
        let key = self.captures.reserve();
        let choices = alloc::vec![
            Choice { custom_id: choice_id(key, ACCEPT), label: "Start".into(), tone: Tone::Success },
            Choice { custom_id: choice_id(key, 1), label: "Cancel".into(), tone: Tone::Danger },
        ];
        let content = format!("📩 Are you ready to take the quiz **{quiz_id}**?");
        let handle = self.outbox.send(player.id, Letter::with_choices(content, choices)).await?;
        state.transient.push(handle);

        let receipts = alloc::vec![Box::from("✅ Let's begin!"), Box::from("❌ Quiz cancelled.")];
        let capture = AnswerCapture::new(player.id, 2, self.settings.confirm_timeout).with_receipts(receipts);
        let armed = self.captures.arm(key, handle.message, capture);
        let outcome = armed.wait().await;
        Ok(outcome.choice == Some(ACCEPT))
    }

    async fn ask(
        &self,
        player: &Player,
        quiz_id: &str,
        quiz: &Quiz,
        question: &Question,
        total: usize,
        state: &mut SessionState,
    ) -> core::result::Result<(), DeliveryError> {
        log::debug!("sending question #{} of quiz {quiz_id} to user {}", state.question + 1, player.id);
        let key = self.captures.reserve();
        let letter = render_question(key, state.question, total, question);
        let handle = self.outbox.send(player.id, letter).await?;
        state.transient.push(handle);

        let timeout = Duration::from_secs(question.timeout.into());
        let capture = AnswerCapture::new(player.id, question.options.len(), timeout);
        let armed = self.captures.arm(key, handle.message, capture);
        let outcome = armed.wait().await;
        drop(armed);

        let correct = outcome.is_correct(question.answer_index.into());
        let points = capture::points(correct, outcome.elapsed, self.settings.decay);
        state.score = state.score.saturating_add(points);

        let answer = Answer {
            index: u16::try_from(state.question).unwrap_or(u16::MAX),
            elapsed: u16::try_from(outcome.elapsed).unwrap_or(u16::MAX),
            points,
            correct,
        };
        if let Err(err) = self.ledger.save_question(player.id, quiz_id, answer).await {
            log::error!("cannot save question #{} of quiz {quiz_id} for user {}: {err}", answer.index, player.id);
        }

        if quiz.show_feedback {
            match self.outbox.send(player.id, render_feedback(outcome, correct, points)).await {
                Ok(handle) => state.transient.push(handle),
                Err(DeliveryError::Denied) => return Err(DeliveryError::Denied),
                Err(err) => log::warn!("dropping feedback for user {}: {err}", player.id),
            }
        }
        Ok(())
    }

    fn schedule_cleanup(&self, handles: Vec<MessageHandle>) {
        let shredder = self.shredder.clone();
        let grace = self.settings.cleanup_grace;
        tokio::spawn(async move {
            time::sleep(grace).await;
            log::debug!("cleaning up {} messages", handles.len());
            for handle in handles {
                shredder.delete(handle);
            }
        });
    }
}
