//! Throttled outbound delivery.
//!
//! A [`Pipeline`] is an unbounded FIFO of [`DeliveryTask`]s drained by a fixed
//! pool of workers. Each worker executes one task at a time and then sleeps for
//! the configured delay, which keeps us under the messaging rate limits. Order
//! is preserved per worker only. Delivery is best-effort: failures are logged
//! and the task is dropped.

use alloc::{boxed::Box, sync::Arc, vec::Vec};
use core::{
    fmt::{self, Display},
    future::Future,
    time::Duration,
};
use tokio::{
    sync::{mpsc, oneshot, Mutex},
    task::JoinHandle,
    time,
};
use twilight_model::id::{
    marker::{ChannelMarker, MessageMarker, UserMarker},
    Id,
};

type UserId = Id<UserMarker>;

/// Visual weight of a choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Primary,
    Success,
    Danger,
}

/// One clickable option attached to a letter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choice {
    pub custom_id: Box<str>,
    pub label: Box<str>,
    pub tone: Tone,
}

/// Content of an outbound message, optionally with an interactive view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Letter {
    pub content: Box<str>,
    pub choices: Vec<Choice>,
}

impl Letter {
    pub fn text(content: impl Into<Box<str>>) -> Self {
        Self { content: content.into(), choices: Vec::new() }
    }

    pub fn with_choices(content: impl Into<Box<str>>, choices: Vec<Choice>) -> Self {
        Self { content: content.into(), choices }
    }

    pub fn is_interactive(&self) -> bool {
        !self.choices.is_empty()
    }
}

/// Address of a delivered message, needed to delete it later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageHandle {
    pub channel: Id<ChannelMarker>,
    pub message: Id<MessageMarker>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    /// The recipient does not accept messages from us.
    Denied,
    /// The message no longer exists.
    Gone,
    /// Anything else: network trouble, rate limits, malformed payloads.
    Transient,
}

impl Display for DeliveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Denied => "recipient does not accept direct messages",
            Self::Gone => "message no longer exists",
            Self::Transient => "transient delivery failure",
        })
    }
}

pub type Delivery = Result<MessageHandle, DeliveryError>;

/// The messaging capability consumed by the pipelines.
pub trait Messenger: Send + Sync + 'static {
    fn send(&self, recipient: UserId, letter: &Letter) -> impl Future<Output = Delivery> + Send;
    fn delete(&self, handle: MessageHandle) -> impl Future<Output = Result<(), DeliveryError>> + Send;
}

pub enum DeliveryTask {
    Send {
        recipient: UserId,
        letter: Letter,
        /// Where to report the delivered handle (or the failure), if anyone cares.
        reply: Option<oneshot::Sender<Delivery>>,
    },
    Delete {
        handle: MessageHandle,
    },
}

impl DeliveryTask {
    async fn execute<M: Messenger>(self, pipeline: &str, messenger: &M) {
        match self {
            Self::Send { recipient, letter, reply } => {
                let result = messenger.send(recipient, &letter).await;
                match result {
                    Ok(handle) => log::trace!("[{pipeline}] delivered message {} to {recipient}", handle.message),
                    Err(DeliveryError::Denied) => log::warn!("[{pipeline}] cannot message user {recipient}"),
                    Err(err) => log::error!("[{pipeline}] failed to message user {recipient}: {err}"),
                }
                if let Some(reply) = reply {
                    // The session may have been abandoned in the meantime.
                    let _ = reply.send(result);
                }
            }
            Self::Delete { handle } => match messenger.delete(handle).await {
                Ok(()) => log::trace!("[{pipeline}] deleted message {}", handle.message),
                Err(DeliveryError::Gone) => log::debug!("[{pipeline}] message {} already gone", handle.message),
                Err(err) => log::warn!("[{pipeline}] failed to delete message {}: {err}", handle.message),
            },
        }
    }
}

type Queue = Arc<Mutex<mpsc::UnboundedReceiver<DeliveryTask>>>;

async fn work<M: Messenger>(name: &'static str, id: usize, messenger: Arc<M>, queue: Queue, delay: Duration) {
    log::debug!("[{name}] worker {id} started");
    loop {
        let Some(task) = queue.lock().await.recv().await else {
            break;
        };
        task.execute(name, &*messenger).await;
        time::sleep(delay).await;
    }
    log::debug!("[{name}] worker {id} stopped");
}

/// Producer handle of a delivery pipeline. Cheap to clone.
#[derive(Clone)]
pub struct Pipeline {
    name: &'static str,
    queue: mpsc::UnboundedSender<DeliveryTask>,
}

impl Pipeline {
    /// Spawns `workers` workers (at least one) onto the current runtime.
    pub fn spawn<M: Messenger>(
        name: &'static str,
        messenger: Arc<M>,
        workers: usize,
        delay: Duration,
    ) -> (Self, Vec<JoinHandle<()>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let queue = Arc::new(Mutex::new(rx));
        let handles = (0..workers.max(1))
            .map(|id| tokio::spawn(work(name, id, Arc::clone(&messenger), Arc::clone(&queue), delay)))
            .collect();
        (Self { name, queue: tx }, handles)
    }

    pub fn enqueue(&self, task: DeliveryTask) -> bool {
        if self.queue.send(task).is_ok() {
            return true;
        }
        log::error!("[{}] pipeline has shut down", self.name);
        false
    }

    /// Queues a message and waits for its delivery report.
    pub async fn send(&self, recipient: UserId, letter: Letter) -> Delivery {
        let (tx, rx) = oneshot::channel();
        if !self.enqueue(DeliveryTask::Send { recipient, letter, reply: Some(tx) }) {
            return Err(DeliveryError::Transient);
        }
        rx.await.unwrap_or(Err(DeliveryError::Transient))
    }

    /// Queues a message without waiting for it.
    pub fn post(&self, recipient: UserId, letter: Letter) -> bool {
        self.enqueue(DeliveryTask::Send { recipient, letter, reply: None })
    }

    pub fn delete(&self, handle: MessageHandle) -> bool {
        self.enqueue(DeliveryTask::Delete { handle })
    }
}
