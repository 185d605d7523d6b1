use core::time::Duration;

/// Which sessions count against a quiz's attempt limit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AttemptPolicy {
    /// Only sessions that reached the final score.
    #[default]
    Completed,
    /// Every session that made it past the confirmation prompt.
    Started,
}

#[derive(Debug, Clone)]
pub struct Settings {
    /// Workers draining the send pipeline.
    pub send_workers: usize,
    /// Pause after each send, per worker.
    pub send_delay: Duration,
    /// Workers draining the delete pipeline.
    pub delete_workers: usize,
    /// Pause after each delete, per worker.
    pub delete_delay: Duration,
    /// Longest a player waits in line before giving up.
    pub admission_ceiling: Duration,
    /// How long the "ready?" prompt stays open.
    pub confirm_timeout: Duration,
    /// Delay between the final summary and the cleanup of the session's messages.
    pub cleanup_grace: Duration,
    /// Points lost per second of thinking time.
    pub decay: u32,
    /// Rows shown by the leaderboard.
    pub leaderboard: u32,
    pub attempts: AttemptPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            send_workers: 2,
            send_delay: Duration::from_millis(200),
            delete_workers: 2,
            delete_delay: Duration::from_millis(1200),
            admission_ceiling: Duration::from_secs(600),
            confirm_timeout: Duration::from_secs(30),
            cleanup_grace: Duration::from_secs(5),
            decay: 3,
            leaderboard: 5,
            attempts: AttemptPolicy::Completed,
        }
    }
}
