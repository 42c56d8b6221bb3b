//! The command object handed to the worker pool
//!
//! A [`Command`] carries the text to send, an optional issuer, and the
//! machinery a worker uses to deliver the outcome: a single-assignment
//! outcome cell plus a completion signal that any number of tasks can wait
//! on without consuming the result. Dependencies are references to other
//! commands that must settle before this one may be sent.

use crate::error::RconError;
use crate::issuer::Issuer;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use tokio::sync::watch;

/// A command destined for the RCON server
///
/// Settlement happens exactly once: the first of `set_result` / `set_error`
/// wins and every later call is ignored. The completion signal fires for
/// every settled command, so other commands may depend on one whose outcome
/// nobody ever awaits.
pub struct Command {
    text: String,
    issuer: Option<Issuer>,
    id: i32,
    dependencies: Mutex<Vec<Arc<Command>>>,
    outcome: OnceLock<Result<String, RconError>>,
    done: watch::Sender<bool>,
}

impl Command {
    /// Create a standalone command with no issuer and id 0
    pub fn new(text: impl Into<String>) -> Arc<Self> {
        Self::with_details(text, None, 0)
    }

    /// Create a command with an issuer and a batch id
    ///
    /// Ids only matter within a job, where nonzero ids must be unique;
    /// standalone commands use 0.
    pub fn with_details(text: impl Into<String>, issuer: Option<Issuer>, id: i32) -> Arc<Self> {
        let (done, _) = watch::channel(false);
        Arc::new(Self {
            text: text.into(),
            issuer,
            id,
            dependencies: Mutex::new(Vec::new()),
            outcome: OnceLock::new(),
            done,
        })
    }

    /// The command string sent verbatim to the server
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Who issued the command, if anyone
    pub fn issuer(&self) -> Option<&Issuer> {
        self.issuer.as_ref()
    }

    /// Batch id; 0 outside of jobs
    pub fn id(&self) -> i32 {
        self.id
    }

    /// Record a command this one must wait for
    ///
    /// Only legal before the command is submitted to a pool; workers snapshot
    /// the list when they dequeue.
    pub fn add_dependency(&self, dependency: &Arc<Command>) {
        self.dependencies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(dependency));
    }

    /// Snapshot of the dependency list
    pub fn dependencies(&self) -> Vec<Arc<Command>> {
        self.dependencies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn settle(&self, outcome: Result<String, RconError>) -> bool {
        let won = self.outcome.set(outcome).is_ok();
        if won {
            // Signal completion only after the cell is written, so waiters
            // that wake always observe the outcome.
            let _ = self.done.send(true);
        }
        won
    }

    /// Settle successfully with the server's response
    ///
    /// Returns whether this call performed the settlement; ignored if the
    /// command was already settled.
    pub fn set_result(&self, response: impl Into<String>) -> bool {
        self.settle(Ok(response.into()))
    }

    /// Settle with an error; ignored if already settled
    pub fn set_error(&self, error: RconError) -> bool {
        self.settle(Err(error))
    }

    /// Whether the command has reached a terminal outcome
    pub fn is_settled(&self) -> bool {
        self.outcome.get().is_some()
    }

    /// The recorded outcome, if the command has settled
    pub fn outcome(&self) -> Option<Result<String, RconError>> {
        self.outcome.get().cloned()
    }

    /// Wait until the command settles, without consuming the outcome
    pub async fn wait_settled(&self) {
        let mut done = self.done.subscribe();
        // The sender lives in `self`, so `changed` cannot fail while we
        // hold a reference to the command.
        while !*done.borrow_and_update() {
            if done.changed().await.is_err() {
                break;
            }
        }
    }

    /// Wait for settlement and return the outcome
    pub async fn result(&self) -> Result<String, RconError> {
        let mut done = self.done.subscribe();
        loop {
            if let Some(outcome) = self.outcome.get() {
                return outcome.clone();
            }
            let _ = done.changed().await;
        }
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("text", &self.text)
            .field("issuer", &self.issuer)
            .field("id", &self.id)
            .field("settled", &self.is_settled())
            .finish()
    }
}
