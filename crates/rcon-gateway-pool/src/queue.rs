//! Shared command queue
//!
//! An unbounded FIFO with the extra operations the shutdown state machine
//! needs: an unfinished-work counter with `join`, an atomic close-and-drain,
//! and refusal of pushes once closed. Built from a mutex and two `Notify`
//! condvars; the wait loops register interest before re-checking state so a
//! notification between the check and the await is never lost.

use rcon_gateway_core::Command;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

#[derive(Default)]
struct Inner {
    items: VecDeque<Arc<Command>>,
    unfinished: usize,
    closed: bool,
}

/// FIFO of commands shared between submitters and workers
#[derive(Default)]
pub struct CommandQueue {
    inner: Mutex<Inner>,
    item_pushed: Notify,
    work_finished: Notify,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue one command; refused once the queue is closed
    pub fn push(&self, command: Arc<Command>) -> bool {
        {
            let mut inner = self.lock();
            if inner.closed {
                return false;
            }
            inner.items.push_back(command);
            inner.unfinished += 1;
        }
        self.item_pushed.notify_waiters();
        true
    }

    /// Enqueue a batch in one critical section, so a sorted job can never
    /// interleave with a concurrent submission
    pub fn push_all(&self, commands: Vec<Arc<Command>>) -> bool {
        {
            let mut inner = self.lock();
            if inner.closed {
                return false;
            }
            inner.unfinished += commands.len();
            inner.items.extend(commands);
        }
        self.item_pushed.notify_waiters();
        true
    }

    /// Wait for the next command; `None` once the queue is closed and empty
    pub async fn pop(&self) -> Option<Arc<Command>> {
        loop {
            let waiter = self.item_pushed.notified();
            tokio::pin!(waiter);
            waiter.as_mut().enable();
            {
                let mut inner = self.lock();
                if let Some(command) = inner.items.pop_front() {
                    return Some(command);
                }
                if inner.closed {
                    return None;
                }
            }
            waiter.await;
        }
    }

    /// Mark one previously popped command as fully processed
    pub fn task_done(&self) {
        let all_done = {
            let mut inner = self.lock();
            inner.unfinished = inner.unfinished.saturating_sub(1);
            inner.unfinished == 0
        };
        if all_done {
            self.work_finished.notify_waiters();
        }
    }

    /// Wait until every pushed command has been marked done
    pub async fn join(&self) {
        loop {
            let waiter = self.work_finished.notified();
            tokio::pin!(waiter);
            waiter.as_mut().enable();
            if self.lock().unfinished == 0 {
                return;
            }
            waiter.await;
        }
    }

    /// Close the queue and hand back whatever never got dequeued
    ///
    /// One critical section: a racing push either lands before the close and
    /// is returned here, or observes the closed flag and is refused. Either
    /// way no command is left stranded unsettled. Waiting poppers wake and
    /// observe the closed flag.
    pub fn close(&self) -> Vec<Arc<Command>> {
        let drained: Vec<_> = {
            let mut inner = self.lock();
            inner.closed = true;
            let remaining = inner.items.len();
            inner.unfinished = inner.unfinished.saturating_sub(remaining);
            inner.items.drain(..).collect()
        };
        self.item_pushed.notify_waiters();
        self.work_finished.notify_waiters();
        drained
    }

    /// Commands currently waiting to be dequeued
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready, task};

    #[tokio::test]
    async fn pop_returns_pushed_commands_in_order() {
        let queue = CommandQueue::new();
        assert!(queue.push(Command::new("first")));
        assert!(queue.push(Command::new("second")));

        assert_eq!(queue.pop().await.unwrap().text(), "first");
        assert_eq!(queue.pop().await.unwrap().text(), "second");
        assert!(queue.is_empty());
    }

    #[test]
    fn pop_blocks_until_a_push_arrives() {
        let queue = CommandQueue::new();
        let mut pop = task::spawn(queue.pop());
        assert_pending!(pop.poll());

        queue.push(Command::new("late"));

        let popped = assert_ready!(pop.poll()).unwrap();
        assert_eq!(popped.text(), "late");
    }

    #[test]
    fn close_wakes_blocked_poppers_with_none() {
        let queue = CommandQueue::new();
        let mut pop = task::spawn(queue.pop());
        assert_pending!(pop.poll());

        assert!(queue.close().is_empty());

        assert!(assert_ready!(pop.poll()).is_none());
    }

    #[tokio::test]
    async fn close_drains_remaining_commands_and_refuses_pushes() {
        let queue = CommandQueue::new();
        queue.push(Command::new("a"));
        queue.push(Command::new("b"));

        let drained = queue.close();
        assert_eq!(drained.len(), 2);
        assert!(queue.is_empty());

        assert!(!queue.push(Command::new("too late")));
        assert!(queue.pop().await.is_none());
    }

    #[test]
    fn join_waits_for_task_done() {
        let queue = CommandQueue::new();
        queue.push(Command::new("work"));

        let mut join = task::spawn(queue.join());
        assert_pending!(join.poll());

        assert_ready!(task::spawn(queue.pop()).poll()).unwrap();
        queue.task_done();
        assert_ready!(join.poll());
    }

    #[tokio::test]
    async fn join_returns_immediately_when_idle() {
        let queue = CommandQueue::new();
        queue.join().await;
    }

    #[tokio::test]
    async fn batch_push_keeps_order() {
        let queue = CommandQueue::new();
        let commands = vec![Command::new("1"), Command::new("2"), Command::new("3")];
        assert!(queue.push_all(commands));
        assert_eq!(queue.len(), 3);

        assert_eq!(queue.pop().await.unwrap().text(), "1");
        assert_eq!(queue.pop().await.unwrap().text(), "2");
        assert_eq!(queue.pop().await.unwrap().text(), "3");
    }
}
