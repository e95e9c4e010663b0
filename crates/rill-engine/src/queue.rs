//! Turn serialization: the queue that gives turns a linear commit
//! order, and the merge window that folds bursty transactions into the
//! turn ahead of them.
//!
//! Each queue entry owns a blocked flag and condition variable. A new
//! turn appends itself behind the tail and waits; the finishing turn
//! unblocks its successor and every caller that merged into it. A
//! transaction with the merge flag set can be appended to the tail's
//! merged list while the tail is still waiting for its own admission —
//! its caller then blocks until the host turn ends.

use std::sync::{Arc, Condvar, Mutex};

use crate::input::TransactionCtx;

/// A transaction body: runs during admission, submitting input writes
/// through the context.
pub type TransactionBody = Box<dyn FnOnce(&mut TransactionCtx) + Send>;

/// A blocked/unblocked flag with its condition variable.
#[derive(Debug)]
pub(crate) struct Blocker {
    blocked: Mutex<bool>,
    cv: Condvar,
}

impl Blocker {
    pub fn new(blocked: bool) -> Self {
        Self {
            blocked: Mutex::new(blocked),
            cv: Condvar::new(),
        }
    }

    pub fn block(&self) {
        *self.blocked.lock().expect("blocker poisoned") = true;
    }

    pub fn unblock(&self) {
        let mut blocked = self.blocked.lock().expect("blocker poisoned");
        *blocked = false;
        self.cv.notify_all();
    }

    pub fn wait(&self) {
        let mut blocked = self.blocked.lock().expect("blocker poisoned");
        while *blocked {
            blocked = self.cv.wait(blocked).expect("blocker poisoned");
        }
    }

    /// Run `f` under the state lock iff currently blocked.
    pub fn run_if_blocked(&self, f: impl FnOnce()) -> bool {
        let blocked = self.blocked.lock().expect("blocker poisoned");
        if *blocked {
            f();
            true
        } else {
            false
        }
    }
}

#[derive(Default)]
struct MergedState {
    bodies: Vec<TransactionBody>,
    callers: Vec<Arc<Blocker>>,
}

/// One turn's seat in the serializer.
pub(crate) struct QueueEntry {
    mergeable: bool,
    blocker: Blocker,
    successor: Mutex<Option<Arc<QueueEntry>>>,
    merged: Mutex<MergedState>,
}

impl QueueEntry {
    pub fn new(mergeable: bool) -> Self {
        Self {
            mergeable,
            blocker: Blocker::new(false),
            successor: Mutex::new(None),
            merged: Mutex::new(MergedState::default()),
        }
    }

    /// Chain `next` behind this entry, blocking it.
    fn append(&self, next: &Arc<QueueEntry>) {
        next.blocker.block();
        *self.successor.lock().expect("queue entry poisoned") = Some(Arc::clone(next));
    }

    /// Fold `body` into this entry if it is still waiting its turn.
    /// On success the caller's blocker has been blocked; the caller
    /// must wait on it after releasing the queue lock.
    fn try_merge(
        &self,
        body: TransactionBody,
        caller: &Arc<Blocker>,
    ) -> Result<(), TransactionBody> {
        if !self.mergeable {
            return Err(body);
        }
        let mut body = Some(body);
        let merged = self.blocker.run_if_blocked(|| {
            caller.block();
            let mut state = self.merged.lock().expect("merged state poisoned");
            state.bodies.push(body.take().expect("body consumed once"));
            state.callers.push(Arc::clone(caller));
        });
        match (merged, body) {
            (true, None) => Ok(()),
            (false, Some(body)) => Err(body),
            _ => unreachable!("merge outcome and body possession disagree"),
        }
    }

    /// Take the merged bodies to run at the end of admission. Their
    /// callers stay blocked until [`unblock_successors`].
    ///
    /// [`unblock_successors`]: QueueEntry::unblock_successors
    pub fn take_merged_bodies(&self) -> Vec<TransactionBody> {
        std::mem::take(
            &mut self
                .merged
                .lock()
                .expect("merged state poisoned")
                .bodies,
        )
    }

    /// Release every merged caller and the next queued turn.
    fn unblock_successors(&self) {
        for caller in std::mem::take(
            &mut self
                .merged
                .lock()
                .expect("merged state poisoned")
                .callers,
        ) {
            caller.unblock();
        }
        if let Some(next) = self.successor.lock().expect("queue entry poisoned").take() {
            next.blocker.unblock();
        }
    }
}

/// The serializer: a tail pointer under a mutex.
#[derive(Default)]
pub(crate) struct TurnQueue {
    tail: Mutex<Option<Arc<QueueEntry>>>,
}

impl TurnQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to fold `body` into the waiting tail turn. Blocks until the
    /// host turn ends when the merge succeeds; hands the body back when
    /// it does not.
    pub fn try_merge(&self, body: TransactionBody) -> Result<(), TransactionBody> {
        let caller = Arc::new(Blocker::new(false));
        let outcome = {
            let tail = self.tail.lock().expect("turn queue poisoned");
            match tail.as_ref() {
                Some(entry) => entry.try_merge(body, &caller),
                None => Err(body),
            }
        };
        match outcome {
            Ok(()) => {
                caller.wait();
                Ok(())
            }
            Err(body) => Err(body),
        }
    }

    /// Enter the queue and wait until this entry is at the front.
    pub fn start_turn(&self, entry: &Arc<QueueEntry>) {
        {
            let mut tail = self.tail.lock().expect("turn queue poisoned");
            if let Some(prev) = tail.as_ref() {
                prev.append(entry);
            }
            *tail = Some(Arc::clone(entry));
        }
        entry.blocker.wait();
    }

    /// Leave the queue, releasing merged callers and the successor.
    pub fn end_turn(&self, entry: &Arc<QueueEntry>) {
        let mut tail = self.tail.lock().expect("turn queue poisoned");
        entry.unblock_successors();
        if tail.as_ref().is_some_and(|t| Arc::ptr_eq(t, entry)) {
            *tail = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn lone_turn_passes_straight_through() {
        let queue = TurnQueue::new();
        let entry = Arc::new(QueueEntry::new(false));
        queue.start_turn(&entry);
        queue.end_turn(&entry);
    }

    #[test]
    fn second_turn_waits_for_first() {
        let queue = Arc::new(TurnQueue::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        let first = Arc::new(QueueEntry::new(false));
        queue.start_turn(&first);

        let handle = {
            let queue = Arc::clone(&queue);
            let order = Arc::clone(&order);
            thread::spawn(move || {
                let second = Arc::new(QueueEntry::new(false));
                queue.start_turn(&second);
                order.lock().unwrap().push("second");
                queue.end_turn(&second);
            })
        };

        // Give the second thread time to reach the queue.
        thread::sleep(Duration::from_millis(50));
        order.lock().unwrap().push("first");
        queue.end_turn(&first);
        handle.join().unwrap();

        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn merge_rejected_when_queue_empty() {
        let queue = TurnQueue::new();
        let body: TransactionBody = Box::new(|_| {});
        assert!(queue.try_merge(body).is_err());
    }

    #[test]
    fn merge_rejected_by_non_mergeable_tail() {
        let queue = TurnQueue::new();
        let entry = Arc::new(QueueEntry::new(false));
        queue.start_turn(&entry);
        let body: TransactionBody = Box::new(|_| {});
        assert!(queue.try_merge(body).is_err());
        queue.end_turn(&entry);
    }

    #[test]
    fn merge_rejected_once_tail_is_running() {
        // A mergeable tail that has already been unblocked (it is the
        // running turn) must not accept merges.
        let queue = TurnQueue::new();
        let entry = Arc::new(QueueEntry::new(true));
        queue.start_turn(&entry);
        let body: TransactionBody = Box::new(|_| {});
        assert!(queue.try_merge(body).is_err());
        queue.end_turn(&entry);
    }

    #[test]
    fn merged_body_joins_waiting_tail() {
        let queue = Arc::new(TurnQueue::new());
        let ran = Arc::new(AtomicUsize::new(0));

        // Occupy the queue so the mergeable turn behind it stays blocked.
        let head = Arc::new(QueueEntry::new(false));
        queue.start_turn(&head);

        let waiting = Arc::new(QueueEntry::new(true));
        let waiter = {
            let queue = Arc::clone(&queue);
            let waiting = Arc::clone(&waiting);
            let ran = Arc::clone(&ran);
            thread::spawn(move || {
                queue.start_turn(&waiting);
                // Admission: run merged bodies.
                let mut ctx = TransactionCtx::new();
                for body in waiting.take_merged_bodies() {
                    body(&mut ctx);
                }
                ran.fetch_add(1, Ordering::SeqCst);
                queue.end_turn(&waiting);
            })
        };

        thread::sleep(Duration::from_millis(50));

        let merger = {
            let queue = Arc::clone(&queue);
            let ran = Arc::clone(&ran);
            thread::spawn(move || {
                let ran_inner = Arc::clone(&ran);
                let body: TransactionBody = Box::new(move |_| {
                    ran_inner.fetch_add(10, Ordering::SeqCst);
                });
                // Blocks until the host turn ends.
                queue
                    .try_merge(body)
                    .unwrap_or_else(|_| panic!("tail is mergeable and waiting"));
                assert!(ran.load(Ordering::SeqCst) >= 11);
            })
        };

        thread::sleep(Duration::from_millis(50));
        queue.end_turn(&head);
        waiter.join().unwrap();
        merger.join().unwrap();
        assert_eq!(ran.load(Ordering::SeqCst), 11);
    }
}
