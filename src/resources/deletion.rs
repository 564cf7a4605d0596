//! Deferred destruction of render resources.
//!
//! Render data may be dropped from worker threads during scene sync, but the
//! resources it owns must be released on the thread that owns the graphics
//! context. Items are pushed into a [`DeletionQueue`] from anywhere and are
//! only drained by the owning thread: the creating thread until ownership is
//! handed over with [`DeletionQueue::set_owner`].

use std::thread::{self, ThreadId};

use parking_lot::Mutex;

use crate::errors::{BatchError, Result};

pub struct DeletionQueue<T> {
    owner: ThreadId,
    pending: Mutex<Vec<T>>,
}

impl<T> Default for DeletionQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> DeletionQueue<T> {
    /// Creates a queue owned by the calling thread.
    pub fn new() -> Self {
        Self {
            owner: thread::current().id(),
            pending: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, item: T) {
        self.pending.lock().push(item);
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    pub fn owner(&self) -> ThreadId {
        self.owner
    }

    /// Hands draining over to `owner`, e.g. when render data built on a
    /// worker joins the store of the graphics thread.
    pub fn set_owner(&mut self, owner: ThreadId) {
        self.owner = owner;
    }

    /// Takes every pending item. Fails when called off the owning thread.
    pub fn drain(&self) -> Result<Vec<T>> {
        let current = thread::current().id();
        if current != self.owner {
            return Err(BatchError::ForeignThread(format!("{current:?} (owner {:?})", self.owner)));
        }
        Ok(std::mem::take(&mut *self.pending.lock()))
    }
}

impl<T> std::fmt::Debug for DeletionQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeletionQueue")
            .field("owner", &self.owner)
            .field("pending", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn only_the_owner_drains() {
        let queue = Arc::new(DeletionQueue::new());
        let remote = Arc::clone(&queue);
        let drained_remotely = thread::spawn(move || {
            remote.push(1u32);
            remote.drain().is_err()
        })
        .join()
        .unwrap();

        assert!(drained_remotely);
        assert_eq!(queue.drain().unwrap(), vec![1]);
        assert!(queue.is_empty());
    }

    #[test]
    fn ownership_can_be_handed_over() {
        let mut queue = thread::spawn(|| {
            let queue = DeletionQueue::new();
            queue.push(7u32);
            queue
        })
        .join()
        .unwrap();
        assert!(queue.drain().is_err());

        queue.set_owner(thread::current().id());
        assert_eq!(queue.owner(), thread::current().id());
        assert_eq!(queue.drain().unwrap(), vec![7]);
    }
}
