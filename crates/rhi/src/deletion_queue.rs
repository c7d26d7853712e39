//! Deferred resource destruction.
//!
//! A [`DeletionQueue`] collects cleanup actions and runs them last-in
//! first-out when flushed, so a resource registered after its dependencies is
//! destroyed before them. RAII resources can be pushed directly with
//! [`DeletionQueue::push_drop`]; dropping them is their cleanup.
//!
//! # Example
//!
//! ```
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use ember_rhi::deletion_queue::DeletionQueue;
//!
//! let log = Rc::new(RefCell::new(Vec::new()));
//! let mut queue = DeletionQueue::new();
//! for name in ["image", "view"] {
//!     let log = log.clone();
//!     queue.push(move || log.borrow_mut().push(name));
//! }
//! queue.flush();
//! assert_eq!(*log.borrow(), vec!["view", "image"]);
//! ```

use tracing::{debug, trace};

/// Ordered list of cleanup actions, executed in reverse registration order.
#[derive(Default)]
pub struct DeletionQueue {
    deletors: Vec<Box<dyn FnOnce()>>,
}

impl DeletionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a cleanup action.
    pub fn push<F>(&mut self, deletor: F)
    where
        F: FnOnce() + 'static,
    {
        self.deletors.push(Box::new(deletor));
    }

    /// Registers an owned resource whose `Drop` performs the cleanup.
    pub fn push_drop<T: 'static>(&mut self, resource: T) {
        self.push(move || drop(resource));
    }

    /// Runs every action, newest first, and empties the queue.
    pub fn flush(&mut self) {
        if self.deletors.is_empty() {
            return;
        }
        trace!("Flushing {} deferred deletion(s)", self.deletors.len());
        while let Some(deletor) = self.deletors.pop() {
            deletor();
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.deletors.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.deletors.is_empty()
    }
}

impl Drop for DeletionQueue {
    fn drop(&mut self) {
        if !self.deletors.is_empty() {
            debug!(
                "Deletion queue dropped with {} pending action(s), flushing",
                self.deletors.len()
            );
            self.flush();
        }
    }
}

impl std::fmt::Debug for DeletionQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeletionQueue")
            .field("pending", &self.deletors.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn recorder() -> (Rc<RefCell<Vec<&'static str>>>, DeletionQueue) {
        (Rc::new(RefCell::new(Vec::new())), DeletionQueue::new())
    }

    #[test]
    fn test_flush_runs_in_reverse_order() {
        let (log, mut queue) = recorder();
        for name in ["A", "B", "C"] {
            let log = log.clone();
            queue.push(move || log.borrow_mut().push(name));
        }
        assert_eq!(queue.len(), 3);

        queue.flush();
        assert_eq!(*log.borrow(), vec!["C", "B", "A"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_second_flush_is_noop() {
        let (log, mut queue) = recorder();
        let counter = log.clone();
        queue.push(move || counter.borrow_mut().push("once"));

        queue.flush();
        queue.flush();
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn test_flush_empty_queue() {
        let mut queue = DeletionQueue::new();
        queue.flush();
        assert!(queue.is_empty());
    }

    #[test]
    fn test_push_drop_releases_resource() {
        struct Tracked(Rc<RefCell<Vec<&'static str>>>);
        impl Drop for Tracked {
            fn drop(&mut self) {
                self.0.borrow_mut().push("dropped");
            }
        }

        let (log, mut queue) = recorder();
        queue.push_drop(Tracked(log.clone()));
        assert!(log.borrow().is_empty());
        queue.flush();
        assert_eq!(*log.borrow(), vec!["dropped"]);
    }

    #[test]
    fn test_actions_pushed_after_flush_run_next_time() {
        let (log, mut queue) = recorder();
        let first = log.clone();
        queue.push(move || first.borrow_mut().push("frame0"));
        queue.flush();

        let second = log.clone();
        queue.push(move || second.borrow_mut().push("frame1"));
        queue.flush();

        assert_eq!(*log.borrow(), vec!["frame0", "frame1"]);
    }

    #[test]
    fn test_drop_flushes_pending() {
        let (log, mut queue) = recorder();
        let pending = log.clone();
        queue.push(move || pending.borrow_mut().push("pending"));
        drop(queue);
        assert_eq!(*log.borrow(), vec!["pending"]);
    }
}
