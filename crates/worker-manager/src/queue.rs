//! Bounded multi-producer, multi-consumer task queue
//!
//! Capacity is enforced with a `slots` semaphore acquired before an item is
//! pushed and released after it is popped; a second `ready` semaphore counts
//! queued items so consumers wait without holding a lock. Completion tracking
//! lives in a `watch` channel so [`TaskQueue::join`] can observe the
//! unfinished count reaching zero without polling.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::{watch, Semaphore, TryAcquireError};

use crate::error::{GetError, QueueError, TooManyDone, WorkerManagerError};

struct Inner<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Bounded FIFO queue with drain support
///
/// # Example
///
/// ```
/// # tokio_test::block_on(async {
/// use async_worker_manager::TaskQueue;
///
/// let queue = TaskQueue::new(2).unwrap();
/// queue.put("a").await.unwrap();
/// queue.put_nowait("b").unwrap();
/// assert!(queue.put_nowait("c").is_err());
///
/// assert_eq!(queue.get().await.unwrap(), "a");
/// queue.mark_done().unwrap();
/// assert_eq!(queue.get().await.unwrap(), "b");
/// queue.mark_done().unwrap();
///
/// queue.join().await;
/// # });
/// ```
pub struct TaskQueue<T> {
    capacity: usize,
    inner: Mutex<Inner<T>>,
    slots: Semaphore,
    ready: Semaphore,
    unfinished: watch::Sender<usize>,
}

impl<T> TaskQueue<T> {
    /// Create a queue holding at most `capacity` items
    pub fn new(capacity: usize) -> Result<Self, WorkerManagerError> {
        if capacity == 0 {
            return Err(WorkerManagerError::config(
                "queue capacity must be at least 1",
            ));
        }
        if capacity > Semaphore::MAX_PERMITS {
            return Err(WorkerManagerError::config(format!(
                "queue capacity must be at most {}",
                Semaphore::MAX_PERMITS
            )));
        }

        let (unfinished, _) = watch::channel(0);

        Ok(Self {
            capacity,
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                closed: false,
            }),
            slots: Semaphore::new(capacity),
            ready: Semaphore::new(0),
            unfinished,
        })
    }

    /// Enqueue a task, waiting while the queue is at capacity
    ///
    /// Fails only when the queue is closed, handing the task back.
    pub async fn put(&self, task: T) -> Result<(), QueueError<T>> {
        match self.slots.acquire().await {
            Ok(permit) => {
                permit.forget();
                self.push(task)
            }
            Err(_) => Err(QueueError::Closed(task)),
        }
    }

    /// Enqueue a task without waiting
    pub fn put_nowait(&self, task: T) -> Result<(), QueueError<T>> {
        match self.slots.try_acquire() {
            Ok(permit) => {
                permit.forget();
                self.push(task)
            }
            Err(TryAcquireError::NoPermits) => Err(QueueError::Full(task)),
            Err(TryAcquireError::Closed) => Err(QueueError::Closed(task)),
        }
    }

    /// Dequeue the oldest task, waiting until one is available
    ///
    /// Once the queue is closed, remaining items are still handed out; after
    /// the last one, every call fails with [`GetError`].
    pub async fn get(&self) -> Result<T, GetError> {
        let permit = self.ready.acquire().await.map_err(|_| GetError)?;
        permit.forget();

        let mut inner = self.inner.lock();
        let task = inner.items.pop_front().ok_or(GetError)?;
        if inner.closed && inner.items.is_empty() {
            self.ready.close();
        }
        drop(inner);

        self.slots.add_permits(1);
        Ok(task)
    }

    /// Record that one dequeued task has finished processing
    pub fn mark_done(&self) -> Result<(), TooManyDone> {
        let mut result = Ok(());
        self.unfinished.send_if_modified(|unfinished| {
            if *unfinished == 0 {
                result = Err(TooManyDone);
                false
            } else {
                *unfinished -= 1;
                true
            }
        });
        result
    }

    /// Wait until every enqueued task has been marked done
    ///
    /// Tasks enqueued while waiting are awaited too.
    pub async fn join(&self) {
        let mut rx = self.unfinished.subscribe();
        // The sender lives in `self`, so `wait_for` cannot observe a closed channel.
        let _ = rx.wait_for(|unfinished| *unfinished == 0).await;
    }

    /// Stop accepting new tasks
    ///
    /// Producers blocked in [`put`](Self::put) are woken with
    /// [`QueueError::Closed`]. Items already queued remain available to
    /// consumers.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        self.slots.close();
        if inner.items.is_empty() {
            self.ready.close();
        }
    }

    /// Whether [`close`](Self::close) has been called
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Number of queued items
    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    /// Whether no items are queued
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the queue is at capacity
    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    /// Maximum number of queued items
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Items enqueued but not yet marked done
    pub fn unfinished(&self) -> usize {
        *self.unfinished.borrow()
    }

    fn push(&self, task: T) -> Result<(), QueueError<T>> {
        let mut inner = self.inner.lock();
        if inner.closed {
            drop(inner);
            self.slots.add_permits(1);
            return Err(QueueError::Closed(task));
        }

        // Count before the item becomes visible so a consumer never marks
        // done an item that is not yet counted.
        self.unfinished.send_modify(|unfinished| *unfinished += 1);
        inner.items.push_back(task);
        self.ready.add_permits(1);
        Ok(())
    }
}

impl<T> std::fmt::Debug for TaskQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .field("unfinished", &self.unfinished())
            .field("closed", &self.is_closed())
            .finish()
    }
}
