//! Bounded blocking job queue shared by the pool and its worker proxies.

#![allow(dead_code)] // Some accessors are for tests and monitoring

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

/// One item handed to a queue consumer.
#[derive(Debug, PartialEq, Eq)]
pub enum Queued<T> {
    /// The oldest pending job.
    Work(T),
    /// The quit token: the consumer must re-publish it and terminate.
    Quit,
}

struct QueueState<T> {
    items: VecDeque<T>,
    quit: bool,
}

/// Bounded blocking FIFO with a re-publishable quit token.
///
/// Jobs are handed off first-in first-out; `put` blocks while the queue is
/// at capacity and `get` blocks while it has nothing to hand out. The quit
/// token is out-of-band of the FIFO: it does not consume capacity, and once
/// published it is observed by consumers ahead of any queued job, so
/// shutdown drains only in-flight work. Every consumer that observes the
/// token re-publishes it before terminating, which guarantees all
/// consumers eventually see it and exactly one token is left behind.
///
/// Safe under many concurrent producers and consumers.
pub struct JobQueue<T> {
    state: Mutex<QueueState<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

impl<T> JobQueue<T> {
    /// Create a queue with the given capacity.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be at least 1");
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity.min(1024)),
                quit: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
        }
    }

    /// Append an item, blocking while the queue is full.
    pub fn put(&self, item: T) {
        let mut state = self.state.lock().expect("job queue mutex poisoned");
        while state.items.len() >= self.capacity {
            state = self
                .not_full
                .wait(state)
                .expect("job queue mutex poisoned");
        }
        state.items.push_back(item);
        self.not_empty.notify_one();
    }

    /// Publish the quit token, waking every blocked consumer.
    ///
    /// Publishing is monotonic and does not consume queue capacity, so it
    /// never blocks and a published token is never lost.
    pub fn put_quit(&self) {
        let mut state = self.state.lock().expect("job queue mutex poisoned");
        state.quit = true;
        self.not_empty.notify_all();
    }

    /// Take the next item, blocking while there is nothing to hand out.
    ///
    /// A published quit token is observed ahead of any queued job and is
    /// consumed by the observer, which is expected to re-publish it via
    /// [`put_quit`](Self::put_quit) before terminating.
    pub fn get(&self) -> Queued<T> {
        let mut state = self.state.lock().expect("job queue mutex poisoned");
        loop {
            if state.quit {
                state.quit = false;
                return Queued::Quit;
            }
            if let Some(item) = state.items.pop_front() {
                self.not_full.notify_one();
                return Queued::Work(item);
            }
            state = self
                .not_empty
                .wait(state)
                .expect("job queue mutex poisoned");
        }
    }

    /// Number of jobs currently queued (the quit token does not count).
    pub fn len(&self) -> usize {
        self.state
            .lock()
            .expect("job queue mutex poisoned")
            .items
            .len()
    }

    /// True when no jobs are queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// True when a quit token is published and not yet consumed.
    pub fn quit_pending(&self) -> bool {
        self.state.lock().expect("job queue mutex poisoned").quit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_fifo_order() {
        let queue = JobQueue::new(8);
        queue.put(1);
        queue.put(2);
        queue.put(3);
        assert_eq!(queue.get(), Queued::Work(1));
        assert_eq!(queue.get(), Queued::Work(2));
        assert_eq!(queue.get(), Queued::Work(3));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_put_blocks_at_capacity() {
        let queue = Arc::new(JobQueue::new(2));
        let published = Arc::new(AtomicUsize::new(0));

        let producer = {
            let queue = Arc::clone(&queue);
            let published = Arc::clone(&published);
            thread::spawn(move || {
                for i in 0..3 {
                    queue.put(i);
                    published.fetch_add(1, Ordering::SeqCst);
                }
            })
        };

        thread::sleep(Duration::from_millis(100));
        assert_eq!(published.load(Ordering::SeqCst), 2, "third put must block");
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.get(), Queued::Work(0));
        producer.join().unwrap();
        assert_eq!(published.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_get_blocks_until_put() {
        let queue = Arc::new(JobQueue::new(2));

        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.get())
        };

        thread::sleep(Duration::from_millis(50));
        queue.put(42);
        assert_eq!(consumer.join().unwrap(), Queued::Work(42));
    }

    #[test]
    fn test_quit_observed_ahead_of_queued_jobs() {
        let queue = JobQueue::new(8);
        queue.put("job");
        queue.put_quit();
        assert_eq!(queue.get(), Queued::Quit);
        // The job is still queued behind the token.
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.get(), Queued::Work("job"));
    }

    #[test]
    fn test_quit_does_not_consume_capacity() {
        let queue = JobQueue::new(1);
        queue.put(7);
        // Queue is full; the token still goes in without blocking.
        queue.put_quit();
        assert!(queue.quit_pending());
        assert_eq!(queue.get(), Queued::Quit);
    }

    #[test]
    fn test_quit_republish_terminates_all_consumers() {
        let queue: Arc<JobQueue<u32>> = Arc::new(JobQueue::new(16));
        let drained = Arc::new(AtomicUsize::new(0));

        let consumers: Vec<_> = (0..3)
            .map(|_| {
                let queue = Arc::clone(&queue);
                let drained = Arc::clone(&drained);
                thread::spawn(move || {
                    loop {
                        match queue.get() {
                            Queued::Work(_) => {
                                drained.fetch_add(1, Ordering::SeqCst);
                            }
                            Queued::Quit => {
                                queue.put_quit();
                                break;
                            }
                        }
                    }
                })
            })
            .collect();

        for i in 0..5 {
            queue.put(i);
        }
        // Let consumers drain before publishing the token so every job is
        // handed out.
        while drained.load(Ordering::SeqCst) < 5 {
            thread::sleep(Duration::from_millis(5));
        }
        queue.put_quit();

        for consumer in consumers {
            consumer.join().unwrap();
        }
        assert_eq!(drained.load(Ordering::SeqCst), 5);
        assert!(queue.quit_pending(), "exactly one token remains");
        assert!(queue.is_empty());
    }

    #[test]
    fn test_concurrent_producers_and_consumers() {
        let queue: Arc<JobQueue<usize>> = Arc::new(JobQueue::new(4));
        let seen = Arc::new(AtomicUsize::new(0));

        let producers: Vec<_> = (0..4)
            .map(|p| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for i in 0..25 {
                        queue.put(p * 25 + i);
                    }
                })
            })
            .collect();

        let consumers: Vec<_> = (0..3)
            .map(|_| {
                let queue = Arc::clone(&queue);
                let seen = Arc::clone(&seen);
                thread::spawn(move || {
                    loop {
                        match queue.get() {
                            Queued::Work(_) => {
                                seen.fetch_add(1, Ordering::SeqCst);
                            }
                            Queued::Quit => {
                                queue.put_quit();
                                break;
                            }
                        }
                    }
                })
            })
            .collect();

        for producer in producers {
            producer.join().unwrap();
        }
        while seen.load(Ordering::SeqCst) < 100 {
            thread::sleep(Duration::from_millis(5));
        }
        queue.put_quit();
        for consumer in consumers {
            consumer.join().unwrap();
        }
        assert_eq!(seen.load(Ordering::SeqCst), 100);
    }

    #[test]
    #[should_panic(expected = "capacity must be at least 1")]
    fn test_zero_capacity_panics() {
        let _: JobQueue<u32> = JobQueue::new(0);
    }
}
