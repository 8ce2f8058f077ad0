//! The application-facing job contract.

/// A unit of work dispatched to one remote worker.
///
/// The core never inspects payloads: `get_work` produces the bytes to send
/// and `put_result` consumes the worker's raw response. The application
/// owns payload encoding on both ends, and any retry policy: a job that
/// failed to deliver may re-enqueue itself from `put_result` through a
/// pool handle it holds.
pub trait Job: Send {
    /// Produce the payload for this job.
    ///
    /// Called exactly once per successful dispatch, immediately before the
    /// send. This is the deferral hook: jobs stay cheap while queued and
    /// materialize their payload only when a worker is ready for them.
    fn get_work(&mut self) -> Vec<u8>;

    /// Consume the outcome of the dispatch attempt.
    ///
    /// `Some(bytes)` is the worker's raw response. `None` signals that the
    /// job could not be delivered (transport or protocol failure) and was
    /// not computed. Called exactly once per dispatch attempt.
    fn put_result(&mut self, result: Option<Vec<u8>>);
}

/// Owned job handle as stored on the queue.
pub type BoxedJob = Box<dyn Job>;
