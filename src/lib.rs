//! devolve - distributed work dispatch over TCP.
//!
//! A long-lived "boss" process hands opaque work units to a dynamic set of
//! "worker" processes and collects their results. The boss exposes an
//! in-process job-queue API to application code; workers are separate OS
//! processes that connect inbound on a well-known port, announce
//! themselves, and then serve framed request/response rounds until the
//! boss tells them to quit.
//!
//! # Architecture
//!
//! ```text
//!        application threads
//!               │ add(job)
//!               ▼
//!        ┌─────────────┐     ┌──────────┐
//!        │  job queue  │◄────│   Pool   │ close() publishes quit
//!        └──────┬──────┘     └────┬─────┘
//!               │ get             │ Pool::start
//!    ┌──────────┼──────────┐      ▼
//!    │          │          │ ┌──────────┐ accepts + handshakes
//! ┌──▼───┐  ┌───▼──┐  ┌────▼─┐ listener │ spawns one proxy per worker
//! │proxy │  │proxy │  │proxy ││  thread  │
//! └──┬───┘  └──┬───┘  └──┬───┘└──────────┘
//!    │ TCP     │ TCP     │ TCP
//! ┌──▼───┐  ┌──▼───┐  ┌──▼───┐
//! │worker│  │worker│  │worker│   (separate processes)
//! └──────┘  └──────┘  └──────┘
//! ```
//!
//! Each proxy drains the shared queue one job at a time: `get_work()`
//! produces the payload, the framed codec ships it and collects the
//! worker's response, `put_result()` delivers it back to the application.
//! Failures on one connection never disturb the others. Shutdown is
//! two-phase: [`Pool::close`] publishes a quit token that every proxy
//! observes and re-publishes, and [`Pool::join`] waits for the listener
//! to join them all.
//!
//! # Example
//!
//! ```no_run
//! use devolve::{Job, Pool, PoolConfig};
//!
//! struct Checksum {
//!     input: Vec<u8>,
//! }
//!
//! impl Job for Checksum {
//!     fn get_work(&mut self) -> Vec<u8> {
//!         self.input.clone()
//!     }
//!
//!     fn put_result(&mut self, result: Option<Vec<u8>>) {
//!         match result {
//!             Some(bytes) => println!("worker answered {} bytes", bytes.len()),
//!             None => eprintln!("delivery failed"),
//!         }
//!     }
//! }
//!
//! fn main() -> devolve::Result<()> {
//!     let pool = Pool::start(PoolConfig::default())?;
//!     pool.add(Checksum { input: b"hello".to_vec() });
//!     pool.close();
//!     let stats = pool.join()?;
//!     println!("{} jobs completed", stats.jobs_completed);
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod job;
mod listener;
pub mod logging;
pub mod pool;
mod proxy;
mod queue;

pub use config::PoolConfig;
pub use error::{DevolveError, Result};
pub use job::{BoxedJob, Job};
pub use pool::{Pool, PoolStats};
pub use proxy::{ProxyReport, ProxyStatus};
