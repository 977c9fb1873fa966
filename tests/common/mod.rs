//! Common test infrastructure
//!
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::TestDispatcher;
//!
//! #[tokio::test]
//! async fn test_runs_due_job() {
//!     let dispatcher = TestDispatcher::new();
//!     let (job, completion) = dispatcher.job("socks", -1, 3600);
//!     dispatcher.dispatch(&job);
//!
//!     dispatcher.service.run_due_tick().settled().await;
//!     assert_eq!(completion.await.unwrap(), "socks");
//! }
//! ```
#![allow(dead_code)]

mod dispatcher;
mod jobs;

pub use dispatcher::TestDispatcher;
pub use jobs::RecordingJob;
