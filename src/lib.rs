//! Wishlist Server Library
//!
//! Background job dispatching for the gift-wishlist backend, plus the
//! notification, configuration and metrics pieces it runs with.

pub mod background_jobs;
pub mod config;
pub mod metrics;
pub mod notifications;

// Re-export commonly used types for convenience
pub use background_jobs::{
    create_dispatcher, BaseJob, Completion, DispatcherHandle, DispatchingService, Job, JobBase,
    JobContext, JobError, JobId,
};
