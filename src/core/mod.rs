//! Core domain types shared across the queue, workers, and observer.

pub mod job;
pub mod types;
