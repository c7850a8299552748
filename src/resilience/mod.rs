//! Retry helpers for the cache primary.

pub mod retry;
