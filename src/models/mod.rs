//! Core data models for the local object store.
//!
//! Objects carry no persisted metadata: every value here is rebuilt from the
//! filesystem (and, where verified, from a freshly computed digest).

pub mod object;
