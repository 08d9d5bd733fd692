//! Quire: quality-gated, resumable long-form generation
//!
//! Entries are generated section by section through a text-generation
//! backend. Every section is scored against a rubric and corrected until it
//! passes or its attempt budget runs out; generated text is cached under the
//! fingerprint of the request that produced it, and progress is checkpointed
//! after every transition so an interrupted run resumes where it stopped.

pub mod backend;
pub mod cache;
pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod generation;
pub mod logging;
pub mod progress;
pub mod request;
pub mod validation;
