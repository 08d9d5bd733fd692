//! Integration tests for the quire generation pipeline

mod batch_runs;
mod bounded_correction;
mod cache_concurrency;
mod checkpoint_monotonicity;
mod cli_workflow;
mod correction_scenario;
mod resume_equivalence;
mod test_utils;
