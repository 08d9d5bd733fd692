mod determinism;
mod scoring;
