//! Job orchestration: the stage machine, the runner that drives it, and pack export.

pub mod export;
pub mod job;
pub mod runner;
