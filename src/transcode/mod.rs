//! External encoder invocation: argument policy and process supervision.

pub mod args;
mod supervisor;

pub use supervisor::{ExitOutcome, ProcessHandle, Supervisor};
