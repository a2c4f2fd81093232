//! REPL tooling shared between firmware and emulator targets.
//!
//! The line grammar lives in [`grammar`] and is parsed with `winnow` so it
//! stays `no_std` compatible.

pub mod catalog;
pub mod commands;
pub mod grammar;
pub mod status;
