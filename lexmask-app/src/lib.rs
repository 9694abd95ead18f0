//! Console front end: command line, console display and stdin input, the
//! JSON Lines record store, and per-subject exports.

pub mod app;
pub mod cli;
pub mod console;
pub mod export;
pub mod report;
pub mod store;

pub use cli::{Cli, Command};
