//! Command line front end for codelens sessions.

pub mod cli;
pub mod commands;
pub mod logging;
