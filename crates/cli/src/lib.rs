//! Command implementations behind the `notesweep` binary.
pub mod commands;
