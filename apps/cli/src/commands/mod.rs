//! Command implementations for the Titanic CLI.

pub mod evaluate;
pub mod models;
pub mod predict;
pub mod prepare;
pub mod runs;
pub mod train;
