//! Terminal output.

pub mod actor;

pub use actor::{ConsoleReporter, UiEvent};
