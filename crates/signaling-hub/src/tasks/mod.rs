//! Background supervisor tasks, orthogonal to event handling.

pub mod sweeper;

pub use sweeper::start_supervisor;
