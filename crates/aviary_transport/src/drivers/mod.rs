//! Concrete `Driver` implementations.

pub mod console;
pub mod reversews;

pub use console::ConsoleDriver;
pub use reversews::ReverseWsDriver;
