//! Concrete `Adapter` implementations.

pub mod console;
pub mod onebot;

pub use console::ConsoleAdapter;
pub use onebot::OnebotAdapter;
