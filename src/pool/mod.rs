//! Pool module - batch runner and directory scanner.

mod runner;
mod scanner;

pub use runner::*;
pub use scanner::*;
