//! Script handling: sandboxed execution and source scanning

pub mod lexer;
pub mod sandbox;

pub use lexer::*;
pub use sandbox::*;
