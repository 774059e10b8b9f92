// Library interface for the marsh shell.
// The binary, integration tests and benchmarks all drive the interpreter
// through these modules.

pub mod arithmetic;
pub mod builtins;
pub mod config;
pub mod error;
pub mod executor;
pub mod expansion;
pub mod jobs;
pub mod lexer;
pub mod parser;
pub mod runtime;
pub mod signal;
pub mod terminal;
