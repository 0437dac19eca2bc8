//! Library entry point: the five pipeline drivers behind the CLI.

pub mod application;

pub use application::run;
