mod config;
mod ctl;
mod registers;
mod tracing;

pub use ctl::main as ctl_main;
