// src/display/mod.rs
//! Display front ends

pub mod terminal;

pub use terminal::TerminalDisplay;
