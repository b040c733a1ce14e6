//! dtrack CLI library
//!
//! Commands, output rendering and error mapping for the `dtrack` binary.

pub mod commands;
pub mod error;
pub mod logging;
pub mod output;
