//! CLI command implementations. Each returns the text to print.

pub mod check_config;
pub mod inspect;
pub mod verify;
