// Common utilities and abstractions module

pub mod constants;
pub mod utils;
