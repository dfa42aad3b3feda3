//! Process-level I/O: single-instance lock and signal handling.

pub mod lock;
pub mod signals;
