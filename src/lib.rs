//! # lamplink
//!
//! Connectivity and real-time coordination core for ambient display lamps.
//!
//! The library exists so the binary stays a thin CLI dispatcher and so the
//! internals can be exercised from integration tests with simulated radios
//! and clocks.
//!
//! ## Architecture
//!
//! - **Entry point**: [`Lamplink`] loads configuration, takes the instance
//!   lock and supervises the two execution contexts.
//! - **Network worker** (`worker`): blocking side. Drives the connectivity
//!   manager (`wifi`), server discovery (`discovery`), time sync
//!   (`time_sync`) and the sunset scheduler (`sunset`).
//! - **Render loop** (`render`): non-blocking side, polling shared state at a
//!   fixed frame rate.
//! - **Coordinator** (`coordinator`): lock-free shared state with exactly one
//!   writer per field.
//! - **Infrastructure**: `clock`, `storage`, `http`, `config`, `io`, `logger`.

#[macro_use]
pub mod logger;

pub mod args;
pub mod clock;
pub mod commands;
pub mod common;
pub mod config;
pub mod coordinator;
pub mod discovery;
pub mod error;
pub mod http;
pub mod io;
pub mod render;
pub mod storage;
pub mod sunset;
pub mod time_sync;
pub mod wifi;
pub mod worker;

mod lamplink;

pub use error::LinkError;
pub use lamplink::Lamplink;
