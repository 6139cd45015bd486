//! Data types shared by the walguard crates.
//!
//! This crate holds the pieces of the engine's on-disk vocabulary that a backup
//! coordinator and a backup tool have to agree on byte for byte: WAL positions,
//! timelines, segment file names, and the backup label text.
//!
//! # Design Philosophy
//!
//! Types in this crate are:
//! * Pure data: no locking, no engine access, no I/O
//! * Stable: the rendered forms are read back by external tools
//!
//! The session lifecycle built on top of these types lives in `walguard`.

pub mod label;
pub mod wal;

pub use label::*;
pub use wal::*;
