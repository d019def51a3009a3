//! # OxiLZMA Core
//!
//! Core components shared by the OxiLZMA codec crates:
//!
//! - [`error`]: the [`LzmaError`] type and `Result` alias
//! - [`crc`]: the CRC-32 table used by the match-finder hashes
//! - [`traits`]: streaming traits implemented by the writers and coders
//!
//! ## Example
//!
//! ```rust
//! use oxilzma_core::{CRC32_TABLE, LzmaError};
//!
//! assert_eq!(CRC32_TABLE[1], 0x77073096);
//!
//! let err = LzmaError::corrupted("bad control byte");
//! assert!(err.is_corruption());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod crc;
pub mod error;
pub mod traits;

// Re-exports for convenience
pub use crc::CRC32_TABLE;
pub use error::{LzmaError, Result};
pub use traits::{FinishableWrite, MemoryUsage};
