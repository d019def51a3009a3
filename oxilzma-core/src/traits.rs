//! Streaming traits shared by the LZMA writers.

use crate::error::Result;
use std::io::Write;

/// A compressing writer whose stream must be explicitly terminated.
///
/// `finish` methods that consume the writer are convenient for callers that
/// own it; container layers that only hold `&mut` use this trait instead.
/// After `try_finish` succeeds, further writes fail with
/// [`LzmaError::Finished`](crate::error::LzmaError::Finished) and repeated
/// calls to `try_finish` are no-ops.
pub trait FinishableWrite: Write {
    /// Encode all buffered input and write the end of the stream.
    fn try_finish(&mut self) -> Result<()>;
}

/// Memory usage of a coder, in KiB.
pub trait MemoryUsage {
    /// Estimated memory usage in KiB.
    fn memory_usage_kib(&self) -> u64;
}
