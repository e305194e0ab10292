/// Per-direction configuration for a [`crate::Pipe`]: buffer pool sizing and
/// the high/low watermark pair.
///
/// # Why
/// A scheduler handle is deliberately absent: this crate always resumes
/// continuations on whichever Tokio task polls them, matching the runtime's
/// default executor rather than threading a custom scheduler abstraction
/// through — once the crate commits to Tokio directly, a generic async
/// runtime indirection buys nothing.
#[derive(Clone, Copy, Debug)]
pub struct PipeOptions {
    pool_block_size: usize,
    high_watermark: usize,
    low_watermark: usize,
}

impl PipeOptions {
    /// `high_watermark` must be >= `low_watermark`; `pool_block_size` is the
    /// minimum chunk the receive loop rents per read.
    pub fn new(pool_block_size: usize, low_watermark: usize, high_watermark: usize) -> Self {
        assert!(
            high_watermark >= low_watermark,
            "high watermark must be >= low watermark"
        );
        Self {
            pool_block_size,
            low_watermark,
            high_watermark,
        }
    }

    pub fn pool_block_size(&self) -> usize {
        self.pool_block_size
    }

    pub fn low_watermark(&self) -> usize {
        self.low_watermark
    }

    pub fn high_watermark(&self) -> usize {
        self.high_watermark
    }

    /// The minimum read-buffer size the receive loop should rent: at least
    /// half a pool block.
    pub fn min_read_size(&self) -> usize {
        (self.pool_block_size / 2).max(1)
    }
}

impl Default for PipeOptions {
    /// 64 KiB pool blocks, a 32 KiB low watermark and a 64 KiB high
    /// watermark — in line with common default socket transport settings.
    fn default() -> Self {
        Self::new(64 * 1024, 32 * 1024, 64 * 1024)
    }
}
