//! Decode budgets and cooperative cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{LimitKind, ProtocolError};

/// Stack a thread needs per level of nesting, unoptimized builds included.
const STACK_PER_LEVEL: usize = 16 << 10;
const MIN_STACK: usize = 2 << 20;
const MAX_STACK: usize = 512 << 20;

/// Upper bounds applied while decoding untrusted streams.
///
/// Decoding recurses once per nesting level, so `depth` also bounds stack
/// use. The default depth fits a 2 MiB thread stack; threads decoding with a
/// larger depth should be spawned with [`DecodeLimits::stack_size`].
///
/// ```
/// use qpdata_object_stream::DecodeLimits;
///
/// let limits = DecodeLimits::default().max_depth(64).max_handles(10_000);
/// assert_eq!(limits.depth, 64);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeLimits {
    /// Total handles assigned over the whole stream, resets included.
    pub handles: u64,
    /// Maximum nesting of objects, arrays and descriptors.
    pub depth: usize,
    /// Maximum stream segment length in bytes.
    pub bytes: usize,
    /// Maximum number of tag dispatches.
    pub steps: u64,
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self {
            handles: 1_000_000,
            depth: 128,
            bytes: 1 << 30,
            steps: 50_000_000,
        }
    }
}

impl DecodeLimits {
    /// No limits; only for input from a trusted producer.
    pub fn unbounded() -> Self {
        Self {
            handles: u64::MAX,
            depth: usize::MAX,
            bytes: usize::MAX,
            steps: u64::MAX,
        }
    }

    pub fn max_handles(mut self, handles: u64) -> Self {
        self.handles = handles;
        self
    }

    pub fn max_depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }

    pub fn max_bytes(mut self, bytes: usize) -> Self {
        self.bytes = bytes;
        self
    }

    pub fn max_steps(mut self, steps: u64) -> Self {
        self.steps = steps;
        self
    }

    /// Thread stack size that fits a decode nested to `depth`.
    pub fn stack_size(&self) -> usize {
        self.depth
            .saturating_mul(STACK_PER_LEVEL)
            .clamp(MIN_STACK, MAX_STACK)
    }
}

/// Shared flag that asks in-flight decodes to stop at their next dispatch.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Running counters checked against [`DecodeLimits`].
#[derive(Debug)]
pub(crate) struct Budget {
    limits: DecodeLimits,
    cancel: Option<CancelToken>,
    pub(crate) handles: u64,
    pub(crate) depth: usize,
    pub(crate) steps: u64,
}

impl Budget {
    pub(crate) fn new(limits: DecodeLimits, cancel: Option<CancelToken>) -> Self {
        Self {
            limits,
            cancel,
            handles: 0,
            depth: 0,
            steps: 0,
        }
    }

    pub(crate) fn check_bytes(&self, len: usize) -> Result<(), ProtocolError> {
        if len > self.limits.bytes {
            return Err(ProtocolError::ResourceLimitExceeded {
                limit: LimitKind::Bytes,
                offset: self.limits.bytes,
            });
        }
        Ok(())
    }

    /// Called once per tag dispatch.
    pub(crate) fn step(&mut self, offset: usize) -> Result<(), ProtocolError> {
        if let Some(token) = &self.cancel {
            if token.is_cancelled() {
                return Err(ProtocolError::Cancelled { offset });
            }
        }
        self.steps += 1;
        if self.steps > self.limits.steps {
            return Err(ProtocolError::ResourceLimitExceeded {
                limit: LimitKind::Steps,
                offset,
            });
        }
        Ok(())
    }

    pub(crate) fn assign_handle(&mut self, offset: usize) -> Result<(), ProtocolError> {
        self.handles += 1;
        if self.handles > self.limits.handles {
            return Err(ProtocolError::ResourceLimitExceeded {
                limit: LimitKind::Handles,
                offset,
            });
        }
        Ok(())
    }

    pub(crate) fn enter(&mut self, offset: usize) -> Result<(), ProtocolError> {
        if self.depth >= self.limits.depth {
            return Err(ProtocolError::ResourceLimitExceeded {
                limit: LimitKind::Depth,
                offset,
            });
        }
        self.depth += 1;
        Ok(())
    }

    pub(crate) fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }
}
