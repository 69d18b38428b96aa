//! Caller-owned buffer and context references
//!
//! These mirror the fields of libdrm's `drm_intel_bo` and
//! `drm_intel_context` that the perfmon calls touch. Allocation, mapping
//! and context creation belong to the buffer manager, not to this crate.

use libc::c_ulong;
use serde::{Deserialize, Serialize};

/// Reference to a GEM context created elsewhere
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GemContext {
    /// Context id assigned by `DRM_IOCTL_I915_GEM_CONTEXT_CREATE`
    pub ctx_id: u32,
}

impl GemContext {
    /// Wrap an existing context id
    pub fn new(ctx_id: u32) -> Self {
        Self { ctx_id }
    }
}

/// Context id sent to the kernel; no context means the device default, 0.
pub fn context_id(ctx: Option<&GemContext>) -> u32 {
    ctx.map_or(0, |c| c.ctx_id)
}

/// A GEM buffer object
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferObject {
    /// GEM handle
    pub handle: u32,
    /// Size in bytes
    pub size: u64,
    /// Device-visible offset
    pub offset64: u64,
    /// Legacy offset, `unsigned long` wide
    pub offset: c_ulong,
}

impl BufferObject {
    /// A buffer with no known device offset yet
    pub fn new(handle: u32, size: u64) -> Self {
        Self {
            handle,
            size,
            ..Self::default()
        }
    }

    /// Record the device offset in both offset fields
    pub(crate) fn set_offset(&mut self, offset: u64) {
        self.offset64 = offset;
        self.offset = offset as c_ulong;
    }
}
