//! `#[repr(C)]` mirrors of the structures in `i915_perfmon.h`
//!
//! Names follow the kernel header so the layouts can be compared side by
//! side with the C definitions.

#![allow(non_camel_case_types, missing_docs)]

use serde::{Deserialize, Serialize};

/// `enum drm_i915_perfmon_op` values
pub const I915_PERFMON_OPEN: u32 = 0;
pub const I915_PERFMON_CLOSE: u32 = 1;
pub const I915_PERFMON_ENABLE_CONFIG: u32 = 2;
pub const I915_PERFMON_DISABLE_CONFIG: u32 = 3;
pub const I915_PERFMON_SET_CONFIG: u32 = 4;
pub const I915_PERFMON_LOAD_CONFIG: u32 = 5;
pub const I915_PERFMON_GET_HW_CTX_ID: u32 = 6;
pub const I915_PERFMON_GET_HW_CTX_IDS: u32 = 7;
pub const I915_PERFMON_PIN_OA_BUFFER: u32 = 8;
pub const I915_PERFMON_UNPIN_OA_BUFFER: u32 = 9;

/// `enum DRM_I915_PERFMON_CONFIG_TARGET` values
pub const I915_PERFMON_CONFIG_TARGET_CTX: u32 = 0;
pub const I915_PERFMON_CONFIG_TARGET_PID: u32 = 1;
pub const I915_PERFMON_CONFIG_TARGET_ALL: u32 = 2;

/// Upper bound the driver accepts for `get_hw_ctx_ids.count`
pub const I915_PERFMON_MAX_HW_CTX_IDS: u32 = 1024;

/// One register write of an OA or GP configuration
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct drm_i915_perfmon_config_entry {
    pub offset: u32,
    pub value: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct drm_i915_perfmon_config_entries {
    /// User pointer to `size` entries
    pub entries: u64,
    pub size: u32,
    pub id: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct drm_i915_perfmon_set_config {
    pub target: u32,
    pub oa: drm_i915_perfmon_config_entries,
    pub gp: drm_i915_perfmon_config_entries,
    pub pid: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct drm_i915_perfmon_load_config {
    pub ctx_id: u32,
    pub oa_id: u32,
    pub gp_id: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct drm_i915_perfmon_get_hw_ctx_id {
    pub ctx_id: u32,
    pub hw_ctx_id: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct drm_i915_perfmon_get_hw_ctx_ids {
    pub pid: u32,
    pub count: u32,
    /// User pointer to `count` u32 slots
    pub ids: u64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct drm_i915_perfmon_pin_oa_buffer {
    pub handle: u32,
    pub alignment: u32,
    pub offset: u64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct drm_i915_perfmon_unpin_oa_buffer {
    pub handle: u32,
    pub unused: u32,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub union drm_i915_perfmon_data {
    pub set_config: drm_i915_perfmon_set_config,
    pub load_config: drm_i915_perfmon_load_config,
    pub get_hw_ctx_id: drm_i915_perfmon_get_hw_ctx_id,
    pub get_hw_ctx_ids: drm_i915_perfmon_get_hw_ctx_ids,
    pub pin_oa_buffer: drm_i915_perfmon_pin_oa_buffer,
    pub unpin_oa_buffer: drm_i915_perfmon_unpin_oa_buffer,
}

impl Default for drm_i915_perfmon_data {
    fn default() -> Self {
        // Padding of one variant overlaps fields of another, so zero every byte.
        // SAFETY: all variants are plain integers, for which zero is valid.
        unsafe { core::mem::zeroed() }
    }
}

/// `struct drm_i915_perfmon`, the argument of `DRM_IOCTL_I915_PERFMON`
#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct drm_i915_perfmon {
    pub op: u32,
    pub data: drm_i915_perfmon_data,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{align_of, size_of};

    #[test]
    fn test_layout_matches_header() {
        assert_eq!(size_of::<drm_i915_perfmon_config_entry>(), 8);
        assert_eq!(size_of::<drm_i915_perfmon_config_entries>(), 16);
        assert_eq!(size_of::<drm_i915_perfmon_set_config>(), 48);
        assert_eq!(size_of::<drm_i915_perfmon_load_config>(), 12);
        assert_eq!(size_of::<drm_i915_perfmon_get_hw_ctx_ids>(), 16);
        assert_eq!(size_of::<drm_i915_perfmon_pin_oa_buffer>(), 16);
        assert_eq!(size_of::<drm_i915_perfmon_data>(), 48);
        assert_eq!(align_of::<drm_i915_perfmon_data>(), 8);
        assert_eq!(size_of::<drm_i915_perfmon>(), 56);
    }

    #[test]
    fn test_default_is_zeroed() {
        let record = drm_i915_perfmon::default();
        assert_eq!(record.op, 0);
        let set_config = unsafe { record.data.set_config };
        assert_eq!(set_config, drm_i915_perfmon_set_config::default());
    }
}
