//! The perfmon command record
//!
//! A [`PerfmonCommand`] wraps the kernel's tagged union. Constructors set the
//! operation tag together with the matching payload, and the payload
//! accessors return `None` unless the tag selects that variant, so a
//! record is never read through an inactive union member.

use crate::abi;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;

/// Operation tag of a command record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum PerfmonOp {
    /// Open a perfmon session on the device
    Open = abi::I915_PERFMON_OPEN,
    /// Close the perfmon session
    Close = abi::I915_PERFMON_CLOSE,
    /// Enable the loaded configuration
    EnableConfig = abi::I915_PERFMON_ENABLE_CONFIG,
    /// Disable the loaded configuration
    DisableConfig = abi::I915_PERFMON_DISABLE_CONFIG,
    /// Upload OA and GP register configurations
    SetConfig = abi::I915_PERFMON_SET_CONFIG,
    /// Load a configuration into a context
    LoadConfig = abi::I915_PERFMON_LOAD_CONFIG,
    /// Query the hardware id of one context
    GetHwCtxId = abi::I915_PERFMON_GET_HW_CTX_ID,
    /// Query the hardware ids of a process's contexts
    GetHwCtxIds = abi::I915_PERFMON_GET_HW_CTX_IDS,
    /// Pin a buffer for OA sampling
    PinOaBuffer = abi::I915_PERFMON_PIN_OA_BUFFER,
    /// Release a pinned OA buffer
    UnpinOaBuffer = abi::I915_PERFMON_UNPIN_OA_BUFFER,
}

impl PerfmonOp {
    /// Every tag, in ABI order
    pub const ALL: [PerfmonOp; 10] = [
        PerfmonOp::Open,
        PerfmonOp::Close,
        PerfmonOp::EnableConfig,
        PerfmonOp::DisableConfig,
        PerfmonOp::SetConfig,
        PerfmonOp::LoadConfig,
        PerfmonOp::GetHwCtxId,
        PerfmonOp::GetHwCtxIds,
        PerfmonOp::PinOaBuffer,
        PerfmonOp::UnpinOaBuffer,
    ];

    /// `EnableConfig` when `enable`, else `DisableConfig`
    pub fn toggle_config(enable: bool) -> Self {
        if enable {
            PerfmonOp::EnableConfig
        } else {
            PerfmonOp::DisableConfig
        }
    }

    /// Raw value written into `drm_i915_perfmon.op`
    pub fn as_raw(self) -> u32 {
        self as u32
    }

    /// Parse a raw tag
    pub fn from_raw(raw: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.as_raw() == raw)
    }

    /// Header name of the tag
    pub fn name(self) -> &'static str {
        match self {
            PerfmonOp::Open => "I915_PERFMON_OPEN",
            PerfmonOp::Close => "I915_PERFMON_CLOSE",
            PerfmonOp::EnableConfig => "I915_PERFMON_ENABLE_CONFIG",
            PerfmonOp::DisableConfig => "I915_PERFMON_DISABLE_CONFIG",
            PerfmonOp::SetConfig => "I915_PERFMON_SET_CONFIG",
            PerfmonOp::LoadConfig => "I915_PERFMON_LOAD_CONFIG",
            PerfmonOp::GetHwCtxId => "I915_PERFMON_GET_HW_CTX_ID",
            PerfmonOp::GetHwCtxIds => "I915_PERFMON_GET_HW_CTX_IDS",
            PerfmonOp::PinOaBuffer => "I915_PERFMON_PIN_OA_BUFFER",
            PerfmonOp::UnpinOaBuffer => "I915_PERFMON_UNPIN_OA_BUFFER",
        }
    }
}

impl fmt::Display for PerfmonOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which work a `set_config` applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigTarget {
    /// A single context
    Ctx,
    /// All contexts of one process
    Pid,
    /// Every context on the device
    All,
}

impl ConfigTarget {
    /// Raw `DRM_I915_PERFMON_CONFIG_TARGET` value
    pub fn as_raw(self) -> u32 {
        match self {
            ConfigTarget::Ctx => abi::I915_PERFMON_CONFIG_TARGET_CTX,
            ConfigTarget::Pid => abi::I915_PERFMON_CONFIG_TARGET_PID,
            ConfigTarget::All => abi::I915_PERFMON_CONFIG_TARGET_ALL,
        }
    }

    /// Parse a raw target value
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            abi::I915_PERFMON_CONFIG_TARGET_CTX => Some(ConfigTarget::Ctx),
            abi::I915_PERFMON_CONFIG_TARGET_PID => Some(ConfigTarget::Pid),
            abi::I915_PERFMON_CONFIG_TARGET_ALL => Some(ConfigTarget::All),
            _ => None,
        }
    }
}

/// One register write (`offset`, `value`)
pub type ConfigEntry = abi::drm_i915_perfmon_config_entry;

/// A caller-owned register array plus the id the driver files it under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigEntries<'a> {
    /// Register writes
    pub entries: &'a [ConfigEntry],
    /// Configuration id
    pub id: u32,
}

impl<'a> ConfigEntries<'a> {
    /// Wrap `entries` under configuration `id`
    pub fn new(entries: &'a [ConfigEntry], id: u32) -> Self {
        Self { entries, id }
    }

    /// No register writes
    pub fn empty(id: u32) -> Self {
        Self { entries: &[], id }
    }

    fn to_raw(self) -> abi::drm_i915_perfmon_config_entries {
        abi::drm_i915_perfmon_config_entries {
            entries: slice_addr(self.entries),
            size: u32::try_from(self.entries.len()).unwrap_or(u32::MAX),
            id: self.id,
        }
    }
}

/// User-pointer value for a slice; an empty slice is sent as NULL.
fn slice_addr<T>(slice: &[T]) -> u64 {
    if slice.is_empty() {
        0
    } else {
        slice.as_ptr() as usize as u64
    }
}

/// As [`slice_addr`], for an array the kernel writes into.
fn slice_addr_mut<T>(slice: &mut [T]) -> u64 {
    if slice.is_empty() {
        0
    } else {
        slice.as_mut_ptr() as usize as u64
    }
}

/// A tagged `drm_i915_perfmon` record
///
/// The lifetime ties the record to any caller-owned arrays whose address
/// it carries, so it cannot be submitted after they are gone.
pub struct PerfmonCommand<'a> {
    raw: abi::drm_i915_perfmon,
    _borrow: PhantomData<&'a mut [u32]>,
}

macro_rules! payload_accessors {
    ($($op:ident => $field:ident : $ty:ident, $get:ident, [$($unsafety:tt)*] $get_mut:ident;)*) => {
        $(
            #[doc = concat!("`", stringify!($field), "` payload, if the tag selects it")]
            pub fn $get(&self) -> Option<&abi::$ty> {
                if self.raw.op == PerfmonOp::$op.as_raw() {
                    // SAFETY: the tag names this variant and every variant
                    // is plain integers over a zero-initialised union.
                    Some(unsafe { &self.raw.data.$field })
                } else {
                    None
                }
            }

            #[doc = concat!("Mutable `", stringify!($field), "` payload, if the tag selects it")]
            pub $($unsafety)* fn $get_mut(&mut self) -> Option<&mut abi::$ty> {
                if self.raw.op == PerfmonOp::$op.as_raw() {
                    // SAFETY: as above
                    Some(unsafe { &mut self.raw.data.$field })
                } else {
                    None
                }
            }
        )*
    };
}

impl<'a> PerfmonCommand<'a> {
    /// A record carrying only `op`, with the payload zeroed
    pub(crate) fn tagged(op: PerfmonOp) -> Self {
        Self {
            raw: abi::drm_i915_perfmon {
                op: op.as_raw(),
                data: abi::drm_i915_perfmon_data::default(),
            },
            _borrow: PhantomData,
        }
    }

    /// `I915_PERFMON_OPEN`
    pub fn open() -> Self {
        Self::tagged(PerfmonOp::Open)
    }

    /// `I915_PERFMON_CLOSE`
    pub fn close() -> Self {
        Self::tagged(PerfmonOp::Close)
    }

    /// `I915_PERFMON_ENABLE_CONFIG` when `enable`, else `I915_PERFMON_DISABLE_CONFIG`
    pub fn enable_config(enable: bool) -> Self {
        Self::tagged(PerfmonOp::toggle_config(enable))
    }

    /// `I915_PERFMON_SET_CONFIG`
    pub fn set_config(
        target: ConfigTarget,
        pid: u32,
        oa: ConfigEntries<'a>,
        gp: ConfigEntries<'a>,
    ) -> Self {
        let mut cmd = Self::tagged(PerfmonOp::SetConfig);
        cmd.raw.data.set_config = abi::drm_i915_perfmon_set_config {
            target: target.as_raw(),
            oa: oa.to_raw(),
            gp: gp.to_raw(),
            pid,
        };
        cmd
    }

    /// `I915_PERFMON_LOAD_CONFIG`
    pub fn load_config(ctx_id: u32, oa_id: u32, gp_id: u32) -> Self {
        let mut cmd = Self::tagged(PerfmonOp::LoadConfig);
        cmd.raw.data.load_config = abi::drm_i915_perfmon_load_config {
            ctx_id,
            oa_id,
            gp_id,
        };
        cmd
    }

    /// `I915_PERFMON_GET_HW_CTX_ID`
    pub fn get_hw_ctx_id(ctx_id: u32) -> Self {
        let mut cmd = Self::tagged(PerfmonOp::GetHwCtxId);
        cmd.raw.data.get_hw_ctx_id = abi::drm_i915_perfmon_get_hw_ctx_id {
            ctx_id,
            hw_ctx_id: 0,
        };
        cmd
    }

    /// `I915_PERFMON_GET_HW_CTX_IDS`, requesting at most `ids.len()` ids
    ///
    /// `count` above `ids.len()` is lowered to it; the kernel writes only
    /// into `ids`.
    pub fn get_hw_ctx_ids(pid: u32, ids: &'a mut [u32], count: u32) -> Self {
        let capacity = u32::try_from(ids.len()).unwrap_or(u32::MAX);
        let addr = slice_addr_mut(ids);
        let mut cmd = Self::tagged(PerfmonOp::GetHwCtxIds);
        cmd.raw.data.get_hw_ctx_ids = abi::drm_i915_perfmon_get_hw_ctx_ids {
            pid,
            count: count.min(capacity),
            ids: addr,
        };
        cmd
    }

    /// `I915_PERFMON_PIN_OA_BUFFER`, with the result offset cleared
    pub fn pin_oa_buffer(handle: u32, alignment: u32) -> Self {
        let mut cmd = Self::tagged(PerfmonOp::PinOaBuffer);
        cmd.raw.data.pin_oa_buffer = abi::drm_i915_perfmon_pin_oa_buffer {
            handle,
            alignment,
            offset: 0,
        };
        cmd
    }

    /// `I915_PERFMON_UNPIN_OA_BUFFER`
    pub fn unpin_oa_buffer(handle: u32) -> Self {
        let mut cmd = Self::tagged(PerfmonOp::UnpinOaBuffer);
        cmd.raw.data.unpin_oa_buffer = abi::drm_i915_perfmon_unpin_oa_buffer {
            handle,
            unused: 0,
        };
        cmd
    }

    /// The operation tag
    pub fn op(&self) -> Option<PerfmonOp> {
        PerfmonOp::from_raw(self.raw.op)
    }

    /// The raw tag value
    pub fn raw_op(&self) -> u32 {
        self.raw.op
    }

    // The set_config and get_hw_ctx_ids payloads carry user pointers and
    // counts. Editing them before submission can make the kernel touch
    // memory outside the borrowed arrays, hence `unsafe`.
    payload_accessors! {
        SetConfig => set_config: drm_i915_perfmon_set_config,
            set_config_data, [unsafe] set_config_data_mut;
        LoadConfig => load_config: drm_i915_perfmon_load_config,
            load_config_data, [] load_config_data_mut;
        GetHwCtxId => get_hw_ctx_id: drm_i915_perfmon_get_hw_ctx_id,
            hw_ctx_id_data, [] hw_ctx_id_data_mut;
        GetHwCtxIds => get_hw_ctx_ids: drm_i915_perfmon_get_hw_ctx_ids,
            hw_ctx_ids_data, [unsafe] hw_ctx_ids_data_mut;
        PinOaBuffer => pin_oa_buffer: drm_i915_perfmon_pin_oa_buffer,
            pin_oa_buffer_data, [] pin_oa_buffer_data_mut;
        UnpinOaBuffer => unpin_oa_buffer: drm_i915_perfmon_unpin_oa_buffer,
            unpin_oa_buffer_data, [] unpin_oa_buffer_data_mut;
    }

    /// Raw bytes of the payload union
    ///
    /// Only meaningful for tags that carry no payload: a written variant
    /// may leave its padding bytes uninitialised.
    #[cfg(test)]
    pub(crate) fn payload_bytes(&self) -> &[u8] {
        let data = &self.raw.data as *const abi::drm_i915_perfmon_data as *const u8;
        let len = std::mem::size_of::<abi::drm_i915_perfmon_data>();
        // SAFETY: the union starts zeroed and payload-free tags never
        // write a variant over it.
        unsafe { std::slice::from_raw_parts(data, len) }
    }

    /// Pointer handed to `ioctl(2)`
    pub(crate) fn as_mut_ptr(&mut self) -> *mut abi::drm_i915_perfmon {
        &mut self.raw
    }
}

impl fmt::Debug for PerfmonCommand<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("PerfmonCommand");
        match self.op() {
            Some(op) => s.field("op", &op),
            None => s.field("op", &self.raw.op),
        };
        if let Some(data) = self.set_config_data() {
            s.field("data", data);
        } else if let Some(data) = self.load_config_data() {
            s.field("data", data);
        } else if let Some(data) = self.hw_ctx_id_data() {
            s.field("data", data);
        } else if let Some(data) = self.hw_ctx_ids_data() {
            s.field("data", data);
        } else if let Some(data) = self.pin_oa_buffer_data() {
            s.field("data", data);
        } else if let Some(data) = self.unpin_oa_buffer_data() {
            s.field("data", data);
        }
        s.finish()
    }
}
