//! The control-call primitive and the device handle around it

mod drm;

pub use drm::DrmDevice;

use crate::abi::I915_PERFMON_MAX_HW_CTX_IDS;
use crate::command::PerfmonCommand;
use crate::error::{PerfmonError, PerfmonResult};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

/// Something that can submit a perfmon command record
///
/// [`DrmDevice`] issues the real ioctl. Tests and tools can substitute
/// their own implementation to observe or answer records.
pub trait ControlDevice {
    /// Submit `cmd`, letting the receiver write its output fields in place
    fn control(&self, cmd: &mut PerfmonCommand<'_>) -> ControlOutcome;
}

impl<D: ControlDevice + ?Sized> ControlDevice for &D {
    fn control(&self, cmd: &mut PerfmonCommand<'_>) -> ControlOutcome {
        (**self).control(cmd)
    }
}

/// Result of one control call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlOutcome {
    /// Return value of the call
    pub ret: i32,
    /// Error state captured right after the call, 0 if none
    pub errno: i32,
}

impl ControlOutcome {
    /// A successful call
    pub fn ok() -> Self {
        Self { ret: 0, errno: 0 }
    }

    /// A failed call in the libc convention: -1 with `errno` set
    pub fn failed(errno: i32) -> Self {
        Self { ret: -1, errno }
    }

    /// Whether the call returned zero
    pub fn is_success(&self) -> bool {
        self.ret == 0
    }
}

/// Device configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Device node to open; auto-detected when unset
    pub device_path: Option<PathBuf>,
    /// Restart calls interrupted with EINTR/EAGAIN, like libdrm's `drmIoctl`
    pub restart_interrupted: bool,
    /// Capacity used when querying hardware-context ids
    pub max_hw_ctx_ids: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            device_path: None,
            restart_interrupted: true,
            max_hw_ctx_ids: I915_PERFMON_MAX_HW_CTX_IDS,
        }
    }
}

impl DeviceConfig {
    /// Configuration for a specific device node
    pub fn for_device(path: impl Into<PathBuf>) -> Self {
        Self {
            device_path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Parse a JSON configuration
    pub fn from_json_str(json: &str) -> PerfmonResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file
    pub fn from_json_file(path: impl AsRef<Path>) -> PerfmonResult<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| {
            PerfmonError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&json)
    }

    fn validate(&self) -> PerfmonResult<()> {
        if self.max_hw_ctx_ids == 0 || self.max_hw_ctx_ids > I915_PERFMON_MAX_HW_CTX_IDS {
            return Err(PerfmonError::Config(format!(
                "max_hw_ctx_ids must be within 1..={}, got {}",
                I915_PERFMON_MAX_HW_CTX_IDS, self.max_hw_ctx_ids
            )));
        }
        Ok(())
    }

    /// The configured device node, or the first one found
    pub fn resolve_device_path(&self) -> PerfmonResult<PathBuf> {
        match &self.device_path {
            Some(path) => Ok(path.clone()),
            None => find_render_node()
                .map(PathBuf::from)
                .ok_or(PerfmonError::NoDevice),
        }
    }

    /// Open the device node read-write
    ///
    /// The returned file owns the descriptor; wrap it with
    /// [`DrmDevice::from_file`] to issue perfmon calls.
    pub fn open_device(&self) -> PerfmonResult<File> {
        let path = self.resolve_device_path()?;
        log::debug!("opening {}", path.display());
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        Ok(file)
    }
}

/// Find all DRM device nodes on the system
pub fn find_render_nodes() -> Vec<String> {
    let mut devices = Vec::new();

    // Render nodes first, they need no DRM master
    for i in 128..138 {
        let path = format!("/dev/dri/renderD{}", i);
        if fs::metadata(&path).is_ok() {
            devices.push(path);
        }
    }

    for i in 0..4 {
        let path = format!("/dev/dri/card{}", i);
        if fs::metadata(&path).is_ok() {
            devices.push(path);
        }
    }

    devices
}

/// Find the most likely DRM device node
pub fn find_render_node() -> Option<String> {
    find_render_nodes().into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = DeviceConfig::default();
        assert_eq!(config.device_path, None);
        assert!(config.restart_interrupted);
        assert_eq!(config.max_hw_ctx_ids, 1024);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = DeviceConfig::from_json_str(r#"{ "device_path": "/dev/dri/renderD129" }"#)
            .unwrap();
        assert_eq!(config, DeviceConfig::for_device("/dev/dri/renderD129"));
    }

    #[test]
    fn test_rejects_bad_capacity() {
        let err = DeviceConfig::from_json_str(r#"{ "max_hw_ctx_ids": 4096 }"#).unwrap_err();
        assert!(matches!(err, PerfmonError::Config(_)));
        let err = DeviceConfig::from_json_str(r#"{ "max_hw_ctx_ids": 0 }"#).unwrap_err();
        assert!(matches!(err, PerfmonError::Config(_)));
    }

    #[test]
    fn test_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "restart_interrupted": false, "max_hw_ctx_ids": 64 }}"#
        )
        .unwrap();

        let config = DeviceConfig::from_json_file(file.path()).unwrap();
        assert!(!config.restart_interrupted);
        assert_eq!(config.max_hw_ctx_ids, 64);
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = DeviceConfig::from_json_file(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, PerfmonError::Config(_)));
    }

    #[test]
    fn test_explicit_path_skips_auto_detect() {
        let config = DeviceConfig::for_device("/nonexistent/renderD200");
        assert_eq!(
            config.resolve_device_path().unwrap(),
            PathBuf::from("/nonexistent/renderD200")
        );
        assert!(matches!(config.open_device(), Err(PerfmonError::NoDevice)));
    }

    #[test]
    fn test_outcome_helpers() {
        assert!(ControlOutcome::ok().is_success());
        let failed = ControlOutcome::failed(libc::EINVAL);
        assert!(!failed.is_success());
        assert_eq!(failed.ret, -1);
        assert_eq!(failed.errno, libc::EINVAL);
    }
}
