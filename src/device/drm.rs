//! libc-backed perfmon control calls

use super::{ControlDevice, ControlOutcome, DeviceConfig};
use crate::abi::DRM_IOCTL_I915_PERFMON;
use crate::command::PerfmonCommand;
use std::fs::File;
use std::io;
use std::os::unix::io::{AsRawFd, RawFd};

/// An open DRM device descriptor
///
/// The descriptor is borrowed: `DrmDevice` never closes it, and the
/// caller keeps it open for as long as the device is used.
#[derive(Debug, Clone, Copy)]
pub struct DrmDevice {
    fd: RawFd,
    restart_interrupted: bool,
}

impl DrmDevice {
    /// Use an already open descriptor
    pub fn new(fd: RawFd) -> Self {
        Self {
            fd,
            restart_interrupted: true,
        }
    }

    /// Use the descriptor of an open file
    pub fn from_file(file: &File) -> Self {
        Self::new(file.as_raw_fd())
    }

    /// Use an open descriptor with the call behaviour from `config`
    pub fn with_config(fd: RawFd, config: &DeviceConfig) -> Self {
        Self::new(fd).restart_interrupted(config.restart_interrupted)
    }

    /// Whether EINTR/EAGAIN failures are transparently reissued
    pub fn restart_interrupted(mut self, restart: bool) -> Self {
        self.restart_interrupted = restart;
        self
    }

    /// The underlying descriptor
    pub fn fd(&self) -> RawFd {
        self.fd
    }
}

impl AsRawFd for DrmDevice {
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

impl ControlDevice for DrmDevice {
    fn control(&self, cmd: &mut PerfmonCommand<'_>) -> ControlOutcome {
        log::trace!(
            "ioctl(fd={}, 0x{:08x}) {:?}",
            self.fd,
            DRM_IOCTL_I915_PERFMON,
            cmd
        );

        loop {
            // SAFETY: the record is a live, correctly sized drm_i915_perfmon,
            // and any user pointers in it come from slices borrowed for
            // the record's lifetime.
            let ret =
                unsafe { libc::ioctl(self.fd, DRM_IOCTL_I915_PERFMON as _, cmd.as_mut_ptr()) };
            if ret == 0 {
                return ControlOutcome::ok();
            }

            let errno = io::Error::last_os_error().raw_os_error().unwrap_or(0);
            if ret == -1
                && self.restart_interrupted
                && (errno == libc::EINTR || errno == libc::EAGAIN)
            {
                continue;
            }
            return ControlOutcome { ret, errno };
        }
    }
}
