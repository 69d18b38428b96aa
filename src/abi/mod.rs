//! Kernel ABI for the i915 perfmon ioctl
//!
//! Request-number encoding follows the generic Linux `_IOC` layout used on
//! x86, x86_64, arm and aarch64. Architectures with a different layout
//! (mips, powerpc, sparc) are not supported.

mod perfmon;

pub use perfmon::*;

use libc::c_ulong;

const IOC_NRBITS: c_ulong = 8;
const IOC_TYPEBITS: c_ulong = 8;
const IOC_SIZEBITS: c_ulong = 14;

const IOC_NRSHIFT: c_ulong = 0;
const IOC_TYPESHIFT: c_ulong = IOC_NRSHIFT + IOC_NRBITS;
const IOC_SIZESHIFT: c_ulong = IOC_TYPESHIFT + IOC_TYPEBITS;
const IOC_DIRSHIFT: c_ulong = IOC_SIZESHIFT + IOC_SIZEBITS;

const IOC_WRITE: c_ulong = 1;
const IOC_READ: c_ulong = 2;

/// DRM ioctl magic
pub const DRM_IOCTL_BASE: u8 = b'd';
/// First driver-private DRM command number
pub const DRM_COMMAND_BASE: c_ulong = 0x40;
/// i915 driver-private command number of the perfmon ioctl
pub const DRM_I915_PERFMON: c_ulong = 0x3e;

/// Request number of the perfmon control call
pub const DRM_IOCTL_I915_PERFMON: c_ulong =
    iowr::<drm_i915_perfmon>(DRM_IOCTL_BASE, DRM_COMMAND_BASE + DRM_I915_PERFMON);

const fn ioc(dir: c_ulong, ty: u8, nr: c_ulong, size: usize) -> c_ulong {
    (dir << IOC_DIRSHIFT)
        | ((ty as c_ulong) << IOC_TYPESHIFT)
        | (nr << IOC_NRSHIFT)
        | ((size as c_ulong) << IOC_SIZESHIFT)
}

/// `_IOWR(ty, nr, T)`
pub const fn iowr<T>(ty: u8, nr: c_ulong) -> c_ulong {
    ioc(IOC_READ | IOC_WRITE, ty, nr, core::mem::size_of::<T>())
}

/// Split a request number into (dir, type, nr, size)
pub fn decode_request(request: c_ulong) -> (u8, u8, u8, u16) {
    let dir = (request >> IOC_DIRSHIFT) & 0x3;
    let ty = (request >> IOC_TYPESHIFT) & ((1 << IOC_TYPEBITS) - 1);
    let nr = (request >> IOC_NRSHIFT) & ((1 << IOC_NRBITS) - 1);
    let size = (request >> IOC_SIZESHIFT) & ((1 << IOC_SIZEBITS) - 1);
    (dir as u8, ty as u8, nr as u8, size as u16)
}
