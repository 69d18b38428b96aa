//! The perfmon operations
//!
//! Each function builds one [`PerfmonCommand`], submits it through a
//! [`ControlDevice`] and copies any output fields back. Nothing is cached
//! and nothing is retried: a failed call is returned as
//! [`PerfmonError::ControlCall`] right away.
//!
//! Two result conventions apply, matching libdrm's C interface:
//! most operations report the raw ioctl return value, while
//! [`pin_oa_buffer`] and [`unpin_oa_buffer`] report `-errno`.

use crate::bufmgr::{context_id, BufferObject, GemContext};
use crate::command::{ConfigEntries, ConfigTarget, PerfmonCommand, PerfmonOp};
use crate::device::{ControlDevice, ControlOutcome};
use crate::error::{PerfmonError, PerfmonResult};

fn submit<D: ControlDevice + ?Sized>(device: &D, cmd: &mut PerfmonCommand<'_>) -> ControlOutcome {
    let outcome = device.control(cmd);
    if !outcome.is_success() {
        log::debug!(
            "{:?} returned {} (errno {})",
            cmd.op(),
            outcome.ret,
            outcome.errno
        );
    }
    outcome
}

/// Raw-result convention: the call's own return value is the code.
fn forward(op: PerfmonOp, outcome: ControlOutcome) -> PerfmonResult<()> {
    if outcome.ret == 0 {
        Ok(())
    } else {
        Err(PerfmonError::ControlCall {
            op,
            code: outcome.ret,
        })
    }
}

/// Errno convention: any failure is reported as `-errno`.
fn negate_errno(op: PerfmonOp, outcome: ControlOutcome) -> PerfmonResult<()> {
    if outcome.ret == 0 {
        Ok(())
    } else {
        Err(PerfmonError::ControlCall {
            op,
            code: -outcome.errno,
        })
    }
}

/// Enable (`true`) or disable (`false`) the loaded configuration
pub fn enable_config<D: ControlDevice + ?Sized>(device: &D, enable: bool) -> PerfmonResult<()> {
    let op = PerfmonOp::toggle_config(enable);
    let mut cmd = PerfmonCommand::tagged(op);
    forward(op, submit(device, &mut cmd))
}

/// Open a perfmon session
pub fn open<D: ControlDevice + ?Sized>(device: &D) -> PerfmonResult<()> {
    let mut cmd = PerfmonCommand::open();
    forward(PerfmonOp::Open, submit(device, &mut cmd))
}

/// Close the perfmon session
pub fn close<D: ControlDevice + ?Sized>(device: &D) -> PerfmonResult<()> {
    let mut cmd = PerfmonCommand::close();
    forward(PerfmonOp::Close, submit(device, &mut cmd))
}

/// Upload OA and GP register configurations for `target`
///
/// `pid` selects the process when `target` is [`ConfigTarget::Pid`]. The
/// entry arrays stay borrowed for the duration of the call only.
pub fn set_config<D: ControlDevice + ?Sized>(
    device: &D,
    target: ConfigTarget,
    pid: u32,
    oa: ConfigEntries<'_>,
    gp: ConfigEntries<'_>,
) -> PerfmonResult<()> {
    let mut cmd = PerfmonCommand::set_config(target, pid, oa, gp);
    forward(PerfmonOp::SetConfig, submit(device, &mut cmd))
}

/// Load configurations into `ctx` (the device default when `None`)
///
/// `oa_cfg_id` and `gp_cfg_id` carry the requested ids in and the ids
/// the driver reports out. They are written back even when the call fails.
pub fn load_config<D: ControlDevice + ?Sized>(
    device: &D,
    ctx: Option<&GemContext>,
    oa_cfg_id: &mut u32,
    gp_cfg_id: &mut u32,
) -> PerfmonResult<()> {
    let mut cmd = PerfmonCommand::load_config(context_id(ctx), *oa_cfg_id, *gp_cfg_id);
    let outcome = submit(device, &mut cmd);

    if let Some(data) = cmd.load_config_data() {
        *oa_cfg_id = data.oa_id;
        *gp_cfg_id = data.gp_id;
    }

    forward(PerfmonOp::LoadConfig, outcome)
}

/// Hardware id of `ctx` (the device default when `None`)
///
/// `hw_ctx_id` receives whatever the record holds after the call,
/// successful or not.
pub fn get_hw_ctx_id<D: ControlDevice + ?Sized>(
    device: &D,
    ctx: Option<&GemContext>,
    hw_ctx_id: &mut u32,
) -> PerfmonResult<()> {
    let mut cmd = PerfmonCommand::get_hw_ctx_id(context_id(ctx));
    let outcome = submit(device, &mut cmd);

    if let Some(data) = cmd.hw_ctx_id_data() {
        *hw_ctx_id = data.hw_ctx_id;
    }

    forward(PerfmonOp::GetHwCtxId, outcome)
}

/// Hardware ids of the contexts owned by `pid`
///
/// `count` is the number of ids requested on entry (never more than
/// `hw_ctx_ids.len()`) and the number the driver reports on return. It
/// is written back even when the call fails.
pub fn get_hw_ctx_ids<D: ControlDevice + ?Sized>(
    device: &D,
    pid: i32,
    hw_ctx_ids: &mut [u32],
    count: &mut u32,
) -> PerfmonResult<()> {
    let mut cmd = PerfmonCommand::get_hw_ctx_ids(pid as u32, hw_ctx_ids, *count);
    let outcome = submit(device, &mut cmd);

    if let Some(data) = cmd.hw_ctx_ids_data() {
        *count = data.count;
    }

    forward(PerfmonOp::GetHwCtxIds, outcome)
}

/// Pin `bo` as the OA sample buffer
///
/// On success the device offset is stored in both `bo.offset64` and
/// `bo.offset`; on failure `bo` is untouched and the code is `-errno`.
pub fn pin_oa_buffer<D: ControlDevice + ?Sized>(
    device: &D,
    bo: &mut BufferObject,
    alignment: u32,
) -> PerfmonResult<()> {
    let mut cmd = PerfmonCommand::pin_oa_buffer(bo.handle, alignment);
    let outcome = submit(device, &mut cmd);
    negate_errno(PerfmonOp::PinOaBuffer, outcome)?;

    if let Some(data) = cmd.pin_oa_buffer_data() {
        bo.set_offset(data.offset);
    }
    Ok(())
}

/// Release an OA buffer pinned with [`pin_oa_buffer`]
///
/// Failures are reported as `-errno`.
pub fn unpin_oa_buffer<D: ControlDevice + ?Sized>(
    device: &D,
    bo: &BufferObject,
) -> PerfmonResult<()> {
    let mut cmd = PerfmonCommand::unpin_oa_buffer(bo.handle);
    negate_errno(PerfmonOp::UnpinOaBuffer, submit(device, &mut cmd))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi;
    use crate::command::ConfigEntry;
    use crate::error::status_code;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::cell::RefCell;

    /// Snapshot of a submitted record
    #[derive(Debug, Clone, PartialEq)]
    enum Seen {
        /// Tag and whether the payload union is still all zeroes
        Bare(u32, bool),
        SetConfig(abi::drm_i915_perfmon_set_config),
        LoadConfig(abi::drm_i915_perfmon_load_config),
        HwCtxId(abi::drm_i915_perfmon_get_hw_ctx_id),
        HwCtxIds(abi::drm_i915_perfmon_get_hw_ctx_ids),
        Pin(abi::drm_i915_perfmon_pin_oa_buffer),
        Unpin(abi::drm_i915_perfmon_unpin_oa_buffer),
    }

    /// Records every command and answers with a canned outcome,
    /// optionally editing the record first
    struct FakeDevice {
        outcome: ControlOutcome,
        reply: Box<dyn Fn(&mut PerfmonCommand<'_>)>,
        seen: RefCell<Vec<(Option<PerfmonOp>, Seen)>>,
    }

    impl FakeDevice {
        fn new(outcome: ControlOutcome) -> Self {
            Self {
                outcome,
                reply: Box::new(|_: &mut PerfmonCommand<'_>| {}),
                seen: RefCell::new(Vec::new()),
            }
        }

        fn replying(
            outcome: ControlOutcome,
            reply: impl Fn(&mut PerfmonCommand<'_>) + 'static,
        ) -> Self {
            Self {
                reply: Box::new(reply),
                ..Self::new(outcome)
            }
        }

        fn only(&self) -> (Option<PerfmonOp>, Seen) {
            let seen = self.seen.borrow();
            assert_eq!(seen.len(), 1, "expected exactly one control call");
            seen[0].clone()
        }
    }

    impl ControlDevice for FakeDevice {
        fn control(&self, cmd: &mut PerfmonCommand<'_>) -> ControlOutcome {
            let snapshot = if let Some(d) = cmd.set_config_data() {
                Seen::SetConfig(*d)
            } else if let Some(d) = cmd.load_config_data() {
                Seen::LoadConfig(*d)
            } else if let Some(d) = cmd.hw_ctx_id_data() {
                Seen::HwCtxId(*d)
            } else if let Some(d) = cmd.hw_ctx_ids_data() {
                Seen::HwCtxIds(*d)
            } else if let Some(d) = cmd.pin_oa_buffer_data() {
                Seen::Pin(*d)
            } else if let Some(d) = cmd.unpin_oa_buffer_data() {
                Seen::Unpin(*d)
            } else {
                Seen::Bare(cmd.raw_op(), cmd.payload_bytes().iter().all(|&b| b == 0))
            };
            self.seen.borrow_mut().push((cmd.op(), snapshot));
            (self.reply)(cmd);
            self.outcome
        }
    }

    #[rstest]
    #[case(true, PerfmonOp::EnableConfig)]
    #[case(false, PerfmonOp::DisableConfig)]
    fn test_enable_config_tag(#[case] enable: bool, #[case] expected: PerfmonOp) {
        let device = FakeDevice::new(ControlOutcome::ok());
        enable_config(&device, enable).unwrap();
        assert_eq!(device.only(), (Some(expected), Seen::Bare(expected.as_raw(), true)));
    }

    #[test]
    fn test_open_and_close_tags() {
        let device = FakeDevice::new(ControlOutcome::ok());
        open(&device).unwrap();
        close(&device).unwrap();
        let seen = device.seen.borrow();
        assert_eq!(seen[0].0, Some(PerfmonOp::Open));
        assert_eq!(seen[1].0, Some(PerfmonOp::Close));
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn test_raw_result_is_forwarded() {
        let device = FakeDevice::new(ControlOutcome::failed(libc::EACCES));
        let result = open(&device);
        assert_eq!(status_code(&result), -1);

        let device = FakeDevice::new(ControlOutcome { ret: -22, errno: 0 });
        let result = enable_config(&device, true);
        assert!(matches!(
            result,
            Err(PerfmonError::ControlCall { op: PerfmonOp::EnableConfig, code: -22 })
        ));
    }

    #[test]
    fn test_set_config_payload() {
        let oa = [
            ConfigEntry { offset: 0x2710, value: 0x1 },
            ConfigEntry { offset: 0x2714, value: 0x2 },
            ConfigEntry { offset: 0x2718, value: 0x3 },
        ];
        let device = FakeDevice::new(ControlOutcome::ok());
        set_config(
            &device,
            ConfigTarget::Pid,
            1234,
            ConfigEntries::new(&oa, 7),
            ConfigEntries::empty(0),
        )
        .unwrap();

        let (op, seen) = device.only();
        assert_eq!(op, Some(PerfmonOp::SetConfig));
        let Seen::SetConfig(data) = seen else {
            panic!("expected set_config payload");
        };
        assert_eq!(data.target, ConfigTarget::Pid.as_raw());
        assert_eq!(data.pid, 1234);
        assert_eq!((data.oa.size, data.oa.id), (3, 7));
        assert_eq!(data.oa.entries, oa.as_ptr() as usize as u64);
        assert_eq!((data.gp.size, data.gp.id), (0, 0));
    }

    #[test]
    fn test_load_config_writes_back_on_success() {
        let device = FakeDevice::replying(ControlOutcome::ok(), |cmd| {
            let data = cmd.load_config_data_mut().unwrap();
            data.oa_id = 11;
            data.gp_id = 12;
        });
        let ctx = GemContext::new(5);
        let (mut oa_id, mut gp_id) = (1, 2);
        load_config(&device, Some(&ctx), &mut oa_id, &mut gp_id).unwrap();

        assert_eq!((oa_id, gp_id), (11, 12));
        assert_eq!(
            device.only().1,
            Seen::LoadConfig(abi::drm_i915_perfmon_load_config { ctx_id: 5, oa_id: 1, gp_id: 2 })
        );
    }

    #[test]
    fn test_load_config_writes_back_on_failure() {
        let device = FakeDevice::replying(ControlOutcome::failed(libc::EINVAL), |cmd| {
            let data = cmd.load_config_data_mut().unwrap();
            data.oa_id = 0;
            data.gp_id = 99;
        });
        let (mut oa_id, mut gp_id) = (3, 4);
        let result = load_config(&device, None, &mut oa_id, &mut gp_id);

        assert_eq!(status_code(&result), -1);
        assert_eq!((oa_id, gp_id), (0, 99));
        let Seen::LoadConfig(data) = device.only().1 else {
            panic!("expected load_config payload");
        };
        assert_eq!(data.ctx_id, 0);
    }

    #[test]
    fn test_get_hw_ctx_id_default_context() {
        let device = FakeDevice::replying(ControlOutcome::ok(), |cmd| {
            cmd.hw_ctx_id_data_mut().unwrap().hw_ctx_id = 0x1f;
        });
        let mut hw_ctx_id = 0;
        get_hw_ctx_id(&device, None, &mut hw_ctx_id).unwrap();

        assert_eq!(hw_ctx_id, 0x1f);
        assert_eq!(
            device.only(),
            (
                Some(PerfmonOp::GetHwCtxId),
                Seen::HwCtxId(abi::drm_i915_perfmon_get_hw_ctx_id { ctx_id: 0, hw_ctx_id: 0 })
            )
        );
    }

    #[test]
    fn test_get_hw_ctx_id_writes_back_on_failure() {
        let device = FakeDevice::replying(ControlOutcome::failed(libc::ENOENT), |cmd| {
            cmd.hw_ctx_id_data_mut().unwrap().hw_ctx_id = 0x77;
        });
        let ctx = GemContext::new(4);
        let mut hw_ctx_id = 0;
        let result = get_hw_ctx_id(&device, Some(&ctx), &mut hw_ctx_id);

        assert_eq!(status_code(&result), -1);
        assert_eq!(hw_ctx_id, 0x77);
        let Seen::HwCtxId(data) = device.only().1 else {
            panic!("expected get_hw_ctx_id payload");
        };
        assert_eq!(data.ctx_id, 4);
    }

    #[test]
    fn test_get_hw_ctx_ids_count_round_trip() {
        let device = FakeDevice::replying(ControlOutcome::ok(), |cmd| {
            // SAFETY: only lowers the count the kernel reports back
            unsafe { cmd.hw_ctx_ids_data_mut() }.unwrap().count = 2;
        });
        let mut ids = [0u32; 8];
        let addr = ids.as_ptr() as usize as u64;
        let mut count = 8;
        get_hw_ctx_ids(&device, 77, &mut ids, &mut count).unwrap();

        assert_eq!(count, 2);
        assert_eq!(
            device.only().1,
            Seen::HwCtxIds(abi::drm_i915_perfmon_get_hw_ctx_ids { pid: 77, count: 8, ids: addr })
        );
    }

    #[test]
    fn test_get_hw_ctx_ids_writes_count_on_failure() {
        let device = FakeDevice::new(ControlOutcome::failed(libc::ESRCH));
        let mut ids = [0u32; 4];
        let mut count = 16;
        let result = get_hw_ctx_ids(&device, 1, &mut ids, &mut count);

        assert_eq!(status_code(&result), -1);
        // The request was capped at the slice and comes back unchanged
        assert_eq!(count, 4);
    }

    #[test]
    fn test_pin_oa_buffer_success_sets_both_offsets() {
        let device = FakeDevice::replying(ControlOutcome::ok(), |cmd| {
            cmd.pin_oa_buffer_data_mut().unwrap().offset = 0x00ff_f000;
        });
        let mut bo = BufferObject::new(42, 16 << 20);
        pin_oa_buffer(&device, &mut bo, 1 << 24).unwrap();

        assert_eq!(bo.offset64, 0x00ff_f000);
        assert_eq!(bo.offset as u64, 0x00ff_f000);
        assert_eq!(
            device.only().1,
            Seen::Pin(abi::drm_i915_perfmon_pin_oa_buffer {
                handle: 42,
                alignment: 1 << 24,
                offset: 0
            })
        );
    }

    #[test]
    fn test_pin_oa_buffer_failure_negates_errno() {
        let device = FakeDevice::replying(ControlOutcome::failed(libc::ENOSPC), |cmd| {
            cmd.pin_oa_buffer_data_mut().unwrap().offset = 0xdead_0000;
        });
        let mut bo = BufferObject::new(42, 4096);
        bo.offset64 = 0x1000;
        bo.offset = 0x1000;

        let result = pin_oa_buffer(&device, &mut bo, 4096);
        assert_eq!(status_code(&result), -libc::ENOSPC);
        assert_eq!(bo.offset64, 0x1000);
        assert_eq!(bo.offset, 0x1000);
    }

    #[test]
    fn test_unpin_oa_buffer() {
        let bo = BufferObject::new(9, 4096);

        let device = FakeDevice::new(ControlOutcome::ok());
        let result = unpin_oa_buffer(&device, &bo);
        assert_eq!(status_code(&result), 0);
        assert_eq!(
            device.only(),
            (
                Some(PerfmonOp::UnpinOaBuffer),
                Seen::Unpin(abi::drm_i915_perfmon_unpin_oa_buffer { handle: 9, unused: 0 })
            )
        );

        let device = FakeDevice::new(ControlOutcome::failed(libc::EINVAL));
        let result = unpin_oa_buffer(&device, &bo);
        assert_eq!(status_code(&result), -libc::EINVAL);
    }

    #[test]
    fn test_device_by_trait_object() {
        let device = FakeDevice::new(ControlOutcome::ok());
        let dynamic: &dyn ControlDevice = &device;
        open(dynamic).unwrap();
        assert_eq!(device.only().0, Some(PerfmonOp::Open));
    }
}
