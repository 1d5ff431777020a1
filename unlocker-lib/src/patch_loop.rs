use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use tracing::{info, trace};

use crate::{
    address_validator::ValidatedTarget, channel_record::Status, config::PatchConfig,
    shared_channel::SharedChannel,
};

pub const MIN_VALUE: i32 = 1;
pub const MAX_VALUE: i32 = 1000;

pub fn clamp_value(value: i32) -> i32 {
    value.clamp(MIN_VALUE, MAX_VALUE)
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PatchReport {
    pub ticks: u64,
    pub writes: u64,
}

/// Background writer. Polls the stop flag every tick and commits the clamped
/// desired value every `interval_ticks` ticks.
pub struct PatchLoop {
    channel: Arc<SharedChannel>,
    target: ValidatedTarget,
    stop: Arc<AtomicBool>,
    tick: Duration,
    interval_ticks: u64,
}

impl PatchLoop {
    pub fn new(
        channel: Arc<SharedChannel>,
        target: ValidatedTarget,
        stop: Arc<AtomicBool>,
        config: &PatchConfig,
    ) -> Self {
        Self {
            channel,
            target,
            stop,
            tick: config.tick(),
            interval_ticks: config.interval_ticks(),
        }
    }

    pub fn run(self) -> PatchReport {
        let mailbox = self.channel.mailbox();
        let mut report = PatchReport::default();
        info!(
            "patching {:#x} every {} ticks of {:?}",
            self.target.address(),
            self.interval_ticks,
            self.tick
        );
        while !self.stop.load(Ordering::Acquire) {
            // one tick per check so a stop request is seen within one sleep
            report.ticks += 1;
            thread::sleep(self.tick);

            if report.ticks % self.interval_ticks != 0 {
                continue;
            }

            let value = clamp_value(mailbox.desired_value());
            unsafe { self.target.write(value) };
            report.writes += 1;
            trace!("wrote {} to {:#x}", value, self.target.address());
        }

        mailbox.advance_status(Status::ClientExit);
        info!(
            "patch loop stopped after {} ticks, {} writes",
            report.ticks, report.writes
        );
        report
    }
}
