//! Implements current state

use std::time::{Duration, Instant};

use crate::config::{Conf, PowerSource, TimeBucket, TimeoutSlot};

#[derive(Debug)]
pub(crate) struct State {
    pub power_source: PowerSource,
    pub display_dimmed: bool,
    pub time_bucket: TimeBucket,
    /// Inside a sunrise/sunset event window.
    pub in_event: bool,
    /// Last instant any monitored input device was used.
    pub last_input: Instant,
    /// Last averaged sensor reading.
    pub ambient_br: f64,
    /// Last screen backlight percentage confirmed by the hardware.
    pub current_bl_pct: f64,
    /// Last keyboard backlight percentage confirmed by the hardware.
    pub current_kbd_pct: f64,
}

impl State {
    pub(crate) fn new() -> Self {
        Self {
            power_source: PowerSource::Ac,
            display_dimmed: false,
            time_bucket: TimeBucket::Day,
            in_event: false,
            last_input: Instant::now(),
            ambient_br: 0.0,
            current_bl_pct: 0.0,
            current_kbd_pct: 0.0,
        }
    }

    /// Timeout table column currently in effect.
    pub(crate) fn timeout_slot(&self) -> TimeoutSlot {
        if self.in_event {
            TimeoutSlot::InEvent
        } else {
            self.time_bucket.into()
        }
    }
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything the controller reads: configuration plus observed state.
#[derive(Debug)]
pub(crate) struct Context {
    pub conf: Conf,
    pub state: State,
}

impl Context {
    pub(crate) fn new(conf: Conf, state: State) -> Self {
        Self { conf, state }
    }

    /// Capture period for the current power source and time of day.
    pub(crate) fn current_timeout(&self) -> Duration {
        self.conf
            .timeouts
            .get(self.state.power_source, self.state.timeout_slot())
    }
}
