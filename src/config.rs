//! Runtime configuration, built once from the command line.

use std::{fmt::Display, str::FromStr, time::Duration};

use smallvec::SmallVec;

use crate::flags::Cli;

/// Source of power for the machine. Every curve and timeout is kept per source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum PowerSource {
    Ac,
    Battery,
}

impl PowerSource {
    pub const ALL: [PowerSource; 2] = [PowerSource::Ac, PowerSource::Battery];

    pub fn from_on_battery(on_battery: bool) -> Self {
        if on_battery {
            PowerSource::Battery
        } else {
            PowerSource::Ac
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            PowerSource::Ac => 0,
            PowerSource::Battery => 1,
        }
    }
}

impl Display for PowerSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PowerSource::Ac => write!(f, "ac"),
            PowerSource::Battery => write!(f, "batt"),
        }
    }
}

impl FromStr for PowerSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ac" => Ok(PowerSource::Ac),
            "batt" | "battery" => Ok(PowerSource::Battery),
            _ => Err(format!("unknown power source '{s}' (expected ac or batt)")),
        }
    }
}

/// Discretized period of the day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum TimeBucket {
    Day,
    Night,
}

/// Column of the timeout table: a time bucket, or the reserved in-event slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum TimeoutSlot {
    Day,
    Night,
    InEvent,
}

impl TimeoutSlot {
    #[cfg(test)]
    pub const ALL: [TimeoutSlot; 3] = [TimeoutSlot::Day, TimeoutSlot::Night, TimeoutSlot::InEvent];

    fn index(self) -> usize {
        match self {
            TimeoutSlot::Day => 0,
            TimeoutSlot::Night => 1,
            TimeoutSlot::InEvent => 2,
        }
    }
}

impl From<TimeBucket> for TimeoutSlot {
    fn from(bucket: TimeBucket) -> Self {
        match bucket {
            TimeBucket::Day => TimeoutSlot::Day,
            TimeBucket::Night => TimeoutSlot::Night,
        }
    }
}

impl FromStr for TimeoutSlot {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "day" => Ok(TimeoutSlot::Day),
            "night" => Ok(TimeoutSlot::Night),
            "event" => Ok(TimeoutSlot::InEvent),
            _ => Err(format!("unknown timeout slot '{s}' (expected day, night or event)")),
        }
    }
}

/// Capture period per power source and slot. Every cell is populated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TimeoutTable {
    timeouts: [[Duration; 3]; 2],
}

impl TimeoutTable {
    pub fn new(ac: SlotTimeouts, battery: SlotTimeouts) -> Self {
        Self {
            timeouts: [ac.0, battery.0],
        }
    }

    pub fn get(&self, source: PowerSource, slot: TimeoutSlot) -> Duration {
        self.timeouts[source.index()][slot.index()]
    }

    /// Replace one cell, returning the previous value.
    pub fn set(&mut self, source: PowerSource, slot: TimeoutSlot, value: Duration) -> Duration {
        std::mem::replace(&mut self.timeouts[source.index()][slot.index()], value)
    }
}

/// `day,night,event` timeouts in seconds for one power source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SlotTimeouts(pub [Duration; 3]);

impl FromStr for SlotTimeouts {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let secs: Vec<u64> = s
            .split(',')
            .map(|v| parse_timeout_secs(v.trim()))
            .collect::<Result<_, _>>()?;
        match secs.as_slice() {
            &[day, night, event] => Ok(Self([
                Duration::from_secs(day),
                Duration::from_secs(night),
                Duration::from_secs(event),
            ])),
            _ => Err(format!(
                "expected 3 comma separated timeouts (day,night,event), got {}",
                secs.len()
            )),
        }
    }
}

/// Parse a strictly positive number of seconds.
pub(crate) fn parse_timeout_secs(s: &str) -> Result<u64, String> {
    match s.parse::<u64>() {
        Ok(0) => Err("timeouts must be greater than zero".to_string()),
        Ok(v) => Ok(v),
        Err(e) => Err(format!("invalid timeout '{s}': {e}")),
    }
}

/// Calibration curve control points, evenly spaced over the scaled ambient domain.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CurvePoints(pub SmallVec<[f64; 16]>);

impl CurvePoints {
    pub const MIN_POINTS: usize = 3;
    pub const MAX_POINTS: usize = 50;
}

impl FromStr for CurvePoints {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut points = SmallVec::new();
        for v in s.split(',') {
            let v = v.trim();
            let p: f64 = v
                .parse()
                .map_err(|e| format!("invalid curve point '{v}': {e}"))?;
            if !(0.0..=1.0).contains(&p) {
                return Err(format!("curve point {p} is outside [0, 1]"));
            }
            points.push(p);
        }
        if !(Self::MIN_POINTS..=Self::MAX_POINTS).contains(&points.len()) {
            return Err(format!(
                "a curve needs between {} and {} points, got {}",
                Self::MIN_POINTS,
                Self::MAX_POINTS,
                points.len()
            ));
        }
        Ok(Self(points))
    }
}

/// Parse a fraction in `[0, 1]`.
pub(crate) fn parse_fraction(s: &str) -> Result<f64, String> {
    let v: f64 = s.parse().map_err(|e| format!("invalid number '{s}': {e}"))?;
    if (0.0..=1.0).contains(&v) {
        Ok(v)
    } else {
        Err(format!("{v} is outside [0, 1]"))
    }
}

/// Parse a finite number strictly greater than zero.
pub(crate) fn parse_positive(s: &str) -> Result<f64, String> {
    let v: f64 = s.parse().map_err(|e| format!("invalid number '{s}': {e}"))?;
    if v.is_finite() && v > 0.0 {
        Ok(v)
    } else {
        Err(format!("{v} must be a finite number above 0"))
    }
}

/// Smooth transition parameters for backlight writes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Smoothing {
    pub enabled: bool,
    /// Fraction of full brightness changed per write.
    pub step: f64,
    /// Pause between two writes.
    pub step_timeout: Duration,
}

/// Configuration of the backlight controller.
#[derive(Debug, Clone)]
pub(crate) struct Conf {
    pub auto_calib: bool,
    pub keyboard_bl: bool,
    pub smoothing: Smoothing,
    /// Captures at or below this ambient brightness are considered clogged.
    pub shutter_threshold: f64,
    pub num_captures: u8,
    /// Sensor device name, `None` for autodetection.
    pub sensor: Option<String>,
    /// Backlight device name, `None` for all of them.
    pub screen: Option<String>,
    pub timeouts: TimeoutTable,
    curves: [CurvePoints; 2],
}

impl Conf {
    pub fn from_cli(cli: &Cli) -> Self {
        Self {
            auto_calib: !cli.no_auto_calib,
            keyboard_bl: !cli.no_keyboard_bl,
            smoothing: Smoothing {
                enabled: !cli.no_smooth_backlight,
                step: cli.backlight_trans_step,
                step_timeout: Duration::from_millis(cli.backlight_trans_timeout.into()),
            },
            shutter_threshold: cli.shutter_threshold,
            num_captures: cli.num_captures,
            sensor: cli.sensor.clone(),
            screen: cli.screen.clone(),
            timeouts: TimeoutTable::new(cli.ac_timeouts, cli.batt_timeouts),
            curves: [cli.ac_curve.clone(), cli.batt_curve.clone()],
        }
    }

    pub fn curve(&self, source: PowerSource) -> &CurvePoints {
        &self.curves[source.index()]
    }

    pub fn set_curve(&mut self, source: PowerSource, points: CurvePoints) {
        self.curves[source.index()] = points;
    }
}
