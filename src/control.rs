//! Line based control commands accepted on the control socket.

use std::{str::FromStr, time::Duration};

use crate::{
    config::{parse_timeout_secs, CurvePoints, PowerSource, TimeBucket, TimeoutSlot},
    lifecycle::{Backlight, Event, Lifecycle},
    state::Context,
};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Command {
    Capture,
    AutoCalib(bool),
    Dimmed(bool),
    Curve(PowerSource, CurvePoints),
    Timeout(PowerSource, TimeoutSlot, Duration),
    Status,
}

fn parse_switch(s: Option<&str>) -> Result<bool, String> {
    match s {
        Some("on") => Ok(true),
        Some("off") => Ok(false),
        _ => Err("expected on or off".to_string()),
    }
}

impl FromStr for Command {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let cmd = match words.next() {
            Some("capture") => Command::Capture,
            Some("status") => Command::Status,
            Some("autocalib") => Command::AutoCalib(parse_switch(words.next())?),
            Some("dimmed") => Command::Dimmed(parse_switch(words.next())?),
            Some("curve") => {
                let source = words.next().ok_or("missing power source")?.parse::<PowerSource>()?;
                let points = words.next().ok_or("missing curve points")?.parse::<CurvePoints>()?;
                Command::Curve(source, points)
            }
            Some("timeout") => {
                let source = words.next().ok_or("missing power source")?.parse::<PowerSource>()?;
                let slot = words.next().ok_or("missing timeout slot")?.parse::<TimeoutSlot>()?;
                let secs = parse_timeout_secs(words.next().ok_or("missing timeout")?)?;
                Command::Timeout(source, slot, Duration::from_secs(secs))
            }
            Some(other) => return Err(format!("unknown command '{other}'")),
            None => return Err("empty command".to_string()),
        };
        match words.next() {
            Some(extra) => Err(format!("unexpected argument '{extra}'")),
            None => Ok(cmd),
        }
    }
}

impl Command {
    /// Event for the controller, if any, and the reply for the client.
    pub fn execute(self, ctx: &Context, backlight: &Backlight) -> (Option<Event>, String) {
        let event = match self {
            Command::Capture => Event::CaptureRequested,
            Command::AutoCalib(enabled) => Event::AutoCalibToggled(enabled),
            Command::Dimmed(dimmed) => Event::DisplayDimmed(dimmed),
            Command::Curve(source, points) => Event::CurveUpdated { source, points },
            Command::Timeout(source, slot, new) => Event::TimeoutChanged {
                source,
                slot,
                old: ctx.conf.timeouts.get(source, slot),
                new,
            },
            Command::Status => {
                let line = status_line(ctx, backlight.lifecycle(), backlight.sensor_available());
                return (None, line);
            }
        };
        (Some(event), "ok".to_string())
    }
}

fn yes_no(b: bool) -> &'static str {
    if b {
        "yes"
    } else {
        "no"
    }
}

pub(crate) fn status_line(ctx: &Context, lifecycle: Lifecycle, sensor_available: bool) -> String {
    let state = &ctx.state;
    format!(
        "lifecycle={} sensor={} autocalib={} power={} bucket={} in_event={} dimmed={} ambient={:.3} backlight={:.3} keyboard={:.3} timeout={}",
        match lifecycle {
            Lifecycle::Active => "active",
            Lifecycle::Paused => "paused",
        },
        yes_no(sensor_available),
        yes_no(ctx.conf.auto_calib),
        state.power_source,
        match state.time_bucket {
            TimeBucket::Day => "day",
            TimeBucket::Night => "night",
        },
        yes_no(state.in_event),
        yes_no(state.display_dimmed),
        state.ambient_br,
        state.current_bl_pct,
        state.current_kbd_pct,
        ctx.current_timeout().as_secs(),
    )
}
