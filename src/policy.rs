//! This module captures ambient brightness and computes the backlight to apply.

use log::{debug, info};
use snafu::{ensure, ResultExt};

use crate::{
    calibration::{Calibration, CURVE_DOMAIN},
    errors::{CaptureError, NoSamplesSnafu, NonFiniteSnafu, TransportSnafu},
    services::{Services, Topic},
    state::Context,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum PolicyAction {
    /// Reading too low to trust, leave everything as is.
    Clogged,
    SetLevels {
        backlight: f64,
        /// `None` when the keyboard backlight is not driven.
        keyboard: Option<f64>,
    },
}

/// Request samples from the sensor and average them.
pub(crate) fn capture(services: &mut Services, ctx: &mut Context) -> Result<f64, CaptureError> {
    let samples = services
        .sensor
        .capture(ctx.conf.sensor.as_deref(), ctx.conf.num_captures)
        .context(TransportSnafu)?;
    ensure!(!samples.is_empty(), NoSamplesSnafu);

    let average = samples.iter().sum::<f64>() / samples.len() as f64;
    ensure!(average.is_finite(), NonFiniteSnafu);
    let ambient = average.clamp(0.0, 1.0);
    ctx.state.ambient_br = ambient;
    services.publisher.publish(Topic::CurrentAmbientBr(ambient));
    Ok(ambient)
}

/// Decide what to do with an ambient reading.
pub(crate) fn policy(
    ambient: f64,
    ctx: &Context,
    calibration: &Calibration,
    keyboard_enabled: bool,
) -> PolicyAction {
    if ambient.is_nan() || ambient <= ctx.conf.shutter_threshold {
        return PolicyAction::Clogged;
    }
    let backlight = calibration.evaluate(ctx.state.power_source, ambient * CURVE_DOMAIN);
    // Keyboard follows the opposite curve: lit in the dark, off in bright light.
    let keyboard = keyboard_enabled.then_some(1.0 - backlight);
    PolicyAction::SetLevels {
        backlight,
        keyboard,
    }
}

/// Apply an ambient reading to the hardware.
///
/// `kbd_max` is the probed keyboard maximum, `None` if unsupported.
pub(crate) fn run_policy(
    ambient: f64,
    services: &mut Services,
    ctx: &mut Context,
    calibration: &Calibration,
    kbd_max: Option<u32>,
) {
    let keyboard_enabled = kbd_max.is_some() && ctx.conf.keyboard_bl;
    let action = policy(ambient, ctx, calibration, keyboard_enabled);
    debug!("Action: {action:?}");

    match action {
        PolicyAction::Clogged => {
            info!("Ambient brightness: {ambient:.3}. Clogged capture detected.");
        }
        PolicyAction::SetLevels {
            backlight,
            keyboard,
        } => {
            set_backlight_level(backlight, services, ctx);
            info!(
                "Ambient brightness: {ambient:.3} -> Backlight pct: {:.3}",
                ctx.state.current_bl_pct
            );
            if let (Some(pct), Some(max)) = (keyboard, kbd_max) {
                set_keyboard_level(pct, max, services, ctx);
            }
        }
    }
}

fn set_backlight_level(pct: f64, services: &mut Services, ctx: &mut Context) {
    match services
        .backlight
        .set_all(pct, &ctx.conf.smoothing, ctx.conf.screen.as_deref())
    {
        Ok(true) => {
            ctx.state.current_bl_pct = pct;
            services.publisher.publish(Topic::CurrentBlPct(pct));
        }
        Ok(false) => debug!("Backlight refused {pct:.3}"),
        Err(e) => debug!("Failed to set backlight: {e}"),
    }
}

fn set_keyboard_level(pct: f64, max: u32, services: &mut Services, ctx: &mut Context) {
    let Some(keyboard) = services.keyboard.as_mut() else {
        return;
    };
    let level = (pct * f64::from(max)).round() as u32;
    match keyboard.set_brightness(level) {
        Ok(()) => {
            ctx.state.current_kbd_pct = pct;
            services.publisher.publish(Topic::CurrentKbdPct(pct));
        }
        Err(e) => debug!("Failed to set keyboard backlight: {e}"),
    }
}
