//! Ambient light backlight daemon. Periodically samples an ambient light
//! sensor and sets screen and keyboard backlight to match.
//!
//! There is no public code API for you to use! However, the command line
//! interface and the control socket protocol should be stable.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;
use chrono::Local;
use clap::Parser;
use log::{info, warn};

use handlers::{ControlListener, DaytimeListener, DimListener, EvDevListener, Handler, UdevListener};
use lifecycle::Backlight;
use monitor::Monitor;
use state::{Context, State};

use crate::als::{IioSensor, IIO_DIR};
use crate::config::{Conf, PowerSource};
use crate::daytime::Daytime;
use crate::led::{find_kbd_led, Led, LEDS_DIR};
use crate::power::{SysfsPower, POWER_SUPPLY_DIR};
use crate::screen::{SysfsBacklight, BACKLIGHT_DIR};
use crate::services::{KeyboardService, LogPublisher, PowerService, SensorService, Services};
use crate::timer::EpollTimer;
use crate::utils::wait_for_device;

mod als;
mod calibration;
mod config;
mod control;
mod daytime;
mod errors;
mod flags;
mod handlers;
mod led;
mod lifecycle;
mod monitor;
mod policy;
mod power;
mod screen;
mod services;
mod state;
mod timer;
mod utils;

#[cfg(test)]
mod test_utils;

fn main() -> anyhow::Result<()> {
    let cli = flags::Cli::parse();
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(if cli.verbose { "debug" } else { "info" }),
    )
    .init();
    if cli.no_backlight {
        info!("Backlight control disabled, exiting.");
        return Ok(());
    }
    setup_daemon(&cli)?;
    Ok(())
}

/// Keyboard LED to drive, if any.
fn keyboard(config: &flags::Cli) -> Option<Box<dyn KeyboardService>> {
    if config.no_keyboard_bl {
        return None;
    }
    let path = match &config.led_base_dir {
        Some(path) => Some(path.clone()),
        None => match find_kbd_led(Path::new(LEDS_DIR)) {
            Ok(path) => path,
            Err(e) => {
                warn!("Failed to look for a keyboard backlight: {e}");
                None
            }
        },
    };
    path.map(|p| Box::new(Led::new(p)) as Box<dyn KeyboardService>)
}

/// Set up to start daemon
fn setup_daemon(config: &flags::Cli) -> anyhow::Result<()> {
    let mut sensor = IioSensor::new(PathBuf::from(IIO_DIR), config.sensor_max_lux);
    if let Some(timeout) = config.wait {
        let name = config.sensor.as_deref();
        let sensor_path = match name {
            Some(name) => Path::new(IIO_DIR).join(name),
            None => PathBuf::from(IIO_DIR),
        };
        wait_for_device(&sensor_path, Duration::from_millis(timeout.into()), || {
            sensor.is_available(name).unwrap_or(false)
        })?;
    }

    let mut state = State::new();
    let mut power = SysfsPower::new(PathBuf::from(POWER_SUPPLY_DIR));
    state.power_source = match power.on_battery() {
        Ok(on_battery) => PowerSource::from_on_battery(on_battery),
        Err(e) => {
            warn!("Failed to read power state, assuming AC: {e}");
            PowerSource::Ac
        }
    };
    let daytime = Daytime::new(config.sunrise, config.sunset, config.event_duration);
    let now = Local::now().time();
    state.time_bucket = daytime.bucket(now);
    state.in_event = daytime.in_event(now);
    let mut ctx = Context::new(Conf::from_cli(config), state);
    info!(
        "Starting on {} power, timeout {:?}.",
        ctx.state.power_source,
        ctx.current_timeout()
    );

    let monitor = Monitor::new()?;
    let services = Services {
        sensor: Box::new(sensor),
        backlight: Box::new(SysfsBacklight::new(PathBuf::from(BACKLIGHT_DIR))),
        keyboard: keyboard(config),
        publisher: Box::new(LogPublisher),
    };
    let timer = EpollTimer::new(monitor.epoll()).context("Failed to create capture timer")?;
    let backlight = Backlight::new(&ctx, services, Box::new(timer));

    let mut listeners: Vec<Box<dyn Handler>> = vec![Box::new(
        DaytimeListener::new(daytime).context("Failed to create daytime timer")?,
    )];
    match UdevListener::new(Box::new(power)) {
        Ok(l) => listeners.push(Box::new(l)),
        Err(e) => warn!("Failed to monitor udev, power source changes go unnoticed: {e}"),
    }
    match ControlListener::bind(&config.control_socket) {
        Ok(l) => listeners.push(Box::new(l)),
        Err(e) => warn!(
            "Failed to bind control socket {:?}: {e}",
            config.control_socket
        ),
    }
    if let Some(secs) = config.dim_timeout {
        listeners.push(Box::new(
            DimListener::new(Duration::from_secs(secs.into())).context("Failed to create dim timer")?,
        ));
        let devices_to_monitor =
            utils::normalize_devices(config.monitor_input.clone(), utils::get_default_devices()?)?;
        for e in devices_to_monitor {
            listeners.push(Box::new(
                EvDevListener::new(&e).map_err(|err| anyhow::anyhow!("Failed to open {e:?}: {err}"))?,
            ));
        }
    }
    ctx.state.last_input = std::time::Instant::now();

    monitor.monitor(listeners, ctx, backlight)?;

    unreachable!();
}
