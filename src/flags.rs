//! Command line argument parsing
use std::path::PathBuf;

use chrono::NaiveTime;

use crate::config::{parse_fraction, parse_positive, CurvePoints, SlotTimeouts};

fn parse_time(s: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(s, "%H:%M").map_err(|e| format!("invalid time '{s}': {e}"))
}

#[derive(Debug, clap::Parser)]
#[command(version, about, long_about = None)]
/// Ambient light backlight daemon. Adjusts screen and keyboard backlight
/// from an ambient light sensor.
pub struct Cli {
    /// Do not run the backlight controller at all.
    #[clap(long)]
    pub no_backlight: bool,
    /// Start without automatic calibration. It can be enabled later over the
    /// control socket.
    #[clap(long)]
    pub no_auto_calib: bool,
    /// Do not drive the keyboard backlight.
    #[clap(long)]
    pub no_keyboard_bl: bool,
    /// Set the screen backlight in a single write.
    #[clap(long)]
    pub no_smooth_backlight: bool,
    /// Fraction of full brightness changed per smooth transition step.
    #[clap(long, default_value = "0.05", value_parser = parse_fraction)]
    pub backlight_trans_step: f64,
    /// Milliseconds between two smooth transition steps.
    #[clap(long, default_value_t = 30)]
    pub backlight_trans_timeout: u32,
    /// Captures at or below this ambient brightness are ignored (sensor
    /// covered).
    #[clap(long, default_value = "0.1", value_parser = parse_fraction)]
    pub shutter_threshold: f64,
    /// Number of sensor samples averaged per capture.
    #[clap(long, default_value_t = 5, value_parser = clap::value_parser!(u8).range(1..=20))]
    pub num_captures: u8,
    /// IIO device name of the ambient light sensor (e.g. iio:device0).
    #[clap(short, long)]
    pub sensor: Option<String>,
    /// Illuminance in lux mapped to full ambient brightness.
    #[clap(long, default_value = "1000", value_parser = parse_positive)]
    pub sensor_max_lux: f64,
    /// Backlight device under /sys/class/backlight. Defaults to all of them.
    #[clap(long)]
    pub screen: Option<String>,
    /// Path for keyboard LED to control.
    #[clap(short, long = "led")]
    pub led_base_dir: Option<PathBuf>,
    /// Backlight curve control points while on AC.
    #[clap(
        long,
        default_value = "0.0,0.15,0.29,0.45,0.61,0.74,0.81,0.88,0.93,0.97,1.0"
    )]
    pub ac_curve: CurvePoints,
    /// Backlight curve control points while on battery.
    #[clap(
        long,
        default_value = "0.0,0.15,0.23,0.36,0.52,0.59,0.65,0.71,0.75,0.78,0.80"
    )]
    pub batt_curve: CurvePoints,
    /// Capture timeouts on AC in seconds: day,night,event
    #[clap(long, default_value = "600,3600,300")]
    pub ac_timeouts: SlotTimeouts,
    /// Capture timeouts on battery in seconds: day,night,event
    #[clap(long, default_value = "1200,7200,600")]
    pub batt_timeouts: SlotTimeouts,
    /// Local time of sunrise (HH:MM).
    #[clap(long, default_value = "07:00", value_parser = parse_time)]
    pub sunrise: NaiveTime,
    /// Local time of sunset (HH:MM).
    #[clap(long, default_value = "19:00", value_parser = parse_time)]
    pub sunset: NaiveTime,
    /// Minutes around sunrise and sunset that count as an event.
    #[clap(long, default_value_t = 30)]
    pub event_duration: u32,
    /// Seconds without input after which the display counts as dimmed and
    /// captures pause.
    #[clap(long)]
    pub dim_timeout: Option<u32>,
    /// Paths to evdev devices to monitor for --dim-timeout. Use
    /// /dev/input/by-id or /dev/input/by-path. Defaults to all keyboards,
    /// mice and touchpads.
    #[clap(short = 'i', long)]
    pub monitor_input: Vec<PathBuf>,
    /// Path of the control socket.
    #[clap(long, default_value = "/run/ambient-backlightd.sock")]
    pub control_socket: PathBuf,
    /// Enable extra verbosity!
    #[clap(short, long)]
    pub verbose: bool,
    /// Timeout in milliseconds during startup for the sensor to appear.
    ///
    /// This can help with late loaded kernel modules.
    #[clap(short, long)]
    pub wait: Option<u32>,
}
