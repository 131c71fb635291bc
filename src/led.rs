//! Abstraction for the keyboard backlight LED in /sys

use std::path::{Path, PathBuf};

use log::warn;

use crate::{
    errors::ServiceError,
    services::KeyboardService,
    utils::{class_entries, read_int, write_int},
};

pub(crate) const LEDS_DIR: &str = "/sys/class/leds";

const BRIGHTNESS: &str = "brightness";
const MAX_BRIGHTNESS: &str = "max_brightness";

#[derive(Debug)]
pub(crate) struct Led {
    /// Path to LED
    path: PathBuf,
}

impl Led {
    /// Create a new LED wrapper.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Get the current brightness
    #[cfg(test)]
    pub fn brightness(&self) -> Result<u32, ServiceError> {
        read_int(&self.path.join(BRIGHTNESS))
    }
}

impl KeyboardService for Led {
    fn max_brightness(&mut self) -> Result<u32, ServiceError> {
        read_int(&self.path.join(MAX_BRIGHTNESS))
    }

    fn set_brightness(&mut self, brightness: u32) -> Result<(), ServiceError> {
        write_int(&self.path.join(BRIGHTNESS), brightness)
    }
}

/// Find the keyboard backlight LED under `leds_dir`.
pub(crate) fn find_kbd_led(leds_dir: &Path) -> Result<Option<PathBuf>, ServiceError> {
    let mut found = class_entries(leds_dir)?.into_iter().filter(|p| {
        p.file_name()
            .is_some_and(|n| n.to_string_lossy().ends_with("kbd_backlight"))
    });
    let first = found.next();
    if let Some(ref led) = first {
        if found.next().is_some() {
            warn!(
                "Multiple kbd_backlights found, using {}. Please specify one explicitly.",
                led.display()
            );
        }
    }
    Ok(first)
}
