//! Hardware capabilities the controller talks to.

use log::debug;
use smallvec::SmallVec;

use crate::{config::Smoothing, errors::ServiceError};

/// Sensor readings of one capture, normalised to `[0, 1]`.
pub(crate) type Samples = SmallVec<[f64; 20]>;

/// Ambient light sensor.
pub(crate) trait SensorService {
    fn is_available(&mut self, device: Option<&str>) -> Result<bool, ServiceError>;
    fn capture(&mut self, device: Option<&str>, count: u8) -> Result<Samples, ServiceError>;
}

/// Screen backlight(s).
pub(crate) trait BacklightService {
    /// Set every selected display to `pct`. `Ok(false)` means the hardware
    /// did not accept the value.
    fn set_all(
        &mut self,
        pct: f64,
        smoothing: &Smoothing,
        selector: Option<&str>,
    ) -> Result<bool, ServiceError>;
}

/// Keyboard backlight.
pub(crate) trait KeyboardService {
    fn max_brightness(&mut self) -> Result<u32, ServiceError>;
    fn set_brightness(&mut self, level: u32) -> Result<(), ServiceError>;
}

/// AC/battery state.
pub(crate) trait PowerService {
    fn on_battery(&mut self) -> Result<bool, ServiceError>;
}

/// Values published by the controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Topic {
    CurrentBlPct(f64),
    CurrentKbdPct(f64),
    CurrentAmbientBr(f64),
}

pub(crate) trait Publisher {
    fn publish(&mut self, topic: Topic);
}

/// Publisher that only logs.
#[derive(Debug, Default)]
pub(crate) struct LogPublisher;

impl Publisher for LogPublisher {
    fn publish(&mut self, topic: Topic) {
        debug!("Published {topic:?}");
    }
}

/// The set of services the controller is built on.
pub(crate) struct Services {
    pub sensor: Box<dyn SensorService>,
    pub backlight: Box<dyn BacklightService>,
    /// `None` when there is no keyboard backlight at all.
    pub keyboard: Option<Box<dyn KeyboardService>>,
    pub publisher: Box<dyn Publisher>,
}
