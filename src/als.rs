//! Ambient light sensors exposed through IIO

use std::{
    path::{Path, PathBuf},
    thread,
    time::Duration,
};

use snafu::OptionExt;

use crate::{
    errors::{NoDeviceSnafu, ServiceError},
    services::{Samples, SensorService},
    utils::{class_entries, read_float},
};

pub(crate) const IIO_DIR: &str = "/sys/bus/iio/devices";

/// Processed illuminance in lux.
const ILLUMINANCE_INPUT: &str = "in_illuminance_input";
/// Raw illuminance, to be multiplied by the scale.
const ILLUMINANCE_RAW: &str = "in_illuminance_raw";
const ILLUMINANCE_SCALE: &str = "in_illuminance_scale";

/// Pause between two samples of one capture.
const SAMPLE_INTERVAL: Duration = Duration::from_millis(20);

fn has_illuminance(dir: &Path) -> bool {
    dir.join(ILLUMINANCE_INPUT).exists() || dir.join(ILLUMINANCE_RAW).exists()
}

#[derive(Debug)]
pub(crate) struct IioSensor {
    root: PathBuf,
    /// Illuminance mapped to an ambient brightness of 1.
    max_lux: f64,
    interval: Duration,
}

impl IioSensor {
    pub fn new(root: PathBuf, max_lux: f64) -> Self {
        Self {
            root,
            max_lux,
            interval: SAMPLE_INTERVAL,
        }
    }

    /// Directory of the sensor to use, if there is one.
    fn device_dir(&self, device: Option<&str>) -> Result<Option<PathBuf>, ServiceError> {
        if let Some(name) = device {
            let dir = self.root.join(name);
            return Ok(has_illuminance(&dir).then_some(dir));
        }
        if !self.root.exists() {
            return Ok(None);
        }
        Ok(class_entries(&self.root)?
            .into_iter()
            .find(|dir| has_illuminance(dir)))
    }

    fn read_lux(dir: &Path) -> Result<f64, ServiceError> {
        let input = dir.join(ILLUMINANCE_INPUT);
        if input.exists() {
            return read_float(&input);
        }
        let scale_path = dir.join(ILLUMINANCE_SCALE);
        let scale = if scale_path.exists() {
            read_float(&scale_path)?
        } else {
            1.0
        };
        Ok(read_float(&dir.join(ILLUMINANCE_RAW))? * scale)
    }

    fn normalize(&self, lux: f64) -> f64 {
        (lux / self.max_lux).clamp(0.0, 1.0)
    }
}

impl SensorService for IioSensor {
    fn is_available(&mut self, device: Option<&str>) -> Result<bool, ServiceError> {
        Ok(self.device_dir(device)?.is_some())
    }

    fn capture(&mut self, device: Option<&str>, count: u8) -> Result<Samples, ServiceError> {
        let dir = self.device_dir(device)?.context(NoDeviceSnafu {
            what: "ambient light sensor",
        })?;
        let mut samples = Samples::new();
        for i in 0..count {
            if i > 0 {
                thread::sleep(self.interval);
            }
            samples.push(self.normalize(Self::read_lux(&dir)?));
        }
        Ok(samples)
    }
}
