//! Screen backlights in /sys/class/backlight

use std::{
    path::{Path, PathBuf},
    thread,
};

use log::debug;

use crate::{
    config::Smoothing,
    errors::ServiceError,
    services::BacklightService,
    utils::{class_entries, read_int, write_int},
};

pub(crate) const BACKLIGHT_DIR: &str = "/sys/class/backlight";

const BRIGHTNESS: &str = "brightness";
const MAX_BRIGHTNESS: &str = "max_brightness";

/// One backlight device and where it is heading.
#[derive(Debug)]
struct Target {
    path: PathBuf,
    levels: std::vec::IntoIter<u32>,
}

/// All backlight devices of a sysfs class directory. Internal panels and
/// DDC/CI driven external monitors both show up there.
#[derive(Debug)]
pub(crate) struct SysfsBacklight {
    root: PathBuf,
}

impl SysfsBacklight {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn devices(&self, selector: Option<&str>) -> Result<Vec<PathBuf>, ServiceError> {
        let devices = class_entries(&self.root)?;
        Ok(match selector {
            Some(name) => devices
                .into_iter()
                .filter(|p| p.file_name().is_some_and(|n| n == name))
                .collect(),
            None => devices,
        })
    }

    /// Compute the writes needed to bring one device to `pct`.
    fn target(path: &Path, pct: f64, smoothing: &Smoothing) -> Result<Target, ServiceError> {
        let max = read_int(&path.join(MAX_BRIGHTNESS))?;
        let wanted = (pct * f64::from(max)).round() as u32;
        let levels = if smoothing.enabled {
            let current = read_int(&path.join(BRIGHTNESS))?;
            let step = ((smoothing.step * f64::from(max)).round() as u32).max(1);
            smooth_steps(current, wanted, step)
        } else {
            vec![wanted]
        };
        Ok(Target {
            path: path.join(BRIGHTNESS),
            levels: levels.into_iter(),
        })
    }
}

/// Levels to write, in order, to go from `current` to `target` by at most
/// `step` at a time. Always ends with `target`.
pub(crate) fn smooth_steps(current: u32, target: u32, step: u32) -> Vec<u32> {
    let step = step.max(1);
    let mut levels = vec![];
    let mut level = current;
    while level != target {
        level = if level < target {
            level.saturating_add(step).min(target)
        } else {
            level.saturating_sub(step).max(target)
        };
        levels.push(level);
    }
    if levels.is_empty() {
        levels.push(target);
    }
    levels
}

impl BacklightService for SysfsBacklight {
    /// Succeeds if at least one display accepted the value.
    fn set_all(
        &mut self,
        pct: f64,
        smoothing: &Smoothing,
        selector: Option<&str>,
    ) -> Result<bool, ServiceError> {
        let mut targets = vec![];
        for dev in self.devices(selector)? {
            match Self::target(&dev, pct, smoothing) {
                Ok(t) => targets.push((t, true)),
                Err(e) => debug!("Skipping backlight {}: {e}", dev.display()),
            }
        }
        if targets.is_empty() {
            return Ok(false);
        }

        // Step all displays together.
        loop {
            let mut wrote = false;
            for (target, ok) in targets.iter_mut().filter(|(_, ok)| *ok) {
                if let Some(level) = target.levels.next() {
                    if let Err(e) = write_int(&target.path, level) {
                        debug!("Failed to write {}: {e}", target.path.display());
                        *ok = false;
                    }
                    wrote = true;
                }
            }
            if !wrote {
                break;
            }
            if smoothing.enabled {
                thread::sleep(smoothing.step_timeout);
            }
        }
        Ok(targets.iter().any(|(_, ok)| *ok))
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, time::Duration};

    use super::*;

    fn fake_backlight(root: &Path, name: &str, current: u32, max: u32) -> PathBuf {
        let dir = root.join(name);
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join(BRIGHTNESS), format!("{current}\n")).unwrap();
        fs::write(dir.join(MAX_BRIGHTNESS), format!("{max}\n")).unwrap();
        dir
    }

    fn smoothing(enabled: bool) -> Smoothing {
        Smoothing {
            enabled,
            step: 0.1,
            step_timeout: Duration::ZERO,
        }
    }

    #[test]
    fn steps_up_and_down() {
        assert_eq!(smooth_steps(0, 25, 10), vec![10, 20, 25]);
        assert_eq!(smooth_steps(25, 0, 10), vec![15, 5, 0]);
        assert_eq!(smooth_steps(7, 7, 10), vec![7]);
        assert_eq!(smooth_steps(0, 2, 0), vec![1, 2]);
    }

    #[test]
    fn sets_every_device() {
        let root = tempfile::tempdir().unwrap();
        let a = fake_backlight(root.path(), "intel_backlight", 0, 1000);
        let b = fake_backlight(root.path(), "ddcci5", 80, 100);
        let mut bl = SysfsBacklight::new(root.path().to_path_buf());

        assert!(bl.set_all(0.25, &smoothing(true), None).unwrap());
        assert_eq!(read_int(&a.join(BRIGHTNESS)).unwrap(), 250);
        assert_eq!(read_int(&b.join(BRIGHTNESS)).unwrap(), 25);
    }

    #[test]
    fn selector_limits_devices() {
        let root = tempfile::tempdir().unwrap();
        let a = fake_backlight(root.path(), "intel_backlight", 0, 100);
        let b = fake_backlight(root.path(), "ddcci5", 0, 100);
        let mut bl = SysfsBacklight::new(root.path().to_path_buf());

        assert!(bl
            .set_all(0.5, &smoothing(false), Some("intel_backlight"))
            .unwrap());
        assert_eq!(read_int(&a.join(BRIGHTNESS)).unwrap(), 50);
        assert_eq!(read_int(&b.join(BRIGHTNESS)).unwrap(), 0);
    }

    #[test]
    fn no_device_is_not_ok() {
        let root = tempfile::tempdir().unwrap();
        let mut bl = SysfsBacklight::new(root.path().to_path_buf());
        assert!(!bl.set_all(0.5, &smoothing(false), None).unwrap());
        assert!(!bl.set_all(0.5, &smoothing(false), Some("missing")).unwrap());
    }

    #[test]
    fn missing_class_dir_is_an_error() {
        let root = tempfile::tempdir().unwrap();
        let mut bl = SysfsBacklight::new(root.path().join("nope"));
        assert!(bl.set_all(0.5, &smoothing(false), None).is_err());
    }
}
