use std::collections::HashSet;
use std::error::Error;
use std::fmt::Display;
use std::fs;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;
use std::time::Instant;

use snafu::ResultExt;
use udev::Device;

use crate::errors::{IoSnafu, ParseFloatSnafu, ParseIntSnafu, ServiceError};

#[derive(Debug)]
pub(crate) struct NoSuchFile {
    path: PathBuf,
}

impl Display for NoSuchFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Could not find: {:?}. Maybe --wait is too short (or there is a typo)?",
            self.path
        )
    }
}

impl Error for NoSuchFile {}

/// Wait for a device at `path` to show up, as reported by `present`.
pub(crate) fn wait_for_device(
    path: &Path,
    timeout: Duration,
    mut present: impl FnMut() -> bool,
) -> Result<(), NoSuchFile> {
    let last_time = Instant::now() + timeout;
    loop {
        if present() {
            return Ok(());
        }
        if Instant::now() >= last_time {
            break;
        }
        std::thread::sleep(Duration::from_millis(250));
    }
    Err(NoSuchFile {
        path: path.to_path_buf(),
    })
}

/// Read a sysfs attribute, without the trailing newline.
pub(crate) fn read_attr(p: &Path) -> Result<String, ServiceError> {
    let buf = fs::read_to_string(p).context(IoSnafu {
        path: p.display().to_string(),
    })?;
    Ok(buf.trim_end_matches('\n').to_string())
}

/// Helper to read an integer from a path.
pub(crate) fn read_int(p: &Path) -> Result<u32, ServiceError> {
    read_attr(p)?.trim().parse::<u32>().context(ParseIntSnafu {
        path: p.display().to_string(),
    })
}

/// Helper to read a float from a path.
pub(crate) fn read_float(p: &Path) -> Result<f64, ServiceError> {
    read_attr(p)?.trim().parse::<f64>().context(ParseFloatSnafu {
        path: p.display().to_string(),
    })
}

/// Helper to write an integer to a path.
pub(crate) fn write_int(p: &Path, value: u32) -> Result<(), ServiceError> {
    let path = || p.display().to_string();
    let mut f = OpenOptions::new()
        .write(true)
        .truncate(true)
        .open(p)
        .context(IoSnafu { path: path() })?;
    write!(f, "{value}").context(IoSnafu { path: path() })
}

/// Sorted entries of a sysfs class directory.
pub(crate) fn class_entries(dir: &Path) -> Result<Vec<PathBuf>, ServiceError> {
    let path = || dir.display().to_string();
    let mut entries = vec![];
    for entry in fs::read_dir(dir).context(IoSnafu { path: path() })? {
        entries.push(entry.context(IoSnafu { path: path() })?.path());
    }
    entries.sort();
    Ok(entries)
}

pub fn get_devnode_if_default(device: &Device) -> Option<&Path> {
    let devnode = device.devnode()?;

    if !devnode.file_name()?.to_str()?.starts_with("event") {
        return None;
    }

    const MONITORED_PROPERTIES: [&str; 3] =
        ["ID_INPUT_KEYBOARD", "ID_INPUT_MOUSE", "ID_INPUT_TOUCHPAD"];

    if !device.properties().any(|prop| {
        prop.name()
            .to_str()
            .is_some_and(|name| MONITORED_PROPERTIES.contains(&name))
    }) {
        return None;
    }

    Some(devnode)
}

/// Input devices used to detect user activity when none are given.
pub fn get_default_devices() -> anyhow::Result<Vec<PathBuf>> {
    let mut default_devices = vec![];

    let mut enumerator = udev::Enumerator::new()?;
    enumerator.match_subsystem("input")?;

    for device in enumerator.scan_devices()? {
        if let Some(devnode) = get_devnode_if_default(&device) {
            default_devices.push(devnode.to_path_buf());
        }
    }

    Ok(default_devices)
}

/// Merge explicitly provided input devices with the defaults, dropping
/// duplicates.
pub fn normalize_devices(
    mut provided_device_paths: Vec<PathBuf>,
    mut default_device_paths: Vec<PathBuf>,
) -> anyhow::Result<Vec<PathBuf>> {
    let mut unique_canons = HashSet::new();
    for path in &provided_device_paths {
        // Disallow duplicates in provided inputs
        let canon = fs::canonicalize(path)?;
        if !unique_canons.insert(canon.clone()) {
            anyhow::bail!(
                "Provided input devices have duplicates (provided: {}; its canon: {}.",
                path.to_string_lossy(),
                canon.to_string_lossy()
            );
        }

        // Remove the corresponding duplicate (if any)
        if let Some(idx) = default_device_paths.iter().position(|p| p == &canon) {
            default_device_paths.swap_remove(idx);
        }
    }

    provided_device_paths.append(&mut default_device_paths);
    Ok(provided_device_paths)
}
