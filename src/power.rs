//! AC/battery detection through /sys/class/power_supply

use std::path::PathBuf;

use log::debug;

use crate::{
    errors::ServiceError,
    services::PowerService,
    utils::{class_entries, read_attr, read_int},
};

pub(crate) const POWER_SUPPLY_DIR: &str = "/sys/class/power_supply";

#[derive(Debug)]
pub(crate) struct SysfsPower {
    root: PathBuf,
}

impl SysfsPower {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

impl PowerService for SysfsPower {
    /// On battery when there are mains supplies and none of them is online.
    /// Machines without any mains supply are assumed to be on AC.
    fn on_battery(&mut self) -> Result<bool, ServiceError> {
        let mut mains = 0;
        for supply in class_entries(&self.root)? {
            if read_attr(&supply.join("type")).ok().as_deref() != Some("Mains") {
                continue;
            }
            mains += 1;
            if read_int(&supply.join("online"))? == 1 {
                return Ok(false);
            }
        }
        if mains == 0 {
            debug!("No mains power supply found, assuming AC");
        }
        Ok(mains > 0)
    }
}
