//! Scripted fake hardware shared by the unit tests.

use std::{cell::RefCell, collections::VecDeque, rc::Rc, time::Duration};

use nix::errno::Errno;

use crate::{
    config::Smoothing,
    errors::{NoDeviceSnafu, ServiceError},
    services::{
        BacklightService, KeyboardService, Publisher, Samples, SensorService, Services, Topic,
    },
    timer::CaptureTimer,
};

/// Script for, and record of, everything the fakes see.
#[derive(Debug)]
pub(crate) struct Hw {
    pub sensor_available: bool,
    /// Next capture results, `None` fails the call. Empty queue fails too.
    pub readings: VecDeque<Option<Vec<f64>>>,
    pub backlight_accepts: bool,
    pub backlight_errors: bool,
    pub keyboard_errors: bool,
    pub kbd_max: Result<u32, ()>,

    pub captures: usize,
    pub backlight_writes: Vec<f64>,
    pub keyboard_writes: Vec<u32>,
    pub published: Vec<Topic>,

    pub registered: bool,
    pub registrations: usize,
    pub deregistrations: usize,
    pub remaining: Option<Duration>,
    pub timeouts: Vec<Duration>,
    pub acks: usize,
}

impl Default for Hw {
    fn default() -> Self {
        Self {
            sensor_available: true,
            readings: VecDeque::new(),
            backlight_accepts: true,
            backlight_errors: false,
            keyboard_errors: false,
            kbd_max: Ok(100),
            captures: 0,
            backlight_writes: Vec::new(),
            keyboard_writes: Vec::new(),
            published: Vec::new(),
            registered: false,
            registrations: 0,
            deregistrations: 0,
            remaining: None,
            timeouts: Vec::new(),
            acks: 0,
        }
    }
}

pub(crate) type SharedHw = Rc<RefCell<Hw>>;

fn fake_error() -> ServiceError {
    NoDeviceSnafu { what: "fake" }.build()
}

struct FakeSensor(SharedHw);

impl SensorService for FakeSensor {
    fn is_available(&mut self, _device: Option<&str>) -> Result<bool, ServiceError> {
        Ok(self.0.borrow().sensor_available)
    }

    fn capture(&mut self, _device: Option<&str>, _count: u8) -> Result<Samples, ServiceError> {
        let mut hw = self.0.borrow_mut();
        hw.captures += 1;
        match hw.readings.pop_front() {
            Some(Some(samples)) => Ok(samples.into_iter().collect()),
            _ => Err(fake_error()),
        }
    }
}

struct FakeBacklight(SharedHw);

impl BacklightService for FakeBacklight {
    fn set_all(
        &mut self,
        pct: f64,
        _smoothing: &Smoothing,
        _selector: Option<&str>,
    ) -> Result<bool, ServiceError> {
        let mut hw = self.0.borrow_mut();
        hw.backlight_writes.push(pct);
        if hw.backlight_errors {
            Err(fake_error())
        } else {
            Ok(hw.backlight_accepts)
        }
    }
}

pub(crate) struct FakeKeyboard(pub SharedHw);

impl KeyboardService for FakeKeyboard {
    fn max_brightness(&mut self) -> Result<u32, ServiceError> {
        self.0.borrow().kbd_max.map_err(|_| fake_error())
    }

    fn set_brightness(&mut self, level: u32) -> Result<(), ServiceError> {
        let mut hw = self.0.borrow_mut();
        hw.keyboard_writes.push(level);
        if hw.keyboard_errors {
            Err(fake_error())
        } else {
            Ok(())
        }
    }
}

struct FakePublisher(SharedHw);

impl Publisher for FakePublisher {
    fn publish(&mut self, topic: Topic) {
        self.0.borrow_mut().published.push(topic);
    }
}

pub(crate) struct FakeTimer(pub SharedHw);

impl CaptureTimer for FakeTimer {
    fn register(&mut self) -> Result<(), Errno> {
        let mut hw = self.0.borrow_mut();
        if !hw.registered {
            hw.registered = true;
            hw.registrations += 1;
        }
        Ok(())
    }

    fn deregister(&mut self) -> Result<(), Errno> {
        let mut hw = self.0.borrow_mut();
        if hw.registered {
            hw.registered = false;
            hw.deregistrations += 1;
        }
        Ok(())
    }

    fn is_registered(&self) -> bool {
        self.0.borrow().registered
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), Errno> {
        let mut hw = self.0.borrow_mut();
        hw.timeouts.push(timeout);
        hw.remaining = Some(timeout);
        Ok(())
    }

    fn remaining(&self) -> Result<Option<Duration>, Errno> {
        Ok(self.0.borrow().remaining)
    }

    fn acknowledge(&mut self) -> Result<(), Errno> {
        let mut hw = self.0.borrow_mut();
        hw.acks += 1;
        hw.remaining = None;
        Ok(())
    }
}

/// Services backed by `hw`, with a keyboard.
pub(crate) fn fake_services(hw: &SharedHw) -> Services {
    Services {
        sensor: Box::new(FakeSensor(hw.clone())),
        backlight: Box::new(FakeBacklight(hw.clone())),
        keyboard: Some(Box::new(FakeKeyboard(hw.clone()))),
        publisher: Box::new(FakePublisher(hw.clone())),
    }
}
