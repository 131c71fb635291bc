//! Active/paused state machine driving the capture loop.
//!
//! Every event is first folded into the [`Context`], then handled by the
//! handler of the current state. Pausing and resuming happen in two phases:
//! the new state is committed first, then a confirmation is routed through
//! the handler of that state, which alone touches the timer registration.

use std::time::Duration;

use log::{debug, info, warn};

use crate::{
    calibration::Calibration,
    config::{CurvePoints, PowerSource, TimeBucket, TimeoutSlot},
    policy::{capture, run_policy},
    services::Services,
    state::Context,
    timer::CaptureTimer,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lifecycle {
    Active,
    Paused,
}

/// Inputs to the controller.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Event {
    PowerSourceChanged {
        old: PowerSource,
        new: PowerSource,
    },
    DisplayDimmed(bool),
    TimeChanged {
        old: TimeBucket,
        new: TimeBucket,
    },
    InEventChanged(bool),
    TimeoutChanged {
        source: PowerSource,
        slot: TimeoutSlot,
        old: Duration,
        new: Duration,
    },
    CaptureRequested,
    CurveUpdated {
        source: PowerSource,
        points: CurvePoints,
    },
    AutoCalibToggled(bool),
    /// Sensor hardware may have appeared or disappeared.
    SensorChanged,
    TimerExpired,
}

impl Event {
    /// Record the change this event carries.
    fn absorb(&self, ctx: &mut Context) {
        match self {
            Event::PowerSourceChanged { new, .. } => ctx.state.power_source = *new,
            Event::DisplayDimmed(dimmed) => ctx.state.display_dimmed = *dimmed,
            Event::TimeChanged { new, .. } => ctx.state.time_bucket = *new,
            Event::InEventChanged(in_event) => ctx.state.in_event = *in_event,
            Event::TimeoutChanged {
                source, slot, new, ..
            } => {
                ctx.conf.timeouts.set(*source, *slot, *new);
            }
            Event::CurveUpdated { source, points } => ctx.conf.set_curve(*source, points.clone()),
            Event::AutoCalibToggled(enabled) => ctx.conf.auto_calib = *enabled,
            Event::CaptureRequested | Event::SensorChanged | Event::TimerExpired => (),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Confirmation {
    Paused,
    Resumed,
}

/// The backlight controller.
pub(crate) struct Backlight {
    lifecycle: Lifecycle,
    sensor_available: bool,
    /// Keyboard maximum level, probed once. `None` disables the keyboard.
    kbd_max: Option<u32>,
    calibration: Calibration,
    services: Services,
    timer: Box<dyn CaptureTimer>,
}

impl Backlight {
    /// Probe the hardware and start in the matching state.
    pub fn new(ctx: &Context, mut services: Services, timer: Box<dyn CaptureTimer>) -> Self {
        let calibration = Calibration::new(&ctx.conf);

        let kbd_max = match services.keyboard.as_mut().map(|k| k.max_brightness()) {
            Some(Ok(max)) if max > 0 => {
                info!("Keyboard backlight calibration enabled.");
                Some(max)
            }
            Some(Err(e)) => {
                info!("Keyboard backlight calibration unsupported: {e}");
                None
            }
            _ => {
                info!("Keyboard backlight calibration unsupported.");
                None
            }
        };

        let sensor_available = services
            .sensor
            .is_available(ctx.conf.sensor.as_deref())
            .unwrap_or(false);

        let mut backlight = Self {
            lifecycle: Lifecycle::Paused,
            sensor_available,
            kbd_max,
            calibration,
            services,
            timer,
        };
        if sensor_available && ctx.conf.auto_calib {
            backlight.lifecycle = Lifecycle::Active;
            backlight.confirm(Confirmation::Resumed);
        } else if !sensor_available {
            info!("Starting paused as no sensor is available.");
        } else {
            info!("Starting paused as automatic calibration is disabled.");
        }
        backlight
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn sensor_available(&self) -> bool {
        self.sensor_available
    }

    /// Handle one event to completion.
    pub fn dispatch(&mut self, ctx: &mut Context, event: Event) {
        event.absorb(ctx);
        debug!("{:?} handling {event:?}, state: {:?}", self.lifecycle, ctx.state);
        match self.lifecycle {
            Lifecycle::Active => self.receive(ctx, event),
            Lifecycle::Paused => self.receive_paused(ctx, event),
        }
    }

    fn receive(&mut self, ctx: &mut Context, event: Event) {
        match event {
            Event::PowerSourceChanged { old, new } => {
                info!("Power source changed from {old} to {new}, capturing now.");
                self.set_timeout(Duration::ZERO);
            }
            Event::DisplayDimmed(_) | Event::AutoCalibToggled(_) => self.reconcile(ctx),
            Event::TimeChanged { old, .. } => {
                // While in an event, the bucket does not select the timeout.
                let old_slot = if ctx.state.in_event {
                    TimeoutSlot::InEvent
                } else {
                    old.into()
                };
                let old = ctx.conf.timeouts.get(ctx.state.power_source, old_slot);
                self.reschedule(old, ctx.current_timeout());
            }
            Event::InEventChanged(in_event) => {
                let old_slot = if in_event {
                    ctx.state.time_bucket.into()
                } else {
                    TimeoutSlot::InEvent
                };
                let old = ctx.conf.timeouts.get(ctx.state.power_source, old_slot);
                self.reschedule(old, ctx.current_timeout());
            }
            Event::TimeoutChanged {
                source, slot, old, ..
            } => {
                if source == ctx.state.power_source && slot == ctx.state.timeout_slot() {
                    self.reschedule(old, ctx.current_timeout());
                }
            }
            Event::CaptureRequested => self.do_capture(ctx, false),
            Event::CurveUpdated { source, .. } => self.recalibrate(ctx, source),
            Event::SensorChanged => self.on_sensor_change(ctx),
            Event::TimerExpired => {
                if let Err(e) = self.timer.acknowledge() {
                    warn!("Failed to read capture timer: {e}");
                }
                self.do_capture(ctx, true);
            }
        }
    }

    fn receive_paused(&mut self, ctx: &mut Context, event: Event) {
        match event {
            Event::DisplayDimmed(_) | Event::AutoCalibToggled(_) => self.reconcile(ctx),
            Event::CaptureRequested => {
                if self.sensor_available && !ctx.state.display_dimmed {
                    self.do_capture(ctx, false);
                }
            }
            Event::CurveUpdated { source, .. } => self.recalibrate(ctx, source),
            Event::SensorChanged => self.on_sensor_change(ctx),
            Event::TimerExpired => debug!("Ignoring capture timer while paused"),
            Event::PowerSourceChanged { .. }
            | Event::TimeChanged { .. }
            | Event::InEventChanged(_)
            | Event::TimeoutChanged { .. } => (),
        }
    }

    fn confirm(&mut self, confirmation: Confirmation) {
        let result = match (self.lifecycle, confirmation) {
            (Lifecycle::Paused, Confirmation::Paused) => self.timer.deregister(),
            (Lifecycle::Active, Confirmation::Resumed) => self.timer.register(),
            (lifecycle, confirmation) => {
                debug!("Ignoring {confirmation:?} while {lifecycle:?}");
                Ok(())
            }
        };
        match result {
            Ok(()) => debug_assert_eq!(
                self.timer.is_registered(),
                self.lifecycle == Lifecycle::Active
            ),
            Err(e) => warn!("Failed to update capture timer registration: {e}"),
        }
    }

    fn pause(&mut self) {
        self.lifecycle = Lifecycle::Paused;
        self.confirm(Confirmation::Paused);
    }

    fn resume(&mut self) {
        self.lifecycle = Lifecycle::Active;
        self.confirm(Confirmation::Resumed);
    }

    fn should_run(&self, ctx: &Context) -> bool {
        self.sensor_available && ctx.conf.auto_calib && !ctx.state.display_dimmed
    }

    /// Pause or resume according to every pausing condition.
    fn reconcile(&mut self, ctx: &Context) {
        if self.should_run(ctx) {
            self.resume();
        } else {
            self.pause();
        }
    }

    fn on_sensor_change(&mut self, ctx: &Context) {
        let available = self
            .services
            .sensor
            .is_available(ctx.conf.sensor.as_deref())
            .unwrap_or(false);
        if available == self.sensor_available {
            return;
        }
        self.sensor_available = available;
        if available {
            info!("Sensor is now available.");
        } else {
            info!("Paused as no sensor is available.");
        }
        self.reconcile(ctx);
    }

    fn recalibrate(&mut self, ctx: &Context, source: PowerSource) {
        self.calibration.recalibrate(source, ctx.conf.curve(source));
    }

    fn do_capture(&mut self, ctx: &mut Context, reset_timer: bool) {
        match capture(&mut self.services, ctx) {
            Ok(ambient) => run_policy(
                ambient,
                &mut self.services,
                ctx,
                &self.calibration,
                self.kbd_max,
            ),
            Err(e) => debug!("Skipping capture: {e}"),
        }
        if reset_timer {
            self.set_timeout(ctx.current_timeout());
        }
    }

    fn set_timeout(&mut self, timeout: Duration) {
        if let Err(e) = self.timer.set_timeout(timeout) {
            warn!("Failed to arm capture timer: {e}");
        }
    }

    fn reschedule(&mut self, old: Duration, new: Duration) {
        if let Err(e) = self.timer.reschedule(old, new) {
            warn!("Failed to reschedule capture timer: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::*;
    use crate::{
        config::test_support::test_conf,
        policy::{policy, PolicyAction},
        services::Topic,
        state::State,
        test_utils::{fake_services, FakeTimer, Hw, SharedHw},
    };

    const fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn setup_with(hw: Hw, tweak: impl FnOnce(&mut Context)) -> (SharedHw, Context, Backlight) {
        let hw = Rc::new(RefCell::new(hw));
        let mut ctx = Context::new(test_conf(), State::new());
        tweak(&mut ctx);
        let backlight = Backlight::new(&ctx, fake_services(&hw), Box::new(FakeTimer(hw.clone())));
        (hw, ctx, backlight)
    }

    fn setup() -> (SharedHw, Context, Backlight) {
        setup_with(Hw::default(), |_| ())
    }

    fn push_reading(hw: &SharedHw, value: f64) {
        hw.borrow_mut().readings.push_back(Some(vec![value; 5]));
    }

    #[test]
    fn starts_active_with_timer_registered_once() {
        let (hw, _ctx, bl) = setup();
        assert_eq!(bl.lifecycle(), Lifecycle::Active);
        assert!(hw.borrow().registered);
        assert_eq!(hw.borrow().registrations, 1);
    }

    #[test]
    fn starts_paused_without_sensor() {
        let (hw, _ctx, bl) = setup_with(
            Hw {
                sensor_available: false,
                ..Hw::default()
            },
            |_| (),
        );
        assert_eq!(bl.lifecycle(), Lifecycle::Paused);
        assert_eq!(hw.borrow().registrations, 0);
        assert!(!hw.borrow().registered);
    }

    #[test]
    fn starts_paused_without_auto_calibration() {
        let (hw, _ctx, bl) = setup_with(Hw::default(), |ctx| ctx.conf.auto_calib = false);
        assert_eq!(bl.lifecycle(), Lifecycle::Paused);
        assert_eq!(hw.borrow().registrations, 0);
    }

    #[test]
    fn capture_applies_calibrated_levels() {
        let (hw, mut ctx, mut bl) = setup();
        bl.calibration = Calibration::from_coefficients([0.0, 0.0, 0.01], [0.0, 0.0, 0.0]);
        push_reading(&hw, 0.5);

        bl.dispatch(&mut ctx, Event::TimerExpired);

        let hw = hw.borrow();
        assert_eq!(hw.acks, 1);
        assert_eq!(hw.backlight_writes.len(), 1);
        assert!((hw.backlight_writes[0] - 0.25).abs() < 1e-12);
        assert!((ctx.state.current_bl_pct - 0.25).abs() < 1e-12);
        assert!((ctx.state.current_kbd_pct - 0.75).abs() < 1e-12);
        assert_eq!(hw.keyboard_writes, vec![75]);
        assert_eq!(ctx.state.ambient_br, 0.5);
        assert!(hw.published.contains(&Topic::CurrentAmbientBr(0.5)));
        assert!(matches!(hw.published.last(), Some(Topic::CurrentKbdPct(_))));
        // Re-armed with the AC day timeout.
        assert_eq!(hw.timeouts.last(), Some(&secs(600)));
    }

    #[test]
    fn clogged_capture_changes_nothing() {
        let (hw, mut ctx, mut bl) = setup();
        ctx.state.current_bl_pct = 0.4;
        push_reading(&hw, 0.03);

        bl.dispatch(&mut ctx, Event::TimerExpired);

        let hw = hw.borrow();
        assert!(hw.backlight_writes.is_empty());
        assert!(hw.keyboard_writes.is_empty());
        assert_eq!(ctx.state.current_bl_pct, 0.4);
        assert_eq!(hw.timeouts.last(), Some(&secs(600)));
    }

    #[test]
    fn transport_failure_skips_cycle_but_keeps_timer() {
        let (hw, mut ctx, mut bl) = setup();
        ctx.state.current_bl_pct = 0.4;

        bl.dispatch(&mut ctx, Event::TimerExpired);

        let hw = hw.borrow();
        assert_eq!(hw.captures, 1);
        assert!(hw.backlight_writes.is_empty());
        assert!(hw.published.is_empty());
        assert_eq!(ctx.state.current_bl_pct, 0.4);
        assert_eq!(hw.timeouts.last(), Some(&secs(600)));
    }

    #[test]
    fn keyboard_failure_keeps_backlight() {
        let (hw, mut ctx, mut bl) = setup();
        hw.borrow_mut().keyboard_errors = true;
        ctx.state.current_kbd_pct = 0.1;
        push_reading(&hw, 0.5);

        bl.dispatch(&mut ctx, Event::CaptureRequested);

        assert!(ctx.state.current_bl_pct > 0.0);
        assert_eq!(ctx.state.current_kbd_pct, 0.1);
        assert_eq!(hw.borrow().keyboard_writes.len(), 1);
    }

    #[test]
    fn backlight_failure_keeps_keyboard_independent() {
        let (hw, mut ctx, mut bl) = setup();
        bl.calibration = Calibration::from_coefficients([0.0, 0.0, 0.01], [0.0, 0.0, 0.0]);
        hw.borrow_mut().backlight_accepts = false;
        ctx.state.current_bl_pct = 0.4;
        push_reading(&hw, 0.5);

        bl.dispatch(&mut ctx, Event::CaptureRequested);

        assert_eq!(ctx.state.current_bl_pct, 0.4);
        assert!((ctx.state.current_kbd_pct - 0.75).abs() < 1e-12);
        assert!(!hw
            .borrow()
            .published
            .iter()
            .any(|t| matches!(t, Topic::CurrentBlPct(_))));
    }

    #[test]
    fn backlight_transport_error_keeps_keyboard_and_timer() {
        let (hw, mut ctx, mut bl) = setup();
        bl.calibration = Calibration::from_coefficients([0.0, 0.0, 0.01], [0.0, 0.0, 0.0]);
        hw.borrow_mut().backlight_errors = true;
        ctx.state.current_bl_pct = 0.4;
        push_reading(&hw, 0.5);

        bl.dispatch(&mut ctx, Event::TimerExpired);

        let hw = hw.borrow();
        assert_eq!(hw.backlight_writes.len(), 1);
        assert_eq!(ctx.state.current_bl_pct, 0.4);
        assert!(!hw
            .published
            .iter()
            .any(|t| matches!(t, Topic::CurrentBlPct(_))));
        assert_eq!(hw.keyboard_writes, vec![75]);
        assert!((ctx.state.current_kbd_pct - 0.75).abs() < 1e-12);
        assert!(matches!(hw.published.last(), Some(Topic::CurrentKbdPct(_))));
        assert_eq!(hw.acks, 1);
        assert_eq!(hw.timeouts.last(), Some(&secs(600)));
    }

    #[test]
    fn non_finite_reading_writes_nothing() {
        let (hw, mut ctx, mut bl) = setup();
        ctx.state.ambient_br = 0.3;
        ctx.state.current_bl_pct = 0.4;
        ctx.state.current_kbd_pct = 0.6;
        hw.borrow_mut()
            .readings
            .push_back(Some(vec![f64::NAN; 5]));

        bl.dispatch(&mut ctx, Event::TimerExpired);

        let hw = hw.borrow();
        assert_eq!(hw.captures, 1);
        assert!(hw.backlight_writes.is_empty());
        assert!(hw.keyboard_writes.is_empty());
        assert!(hw.published.is_empty());
        assert_eq!(ctx.state.ambient_br, 0.3);
        assert_eq!(ctx.state.current_bl_pct, 0.4);
        assert_eq!(ctx.state.current_kbd_pct, 0.6);
        assert_eq!(hw.timeouts.last(), Some(&secs(600)));
    }

    #[test]
    fn nan_ambient_counts_as_clogged() {
        let ctx = Context::new(test_conf(), State::new());
        let cal = Calibration::new(&ctx.conf);
        assert_eq!(policy(f64::NAN, &ctx, &cal, true), PolicyAction::Clogged);
    }

    #[test]
    fn keyboard_disabled_by_config() {
        let (hw, mut ctx, mut bl) = setup_with(Hw::default(), |ctx| ctx.conf.keyboard_bl = false);
        push_reading(&hw, 0.5);
        bl.dispatch(&mut ctx, Event::CaptureRequested);
        assert!(hw.borrow().keyboard_writes.is_empty());
        assert_eq!(hw.borrow().backlight_writes.len(), 1);
    }

    #[test]
    fn keyboard_unsupported_is_never_written() {
        let (hw, mut ctx, mut bl) = setup_with(
            Hw {
                kbd_max: Err(()),
                ..Hw::default()
            },
            |_| (),
        );
        // Hardware showing up later is not picked up.
        hw.borrow_mut().kbd_max = Ok(100);
        push_reading(&hw, 0.5);
        bl.dispatch(&mut ctx, Event::CaptureRequested);
        assert!(hw.borrow().keyboard_writes.is_empty());
    }

    #[test]
    fn manual_capture_does_not_rearm_timer() {
        let (hw, mut ctx, mut bl) = setup();
        push_reading(&hw, 0.5);
        bl.dispatch(&mut ctx, Event::CaptureRequested);
        assert!(hw.borrow().timeouts.is_empty());
        assert_eq!(hw.borrow().acks, 0);
    }

    #[test]
    fn pause_and_resume_are_idempotent() {
        let (hw, _ctx, mut bl) = setup();
        bl.pause();
        bl.pause();
        assert_eq!(bl.lifecycle(), Lifecycle::Paused);
        assert_eq!(hw.borrow().deregistrations, 1);
        assert!(!hw.borrow().registered);

        bl.resume();
        bl.resume();
        assert_eq!(bl.lifecycle(), Lifecycle::Active);
        // Initial registration plus one resume.
        assert_eq!(hw.borrow().registrations, 2);
        assert!(hw.borrow().registered);
    }

    #[test]
    fn pause_resume_round_trip() {
        let (hw, _ctx, mut bl) = setup();
        let before = bl.lifecycle();
        bl.pause();
        bl.resume();
        assert_eq!(bl.lifecycle(), before);
        assert!(hw.borrow().registered);
        assert_eq!(
            hw.borrow().registrations - hw.borrow().deregistrations,
            1
        );
    }

    #[test]
    fn sensor_loss_pauses_before_next_expiry() {
        let (hw, mut ctx, mut bl) = setup();
        hw.borrow_mut().sensor_available = false;

        bl.dispatch(&mut ctx, Event::SensorChanged);
        assert_eq!(bl.lifecycle(), Lifecycle::Paused);
        assert!(!hw.borrow().registered);

        push_reading(&hw, 0.5);
        bl.dispatch(&mut ctx, Event::TimerExpired);
        assert_eq!(hw.borrow().captures, 0);
        assert_eq!(hw.borrow().acks, 0);
    }

    #[test]
    fn unchanged_sensor_notification_is_noop() {
        let (hw, mut ctx, mut bl) = setup();
        bl.dispatch(&mut ctx, Event::SensorChanged);
        bl.dispatch(&mut ctx, Event::SensorChanged);
        assert_eq!(bl.lifecycle(), Lifecycle::Active);
        assert_eq!(hw.borrow().registrations, 1);
        assert_eq!(hw.borrow().deregistrations, 0);
    }

    #[test]
    fn sensor_return_resumes() {
        let (hw, mut ctx, mut bl) = setup_with(
            Hw {
                sensor_available: false,
                ..Hw::default()
            },
            |_| (),
        );
        hw.borrow_mut().sensor_available = true;
        bl.dispatch(&mut ctx, Event::SensorChanged);
        assert_eq!(bl.lifecycle(), Lifecycle::Active);
        assert!(bl.sensor_available());
        assert_eq!(hw.borrow().registrations, 1);
    }

    #[test]
    fn sensor_return_while_dimmed_stays_paused() {
        let (hw, mut ctx, mut bl) = setup();
        bl.dispatch(&mut ctx, Event::DisplayDimmed(true));
        hw.borrow_mut().sensor_available = false;
        bl.dispatch(&mut ctx, Event::SensorChanged);
        hw.borrow_mut().sensor_available = true;
        bl.dispatch(&mut ctx, Event::SensorChanged);
        assert_eq!(bl.lifecycle(), Lifecycle::Paused);

        bl.dispatch(&mut ctx, Event::DisplayDimmed(false));
        assert_eq!(bl.lifecycle(), Lifecycle::Active);
    }

    #[test]
    fn undim_without_sensor_stays_paused() {
        let (hw, mut ctx, mut bl) = setup();
        hw.borrow_mut().sensor_available = false;
        bl.dispatch(&mut ctx, Event::SensorChanged);
        bl.dispatch(&mut ctx, Event::DisplayDimmed(true));
        bl.dispatch(&mut ctx, Event::DisplayDimmed(false));
        assert_eq!(bl.lifecycle(), Lifecycle::Paused);
        assert!(!hw.borrow().registered);
    }

    #[test]
    fn dimming_pauses_and_undimming_resumes() {
        let (hw, mut ctx, mut bl) = setup();
        bl.dispatch(&mut ctx, Event::DisplayDimmed(true));
        assert!(ctx.state.display_dimmed);
        assert_eq!(bl.lifecycle(), Lifecycle::Paused);
        assert!(!hw.borrow().registered);

        bl.dispatch(&mut ctx, Event::DisplayDimmed(false));
        assert_eq!(bl.lifecycle(), Lifecycle::Active);
        assert!(hw.borrow().registered);
    }

    #[test]
    fn paused_manual_capture_honoured_when_possible() {
        let (hw, mut ctx, mut bl) = setup_with(Hw::default(), |ctx| ctx.conf.auto_calib = false);
        push_reading(&hw, 0.5);
        bl.dispatch(&mut ctx, Event::CaptureRequested);
        assert_eq!(hw.borrow().captures, 1);
        assert_eq!(hw.borrow().backlight_writes.len(), 1);
        assert!(hw.borrow().timeouts.is_empty());
    }

    #[test]
    fn paused_manual_capture_ignored_while_dimmed() {
        let (hw, mut ctx, mut bl) = setup();
        bl.dispatch(&mut ctx, Event::DisplayDimmed(true));
        push_reading(&hw, 0.5);
        bl.dispatch(&mut ctx, Event::CaptureRequested);
        assert_eq!(hw.borrow().captures, 0);
    }

    #[test]
    fn paused_manual_capture_ignored_without_sensor() {
        let (hw, mut ctx, mut bl) = setup_with(
            Hw {
                sensor_available: false,
                ..Hw::default()
            },
            |_| (),
        );
        push_reading(&hw, 0.5);
        bl.dispatch(&mut ctx, Event::CaptureRequested);
        assert_eq!(hw.borrow().captures, 0);
    }

    #[test]
    fn auto_calibration_toggle() {
        let (hw, mut ctx, mut bl) = setup();
        bl.dispatch(&mut ctx, Event::AutoCalibToggled(false));
        assert!(!ctx.conf.auto_calib);
        assert_eq!(bl.lifecycle(), Lifecycle::Paused);
        assert!(!hw.borrow().registered);

        bl.dispatch(&mut ctx, Event::AutoCalibToggled(true));
        assert_eq!(bl.lifecycle(), Lifecycle::Active);
        assert!(hw.borrow().registered);
    }

    #[test]
    fn power_change_captures_immediately_when_active() {
        let (hw, mut ctx, mut bl) = setup();
        bl.dispatch(
            &mut ctx,
            Event::PowerSourceChanged {
                old: PowerSource::Ac,
                new: PowerSource::Battery,
            },
        );
        assert_eq!(ctx.state.power_source, PowerSource::Battery);
        assert_eq!(hw.borrow().timeouts, vec![Duration::ZERO]);
    }

    #[test]
    fn power_change_while_paused_only_records_state() {
        let (hw, mut ctx, mut bl) = setup_with(Hw::default(), |ctx| ctx.conf.auto_calib = false);
        bl.dispatch(
            &mut ctx,
            Event::PowerSourceChanged {
                old: PowerSource::Ac,
                new: PowerSource::Battery,
            },
        );
        assert_eq!(ctx.state.power_source, PowerSource::Battery);
        assert!(hw.borrow().timeouts.is_empty());
    }

    #[test]
    fn time_change_keeps_elapsed_wait() {
        let (hw, mut ctx, mut bl) = setup();
        // 100s into the 600s day timeout.
        hw.borrow_mut().remaining = Some(secs(500));
        bl.dispatch(
            &mut ctx,
            Event::TimeChanged {
                old: TimeBucket::Day,
                new: TimeBucket::Night,
            },
        );
        assert_eq!(ctx.current_timeout(), secs(3600));
        assert_eq!(hw.borrow().timeouts, vec![secs(3500)]);
    }

    #[test]
    fn time_change_during_event_keeps_wait() {
        let (hw, mut ctx, mut bl) = setup();
        ctx.state.in_event = true;
        hw.borrow_mut().remaining = Some(secs(250));
        bl.dispatch(
            &mut ctx,
            Event::TimeChanged {
                old: TimeBucket::Day,
                new: TimeBucket::Night,
            },
        );
        assert_eq!(hw.borrow().timeouts, vec![secs(250)]);
    }

    #[test]
    fn entering_and_leaving_event() {
        let (hw, mut ctx, mut bl) = setup();
        hw.borrow_mut().remaining = Some(secs(500));
        bl.dispatch(&mut ctx, Event::InEventChanged(true));
        // 100s elapsed of the 300s event timeout.
        assert_eq!(hw.borrow().timeouts, vec![secs(200)]);

        hw.borrow_mut().remaining = Some(secs(100));
        bl.dispatch(&mut ctx, Event::InEventChanged(false));
        // 200s elapsed of the 600s day timeout.
        assert_eq!(hw.borrow().timeouts.last(), Some(&secs(400)));
    }

    #[test]
    fn overdue_reschedule_fires_immediately() {
        let (hw, mut ctx, mut bl) = setup();
        hw.borrow_mut().remaining = Some(secs(100));
        bl.dispatch(&mut ctx, Event::InEventChanged(true));
        assert_eq!(hw.borrow().timeouts, vec![Duration::ZERO]);
    }

    #[test]
    fn unarmed_timer_is_not_rescheduled() {
        let (hw, mut ctx, mut bl) = setup();
        bl.dispatch(&mut ctx, Event::InEventChanged(true));
        assert!(hw.borrow().timeouts.is_empty());
    }

    #[test]
    fn timeout_change_of_active_slot_reschedules() {
        let (hw, mut ctx, mut bl) = setup();
        hw.borrow_mut().remaining = Some(secs(500));
        bl.dispatch(
            &mut ctx,
            Event::TimeoutChanged {
                source: PowerSource::Battery,
                slot: TimeoutSlot::Day,
                old: secs(1200),
                new: secs(60),
            },
        );
        assert!(hw.borrow().timeouts.is_empty());
        assert_eq!(
            ctx.conf.timeouts.get(PowerSource::Battery, TimeoutSlot::Day),
            secs(60)
        );

        bl.dispatch(
            &mut ctx,
            Event::TimeoutChanged {
                source: PowerSource::Ac,
                slot: TimeoutSlot::Day,
                old: secs(600),
                new: secs(300),
            },
        );
        assert_eq!(hw.borrow().timeouts, vec![secs(200)]);
    }

    #[test]
    fn curve_update_refits_only_that_source() {
        let (_hw, mut ctx, mut bl) = setup_with(Hw::default(), |ctx| ctx.conf.auto_calib = false);
        let batt = bl.calibration.coefficients(PowerSource::Battery);
        let ac = bl.calibration.coefficients(PowerSource::Ac);
        bl.dispatch(
            &mut ctx,
            Event::CurveUpdated {
                source: PowerSource::Ac,
                points: "0.5,0.5,0.5".parse().unwrap(),
            },
        );
        assert_ne!(bl.calibration.coefficients(PowerSource::Ac), ac);
        assert_eq!(bl.calibration.coefficients(PowerSource::Battery), batt);
        assert!((bl.calibration.evaluate(PowerSource::Ac, 3.0) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn committed_levels_stay_in_range() {
        let (hw, mut ctx, mut bl) = setup();
        bl.calibration = Calibration::from_coefficients([-0.5, 0.4, 0.1], [0.0, 0.0, 0.0]);
        // Start above the shutter threshold.
        for i in 2..=20 {
            push_reading(&hw, f64::from(i) / 20.0);
            bl.dispatch(&mut ctx, Event::CaptureRequested);
            let bl_pct = ctx.state.current_bl_pct;
            assert!((0.0..=1.0).contains(&bl_pct));
            assert!((ctx.state.current_kbd_pct - (1.0 - bl_pct)).abs() < 1e-12);
        }
    }
}
