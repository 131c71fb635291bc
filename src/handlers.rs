//! Handlers for activity on file descriptors

use std::{error::Error, os::fd::BorrowedFd};

use smallvec::SmallVec;

use crate::{
    lifecycle::{Backlight, Event},
    state::Context,
};

/// Events produced by one handler invocation.
pub(crate) type Events = SmallVec<[Event; 2]>;

/// Handles some type of notification
pub(crate) trait Handler {
    /// FD that needs to be monitored for this listener
    fn monitored(&self) -> BorrowedFd<'_>;
    /// Called when the monitored FD is readable. Returned events are
    /// dispatched to the controller in order.
    fn process(
        &mut self,
        ctx: &mut Context,
        backlight: &Backlight,
    ) -> Result<Events, Box<dyn Error>>;
}

pub(crate) use control::ControlListener;
pub(crate) use daytime::DaytimeListener;
pub(crate) use dim::DimListener;
pub(crate) use ev_dev::EvDevListener;
pub(crate) use udev_monitor::UdevListener;

/// Code for handling /dev/input
mod ev_dev {
    use std::{
        error::Error,
        io::ErrorKind,
        os::fd::{AsFd, BorrowedFd},
        path::Path,
        time::Instant,
    };

    use evdev_rs::{Device, ReadFlag};
    use log::warn;
    use nix::errno::Errno;
    use smallvec::smallvec;

    use crate::{
        lifecycle::{Backlight, Event},
        state::Context,
    };

    use super::{Events, Handler};

    /// Handler for /dev/input, tracks user activity.
    #[derive(Debug)]
    pub(crate) struct EvDevListener {
        dev: Device,
    }

    impl EvDevListener {
        pub fn new(path: &Path) -> Result<Self, Box<dyn Error>> {
            Ok(Self {
                dev: Device::new_from_path(path)?,
            })
        }
    }

    impl Handler for EvDevListener {
        fn monitored(&self) -> BorrowedFd<'_> {
            self.dev.file().as_fd()
        }

        fn process(
            &mut self,
            ctx: &mut Context,
            _backlight: &Backlight,
        ) -> Result<Events, Box<dyn Error>> {
            match self.dev.next_event(ReadFlag::NORMAL) {
                // We don't care *which* event, just that one happened and when.
                Ok(_) => {
                    // The time in the event is not monotonic, thus we need
                    // to get the time right now instead.
                    ctx.state.last_input = Instant::now();
                    if ctx.state.display_dimmed {
                        return Ok(smallvec![Event::DisplayDimmed(false)]);
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => (),
                Err(e) if e.raw_os_error() == Some(Errno::ENODEV as i32) => {
                    return Err(format!("Input device {:?} is gone", self.dev.file()).into());
                }
                Err(e) => warn!("Error reading {:?}: {}", self.dev.file(), e),
            }
            Ok(Events::new())
        }
    }
}

/// Inactivity based display dimming
mod dim {
    use std::{
        error::Error,
        os::fd::{AsFd, BorrowedFd},
        time::{Duration, Instant},
    };

    use log::info;
    use nix::{
        errno::Errno,
        sys::{
            time::TimeSpec,
            timerfd::{ClockId, Expiration, TimerFd, TimerFlags, TimerSetTimeFlags},
        },
    };
    use smallvec::smallvec;

    use crate::{
        lifecycle::{Backlight, Event},
        state::Context,
    };

    use super::{Events, Handler};

    /// Marks the display dimmed after a period without input. Input devices
    /// ([`super::EvDevListener`]) undim it.
    #[derive(Debug)]
    pub(crate) struct DimListener {
        fd: TimerFd,
        timeout: Duration,
    }

    impl DimListener {
        pub fn new(timeout: Duration) -> Result<Self, Errno> {
            let listener = Self {
                fd: TimerFd::new(
                    ClockId::CLOCK_MONOTONIC,
                    TimerFlags::TFD_NONBLOCK | TimerFlags::TFD_CLOEXEC,
                )?,
                timeout,
            };
            listener.arm(timeout)?;
            Ok(listener)
        }

        fn arm(&self, after: Duration) -> Result<(), Errno> {
            self.fd.set(
                Expiration::OneShot(TimeSpec::from_duration(after.max(Duration::from_millis(1)))),
                TimerSetTimeFlags::empty(),
            )
        }

        /// Decide on dimming after `idle` without input. Returns the event to
        /// emit and when to check again.
        pub(crate) fn check(
            &self,
            idle: Duration,
            dimmed: bool,
        ) -> (Option<Event>, Duration) {
            if idle < self.timeout {
                (None, self.timeout - idle)
            } else if dimmed {
                (None, self.timeout)
            } else {
                (Some(Event::DisplayDimmed(true)), self.timeout)
            }
        }
    }

    impl Handler for DimListener {
        fn monitored(&self) -> BorrowedFd<'_> {
            self.fd.as_fd()
        }

        fn process(
            &mut self,
            ctx: &mut Context,
            _backlight: &Backlight,
        ) -> Result<Events, Box<dyn Error>> {
            match self.fd.wait() {
                Ok(()) | Err(Errno::EAGAIN) => (),
                Err(e) => return Err(e.into()),
            }
            let idle = Instant::now().saturating_duration_since(ctx.state.last_input);
            let (event, next) = self.check(idle, ctx.state.display_dimmed);
            self.arm(next)?;
            Ok(match event {
                Some(event) => {
                    info!("No input for {idle:?}, display dimmed.");
                    smallvec![event]
                }
                None => Events::new(),
            })
        }
    }

}

/// Periodic time of day evaluation
mod daytime {
    use std::{
        error::Error,
        os::fd::{AsFd, BorrowedFd},
        time::Duration,
    };

    use chrono::{Local, NaiveTime};
    use nix::{
        errno::Errno,
        sys::{
            time::TimeSpec,
            timerfd::{ClockId, Expiration, TimerFd, TimerFlags, TimerSetTimeFlags},
        },
    };

    use crate::{
        daytime::Daytime,
        lifecycle::{Backlight, Event},
        state::{Context, State},
    };

    use super::{Events, Handler};

    const CHECK_INTERVAL: Duration = Duration::from_secs(60);

    /// Emits time bucket and event window changes.
    #[derive(Debug)]
    pub(crate) struct DaytimeListener {
        fd: TimerFd,
        daytime: Daytime,
    }

    impl DaytimeListener {
        pub fn new(daytime: Daytime) -> Result<Self, Errno> {
            let fd = TimerFd::new(
                ClockId::CLOCK_REALTIME,
                TimerFlags::TFD_NONBLOCK | TimerFlags::TFD_CLOEXEC,
            )?;
            fd.set(
                Expiration::Interval(TimeSpec::from_duration(CHECK_INTERVAL)),
                TimerSetTimeFlags::empty(),
            )?;
            Ok(Self { fd, daytime })
        }

        pub(crate) fn changes(&self, state: &State, now: NaiveTime) -> Events {
            let mut events = Events::new();
            let bucket = self.daytime.bucket(now);
            if bucket != state.time_bucket {
                events.push(Event::TimeChanged {
                    old: state.time_bucket,
                    new: bucket,
                });
            }
            let in_event = self.daytime.in_event(now);
            if in_event != state.in_event {
                events.push(Event::InEventChanged(in_event));
            }
            events
        }
    }

    impl Handler for DaytimeListener {
        fn monitored(&self) -> BorrowedFd<'_> {
            self.fd.as_fd()
        }

        fn process(
            &mut self,
            ctx: &mut Context,
            _backlight: &Backlight,
        ) -> Result<Events, Box<dyn Error>> {
            match self.fd.wait() {
                Ok(()) | Err(Errno::EAGAIN) => (),
                Err(e) => return Err(e.into()),
            }
            Ok(self.changes(&ctx.state, Local::now().time()))
        }
    }

}

/// Power supply and sensor hotplug notifications from udev
mod udev_monitor {
    use std::{
        error::Error,
        os::fd::{AsRawFd, BorrowedFd},
    };

    use log::{debug, info};
    use udev::{EventType, MonitorBuilder, MonitorSocket};

    use crate::{
        config::PowerSource,
        lifecycle::{Backlight, Event},
        services::PowerService,
        state::{Context, State},
    };

    use super::{Events, Handler};

    pub(crate) struct UdevListener {
        socket: MonitorSocket,
        power: Box<dyn PowerService>,
    }

    impl UdevListener {
        pub fn new(power: Box<dyn PowerService>) -> std::io::Result<Self> {
            let socket = MonitorBuilder::new()?
                .match_subsystem("power_supply")?
                .match_subsystem("iio")?
                .listen()?;
            Ok(Self { socket, power })
        }
    }

    /// Event for a freshly read battery state, if it changed.
    pub(crate) fn power_event(state: &State, on_battery: bool) -> Option<Event> {
        let new = PowerSource::from_on_battery(on_battery);
        (new != state.power_source).then_some(Event::PowerSourceChanged {
            old: state.power_source,
            new,
        })
    }

    impl Handler for UdevListener {
        fn monitored(&self) -> BorrowedFd<'_> {
            // SAFETY: The socket lives as long as self, which the borrow is tied to.
            unsafe { BorrowedFd::borrow_raw(self.socket.as_raw_fd()) }
        }

        fn process(
            &mut self,
            ctx: &mut Context,
            _backlight: &Backlight,
        ) -> Result<Events, Box<dyn Error>> {
            let mut power_changed = false;
            let mut sensor_changed = false;
            for event in self.socket.iter() {
                let device = event.device();
                match device.subsystem().and_then(|s| s.to_str()) {
                    Some("power_supply") => power_changed = true,
                    Some("iio") if matches!(event.event_type(), EventType::Add | EventType::Remove) => {
                        sensor_changed = true
                    }
                    _ => (),
                }
            }

            let mut events = Events::new();
            if power_changed {
                match self.power.on_battery() {
                    Ok(on_battery) => {
                        if let Some(event) = power_event(&ctx.state, on_battery) {
                            info!(
                                "{}",
                                if on_battery {
                                    "AC cable disconnected. Powersaving mode enabled."
                                } else {
                                    "AC cable connected. Powersaving mode disabled."
                                }
                            );
                            events.push(event);
                        }
                    }
                    Err(e) => debug!("Failed to read power state: {e}"),
                }
            }
            if sensor_changed {
                events.push(Event::SensorChanged);
            }
            Ok(events)
        }
    }

}

/// Control socket
mod control {
    use std::{
        error::Error,
        fs,
        io::{BufRead, BufReader, ErrorKind, Write},
        os::{
            fd::{AsFd, BorrowedFd},
            unix::net::{UnixListener, UnixStream},
        },
        path::{Path, PathBuf},
        time::Duration,
    };

    use log::{debug, warn};

    use crate::{
        control::Command,
        lifecycle::{Backlight, Event},
        state::Context,
    };

    use super::{Events, Handler};

    /// Maximum time a client may take to send its command.
    const CLIENT_TIMEOUT: Duration = Duration::from_millis(200);

    #[derive(Debug)]
    pub(crate) struct ControlListener {
        listener: UnixListener,
        path: PathBuf,
    }

    impl ControlListener {
        pub fn bind(path: &Path) -> std::io::Result<Self> {
            // Stale socket from a previous run.
            if path.exists() {
                fs::remove_file(path)?;
            }
            let listener = UnixListener::bind(path)?;
            listener.set_nonblocking(true)?;
            Ok(Self {
                listener,
                path: path.to_path_buf(),
            })
        }

        fn serve(
            stream: UnixStream,
            ctx: &Context,
            backlight: &Backlight,
        ) -> std::io::Result<Option<Event>> {
            stream.set_nonblocking(false)?;
            stream.set_read_timeout(Some(CLIENT_TIMEOUT))?;
            stream.set_write_timeout(Some(CLIENT_TIMEOUT))?;
            let mut line = String::new();
            BufReader::new(&stream).read_line(&mut line)?;
            let (event, reply) = match line.parse::<Command>() {
                Ok(cmd) => {
                    debug!("Control command: {cmd:?}");
                    cmd.execute(ctx, backlight)
                }
                Err(e) => (None, format!("error: {e}")),
            };
            writeln!(&stream, "{reply}")?;
            Ok(event)
        }
    }

    impl Drop for ControlListener {
        fn drop(&mut self) {
            let _ = fs::remove_file(&self.path);
        }
    }

    impl Handler for ControlListener {
        fn monitored(&self) -> BorrowedFd<'_> {
            self.listener.as_fd()
        }

        fn process(
            &mut self,
            ctx: &mut Context,
            backlight: &Backlight,
        ) -> Result<Events, Box<dyn Error>> {
            let mut events = Events::new();
            loop {
                match self.listener.accept() {
                    Ok((stream, _)) => match Self::serve(stream, ctx, backlight) {
                        Ok(Some(event)) => events.push(event),
                        Ok(None) => (),
                        Err(e) => warn!("Control client error: {e}"),
                    },
                    Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                    Err(e) => return Err(e.into()),
                }
            }
            Ok(events)
        }
    }
}
