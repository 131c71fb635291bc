//! Capture timer: a timerfd that the monitor loop polls while registered.

use std::{rc::Rc, time::Duration};

use log::debug;
use nix::{
    errno::Errno,
    sys::{
        epoll::{Epoll, EpollEvent, EpollFlags},
        time::TimeSpec,
        timerfd::{ClockId, Expiration, TimerFd, TimerFlags, TimerSetTimeFlags},
    },
};

/// Marker value in epoll for the capture timer.
pub(crate) const TIMER_HANDLE: u64 = u64::MAX;

/// Shortest wait used when a timeout must fire "now". A zero timerfd value
/// would disarm it instead.
const IMMEDIATELY: Duration = Duration::from_nanos(1);

/// Timer driving periodic captures.
pub(crate) trait CaptureTimer {
    /// Start delivering expirations to the dispatcher. Registering an already
    /// registered timer does nothing.
    fn register(&mut self) -> Result<(), Errno>;
    /// Stop delivering expirations. Deregistering an unregistered timer does
    /// nothing.
    fn deregister(&mut self) -> Result<(), Errno>;
    fn is_registered(&self) -> bool;
    /// Arm the timer to expire once after `timeout`. Zero fires as soon as
    /// possible.
    fn set_timeout(&mut self, timeout: Duration) -> Result<(), Errno>;
    /// Time left before expiry, `None` if not armed.
    fn remaining(&self) -> Result<Option<Duration>, Errno>;
    /// Consume a pending expiration.
    fn acknowledge(&mut self) -> Result<(), Errno>;

    /// Adapt the pending wait to a changed period, keeping the time already
    /// waited. An unarmed timer (expiry pending or not started) is left alone.
    fn reschedule(&mut self, old: Duration, new: Duration) -> Result<(), Errno> {
        if let Some(remaining) = self.remaining()? {
            let next = rescheduled_wait(old, new, remaining);
            debug!("Rescheduling capture: {remaining:?} left of {old:?} -> {next:?} left of {new:?}");
            self.set_timeout(next)?;
        }
        Ok(())
    }
}

/// Wait left after the period changes from `old` to `new` while `remaining`
/// was left of `old`.
///
/// Elapsed time carries over: the capture happens `new` after the previous
/// one. If that point already passed the capture fires immediately.
pub(crate) fn rescheduled_wait(old: Duration, new: Duration, remaining: Duration) -> Duration {
    let elapsed = old.saturating_sub(remaining);
    new.saturating_sub(elapsed)
}

/// [`CaptureTimer`] backed by a `CLOCK_BOOTTIME` timerfd.
#[derive(Debug)]
pub(crate) struct EpollTimer {
    fd: TimerFd,
    epoll: Rc<Epoll>,
    registered: bool,
}

impl EpollTimer {
    /// Create the timer, armed to fire immediately but not yet registered.
    pub fn new(epoll: Rc<Epoll>) -> Result<Self, Errno> {
        let mut timer = Self {
            fd: TimerFd::new(
                ClockId::CLOCK_BOOTTIME,
                TimerFlags::TFD_NONBLOCK | TimerFlags::TFD_CLOEXEC,
            )?,
            epoll,
            registered: false,
        };
        timer.set_timeout(Duration::ZERO)?;
        Ok(timer)
    }
}

impl CaptureTimer for EpollTimer {
    fn register(&mut self) -> Result<(), Errno> {
        if self.registered {
            debug!("Capture timer already registered");
            return Ok(());
        }
        self.epoll.add(
            &self.fd,
            EpollEvent::new(EpollFlags::EPOLLIN | EpollFlags::EPOLLERR, TIMER_HANDLE),
        )?;
        self.registered = true;
        Ok(())
    }

    fn deregister(&mut self) -> Result<(), Errno> {
        if !self.registered {
            debug!("Capture timer already deregistered");
            return Ok(());
        }
        self.epoll.delete(&self.fd)?;
        self.registered = false;
        Ok(())
    }

    fn is_registered(&self) -> bool {
        self.registered
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), Errno> {
        let timeout = timeout.max(IMMEDIATELY);
        self.fd.set(
            Expiration::OneShot(TimeSpec::from_duration(timeout)),
            TimerSetTimeFlags::empty(),
        )
    }

    fn remaining(&self) -> Result<Option<Duration>, Errno> {
        Ok(match self.fd.get()? {
            Some(Expiration::OneShot(ts)) => Some(Duration::from(ts)),
            Some(Expiration::Interval(ts)) => Some(Duration::from(ts)),
            Some(Expiration::IntervalDelayed(ts, _)) => Some(Duration::from(ts)),
            None => None,
        })
    }

    fn acknowledge(&mut self) -> Result<(), Errno> {
        match self.fd.wait() {
            // Spurious wakeup, nothing pending.
            Err(Errno::EAGAIN) => Ok(()),
            r => r,
        }
    }
}
