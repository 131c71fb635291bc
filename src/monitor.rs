//! Main epoll loop

use std::rc::Rc;

use log::{debug, warn};
use nix::{
    errno::Errno,
    sys::epoll::{Epoll, EpollCreateFlags, EpollEvent, EpollFlags, EpollTimeout},
};

use crate::{
    handlers::Handler,
    lifecycle::{Backlight, Event},
    state::Context,
    timer::TIMER_HANDLE,
};

#[derive(Debug)]
pub(crate) struct Monitor {
    /// Shared with the capture timer, which registers itself.
    epoll: Rc<Epoll>,
}

impl Monitor {
    pub(crate) fn new() -> anyhow::Result<Self> {
        Ok(Self {
            epoll: Rc::new(Epoll::new(EpollCreateFlags::EPOLL_CLOEXEC)?),
        })
    }

    pub(crate) fn epoll(&self) -> Rc<Epoll> {
        self.epoll.clone()
    }

    fn setup(&self, listeners: &[Box<dyn Handler>]) -> anyhow::Result<()> {
        for (idx, listener) in listeners.iter().enumerate() {
            // TRICKY BIT: Data = 0 is used to indicate nothing happend.
            // We thus offset the array index into listeners by one.
            self.epoll.add(
                listener.monitored(),
                EpollEvent::new(EpollFlags::EPOLLIN | EpollFlags::EPOLLERR, (idx + 1) as u64),
            )?;
        }
        Ok(())
    }

    /// Main loop that monitors all the different data sources.
    pub(crate) fn monitor(
        &self,
        mut listeners: Vec<Box<dyn Handler>>,
        mut ctx: Context,
        mut backlight: Backlight,
    ) -> anyhow::Result<()> {
        self.setup(&listeners)?;
        let mut disabled = vec![false; listeners.len()];

        loop {
            let mut events = [EpollEvent::empty(); 32];
            let n = match self.epoll.wait(&mut events, EpollTimeout::NONE) {
                Ok(n) => n,
                Err(Errno::EINTR) => continue,
                Err(err) => {
                    return Err(anyhow::anyhow!("Epoll error code: {err}"));
                }
            };
            for event in &events[..n] {
                match event.data() {
                    TIMER_HANDLE => backlight.dispatch(&mut ctx, Event::TimerExpired),
                    0 => (),
                    data => {
                        let idx = (data - 1) as usize;
                        if disabled.get(idx).copied().unwrap_or(true) {
                            continue;
                        }
                        let listener = &mut listeners[idx];
                        match listener.process(&mut ctx, &backlight) {
                            Ok(produced) => {
                                for event in produced {
                                    backlight.dispatch(&mut ctx, event);
                                }
                            }
                            Err(err) => {
                                warn!("Listener failed, no longer monitoring it: {err}");
                                self.epoll.delete(listener.monitored())?;
                                disabled[idx] = true;
                                debug!("Disabled listener {idx}");
                            }
                        }
                    }
                }
            }
        }
    }
}
