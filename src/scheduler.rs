use std::io;
use std::sync::Arc;

use log::trace;

use crate::channel::FrameChannel;
use crate::display::Presenter;

/// The host's deferred repaint mechanism: ask its event/run loop to invoke
/// the presentation path again soon. Implementations must defer, never
/// paint from inside the call; the scheduler relies on that to avoid
/// re-entrant painting and unbounded recursion while draining backlog.
pub trait RedrawHost {
    fn request_redraw(&mut self);
}

/// Drives one presentation pass at a time and keeps the backlog draining.
/// After painting, if more frames than the retention floor are still
/// queued, one more pass is requested through the host; once a pass leaves
/// the queue at the floor the retriggering stops, so the loop is bounded by
/// the backlog size. A producer that outruns consumption anyway is throttled
/// by the channel's blocking push, not by painting faster.
pub struct RedrawScheduler {
    channel: Arc<FrameChannel>,
}

impl RedrawScheduler {
    pub fn new(channel: Arc<FrameChannel>) -> RedrawScheduler {
        RedrawScheduler { channel }
    }

    /// One presentation pass: take the current frame, paint it, decide
    /// whether the host should schedule another pass. Returns whether
    /// anything was painted (false only before the first frame ever
    /// arrives).
    pub fn run_pass(
        &self,
        presenter: &mut dyn Presenter,
        host: &mut dyn RedrawHost,
    ) -> Result<bool, io::Error> {
        let frame = match self.channel.peek_latest() {
            Some(frame) => frame,
            None => return Ok(false),
        };
        presenter.paint(&frame)?;

        // only this side consumes, so a length still above the floor here
        // means frames are queued that no future damage event is obliged to
        // come for; ask the host for one more pass
        let backlog = self.channel.len();
        if backlog > self.channel.config().retention_floor {
            trace!("{} frames still queued, requesting another pass", backlog);
            host.request_redraw();
        }
        Ok(true)
    }
}
