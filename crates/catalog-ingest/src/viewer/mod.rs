//! Renderers for tracker events
//!
//! A viewer is owned by the [`Tracker`](crate::tracker::Tracker) and receives
//! every event synchronously. Returning an error from [`Viewer::receive`] is
//! logged by the tracker and never interrupts the batch.

mod log_formatted;
mod progress_bar;

pub use log_formatted::LogFormatted;
pub use progress_bar::ProgressBar;

use crate::tracker::{TrackerEvent, TrackerState};

pub trait Viewer: Send {
    /// Short name used in diagnostics
    fn name(&self) -> &str;

    fn receive(&mut self, state: &TrackerState, event: &TrackerEvent<'_>) -> anyhow::Result<()>;

    /// Run `f` while this viewer is off the terminal. Viewers that draw in
    /// place override this so other stderr output does not interleave.
    fn suspend(&self, f: &mut dyn FnMut()) {
        f()
    }
}
