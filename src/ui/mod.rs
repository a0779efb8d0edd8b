//! Window-independent UI state: the scrub bar and the status line.

mod progress_bar;
mod status;

pub use progress_bar::{BarRect, DragState, PointerGrab, ProgressBar};
pub use status::{HostEvent, SourceStatus, StatusLine};
