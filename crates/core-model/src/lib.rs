//! Session model: the open tabs, the caches they share, and the async driver
//! that executes their IO.
//!
//! Layering:
//! * [`tabs::TabManager`] holds the controllers in display order with one
//!   active tab.
//! * [`session::EditorSession`] owns the tab manager plus the render and
//!   content caches. There is no process-wide state; hosts create a session
//!   and pass it by value to the driver.
//! * [`driver::SessionDriver`] turns session updates into tokio tasks and
//!   provider calls, and reports [`driver::Notice`]s back to the host.
//!
//! Invariants (must hold after every public call):
//! * a path has at most one tab, and is never both open and opening;
//! * the render cache never holds an entry for content older than the
//!   path's latest edit;
//! * the content cache holds the latest known text of every memory-backed
//!   path that was opened, dirty until its next successful save.

pub mod driver;
pub mod session;
pub mod tabs;

pub use driver::{LoopControl, Notice, PaintNotice, SessionDriver};
pub use session::{
    Closed, EditorSession, OpenStart, SavePlan, SessionError, SessionOptions, TabUpdate,
};
pub use tabs::TabManager;
