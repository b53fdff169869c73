pub mod broadcaster;
pub mod diff;
pub mod event;

pub use broadcaster::{LiveBroadcaster, LiveConnection};
pub use diff::diff_snapshots;
pub use event::{ImageUrls, LiveEvent};
