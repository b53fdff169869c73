pub mod diff;
pub mod engine;
pub mod layout;
pub mod state;
pub mod validate;

pub use diff::{DiffCollaborator, DiffOutcome, DiffRequest, ExactBytesDiff};
pub use engine::{CompareOptions, ComparisonEngine, Screenshot, ScreenshotEvent};
pub use layout::{ImageLayout, ImagePaths};
pub use state::ReportedStatus;
