pub mod comparison;
pub mod details;
pub mod metadata;
pub mod properties;
pub mod report;

pub use comparison::{Comparison, ComparisonStatus};
pub use details::{BoundingBox, ComparisonDetails, DiffDiagnostics};
pub use metadata::{MetadataBundle, MetadataKey};
pub use properties::{Properties, Viewport};
pub use report::{ReportState, ReportSummary};
