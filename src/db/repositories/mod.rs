pub(crate) mod comparisons;
pub(crate) mod details;
pub(crate) mod metadata;
pub(crate) mod report;
