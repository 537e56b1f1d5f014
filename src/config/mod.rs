pub mod scan;
pub mod subjects;

pub use scan::{ClassifierSettings, RetrySettings, ScanConfig, SearchSettings};
pub use subjects::{load_subjects_from, resolve_subjects_path, Subject};
