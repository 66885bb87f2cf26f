//! The scan entrypoint: local or remote source in, project graph out.

pub mod config;
pub mod report;
pub mod scanner;

pub use config::{RemoteScan, ScanConfig, DEFAULT_WRITE_BATCH};
pub use report::{generate_scan_report, RemoteValidation, ScanResult};
pub use scanner::{relative_path, CodebaseScanner, ScanProgressCallback, EMBEDDED_ENTITY_TYPES};
