pub mod metrics;
pub mod store;

pub use metrics::{
    find_cycles, ArchitecturalIssue, ClassMetrics, IssueType, MetricsEngine, PackageMetrics,
    ProjectSummary, Severity,
};
pub use store::InMemoryGraphStore;
