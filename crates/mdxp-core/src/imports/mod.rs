//! Dependency extraction from transformed module text.
//!
//! Extraction runs on the final text of a module, after every transform,
//! so it sees exactly the `require`/`import` calls the evaluator will make.

mod scan;

pub use scan::{scan_dependencies, ScanExtractor};

/// A dependency found in module text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ExtractedDependency {
    /// A string-literal specifier, as written.
    Static(String),
    /// A `require`/`import()` whose argument is not a literal.
    Unknown,
}

impl ExtractedDependency {
    #[must_use]
    pub fn as_static(&self) -> Option<&str> {
        match self {
            Self::Static(spec) => Some(spec),
            Self::Unknown => None,
        }
    }
}

/// Pluggable static analysis of module text.
pub trait DependencyExtractor: Send + Sync {
    /// Dependencies in source order, duplicates preserved.
    fn extract(&self, text: &str) -> Vec<ExtractedDependency>;
}
