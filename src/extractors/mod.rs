// src/extractors/mod.rs
pub mod classifier;
pub mod locator;
pub mod normalizer;
pub mod vocabulary;

// Re-export key extraction types for convenience
pub use classifier::{ClassifiedRow, ClassifiedTable, TableClassifier};
pub use locator::{LocatorOutput, RawTableRegion, TableLocator};
pub use normalizer::{normalize_token, NormalizedValue, SignMarker, UnitScale};
pub use vocabulary::{CanonicalLabel, LabelMatch, Vocabulary};
