//! Title normalization and duplicate detection.

pub mod duplicate;
pub mod normalize;

pub use duplicate::{Assessment, DuplicateDetector, DuplicateSignal, KnownTitle, KnownTracks};
pub use normalize::{NormalizedKey, TitleKeys, normalize, normalize_opt};
