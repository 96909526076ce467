pub mod betti;
pub mod detector;
pub mod distance;
pub mod persistence;

pub use betti::{betti_curves, BettiCurves};
pub use detector::{RegimeDetector, TopologyRegimeDetector};
pub use distance::{correlation_distance, validate_distance_matrix};
pub use persistence::{vietoris_rips_persistence, PersistenceDiagram, PersistencePair};
