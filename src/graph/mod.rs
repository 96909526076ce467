pub mod correlation;
pub mod laplacian;

pub use correlation::{pearson_correlation, CorrelationGraph};
pub use laplacian::{DiffusionSignal, DiffusionSolver, NormalizedLaplacian};
