pub mod generator;
pub mod policy;
pub mod smoother;

pub use generator::{zscores, SignalGenerator, TargetWeights};
pub use policy::{AlphaPolicy, EntropyGatedAlpha, FixedAlpha, StabilityGate};
pub use smoother::ResidualSmoother;
