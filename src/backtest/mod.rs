pub mod driver;
pub mod performance;

pub use crate::pipeline::{DegradeReason, StepStatus};
pub use driver::{BacktestRun, PortfolioState, SimulationDriver, StepRecord};
pub use performance::{
    annualized_sharpe, max_drawdown, yearly_breakdown, DatedReturn, PerformanceReport, StepCounts,
    YearlyPerformance,
};
