//! Pure feature computation: calendar alignment of daily series and the
//! windowed statistics the decision engine consumes.
//!
//! Nothing in this crate performs I/O or logs. Configuration mistakes
//! (zero windows, mismatched lengths) are errors; everything else that
//! cannot be computed is an absent value.

pub mod alignment;
pub mod correlation;
pub mod dataset;
pub mod returns;
pub mod rolling;
pub mod volatility;
pub mod zscore;

pub use alignment::{
    align, align_table, validate_alignment, AlignMethod, AlignedTable, AlignmentDiagnostics, Cell,
    DateRange,
};
pub use correlation::{correlation_report, pearson, rolling_correlation, CorrelationReport};
pub use dataset::{build_analysis_dataset, lagged, with_returns, with_volatility, with_zscores};
pub use returns::{pct_change, returns, ReturnMethod};
pub use rolling::{mean, sample_std, Expanding, FeatureSeries, RollingPair, RollingWindow, Sample};
pub use zscore::zscore;
