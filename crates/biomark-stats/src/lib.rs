//! # biomark-stats — Survival Statistics
//!
//! Pure, synchronous statistics used by the survival action groups:
//! threshold grouping of biomarker series, Kaplan-Meier product-limit
//! estimation, and Cox proportional-hazards regression. No I/O and no
//! dependence on the agent contract; handlers adapt in both directions.

pub mod cox;
pub mod error;
pub mod grouping;
pub mod km;

pub use cox::{CoxCoefficient, CoxObservation, CoxSummary, fit_cox};
pub use error::StatsError;
pub use grouping::{SurvivalGroup, SurvivalGroups, group_survival_data};
pub use km::{KmCurve, KmPoint, fit_kaplan_meier};
