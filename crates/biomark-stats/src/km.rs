//! Kaplan-Meier product-limit estimation.

use serde::{Deserialize, Serialize};

use crate::error::StatsError;

const Z_95: f64 = 1.959_963_984_540_054;

/// One step of the survival function, with a Greenwood 95% confidence
/// interval and the size of the risk set just before the step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KmPoint {
    pub time: f64,
    pub survival: f64,
    pub lower: f64,
    pub upper: f64,
    pub at_risk: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KmCurve {
    pub label: String,
    pub points: Vec<KmPoint>,
}

impl KmCurve {
    /// Survival probability at a given time (step function, right-continuous).
    pub fn survival_at(&self, time: f64) -> f64 {
        self.points
            .iter()
            .take_while(|point| point.time <= time)
            .last()
            .map_or(1.0, |point| point.survival)
    }
}

/// Fit the product-limit estimator to one group.
///
/// `events[i]` is true when the event was observed at `durations[i]` and
/// false when the observation was censored there. The returned curve starts
/// at `(0, 1.0)` and has one step per distinct event time.
pub fn fit_kaplan_meier(
    label: impl Into<String>,
    durations: &[f64],
    events: &[bool],
) -> Result<KmCurve, StatsError> {
    if durations.is_empty() {
        return Err(StatsError::Empty("durations"));
    }
    if events.len() != durations.len() {
        return Err(StatsError::LengthMismatch {
            series: "events",
            expected: durations.len(),
            actual: events.len(),
        });
    }
    if durations.iter().any(|d| !d.is_finite() || *d < 0.0) {
        return Err(StatsError::Degenerate(
            "durations must be finite and non-negative".to_owned(),
        ));
    }

    let mut observations: Vec<(f64, bool)> = durations
        .iter()
        .copied()
        .zip(events.iter().copied())
        .collect();
    observations.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut points = vec![KmPoint {
        time: 0.0,
        survival: 1.0,
        lower: 1.0,
        upper: 1.0,
        at_risk: observations.len(),
    }];

    let mut survival = 1.0;
    let mut greenwood = 0.0;
    let mut at_risk = observations.len();
    let mut index = 0;
    while index < observations.len() {
        let time = observations[index].0;
        let mut deaths = 0usize;
        let mut removed = 0usize;
        while index < observations.len() && observations[index].0 == time {
            if observations[index].1 {
                deaths += 1;
            }
            removed += 1;
            index += 1;
        }

        if deaths > 0 {
            let n = at_risk as f64;
            let d = deaths as f64;
            survival *= 1.0 - d / n;
            // Greenwood's variance term is undefined when the whole risk set
            // dies; the interval collapses to the point estimate there.
            let (lower, upper) = if deaths < at_risk {
                greenwood += d / (n * (n - d));
                let half_width = Z_95 * (survival * survival * greenwood).sqrt();
                (
                    (survival - half_width).max(0.0),
                    (survival + half_width).min(1.0),
                )
            } else {
                (survival, survival)
            };
            points.push(KmPoint {
                time,
                survival,
                lower,
                upper,
                at_risk,
            });
        }

        at_risk -= removed;
    }

    Ok(KmCurve {
        label: label.into(),
        points,
    })
}
