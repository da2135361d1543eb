//! Threshold grouping of aligned biomarker / survival series.

use serde::{Deserialize, Serialize};

use crate::error::StatsError;

/// One group of aligned survival observations. Events are 0 (censored,
/// alive) or 1 (event observed).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SurvivalGroup {
    pub durations: Vec<f64>,
    pub events: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SurvivalGroups {
    pub baseline: SurvivalGroup,
    pub condition: SurvivalGroup,
}

/// Split aligned biomarker/duration/status series into a baseline group
/// (biomarker value at or below the threshold) and a condition group
/// (above the threshold). Every observation lands in exactly one group;
/// within each group the original order is preserved.
pub fn group_survival_data(
    biomarker: &[f64],
    durations: &[f64],
    events: &[u8],
    threshold: f64,
) -> Result<SurvivalGroups, StatsError> {
    if biomarker.is_empty() {
        return Err(StatsError::Empty("biomarker"));
    }
    if durations.len() != biomarker.len() {
        return Err(StatsError::LengthMismatch {
            series: "survival_duration",
            expected: biomarker.len(),
            actual: durations.len(),
        });
    }
    if events.len() != biomarker.len() {
        return Err(StatsError::LengthMismatch {
            series: "survival_status",
            expected: biomarker.len(),
            actual: events.len(),
        });
    }

    let mut baseline = SurvivalGroup::default();
    let mut condition = SurvivalGroup::default();
    for ((value, duration), event) in biomarker.iter().zip(durations).zip(events) {
        let group = if *value <= threshold {
            &mut baseline
        } else {
            &mut condition
        };
        group.durations.push(*duration);
        group.events.push(*event);
    }

    Ok(SurvivalGroups {
        baseline,
        condition,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_threshold() {
        let groups = group_survival_data(
            &[2.0, 12.0, 7.0, 30.0],
            &[100.0, 40.0, 80.0, 10.0],
            &[0, 1, 0, 1],
            10.0,
        )
        .unwrap();

        assert_eq!(groups.baseline.durations, vec![100.0, 80.0]);
        assert_eq!(groups.baseline.events, vec![0, 0]);
        assert_eq!(groups.condition.durations, vec![40.0, 10.0]);
        assert_eq!(groups.condition.events, vec![1, 1]);
    }

    #[test]
    fn threshold_itself_is_baseline() {
        let groups = group_survival_data(&[10.0], &[5.0], &[1], 10.0).unwrap();
        assert_eq!(groups.baseline.durations, vec![5.0]);
        assert!(groups.condition.durations.is_empty());
    }

    #[test]
    fn every_observation_lands_exactly_once() {
        let biomarker: Vec<f64> = (0..25).map(|i| i as f64).collect();
        let durations: Vec<f64> = (0..25).map(|i| (i * 3) as f64).collect();
        let events: Vec<u8> = (0..25).map(|i| (i % 2) as u8).collect();

        let groups = group_survival_data(&biomarker, &durations, &events, 11.5).unwrap();
        assert_eq!(
            groups.baseline.durations.len() + groups.condition.durations.len(),
            25
        );
        assert_eq!(groups.baseline.events.len(), groups.baseline.durations.len());
        assert_eq!(
            groups.condition.events.len(),
            groups.condition.durations.len()
        );
    }

    #[test]
    fn mismatched_series_are_rejected() {
        let err = group_survival_data(&[1.0, 2.0], &[1.0], &[1, 0], 1.0).unwrap_err();
        assert_eq!(
            err,
            StatsError::LengthMismatch {
                series: "survival_duration",
                expected: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn empty_input_is_rejected() {
        assert_eq!(
            group_survival_data(&[], &[], &[], 1.0).unwrap_err(),
            StatsError::Empty("biomarker")
        );
    }
}
