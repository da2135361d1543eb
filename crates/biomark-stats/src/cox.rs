//! Cox proportional-hazards regression.
//!
//! Newton-Raphson on the Breslow partial likelihood. Sized for the feature
//! tables these handlers see (tens to low thousands of rows, a handful of
//! covariates); risk-set sums are recomputed per event time rather than
//! streamed.

use serde::{Deserialize, Serialize};

use crate::error::StatsError;

const MAX_ITERATIONS: usize = 50;
const MAX_STEP_HALVINGS: usize = 8;
const TOLERANCE: f64 = 1e-8;

#[derive(Debug, Clone, PartialEq)]
pub struct CoxObservation {
    pub duration: f64,
    pub event: bool,
    pub covariates: Vec<f64>,
}

/// Fitted coefficient for one covariate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CoxCoefficient {
    pub name: String,
    pub coef: f64,
    pub hazard_ratio: f64,
    pub std_err: f64,
    pub z: f64,
    pub p: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CoxSummary {
    pub coefficients: Vec<CoxCoefficient>,
    pub observations: usize,
    pub events: usize,
    pub iterations: usize,
}

/// Fit the model. `names` labels the covariate columns and fixes their
/// count; every observation must carry that many covariates.
pub fn fit_cox(
    observations: &[CoxObservation],
    names: &[String],
) -> Result<CoxSummary, StatsError> {
    let p = names.len();
    if p == 0 {
        return Err(StatsError::Empty("covariates"));
    }
    if observations.is_empty() {
        return Err(StatsError::Empty("observations"));
    }
    for observation in observations {
        if observation.covariates.len() != p {
            return Err(StatsError::LengthMismatch {
                series: "covariates",
                expected: p,
                actual: observation.covariates.len(),
            });
        }
        if !observation.duration.is_finite()
            || observation.covariates.iter().any(|x| !x.is_finite())
        {
            return Err(StatsError::Degenerate(
                "durations and covariates must be finite".to_owned(),
            ));
        }
    }
    let events = observations.iter().filter(|o| o.event).count();
    if events == 0 {
        return Err(StatsError::Degenerate("no events observed".to_owned()));
    }

    let mut sorted: Vec<&CoxObservation> = observations.iter().collect();
    sorted.sort_by(|a, b| a.duration.total_cmp(&b.duration));

    let mut beta = vec![0.0; p];
    let (mut loglik, _, _) = evaluate(&sorted, &beta, p);
    let mut iterations = 0;

    loop {
        iterations += 1;
        if iterations > MAX_ITERATIONS {
            return Err(StatsError::NonConvergence(MAX_ITERATIONS));
        }

        let (_, score, info) = evaluate(&sorted, &beta, p);
        let delta = solve(info, score).ok_or_else(|| {
            StatsError::Degenerate("singular information matrix".to_owned())
        })?;

        // Step-halving keeps the ascent monotone on awkward data.
        let mut step = 1.0;
        let mut halvings = 0;
        let (next_beta, next_loglik) = loop {
            let candidate: Vec<f64> = beta
                .iter()
                .zip(&delta)
                .map(|(b, d)| b + step * d)
                .collect();
            let (candidate_loglik, _, _) = evaluate(&sorted, &candidate, p);
            if candidate_loglik.is_finite() && candidate_loglik >= loglik - 1e-12 {
                break (candidate, candidate_loglik);
            }
            halvings += 1;
            if halvings > MAX_STEP_HALVINGS {
                return Err(StatsError::NonConvergence(iterations));
            }
            step /= 2.0;
        };

        let max_update = delta
            .iter()
            .map(|d| (d * step).abs())
            .fold(0.0_f64, f64::max);
        beta = next_beta;
        loglik = next_loglik;
        if max_update < TOLERANCE {
            break;
        }
    }

    let (_, _, info) = evaluate(&sorted, &beta, p);
    let covariance = invert(info).ok_or_else(|| {
        StatsError::Degenerate("singular information matrix at optimum".to_owned())
    })?;

    let coefficients = names
        .iter()
        .enumerate()
        .map(|(j, name)| {
            let coef = beta[j];
            let std_err = covariance[j][j].max(0.0).sqrt();
            let z = if std_err > 0.0 { coef / std_err } else { 0.0 };
            CoxCoefficient {
                name: name.clone(),
                coef,
                hazard_ratio: coef.exp(),
                std_err,
                z,
                p: two_sided_p(z),
            }
        })
        .collect();

    Ok(CoxSummary {
        coefficients,
        observations: observations.len(),
        events,
        iterations,
    })
}

/// Breslow partial log-likelihood with score vector and information matrix.
/// `sorted` is ascending by duration, so the risk set at any event time is a
/// suffix.
fn evaluate(
    sorted: &[&CoxObservation],
    beta: &[f64],
    p: usize,
) -> (f64, Vec<f64>, Vec<Vec<f64>>) {
    let n = sorted.len();
    let eta: Vec<f64> = sorted
        .iter()
        .map(|o| {
            o.covariates
                .iter()
                .zip(beta)
                .map(|(x, b)| x * b)
                .sum::<f64>()
        })
        .collect();
    let weights: Vec<f64> = eta.iter().map(|e| e.exp()).collect();

    let mut loglik = 0.0;
    let mut score = vec![0.0; p];
    let mut info = vec![vec![0.0; p]; p];

    let mut start = 0;
    while start < n {
        let time = sorted[start].duration;
        let mut end = start;
        while end < n && sorted[end].duration == time {
            end += 1;
        }

        let deaths: Vec<usize> = (start..end).filter(|&i| sorted[i].event).collect();
        if !deaths.is_empty() {
            let d = deaths.len() as f64;

            let mut s0 = 0.0;
            let mut s1 = vec![0.0; p];
            let mut s2 = vec![vec![0.0; p]; p];
            for k in start..n {
                let w = weights[k];
                s0 += w;
                for j in 0..p {
                    let xj = sorted[k].covariates[j];
                    s1[j] += w * xj;
                    for l in 0..=j {
                        s2[j][l] += w * xj * sorted[k].covariates[l];
                    }
                }
            }

            for &i in &deaths {
                loglik += eta[i];
                for j in 0..p {
                    score[j] += sorted[i].covariates[j];
                }
            }
            loglik -= d * s0.ln();
            for j in 0..p {
                score[j] -= d * s1[j] / s0;
                for l in 0..=j {
                    let term = d * (s2[j][l] / s0 - (s1[j] / s0) * (s1[l] / s0));
                    info[j][l] += term;
                    if j != l {
                        info[l][j] += term;
                    }
                }
            }
        }

        start = end;
    }

    (loglik, score, info)
}

/// Solve `a x = b` by Gaussian elimination with partial pivoting.
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot_row = (col..n).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot_row][col].abs() < 1e-12 {
            return None;
        }
        a.swap(col, pivot_row);
        b.swap(col, pivot_row);

        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let mut sum = b[row];
        for k in row + 1..n {
            sum -= a[row][k] * x[k];
        }
        x[row] = sum / a[row][row];
    }
    Some(x)
}

/// Invert a symmetric positive-definite matrix by Gauss-Jordan elimination.
fn invert(mut a: Vec<Vec<f64>>) -> Option<Vec<Vec<f64>>> {
    let n = a.len();
    let mut inverse = vec![vec![0.0; n]; n];
    for (i, row) in inverse.iter_mut().enumerate() {
        row[i] = 1.0;
    }

    for col in 0..n {
        let pivot_row = (col..n).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot_row][col].abs() < 1e-12 {
            return None;
        }
        a.swap(col, pivot_row);
        inverse.swap(col, pivot_row);

        let pivot = a[col][col];
        for k in 0..n {
            a[col][k] /= pivot;
            inverse[col][k] /= pivot;
        }
        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = a[row][col];
            for k in 0..n {
                a[row][k] -= factor * a[col][k];
                inverse[row][k] -= factor * inverse[col][k];
            }
        }
    }
    Some(inverse)
}

fn two_sided_p(z: f64) -> f64 {
    (2.0 * (1.0 - normal_cdf(z.abs()))).clamp(0.0, 1.0)
}

fn normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

/// Abramowitz & Stegun 7.1.26, accurate to ~1.5e-7.
fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    let t = 1.0 / (1.0 + 0.327_591_1 * x);
    let y = 1.0
        - (((((1.061_405_429 * t - 1.453_152_027) * t) + 1.421_413_741) * t - 0.284_496_736)
            * t
            + 0.254_829_592)
            * t
            * (-x * x).exp();
    sign * y
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interleaved_cohort() -> Vec<CoxObservation> {
        // Exposed subjects (x=1) die at odd times, unexposed at even times;
        // the interleaving keeps the partial likelihood bounded.
        (1..=8)
            .map(|i| CoxObservation {
                duration: i as f64,
                event: true,
                covariates: vec![if i % 2 == 1 { 1.0 } else { 0.0 }],
            })
            .collect()
    }

    #[test]
    fn exposure_that_shortens_survival_has_positive_coefficient() {
        let summary = fit_cox(&interleaved_cohort(), &["exposure".to_owned()]).unwrap();
        let coefficient = &summary.coefficients[0];

        assert!(coefficient.coef > 0.0);
        assert!(coefficient.hazard_ratio > 1.0);
        assert!(coefficient.std_err > 0.0);
        assert!(coefficient.std_err.is_finite());
        assert!(coefficient.p > 0.0 && coefficient.p < 1.0);
        assert_eq!(summary.events, 8);
        assert_eq!(summary.observations, 8);
    }

    #[test]
    fn flipping_the_covariate_flips_the_sign() {
        let cohort = interleaved_cohort();
        let flipped: Vec<CoxObservation> = cohort
            .iter()
            .map(|o| CoxObservation {
                duration: o.duration,
                event: o.event,
                covariates: vec![1.0 - o.covariates[0]],
            })
            .collect();

        let forward = fit_cox(&cohort, &["exposure".to_owned()]).unwrap();
        let backward = fit_cox(&flipped, &["exposure".to_owned()]).unwrap();
        assert!((forward.coefficients[0].coef + backward.coefficients[0].coef).abs() < 1e-6);
    }

    #[test]
    fn collinear_covariates_are_degenerate() {
        // The second column duplicates the first, so the information matrix
        // has a null direction.
        let cohort: Vec<CoxObservation> = (1..=10)
            .map(|i| {
                let x = if i % 2 == 0 { 1.0 } else { 0.0 };
                CoxObservation {
                    duration: i as f64,
                    event: true,
                    covariates: vec![x, x],
                }
            })
            .collect();
        let err = fit_cox(&cohort, &["a".to_owned(), "b".to_owned()]).unwrap_err();
        assert!(matches!(err, StatsError::Degenerate(_)));
    }

    #[test]
    fn constant_covariate_is_degenerate() {
        let cohort: Vec<CoxObservation> = (1..=5)
            .map(|i| CoxObservation {
                duration: i as f64,
                event: true,
                covariates: vec![3.0],
            })
            .collect();
        let err = fit_cox(&cohort, &["constant".to_owned()]).unwrap_err();
        assert!(matches!(err, StatsError::Degenerate(_)));
    }

    #[test]
    fn no_events_is_degenerate() {
        let cohort = vec![CoxObservation {
            duration: 1.0,
            event: false,
            covariates: vec![1.0],
        }];
        let err = fit_cox(&cohort, &["x".to_owned()]).unwrap_err();
        assert!(matches!(err, StatsError::Degenerate(_)));
    }

    #[test]
    fn censoring_is_tolerated() {
        let mut cohort = interleaved_cohort();
        cohort.push(CoxObservation {
            duration: 9.0,
            event: false,
            covariates: vec![1.0],
        });
        cohort.push(CoxObservation {
            duration: 10.0,
            event: false,
            covariates: vec![0.0],
        });
        let summary = fit_cox(&cohort, &["exposure".to_owned()]).unwrap();
        assert_eq!(summary.events, 8);
        assert_eq!(summary.observations, 10);
        assert!(summary.coefficients[0].coef.is_finite());
    }

    #[test]
    fn p_values_come_from_the_normal_tail() {
        assert!((two_sided_p(0.0) - 1.0).abs() < 1e-6);
        assert!((two_sided_p(1.959_964) - 0.05).abs() < 1e-3);
        assert!(two_sided_p(5.0) < 1e-5);
    }
}
