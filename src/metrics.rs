use ndarray::ArrayView1;
use crate::error::{StatsError, Result};

/// false/true positive rates swept over descending score thresholds
#[derive(Debug, Clone, PartialEq)]
pub struct RocPoints {
    pub fpr: Vec<f64>,
    pub tpr: Vec<f64>,
    /// score at which each point starts predicting positive (first is +inf)
    pub thresholds: Vec<f64>,
}

/// ROC curve of `scores` against a 0/1 `outcome`
///
/// One point per distinct score, plus the (0, 0) origin. Needs both classes.
pub fn roc_curve(outcome: ArrayView1<f64>, scores: ArrayView1<f64>) -> Result<RocPoints> {
    if outcome.len() != scores.len() {
        return Err(StatsError::invalid_dimensions(format!(
            "outcome len ({}) != scores len ({})",
            outcome.len(),
            scores.len()
        )));
    }

    if scores.iter().any(|s| s.is_nan()) {
        return Err(StatsError::numerical_error("NaN score"));
    }

    let n_pos = outcome.iter().filter(|&&y| y == 1.0).count();
    let n_neg = outcome.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return Err(StatsError::single_class(format!(
            "{} positives, {} negatives",
            n_pos, n_neg
        )));
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&i, &j| scores[j].total_cmp(&scores[i]));

    let mut fpr = vec![0.0];
    let mut tpr = vec![0.0];
    let mut thresholds = vec![f64::INFINITY];

    let (mut tp, mut fp) = (0usize, 0usize);
    let mut k = 0;
    while k < order.len() {
        let threshold = scores[order[k]];
        while k < order.len() && scores[order[k]] == threshold {
            if outcome[order[k]] == 1.0 {
                tp += 1;
            } else {
                fp += 1;
            }
            k += 1;
        }

        fpr.push(fp as f64 / n_neg as f64);
        tpr.push(tp as f64 / n_pos as f64);
        thresholds.push(threshold);
    }

    Ok(RocPoints { fpr, tpr, thresholds })
}

/// area under a piecewise-linear curve w/ increasing x
pub fn trapezoid_auc(x: &[f64], y: &[f64]) -> Result<f64> {
    if x.len() != y.len() {
        return Err(StatsError::invalid_dimensions("x and y must have same length"));
    }
    if x.len() < 2 {
        return Err(StatsError::invalid_dimensions("need at least 2 points for an area"));
    }

    Ok(x.windows(2)
        .zip(y.windows(2))
        .map(|(xs, ys)| (xs[1] - xs[0]) * (ys[0] + ys[1]) / 2.0)
        .sum())
}

/// share of rows where the rounded probability equals the outcome
pub fn accuracy(outcome: ArrayView1<f64>, probability: ArrayView1<f64>) -> Result<f64> {
    if outcome.len() != probability.len() {
        return Err(StatsError::invalid_dimensions("outcome and probability lengths differ"));
    }
    if outcome.is_empty() {
        return Err(StatsError::invalid_dimensions("no rows to score"));
    }

    // round half to even, so exactly 0.5 counts as 0
    let correct = outcome
        .iter()
        .zip(probability.iter())
        .filter(|&(&y, &p)| p.round_ties_even() == y)
        .count();

    Ok(correct as f64 / outcome.len() as f64)
}

/// piecewise-linear interpolation of (xp, fp) at x, flat outside the data
///
/// `xp` must be non-decreasing; on a run of equal xp the last point wins.
pub fn interp(x: &[f64], xp: &[f64], fp: &[f64]) -> Result<Vec<f64>> {
    if xp.len() != fp.len() {
        return Err(StatsError::invalid_dimensions("xp and fp must have same length"));
    }
    if xp.is_empty() {
        return Err(StatsError::invalid_dimensions("nothing to interpolate from"));
    }

    let last = xp.len() - 1;
    Ok(x.iter()
        .map(|&xi| {
            if xi < xp[0] {
                return fp[0];
            }
            // last index with xp[j] <= xi
            let j = xp.partition_point(|&v| v <= xi) - 1;
            if j == last {
                fp[last]
            } else {
                let slope = (fp[j + 1] - fp[j]) / (xp[j + 1] - xp[j]);
                fp[j] + slope * (xi - xp[j])
            }
        })
        .collect())
}

/// n evenly spaced values from start to end inclusive
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n)
                .map(|i| if i == n - 1 { end } else { start + step * i as f64 })
                .collect()
        }
    }
}

/// force a TPR sequence to start at 0 and end at 1
pub fn pin_endpoints(tpr: &mut [f64]) {
    if let Some(first) = tpr.first_mut() {
        *first = 0.0;
    }
    if let Some(last) = tpr.last_mut() {
        *last = 1.0;
    }
}
