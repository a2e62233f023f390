//! Ranking metrics over scored windows.

use outbreak_output::RocPoint;
use std::cmp::Ordering;

/// Area under the ROC curve, from the Mann-Whitney rank statistic.
///
/// Tied scores share their average rank. Returns `None` when the labels
/// contain a single class, where the AUC is undefined.
pub fn auc(scores: &[f64], labels: &[u8]) -> Option<f64> {
    let n = scores.len().min(labels.len());
    let positives = labels[..n].iter().filter(|&&y| y == 1).count();
    let negatives = n - positives;
    if positives == 0 || negatives == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| scores[a].partial_cmp(&scores[b]).unwrap_or(Ordering::Equal));

    let mut positive_rank_sum = 0.0;
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        // Ranks are 1-based; ties get the mean of ranks i+1..=j+1.
        let rank = (i + j) as f64 / 2.0 + 1.0;
        let tied_positives = order[i..=j].iter().filter(|&&k| labels[k] == 1).count();
        positive_rank_sum += rank * tied_positives as f64;
        i = j + 1;
    }

    let p = positives as f64;
    let q = negatives as f64;
    Some((positive_rank_sum - p * (p + 1.0) / 2.0) / (p * q))
}

/// AUC with the undefined single-class case reported as 0 and logged.
pub fn auc_or_zero(scores: &[f64], labels: &[u8], context: &str) -> f64 {
    auc(scores, labels).unwrap_or_else(|| {
        tracing::warn!(
            context,
            windows = labels.len(),
            "AUC undefined on a single-class set, reporting 0"
        );
        0.0
    })
}

/// ROC curve points, one per distinct score.
///
/// Each point counts windows with `score >= threshold` as predicted positive.
/// The first point uses a threshold above every score, so the curve starts
/// at (0, 0).
pub fn roc_curve(scores: &[f64], labels: &[u8]) -> Vec<RocPoint> {
    let n = scores.len().min(labels.len());
    let positives = labels[..n].iter().filter(|&&y| y == 1).count() as f64;
    let negatives = n as f64 - positives;
    let rate = |count: usize, total: f64| {
        if total > 0.0 {
            count as f64 / total
        } else {
            0.0
        }
    };

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| scores[b].partial_cmp(&scores[a]).unwrap_or(Ordering::Equal));

    let top = order.first().map_or(1.0, |&k| scores[k] + 1.0);
    let mut points = vec![RocPoint {
        threshold: top,
        fpr: 0.0,
        tpr: 0.0,
    }];

    let (mut tp, mut fp) = (0, 0);
    let mut i = 0;
    while i < n {
        let threshold = scores[order[i]];
        loop {
            if labels[order[i]] == 1 {
                tp += 1;
            } else {
                fp += 1;
            }
            i += 1;
            if i == n || scores[order[i]] != threshold {
                break;
            }
        }
        points.push(RocPoint {
            threshold,
            fpr: rate(fp, negatives),
            tpr: rate(tp, positives),
        });
    }
    points
}
