//! Value concentration measures for patent portfolios.

/// Calculates the Gini coefficient of a value vector.
///
/// A Gini coefficient of 0 indicates perfect equality (every patent carries
/// the same value), while values approaching 1 indicate that a single patent
/// holds the entire portfolio value.
///
/// Negative entries are treated as zero. Returns 0.0 for an empty or
/// all-zero vector.
pub fn gini_coefficient(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    let mut sorted: Vec<f64> = values.iter().map(|v| v.max(0.0)).collect();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let n = sorted.len() as f64;
    let sum: f64 = sorted.iter().sum();
    if sum == 0.0 {
        return 0.0;
    }

    let area: f64 = sorted
        .iter()
        .enumerate()
        .map(|(i, v)| (i as f64 + 1.0) * v)
        .sum();

    (2.0 * area) / (n * sum) - (n + 1.0) / n
}

/// Share of the total value held by the top `k` entries.
pub fn top_share(values: &[f64], k: usize) -> f64 {
    let total: f64 = values.iter().map(|v| v.max(0.0)).sum();
    if total == 0.0 || k == 0 {
        return 0.0;
    }

    let mut sorted: Vec<f64> = values.iter().map(|v| v.max(0.0)).collect();
    sorted.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
    sorted.iter().take(k).sum::<f64>() / total
}
