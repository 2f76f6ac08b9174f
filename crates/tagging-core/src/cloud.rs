//! Tag cloud font size calculation.
//!
//! Tags are assigned a `font_size` bucket between 1 and `steps` from
//! their usage counts. Thresholds are spaced linearly between the
//! smallest and largest count; the logarithmic distribution compares
//! `ln(count) * max / ln(max)` against them instead of the raw count,
//! which spreads rarely used tags over more buckets.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{Tag, TagUsage};

/// Font size distribution algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Distribution {
    #[default]
    Logarithmic,
    Linear,
}

impl std::fmt::Display for Distribution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Logarithmic => write!(f, "logarithmic"),
            Self::Linear => write!(f, "linear"),
        }
    }
}

impl FromStr for Distribution {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "logarithmic" | "log" | "1" => Ok(Self::Logarithmic),
            "linear" | "2" => Ok(Self::Linear),
            _ => Err(Error::InvalidDistribution(s.to_string())),
        }
    }
}

/// A tag annotated with its usage count and cloud bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudTag {
    pub tag: Tag,
    pub count: i64,
    pub font_size: u32,
}

/// Compute the bucket of every count, preserving input order.
///
/// Empty input yields empty output. When every count is equal, every
/// bucket is `steps`.
pub fn font_sizes(counts: &[i64], steps: u32, distribution: Distribution) -> Result<Vec<u32>> {
    if steps == 0 {
        return Err(Error::InvalidInput(
            "tag cloud steps must be at least 1".to_string(),
        ));
    }
    let (Some(&min), Some(&max)) = (counts.iter().min(), counts.iter().max()) else {
        return Ok(Vec::new());
    };
    if min == max {
        return Ok(vec![steps; counts.len()]);
    }

    let min_weight = min as f64;
    let max_weight = max as f64;
    let thresholds = thresholds(min_weight, max_weight, steps);

    Ok(counts
        .iter()
        .map(|&count| {
            let weight = tag_weight(count as f64, max_weight, distribution);
            thresholds
                .iter()
                .position(|&threshold| weight <= threshold)
                .map(|i| i as u32 + 1)
                .unwrap_or(steps)
        })
        .collect())
}

/// Annotate tags with cloud buckets.
///
/// Tags without a count are treated as unused (count 0).
pub fn calculate_cloud(
    tags: Vec<TagUsage>,
    steps: u32,
    distribution: Distribution,
) -> Result<Vec<CloudTag>> {
    let counts: Vec<i64> = tags.iter().map(|t| t.count.unwrap_or(0)).collect();
    let sizes = font_sizes(&counts, steps, distribution)?;

    Ok(tags
        .into_iter()
        .zip(counts)
        .zip(sizes)
        .map(|((usage, count), font_size)| CloudTag {
            tag: usage.tag,
            count,
            font_size,
        })
        .collect())
}

fn thresholds(min_weight: f64, max_weight: f64, steps: u32) -> Vec<f64> {
    let delta = (max_weight - min_weight) / f64::from(steps);
    (1..=steps)
        .map(|i| min_weight + f64::from(i) * delta)
        .collect()
}

fn tag_weight(count: f64, max_weight: f64, distribution: Distribution) -> f64 {
    match distribution {
        Distribution::Logarithmic if max_weight > 1.0 => {
            count.ln() * max_weight / max_weight.ln()
        }
        _ => count,
    }
}
