//! Quantized color scale over the global value range.

use crate::types::PeriodDataset;
use image::Rgba;

/// Equal-width buckets over `[min, max]`, one palette color per bucket.
///
/// A value sitting exactly on a bucket boundary belongs to the lower bucket;
/// `max` itself belongs to the last one. With constant data the scale holds a
/// single bucket. Without any value at all there is no domain and nothing maps.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorScale {
    domain: Option<(f64, f64)>,
    palette: Vec<Rgba<u8>>,
    /// Upper bounds of every bucket but the last.
    thresholds: Vec<f64>,
}

impl ColorScale {
    /// Global min/max over every non-null value of every period.
    pub fn build(datasets: &[PeriodDataset], palette: Vec<Rgba<u8>>) -> Self {
        let extent = datasets
            .iter()
            .flat_map(PeriodDataset::values)
            .fold(None, |acc: Option<(f64, f64)>, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            });
        match extent {
            Some((min, max)) => Self::with_domain(min, max, palette),
            None => Self {
                domain: None,
                palette,
                thresholds: Vec::new(),
            },
        }
    }

    pub fn with_domain(min: f64, max: f64, palette: Vec<Rgba<u8>>) -> Self {
        if palette.is_empty() {
            return Self {
                domain: None,
                palette,
                thresholds: Vec::new(),
            };
        }
        if min == max {
            let middle = palette[palette.len() / 2];
            return Self {
                domain: Some((min, max)),
                palette: vec![middle],
                thresholds: Vec::new(),
            };
        }

        let n = palette.len();
        let width = (max - min) / n as f64;
        let thresholds = (1..n).map(|i| min + width * i as f64).collect();
        Self {
            domain: Some((min, max)),
            palette,
            thresholds,
        }
    }

    pub fn domain(&self) -> Option<(f64, f64)> {
        self.domain
    }

    /// Colors of the buckets, lowest first.
    pub fn palette(&self) -> &[Rgba<u8>] {
        &self.palette
    }

    pub fn bucket(&self, value: f64) -> Option<usize> {
        self.domain?;
        let i = self.thresholds.iter().position(|&t| value <= t);
        Some(i.unwrap_or(self.thresholds.len()))
    }

    pub fn color(&self, value: f64) -> Option<Rgba<u8>> {
        self.bucket(value).map(|i| self.palette[i])
    }

    /// `[lower, upper]` of the first bucket painted with `color`. A palette
    /// repeating a color has several buckets per color; use `extent` there.
    pub fn invert_extent(&self, color: Rgba<u8>) -> Option<(f64, f64)> {
        let i = self.palette.iter().position(|c| *c == color)?;
        self.extent(i)
    }

    pub fn extent(&self, bucket: usize) -> Option<(f64, f64)> {
        let (min, max) = self.domain?;
        if bucket >= self.palette.len() {
            return None;
        }
        let lower = if bucket == 0 { min } else { self.thresholds[bucket - 1] };
        let upper = self.thresholds.get(bucket).copied().unwrap_or(max);
        Some((lower, upper))
    }
}
