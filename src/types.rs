use geo::MultiPolygon;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// One named boundary. Shared by every period's dataset, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoFeature {
    pub name: String,
    pub geometry: MultiPolygon<f64>,
}

/// Time-period key taken from a data column header.
///
/// Numeric keys come first, compared by value ("9" < "10"); text keys
/// follow, compared as text. Equal values fall back to the text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Period(String);

impl Period {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn numeric(&self) -> Option<f64> {
        self.0.parse::<f64>().ok().filter(|v| v.is_finite())
    }
}

impl Ord for Period {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.numeric(), other.numeric()) {
            (Some(a), Some(b)) => a.total_cmp(&b).then_with(|| self.0.cmp(&other.0)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for Period {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One row of the statistical table. Periods with an empty cell are absent.
#[derive(Debug, Clone, PartialEq)]
pub struct StatRow {
    pub subunit_name: String,
    pub values_by_period: BTreeMap<Period, f64>,
}

/// A feature and its row's values; `None` when no row matched the feature.
#[derive(Debug, Clone)]
pub struct JoinedRecord {
    pub feature: Arc<GeoFeature>,
    pub values_by_period: Option<BTreeMap<Period, f64>>,
}

impl JoinedRecord {
    pub fn value(&self, period: &Period) -> Option<f64> {
        self.values_by_period.as_ref()?.get(period).copied()
    }
}

#[derive(Debug, Clone)]
pub struct PeriodEntry {
    pub feature: Arc<GeoFeature>,
    pub value: Option<f64>,
}

/// Everything one map panel draws: every feature, in feature-name order.
#[derive(Debug, Clone)]
pub struct PeriodDataset {
    pub period: Period,
    pub entries: Vec<PeriodEntry>,
}

impl PeriodDataset {
    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.entries.iter().filter_map(|e| e.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_periods_sort_by_value() {
        let mut periods: Vec<Period> = ["2010", "9", "1999.5", "10"].into_iter().map(Period::new).collect();
        periods.sort();
        let keys: Vec<&str> = periods.iter().map(Period::as_str).collect();
        assert_eq!(keys, ["9", "10", "1999.5", "2010"]);
    }

    #[test]
    fn text_periods_sort_lexically() {
        let mut periods: Vec<Period> = ["Q2", "Q10", "Q1"].into_iter().map(Period::new).collect();
        periods.sort();
        let keys: Vec<&str> = periods.iter().map(Period::as_str).collect();
        assert_eq!(keys, ["Q1", "Q10", "Q2"]);
    }

    #[test]
    fn mixed_periods_sort_numbers_before_text() {
        let sorted = |keys: &[&str]| -> Vec<String> {
            let mut periods: Vec<Period> = keys.iter().copied().map(Period::new).collect();
            periods.sort();
            periods.iter().map(|p| p.to_string()).collect()
        };
        let expected = ["2", "10", "19a", "1a", "Na", "NaN"];
        assert_eq!(sorted(&["1a", "10", "Na", "2", "19a", "NaN"]), expected);
        assert_eq!(sorted(&["Na", "NaN", "19a", "2", "1a", "10"]), expected);

        let (two, ten, text) = (Period::new("2"), Period::new("10"), Period::new("1a"));
        assert!(two < ten && ten < text && two < text);
    }

    #[test]
    fn unmatched_record_has_no_values() {
        let record = JoinedRecord {
            feature: Arc::new(GeoFeature {
                name: "B".into(),
                geometry: MultiPolygon::new(vec![]),
            }),
            values_by_period: None,
        };
        assert_eq!(record.value(&Period::new("2000")), None);
    }
}
