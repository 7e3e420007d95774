use crate::config::Configuration;
use crate::error::LoadError;
use crate::fetch::Fetch;
use crate::topology::Topology;
use crate::types::{GeoFeature, JoinedRecord, Period, PeriodDataset, PeriodEntry, StatRow};
use anyhow::{anyhow, Context, Result};
use csv::{ReaderBuilder, Trim};
use geo::MultiPolygon;
use geojson::GeoJson;
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Parsed statistical table: rows plus the period columns in header order.
#[derive(Debug, Clone)]
pub struct StatTable {
    pub periods: Vec<Period>,
    pub rows: Vec<StatRow>,
}

/// Fetches both resources concurrently, then parses and joins them.
/// Either failure aborts the whole load; the first error wins.
pub async fn load_data<F: Fetch>(config: &Configuration, fetcher: &F) -> Result<Vec<PeriodDataset>, LoadError> {
    tracing::info!(geo_src = %config.geo_src, src = %config.src, "loading data");

    let fetch = |src: &str| {
        let src = src.to_string();
        async move {
            fetcher
                .fetch(&src)
                .await
                .map_err(|source| LoadError::Fetch { src, source })
        }
    };
    let (geo_bytes, table_bytes) = tokio::try_join!(fetch(&config.geo_src), fetch(&config.src))?;

    let features = parse_features(&geo_bytes, config).map_err(|source| LoadError::Parse {
        src: config.geo_src.clone(),
        source,
    })?;
    tracing::info!("Loaded {} geographic features", features.len());

    let table = parse_table(&table_bytes, config.name_column.as_deref()).map_err(|source| LoadError::Parse {
        src: config.src.clone(),
        source,
    })?;
    tracing::info!("Loaded {} rows over {} periods", table.rows.len(), table.periods.len());

    let records = join(features, &table.rows);
    Ok(transpose(&records, &table.periods))
}

/// Geographic resource: a TopoJSON topology, or a GeoJSON FeatureCollection.
pub fn parse_features(bytes: &[u8], config: &Configuration) -> Result<Vec<GeoFeature>> {
    let value: Value = serde_json::from_slice(bytes).context("Geographic resource is not JSON")?;
    let kind = value.get("type").and_then(Value::as_str).unwrap_or_default().to_string();

    let raw: Vec<(Map<String, Value>, MultiPolygon<f64>)> = match kind.as_str() {
        "Topology" => {
            let topology = Topology::from_slice(bytes).context("Failed to parse topology")?;
            topology
                .features(config.geo_object.as_deref())?
                .into_iter()
                .map(|f| (f.properties, f.geometry))
                .collect()
        }
        "FeatureCollection" => load_geojson(value)?,
        other => return Err(anyhow!("Unsupported geographic resource type {:?}", other)),
    };

    let mut features = Vec::with_capacity(raw.len());
    for (properties, geometry) in raw {
        match properties.get(&config.name_property) {
            Some(Value::String(s)) => features.push(GeoFeature {
                name: s.trim().to_string(),
                geometry,
            }),
            Some(Value::Number(n)) => features.push(GeoFeature {
                name: n.to_string(),
                geometry,
            }),
            _ => tracing::warn!("Skipping feature without a `{}` property", config.name_property),
        }
    }
    Ok(features)
}

fn load_geojson(value: Value) -> Result<Vec<(Map<String, Value>, MultiPolygon<f64>)>> {
    let collection = match GeoJson::from_json_value(value).context("Failed to parse GeoJSON")? {
        GeoJson::FeatureCollection(fc) => fc,
        _ => return Err(anyhow!("GeoJSON must be a FeatureCollection")),
    };

    let mut out = Vec::new();
    for feature in collection.features {
        let geometry = match feature.geometry {
            Some(geo) => {
                let geometry: geo::Geometry<f64> = geo
                    .value
                    .try_into()
                    .map_err(|e| anyhow!("Failed to convert geojson geometry: {:?}", e))?;
                match geometry {
                    geo::Geometry::MultiPolygon(mp) => mp,
                    geo::Geometry::Polygon(p) => MultiPolygon::new(vec![p]),
                    _ => continue,
                }
            }
            None => continue,
        };
        out.push((feature.properties.unwrap_or_default(), geometry));
    }
    Ok(out)
}

/// Tabular resource: the name column (first column unless named) is the
/// join key, every other column is a period. Empty cells are absent values.
pub fn parse_table(bytes: &[u8], name_column: Option<&str>) -> Result<StatTable> {
    let mut rdr = ReaderBuilder::new().trim(Trim::All).from_reader(bytes);
    let headers = rdr.headers()?.clone();

    let key_idx = match name_column {
        Some(name) => headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| anyhow!("Join column '{}' not found in CSV", name))?,
        None if headers.is_empty() => return Err(anyhow!("CSV has no columns")),
        None => 0,
    };

    let columns: Vec<(usize, Period)> = headers
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != key_idx)
        .map(|(i, h)| (i, Period::new(h)))
        .collect();

    let mut rows = Vec::new();
    for (line, result) in rdr.records().enumerate() {
        let record = result?;
        let name = record.get(key_idx).unwrap_or("");
        if name.is_empty() {
            continue;
        }

        let mut values_by_period = std::collections::BTreeMap::new();
        for (idx, period) in &columns {
            let cell = record.get(*idx).unwrap_or("");
            if cell.is_empty() {
                continue;
            }
            let value = cell
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| {
                    anyhow!("Row {} ({}), column {}: {:?} is not a number", line + 2, name, period, cell)
                })?;
            values_by_period.insert(period.clone(), value);
        }

        rows.push(StatRow {
            subunit_name: name.to_string(),
            values_by_period,
        });
    }

    Ok(StatTable {
        periods: columns.into_iter().map(|(_, p)| p).collect(),
        rows,
    })
}

/// Left outer join keyed on features: every feature yields exactly one
/// record, sorted by case-insensitive name with input order breaking ties.
pub fn join(mut features: Vec<GeoFeature>, rows: &[StatRow]) -> Vec<JoinedRecord> {
    features.sort_by_cached_key(|f| f.name.to_lowercase());

    let mut lookup: HashMap<&str, &StatRow> = HashMap::new();
    for row in rows {
        let key = row.subunit_name.trim();
        if lookup.contains_key(key) {
            tracing::warn!(name = key, "Duplicate data row, keeping the first");
            continue;
        }
        lookup.insert(key, row);
    }

    let records: Vec<JoinedRecord> = features
        .into_iter()
        .map(|feature| {
            let values_by_period = lookup.get(feature.name.trim()).map(|row| row.values_by_period.clone());
            if values_by_period.is_none() {
                tracing::debug!(name = %feature.name, "No data row for feature");
            }
            JoinedRecord {
                feature: Arc::new(feature),
                values_by_period,
            }
        })
        .collect();

    let matched: BTreeSet<&str> = records.iter().map(|r| r.feature.name.trim()).collect();
    let orphans = lookup.keys().filter(|k| !matched.contains(*k)).count();
    if orphans > 0 {
        tracing::info!("{} data rows matched no feature", orphans);
    }

    records
}

/// One dataset per period, ascending, each holding every record in order.
pub fn transpose(records: &[JoinedRecord], periods: &[Period]) -> Vec<PeriodDataset> {
    let mut periods = periods.to_vec();
    periods.sort();
    periods.dedup();

    periods
        .into_iter()
        .map(|period| PeriodDataset {
            entries: records
                .iter()
                .map(|r| PeriodEntry {
                    feature: Arc::clone(&r.feature),
                    value: r.value(&period),
                })
                .collect(),
            period,
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::projection::ProjectionRegistry;
    use geo::polygon;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub(crate) const ABC_TOPOLOGY: &str = r#"{
        "type": "Topology",
        "objects": {"units": {"type": "GeometryCollection", "geometries": [
            {"type": "Polygon", "arcs": [[0]], "properties": {"name": "C"}},
            {"type": "Polygon", "arcs": [[1]], "properties": {"name": "a"}},
            {"type": "Polygon", "arcs": [[2]], "properties": {"name": "B"}}
        ]}},
        "arcs": [
            [[2, 0], [3, 0], [3, 1], [2, 1], [2, 0]],
            [[0, 0], [1, 0], [1, 1], [0, 1], [0, 0]],
            [[1, 0], [2, 0], [2, 1], [1, 1], [1, 0]]
        ]
    }"#;

    pub(crate) const ABC_TABLE: &str = "Geographic Administrative Unit,2000,2001\nC,30,40\na,10,20\n";

    fn config(pairs: &[(&str, &str)]) -> Configuration {
        let mut attrs: HashMap<String, String> = [("geoSrc", "geo.json"), ("src", "data.csv")]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        attrs.extend(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        Configuration::resolve(&attrs, &ProjectionRegistry::default()).unwrap()
    }

    fn feature(name: &str) -> GeoFeature {
        GeoFeature {
            name: name.into(),
            geometry: MultiPolygon::new(vec![polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 0.0, y: 1.0)]]),
        }
    }

    fn row(name: &str, values: &[(&str, f64)]) -> StatRow {
        StatRow {
            subunit_name: name.into(),
            values_by_period: values.iter().map(|(p, v)| (Period::new(*p), *v)).collect(),
        }
    }

    pub(crate) struct MemoryFetcher {
        pub files: HashMap<String, Vec<u8>>,
        pub calls: AtomicUsize,
    }

    impl MemoryFetcher {
        pub fn new(files: &[(&str, &str)]) -> Self {
            Self {
                files: files.iter().map(|(k, v)| (k.to_string(), v.as_bytes().to_vec())).collect(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl Fetch for MemoryFetcher {
        async fn fetch(&self, src: &str) -> Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.files.get(src).cloned().ok_or_else(|| anyhow!("404 {}", src))
        }
    }

    #[test]
    fn join_is_total_and_sorted_case_insensitively() {
        let features = vec![feature("c"), feature("B"), feature("a"), feature("b")];
        let rows = vec![row("a", &[("2000", 1.0)]), row("zz", &[("2000", 9.0)])];
        let records = join(features, &rows);

        let names: Vec<&str> = records.iter().map(|r| r.feature.name.as_str()).collect();
        assert_eq!(names, ["a", "B", "b", "c"]);
        assert_eq!(records[0].value(&Period::new("2000")), Some(1.0));
        assert!(records[1..].iter().all(|r| r.values_by_period.is_none()));
    }

    #[test]
    fn first_duplicate_row_wins_and_keys_are_trimmed() {
        let rows = vec![row(" A ", &[("2000", 1.0)]), row("A", &[("2000", 2.0)])];
        let records = join(vec![feature("A")], &rows);
        assert_eq!(records[0].value(&Period::new("2000")), Some(1.0));
    }

    #[test]
    fn table_uses_first_column_as_key_and_keeps_gaps() {
        let table = parse_table(b"name, 2001 ,2000\nA,1.5,\nB, 2 ,3\n,9,9\n", None).unwrap();
        assert_eq!(table.periods, vec![Period::new("2001"), Period::new("2000")]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0], row("A", &[("2001", 1.5)]));
        assert_eq!(table.rows[1], row("B", &[("2001", 2.0), ("2000", 3.0)]));
    }

    #[test]
    fn table_honours_a_named_key_column() {
        let table = parse_table(b"2000,state\n4,A\n", Some("state")).unwrap();
        assert_eq!(table.periods, vec![Period::new("2000")]);
        assert_eq!(table.rows[0], row("A", &[("2000", 4.0)]));
        assert!(parse_table(b"2000,state\n4,A\n", Some("county")).is_err());
    }

    #[test]
    fn mixed_headers_order_numbers_first_and_dedup() {
        let table = parse_table(b"name,1a,10,2,Na,10\nA,1,2,3,4,5\n", None).unwrap();
        let records = join(vec![feature("A")], &table.rows);
        let datasets = transpose(&records, &table.periods);
        let periods: Vec<&str> = datasets.iter().map(|d| d.period.as_str()).collect();
        assert_eq!(periods, ["2", "10", "1a", "Na"]);
    }

    #[test]
    fn non_numeric_cells_fail_the_parse() {
        let err = parse_table(b"name,2000\nA,lots\n", None).unwrap_err();
        assert!(err.to_string().contains("not a number"));
        assert!(parse_table(b"name,2000\nA,NaN\n", None).is_err());
    }

    #[test]
    fn geojson_collections_are_accepted() {
        let json = br#"{"type": "FeatureCollection", "features": [
            {"type": "Feature", "properties": {"name": "A"},
             "geometry": {"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,0]]]}},
            {"type": "Feature", "properties": {"name": "P"},
             "geometry": {"type": "Point", "coordinates": [0,0]}},
            {"type": "Feature", "properties": {},
             "geometry": {"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,0]]]}}
        ]}"#;
        let features = parse_features(json, &config(&[])).unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].name, "A");
    }

    #[test]
    fn unsupported_geographic_types_fail() {
        assert!(parse_features(br#"{"type": "Point", "coordinates": [0, 0]}"#, &config(&[])).is_err());
        assert!(parse_features(b"not json", &config(&[])).is_err());
    }

    #[tokio::test]
    async fn loads_joins_and_transposes() {
        let fetcher = MemoryFetcher::new(&[("geo.json", ABC_TOPOLOGY), ("data.csv", ABC_TABLE)]);
        let datasets = load_data(&config(&[]), &fetcher).await.unwrap();
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);

        assert_eq!(datasets.len(), 2);
        assert_eq!(datasets[0].period, Period::new("2000"));
        assert_eq!(datasets[1].period, Period::new("2001"));
        for dataset in &datasets {
            let names: Vec<&str> = dataset.entries.iter().map(|e| e.feature.name.as_str()).collect();
            assert_eq!(names, ["a", "B", "C"]);
            assert_eq!(dataset.entries[1].value, None);
        }
        assert_eq!(datasets[0].values().collect::<Vec<_>>(), [10.0, 30.0]);
        assert_eq!(datasets[1].values().collect::<Vec<_>>(), [20.0, 40.0]);
        assert!(Arc::ptr_eq(&datasets[0].entries[0].feature, &datasets[1].entries[0].feature));
    }

    #[tokio::test]
    async fn any_failed_fetch_fails_the_load() {
        let fetcher = MemoryFetcher::new(&[("geo.json", ABC_TOPOLOGY)]);
        let err = load_data(&config(&[]), &fetcher).await.unwrap_err();
        assert!(matches!(err, LoadError::Fetch { ref src, .. } if src == "data.csv"));
    }

    #[tokio::test]
    async fn parse_failures_name_the_resource() {
        let fetcher = MemoryFetcher::new(&[("geo.json", "{}"), ("data.csv", ABC_TABLE)]);
        let err = load_data(&config(&[]), &fetcher).await.unwrap_err();
        assert!(matches!(err, LoadError::Parse { ref src, .. } if src == "geo.json"));
    }
}
