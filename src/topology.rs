//! TopoJSON topology decoding into polygon features.

use anyhow::{anyhow, bail, Result};
use geo::{Coord, LineString, MultiPolygon, Polygon};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
pub struct Topology {
    #[serde(default)]
    transform: Option<Transform>,
    arcs: Vec<Vec<Vec<f64>>>,
    objects: BTreeMap<String, TopoGeometry>,
}

/// Quantization transform; arcs are then delta-encoded integers.
#[derive(Debug, Deserialize, Clone, Copy)]
struct Transform {
    scale: [f64; 2],
    translate: [f64; 2],
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum TopoGeometry {
    GeometryCollection {
        geometries: Vec<TopoGeometry>,
    },
    Polygon {
        arcs: Vec<Vec<i64>>,
        #[serde(default)]
        properties: Option<Map<String, Value>>,
    },
    MultiPolygon {
        arcs: Vec<Vec<Vec<i64>>>,
        #[serde(default)]
        properties: Option<Map<String, Value>>,
    },
    #[serde(other)]
    Other,
}

/// A decoded polygon geometry and the properties it carried.
pub struct TopoFeature {
    pub properties: Map<String, Value>,
    pub geometry: MultiPolygon<f64>,
}

impl Topology {
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn object_names(&self) -> impl Iterator<Item = &str> {
        self.objects.keys().map(String::as_str)
    }

    /// Decodes the polygons of one named object, or of the first object in
    /// key order when no name is given. Non-polygon geometries are skipped.
    pub fn features(&self, object: Option<&str>) -> Result<Vec<TopoFeature>> {
        let geometry = match object {
            Some(name) => self
                .objects
                .get(name)
                .ok_or_else(|| {
                    let known: Vec<&str> = self.object_names().collect();
                    anyhow!("topology has no object named {:?} (objects: {})", name, known.join(", "))
                })?,
            None => self
                .objects
                .values()
                .next()
                .ok_or_else(|| anyhow!("topology has no objects"))?,
        };

        let arcs = self.decode_arcs();
        let mut features = Vec::new();
        collect(geometry, &arcs, &mut features)?;
        Ok(features)
    }

    /// Absolute coordinates of every arc, transform applied.
    fn decode_arcs(&self) -> Vec<Vec<Coord<f64>>> {
        self.arcs
            .iter()
            .map(|arc| match self.transform {
                Some(Transform { scale, translate }) => {
                    let (mut x, mut y) = (0.0, 0.0);
                    arc.iter()
                        .filter(|p| p.len() >= 2)
                        .map(|p| {
                            x += p[0];
                            y += p[1];
                            Coord {
                                x: x * scale[0] + translate[0],
                                y: y * scale[1] + translate[1],
                            }
                        })
                        .collect()
                }
                None => arc
                    .iter()
                    .filter(|p| p.len() >= 2)
                    .map(|p| Coord { x: p[0], y: p[1] })
                    .collect(),
            })
            .collect()
    }
}

fn collect(geometry: &TopoGeometry, arcs: &[Vec<Coord<f64>>], out: &mut Vec<TopoFeature>) -> Result<()> {
    match geometry {
        TopoGeometry::GeometryCollection { geometries } => {
            for g in geometries {
                collect(g, arcs, out)?;
            }
        }
        TopoGeometry::Polygon { arcs: rings, properties } => {
            out.push(TopoFeature {
                properties: properties.clone().unwrap_or_default(),
                geometry: MultiPolygon::new(vec![polygon(rings, arcs)?]),
            });
        }
        TopoGeometry::MultiPolygon { arcs: polygons, properties } => {
            let polygons = polygons
                .iter()
                .map(|rings| polygon(rings, arcs))
                .collect::<Result<Vec<_>>>()?;
            out.push(TopoFeature {
                properties: properties.clone().unwrap_or_default(),
                geometry: MultiPolygon::new(polygons),
            });
        }
        TopoGeometry::Other => {}
    }
    Ok(())
}

fn polygon(rings: &[Vec<i64>], arcs: &[Vec<Coord<f64>>]) -> Result<Polygon<f64>> {
    let mut rings = rings.iter().map(|r| ring(r, arcs));
    let exterior = match rings.next() {
        Some(r) => r?,
        None => LineString::new(vec![]),
    };
    let interiors = rings.collect::<Result<Vec<_>>>()?;
    Ok(Polygon::new(exterior, interiors))
}

/// Stitches arcs into one ring. A negative index `!i` means arc `i` reversed;
/// consecutive arcs share their joining point, which is kept once.
fn ring(indices: &[i64], arcs: &[Vec<Coord<f64>>]) -> Result<LineString<f64>> {
    let mut coords: Vec<Coord<f64>> = Vec::new();
    for &index in indices {
        let (i, reversed) = if index < 0 { (!index, true) } else { (index, false) };
        let arc = usize::try_from(i)
            .ok()
            .and_then(|i| arcs.get(i))
            .ok_or_else(|| anyhow!("arc index {} out of range", index))?;
        if !coords.is_empty() {
            coords.pop();
        }
        if reversed {
            coords.extend(arc.iter().rev());
        } else {
            coords.extend(arc.iter());
        }
    }
    if !coords.is_empty() && coords.len() < 4 {
        bail!("ring has {} points, a closed ring needs at least 4", coords.len());
    }
    Ok(LineString::new(coords))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Two unit squares sharing the edge x = 1, quantized.
    const SHARED_EDGE: &str = r#"{
        "type": "Topology",
        "transform": {"scale": [1, 1], "translate": [0, 0]},
        "objects": {
            "states": {
                "type": "GeometryCollection",
                "geometries": [
                    {"type": "Polygon", "arcs": [[0, 1]], "properties": {"name": "West"}},
                    {"type": "Polygon", "arcs": [[2, -1]], "properties": {"name": "East"}},
                    {"type": "Point", "coordinates": [0, 0]}
                ]
            }
        },
        "arcs": [
            [[1, 0], [0, 1]],
            [[1, 1], [-1, 0], [0, -1], [1, 0]],
            [[1, 0], [1, 0], [0, 1], [-1, 0]]
        ]
    }"#;

    #[test]
    fn decodes_delta_encoded_arcs() {
        let topology = Topology::from_slice(SHARED_EDGE.as_bytes()).unwrap();
        assert_eq!(topology.object_names().collect::<Vec<_>>(), ["states"]);

        let features = topology.features(None).unwrap();
        assert_eq!(features.len(), 2);
        assert_eq!(features[0].properties["name"], "West");

        let west = &features[0].geometry.0[0];
        let coords: Vec<(f64, f64)> = west.exterior().coords().map(|c| (c.x, c.y)).collect();
        assert_eq!(coords, [(1.0, 0.0), (1.0, 1.0), (0.0, 1.0), (0.0, 0.0), (1.0, 0.0)]);
    }

    #[test]
    fn reversed_arcs_close_the_neighbour() {
        let topology = Topology::from_slice(SHARED_EDGE.as_bytes()).unwrap();
        let features = topology.features(Some("states")).unwrap();
        let east = &features[1].geometry.0[0];
        let coords: Vec<(f64, f64)> = east.exterior().coords().map(|c| (c.x, c.y)).collect();
        assert_eq!(coords, [(1.0, 0.0), (2.0, 0.0), (2.0, 1.0), (1.0, 1.0), (1.0, 0.0)]);
    }

    #[test]
    fn unknown_object_and_bad_arcs_fail() {
        let topology = Topology::from_slice(SHARED_EDGE.as_bytes()).unwrap();
        assert!(topology.features(Some("counties")).is_err());

        let broken = r#"{"type":"Topology","arcs":[],"objects":{"a":{"type":"Polygon","arcs":[[3]]}}}"#;
        let topology = Topology::from_slice(broken.as_bytes()).unwrap();
        assert!(topology.features(None).is_err());
    }

    #[test]
    fn untransformed_multipolygons_keep_holes() {
        let json = r#"{
            "type": "Topology",
            "objects": {"lake": {"type": "MultiPolygon", "properties": {"name": "Lake"}, "arcs": [[[0], [1]]]}},
            "arcs": [
                [[0, 0], [4, 0], [4, 4], [0, 4], [0, 0]],
                [[1, 1], [1, 2], [2, 2], [2, 1], [1, 1]]
            ]
        }"#;
        let topology = Topology::from_slice(json.as_bytes()).unwrap();
        let features = topology.features(None).unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].geometry.0[0].interiors().len(), 1);
    }
}
