//! Geographic region types: bounding boxes and simple polygons.
//!
//! Coordinates are `(lon, lat)` in degrees, as in WKT. Polygons crossing
//! the antimeridian are not handled.

use serde::{Deserialize, Serialize};

use crate::error::{BinningError, Result};
use crate::product::GeoPos;

/// A geographic bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    /// Create a new bounding box from corner coordinates.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// The whole globe.
    pub fn global() -> Self {
        Self::new(-180.0, -90.0, 180.0, 90.0)
    }

    /// Parse "minx,miny,maxx,maxy".
    pub fn from_csv(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(BinningError::geometry(format!(
                "invalid bounding box '{}', expected 'minx,miny,maxx,maxy'",
                s
            )));
        }

        let mut values = [0.0f64; 4];
        for (value, part) in values.iter_mut().zip(parts.iter()) {
            *value = part
                .parse()
                .map_err(|_| BinningError::geometry(format!("invalid number '{}'", part)))?;
        }
        let bbox = Self::new(values[0], values[1], values[2], values[3]);
        if bbox.min_x > bbox.max_x || bbox.min_y > bbox.max_y {
            return Err(BinningError::geometry(format!(
                "bounding box '{}' has min greater than max",
                s
            )));
        }
        Ok(bbox)
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Check if this bbox intersects another (touching edges count).
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }

    /// Smallest box containing both.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }
}

/// A simple polygon given by its closed outer ring of `(lon, lat)` points.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    ring: Vec<(f64, f64)>,
}

impl Polygon {
    /// Create a polygon from a ring; the ring is closed if necessary.
    pub fn new(mut ring: Vec<(f64, f64)>) -> Result<Self> {
        if let (Some(&first), Some(&last)) = (ring.first(), ring.last()) {
            if first != last {
                ring.push(first);
            }
        }
        if ring.len() < 4 {
            return Err(BinningError::geometry(
                "polygon must have at least 3 distinct points",
            ));
        }
        if ring
            .iter()
            .any(|(x, y)| !x.is_finite() || !y.is_finite() || y.abs() > 90.0)
        {
            return Err(BinningError::geometry("polygon has invalid coordinates"));
        }
        Ok(Self { ring })
    }

    /// Rectangle covering a bounding box.
    pub fn from_bbox(bbox: &BoundingBox) -> Self {
        Self {
            ring: vec![
                (bbox.min_x, bbox.max_y),
                (bbox.max_x, bbox.max_y),
                (bbox.max_x, bbox.min_y),
                (bbox.min_x, bbox.min_y),
                (bbox.min_x, bbox.max_y),
            ],
        }
    }

    /// Polygon traced through a sequence of geographic positions.
    pub fn from_geo_positions(positions: &[GeoPos]) -> Result<Self> {
        Self::new(positions.iter().map(|p| (p.lon, p.lat)).collect())
    }

    /// Parse a WKT `POLYGON((lon lat, ...))` string. Only the outer ring is used.
    pub fn parse_wkt(wkt: &str) -> Result<Self> {
        let wkt = wkt.trim();
        if !wkt.to_uppercase().starts_with("POLYGON") {
            return Err(BinningError::geometry(format!(
                "expected WKT POLYGON, got '{}'",
                wkt
            )));
        }

        let start = wkt
            .find("((")
            .ok_or_else(|| BinningError::geometry("missing opening parentheses"))?;
        let end = wkt[start..]
            .find(')')
            .map(|i| start + i)
            .ok_or_else(|| BinningError::geometry("missing closing parentheses"))?;

        let ring = wkt[start + 2..end]
            .split(',')
            .map(|pair| {
                let parts: Vec<&str> = pair.split_whitespace().collect();
                if parts.len() != 2 {
                    return Err(BinningError::geometry(format!(
                        "expected 'lon lat', got '{}'",
                        pair.trim()
                    )));
                }
                let lon: f64 = parts[0]
                    .parse()
                    .map_err(|_| BinningError::geometry(format!("invalid number '{}'", parts[0])))?;
                let lat: f64 = parts[1]
                    .parse()
                    .map_err(|_| BinningError::geometry(format!("invalid number '{}'", parts[1])))?;
                Ok((lon, lat))
            })
            .collect::<Result<Vec<_>>>()?;

        Self::new(ring)
    }

    pub fn to_wkt(&self) -> String {
        let coords: Vec<String> = self
            .ring
            .iter()
            .map(|(x, y)| format!("{} {}", x, y))
            .collect();
        format!("POLYGON(({}))", coords.join(", "))
    }

    /// Closed outer ring.
    pub fn ring(&self) -> &[(f64, f64)] {
        &self.ring
    }

    pub fn bounds(&self) -> BoundingBox {
        let mut bbox = BoundingBox::new(f64::MAX, f64::MAX, f64::MIN, f64::MIN);
        for &(x, y) in &self.ring {
            bbox.min_x = bbox.min_x.min(x);
            bbox.min_y = bbox.min_y.min(y);
            bbox.max_x = bbox.max_x.max(x);
            bbox.max_y = bbox.max_y.max(y);
        }
        bbox
    }

    /// Point in polygon test (even-odd rule).
    pub fn contains(&self, x: f64, y: f64) -> bool {
        let mut inside = false;
        for edge in self.ring.windows(2) {
            let (x1, y1) = edge[0];
            let (x2, y2) = edge[1];
            if (y1 > y) != (y2 > y) {
                let cross_x = x1 + (y - y1) * (x2 - x1) / (y2 - y1);
                if x < cross_x {
                    inside = !inside;
                }
            }
        }
        inside
    }

    /// True if the two polygons share any area or touch.
    pub fn intersects(&self, other: &Polygon) -> bool {
        if !self.bounds().intersects(&other.bounds()) {
            return false;
        }
        if self.ring.iter().any(|&(x, y)| other.contains(x, y))
            || other.ring.iter().any(|&(x, y)| self.contains(x, y))
        {
            return true;
        }
        self.ring.windows(2).any(|a| {
            other
                .ring
                .windows(2)
                .any(|b| segments_intersect(a[0], a[1], b[0], b[1]))
        })
    }
}

fn orientation(a: (f64, f64), b: (f64, f64), c: (f64, f64)) -> f64 {
    (b.0 - a.0) * (c.1 - a.1) - (b.1 - a.1) * (c.0 - a.0)
}

fn on_segment(a: (f64, f64), b: (f64, f64), p: (f64, f64)) -> bool {
    p.0 >= a.0.min(b.0) && p.0 <= a.0.max(b.0) && p.1 >= a.1.min(b.1) && p.1 <= a.1.max(b.1)
}

fn segments_intersect(p1: (f64, f64), p2: (f64, f64), q1: (f64, f64), q2: (f64, f64)) -> bool {
    let d1 = orientation(q1, q2, p1);
    let d2 = orientation(q1, q2, p2);
    let d3 = orientation(p1, p2, q1);
    let d4 = orientation(p1, p2, q2);

    if ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
    {
        return true;
    }

    (d1 == 0.0 && on_segment(q1, q2, p1))
        || (d2 == 0.0 && on_segment(q1, q2, p2))
        || (d3 == 0.0 && on_segment(p1, p2, q1))
        || (d4 == 0.0 && on_segment(p1, p2, q2))
}
