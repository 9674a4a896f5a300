//! Fundamental geographic and board types.

use serde::{Deserialize, Serialize};

use crate::enums::Team;

/// Participant identifier as assigned by the relay.
pub type ParticipantId = String;

/// Unit (map element) identifier.
pub type UnitId = String;

/// Geographic point in degrees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Axis-aligned geographic rectangle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bounds {
    pub south_west: LatLng,
    pub north_east: LatLng,
}

impl Bounds {
    pub fn new(south_west: LatLng, north_east: LatLng) -> Self {
        Self {
            south_west,
            north_east,
        }
    }

    /// Smallest bounds enclosing all points. `None` for an empty slice.
    pub fn enclosing(points: &[LatLng]) -> Option<Self> {
        let first = points.first()?;
        let mut b = Bounds::new(*first, *first);
        for p in &points[1..] {
            b.south_west.lat = b.south_west.lat.min(p.lat);
            b.south_west.lng = b.south_west.lng.min(p.lng);
            b.north_east.lat = b.north_east.lat.max(p.lat);
            b.north_east.lng = b.north_east.lng.max(p.lng);
        }
        Some(b)
    }

    pub fn contains(&self, p: &LatLng) -> bool {
        p.lat >= self.south_west.lat
            && p.lat <= self.north_east.lat
            && p.lng >= self.south_west.lng
            && p.lng <= self.north_east.lng
    }

    /// True when the rectangle has no area.
    pub fn is_degenerate(&self) -> bool {
        self.north_east.lat <= self.south_west.lat || self.north_east.lng <= self.south_west.lng
    }

    pub fn center(&self) -> LatLng {
        LatLng::new(
            (self.south_west.lat + self.north_east.lat) / 2.0,
            (self.south_west.lng + self.north_east.lng) / 2.0,
        )
    }
}

/// Whether `p` lies inside the closed polygon `ring` (edges count as inside).
/// Even-odd rule.
pub fn polygon_contains(ring: &[LatLng], p: &LatLng) -> bool {
    if ring.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut prev = ring[ring.len() - 1];
    for &curr in ring {
        if on_segment(&prev, &curr, p) {
            return true;
        }
        if (curr.lat > p.lat) != (prev.lat > p.lat) {
            let lng_at = curr.lng + (p.lat - curr.lat) * (prev.lng - curr.lng) / (prev.lat - curr.lat);
            if p.lng < lng_at {
                inside = !inside;
            }
        }
        prev = curr;
    }
    inside
}

fn on_segment(a: &LatLng, b: &LatLng, p: &LatLng) -> bool {
    const EPS: f64 = 1e-12;
    let cross = (b.lng - a.lng) * (p.lat - a.lat) - (b.lat - a.lat) * (p.lng - a.lng);
    cross.abs() <= EPS
        && p.lat >= a.lat.min(b.lat) - EPS
        && p.lat <= a.lat.max(b.lat) + EPS
        && p.lng >= a.lng.min(b.lng) - EPS
        && p.lng <= a.lng.max(b.lng) + EPS
}

/// The operating sector drawn by the director.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sector {
    pub coordinates: Vec<LatLng>,
    pub bounds: Bounds,
}

impl Sector {
    pub fn contains(&self, p: &LatLng) -> bool {
        self.bounds.contains(p) && polygon_contains(&self.coordinates, p)
    }
}

/// Display style of a deployment zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneStyle {
    pub color: String,
    pub fill_opacity: f64,
}

impl ZoneStyle {
    /// Default colours per team.
    pub fn for_team(team: Team) -> Self {
        let color = match team {
            Team::Blue => "#0000ff",
            Team::Red => "#ff0000",
            Team::Unassigned => "#808080",
        };
        Self {
            color: color.into(),
            fill_opacity: 0.2,
        }
    }
}

/// A team's deployment zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub team: Team,
    pub coordinates: Vec<LatLng>,
    pub bounds: Bounds,
    #[serde(default)]
    pub style: Option<ZoneStyle>,
}

impl Zone {
    pub fn contains(&self, p: &LatLng) -> bool {
        self.bounds.contains(p) && polygon_contains(&self.coordinates, p)
    }
}

/// A unit placed on the map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitElement {
    pub id: UnitId,
    pub team: Team,
    /// Free-form designation shown next to the symbol.
    #[serde(default)]
    pub label: String,
    pub position: LatLng,
    pub creator_id: ParticipantId,
}
