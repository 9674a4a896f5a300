//! The battlefield seam: where units are and what happens when they act.
//!
//! Validation and execution only talk to [`Battlefield`]. The stock
//! implementation, [`TerrainBattlefield`], answers reachability from the
//! sector grid and keeps unit positions in memory. Until a sector is
//! known it has no grid and nothing is reachable.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use skirmish_core::constants::{ACTION_ORDER_DURATION_SECS, DEFAULT_EXECUTION_TIME_SCALE, DEFAULT_UNIT_SPEED_MPS};
use skirmish_core::enums::OrderKind;
use skirmish_core::order::{Order, OrderTarget};
use skirmish_core::types::{LatLng, UnitElement, UnitId};
use skirmish_terrain::MapGrid;

/// What an executed order did.
#[derive(Debug, Clone, PartialEq)]
pub struct Effect {
    pub narrative: String,
    /// New position of the acting unit, for orders that move it.
    pub moved_to: Option<LatLng>,
}

#[async_trait]
pub trait Battlefield: Send + Sync {
    async fn unit_position(&self, unit_id: &str) -> Option<LatLng>;

    async fn is_reachable(&self, from: &LatLng, to: &LatLng) -> bool;

    /// Point an order aims at: a unit's position, a map point or an area centre.
    async fn resolve_target(&self, target: &OrderTarget) -> Option<LatLng>;

    /// Estimated duration of an order in seconds.
    async fn estimate_duration(&self, order: &Order) -> f64;

    /// Carry out a validated order.
    async fn execute(&self, order: &Order) -> Result<Effect, String>;
}

/// Battlefield backed by a sector [`MapGrid`] and an in-memory unit table.
pub struct TerrainBattlefield {
    grid: RwLock<Option<MapGrid>>,
    units: Mutex<BTreeMap<UnitId, UnitElement>>,
    time_scale: f64,
}

impl TerrainBattlefield {
    pub fn new(grid: MapGrid) -> Self {
        let field = Self::unmapped();
        field.set_grid(grid);
        field
    }

    /// Field with no sector yet.
    pub fn unmapped() -> Self {
        Self {
            grid: RwLock::new(None),
            units: Mutex::new(BTreeMap::new()),
            time_scale: DEFAULT_EXECUTION_TIME_SCALE,
        }
    }

    /// Wall-clock seconds per order second while executing. 0.0 is instant.
    pub fn with_time_scale(mut self, time_scale: f64) -> Self {
        self.time_scale = time_scale.max(0.0);
        self
    }

    fn units(&self) -> MutexGuard<'_, BTreeMap<UnitId, UnitElement>> {
        self.units.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn grid(&self) -> RwLockReadGuard<'_, Option<MapGrid>> {
        self.grid.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Lay a new grid over the field (sector confirmed or replaced).
    pub fn set_grid(&self, grid: MapGrid) {
        *self.grid.write().unwrap_or_else(|e| e.into_inner()) = Some(grid);
    }

    pub fn has_grid(&self) -> bool {
        self.grid().is_some()
    }

    pub fn place(&self, element: UnitElement) {
        self.units().insert(element.id.clone(), element);
    }

    pub fn remove(&self, unit_id: &str) -> Option<UnitElement> {
        self.units().remove(unit_id)
    }

    pub fn element(&self, unit_id: &str) -> Option<UnitElement> {
        self.units().get(unit_id).cloned()
    }

    /// Replace the unit table (after a snapshot).
    pub fn sync_elements<'a>(&self, elements: impl IntoIterator<Item = &'a UnitElement>) {
        let mut units = self.units();
        units.clear();
        for e in elements {
            units.insert(e.id.clone(), e.clone());
        }
    }

    async fn pace(&self, order_secs: f64) {
        let wall = order_secs * self.time_scale;
        if wall > 0.0 {
            tokio::time::sleep(Duration::from_secs_f64(wall)).await;
        }
    }
}

#[async_trait]
impl Battlefield for TerrainBattlefield {
    async fn unit_position(&self, unit_id: &str) -> Option<LatLng> {
        self.units().get(unit_id).map(|e| e.position)
    }

    async fn is_reachable(&self, from: &LatLng, to: &LatLng) -> bool {
        self.grid().as_ref().is_some_and(|g| g.reachable(from, to))
    }

    async fn resolve_target(&self, target: &OrderTarget) -> Option<LatLng> {
        match target {
            OrderTarget::Unit { unit_id } => self.unit_position(unit_id).await,
            OrderTarget::Point { point } | OrderTarget::Destination { point } => {
                let inside = self.grid().as_ref().is_some_and(|g| g.covers(point));
                inside.then_some(*point)
            }
            OrderTarget::Area { bounds } => Some(bounds.center()),
            OrderTarget::None => None,
        }
    }

    async fn estimate_duration(&self, order: &Order) -> f64 {
        match (&order.kind, &order.target) {
            (OrderKind::Wait, _) => order.estimated_duration_secs,
            (OrderKind::Move, OrderTarget::Destination { point }) => {
                let Some(from) = order.origin else {
                    return 0.0;
                };
                self.grid()
                    .as_ref()
                    .and_then(|g| g.route_length_m(&from, point))
                    .map(|m| m / DEFAULT_UNIT_SPEED_MPS)
                    .unwrap_or(0.0)
            }
            _ => ACTION_ORDER_DURATION_SECS,
        }
    }

    async fn execute(&self, order: &Order) -> Result<Effect, String> {
        let Some(position) = self.unit_position(&order.unit_id).await else {
            return Err(format!("unit {} is no longer on the field", order.unit_id));
        };
        self.pace(order.estimated_duration_secs).await;

        let effect = match (&order.kind, &order.target) {
            (OrderKind::Move, OrderTarget::Destination { point }) => {
                let metres = self
                    .grid()
                    .as_ref()
                    .and_then(|g| g.route_length_m(&position, point))
                    .ok_or_else(|| format!("no route for {} any more", order.unit_id))?;
                if let Some(unit) = self.units().get_mut(&order.unit_id) {
                    unit.position = *point;
                }
                Effect {
                    narrative: format!("{} moved {:.0} m", order.unit_id, metres),
                    moved_to: Some(*point),
                }
            }
            (OrderKind::Attack, target) => {
                let objective = self
                    .resolve_target(target)
                    .await
                    .ok_or_else(|| format!("objective of {} vanished", order.unit_id))?;
                let range = self
                    .grid()
                    .as_ref()
                    .map(|g| g.projection().distance_m(&position, &objective))
                    .unwrap_or(0.0);
                Effect {
                    narrative: format!("{} engaged objective at {:.0} m", order.unit_id, range),
                    moved_to: None,
                }
            }
            (OrderKind::Defend, _) => Effect {
                narrative: format!("{} holds position", order.unit_id),
                moved_to: None,
            },
            (OrderKind::Recon, _) => Effect {
                narrative: format!("{} scouted the area", order.unit_id),
                moved_to: None,
            },
            (OrderKind::Wait, _) => Effect {
                narrative: format!("{} waited {:.0} s", order.unit_id, order.estimated_duration_secs),
                moved_to: None,
            },
            (OrderKind::Move, _) => return Err(format!("move of {} has no destination", order.unit_id)),
        };
        debug!(unit = %order.unit_id, kind = ?order.kind, "order executed");
        Ok(effect)
    }
}
