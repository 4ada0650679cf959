//! Spatial interest management
//!
//! A uniform grid over world space. Every entity occupies exactly one cell
//! at a time; an observer query unions the cube of cells within its radius,
//! rounded up to whole cells. The grid may return entities slightly beyond
//! the radius (cell granularity), but never misses one inside it. Scoping
//! replication to this set bounds per-subscriber bandwidth by local density
//! instead of world size.

use std::collections::{HashMap, HashSet};

use strafe_core::{EntityId, Vec3};

/// Default edge length of a grid cell, in world units.
pub const DEFAULT_CELL_SIZE: f32 = 64.0;

/// Integer cell coordinate: world position divided by cell size, floored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CellCoord {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

/// Uniform-grid spatial index over entity positions.
pub struct InterestGrid {
    cell_size: f32,
    cells: HashMap<CellCoord, HashSet<EntityId>>,
    placements: HashMap<EntityId, CellCoord>,
}

impl InterestGrid {
    pub fn new(cell_size: f32) -> Self {
        assert!(
            cell_size > 0.0 && cell_size.is_finite(),
            "cell size must be positive"
        );
        InterestGrid {
            cell_size,
            cells: HashMap::new(),
            placements: HashMap::new(),
        }
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    pub fn entity_count(&self) -> usize {
        self.placements.len()
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    #[inline]
    fn cell_of(&self, position: Vec3) -> CellCoord {
        CellCoord {
            x: (position.x / self.cell_size).floor() as i32,
            y: (position.y / self.cell_size).floor() as i32,
            z: (position.z / self.cell_size).floor() as i32,
        }
    }

    /// Place or relocate an entity. Membership in any previous cell ends
    /// here; an entity is never in two cells.
    pub fn update_entity(&mut self, id: EntityId, position: Vec3) {
        let target = self.cell_of(position);

        if let Some(&previous) = self.placements.get(&id) {
            if previous == target {
                return;
            }
            self.evict(id, previous);
        }

        self.cells.entry(target).or_default().insert(id);
        self.placements.insert(id, target);
    }

    /// Drop an entity from the index. Returns false if it was not tracked.
    pub fn remove_entity(&mut self, id: EntityId) -> bool {
        match self.placements.remove(&id) {
            Some(cell) => {
                self.evict(id, cell);
                true
            }
            None => false,
        }
    }

    fn evict(&mut self, id: EntityId, cell: CellCoord) {
        if let Some(members) = self.cells.get_mut(&cell) {
            members.remove(&id);
            if members.is_empty() {
                self.cells.remove(&cell);
            }
        }
    }

    /// All entities within `radius` of `center`, by whole-cell coverage.
    pub fn query(&self, center: Vec3, radius: f32) -> HashSet<EntityId> {
        let steps = if radius > 0.0 {
            (radius / self.cell_size).ceil() as i32
        } else {
            0
        };
        let origin = self.cell_of(center);

        let mut result = HashSet::new();
        for dx in -steps..=steps {
            for dy in -steps..=steps {
                for dz in -steps..=steps {
                    let cell = CellCoord {
                        x: origin.x + dx,
                        y: origin.y + dy,
                        z: origin.z + dz,
                    };
                    if let Some(members) = self.cells.get(&cell) {
                        result.extend(members.iter().copied());
                    }
                }
            }
        }
        result
    }
}

impl Default for InterestGrid {
    fn default() -> Self {
        InterestGrid::new(DEFAULT_CELL_SIZE)
    }
}
