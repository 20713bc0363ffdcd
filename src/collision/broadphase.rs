use std::collections::{HashMap, HashSet};

use glam::DVec3;

use crate::{
    backend::impulse::{NativeBodyId, NativeGeomId, NativeTransform},
    core::GeomShape,
};

/// Geoms whose bounding sphere spans more cells than this per axis skip the
/// grid and are paired against every proxy instead.
const MAX_CELLS_PER_AXIS: f64 = 8.0;

/// A geom placed in the world for one collision phase.
#[derive(Debug, Clone, Copy)]
pub struct Proxy<'a> {
    pub geom: NativeGeomId,
    pub body: NativeBodyId,
    pub is_static: bool,
    pub transform: NativeTransform,
    pub shape: &'a GeomShape,
}

impl<'a> Proxy<'a> {
    pub fn bounding_radius(&self) -> f64 {
        self.shape.bounding_radius()
    }
}

/// Uniform grid over bounding spheres.
pub struct SpatialGrid {
    cell_size: f64,
    grid: HashMap<(i64, i64, i64), Vec<usize>>,
}

impl SpatialGrid {
    pub fn new(cell_size: f64) -> Self {
        Self {
            cell_size,
            grid: HashMap::new(),
        }
    }

    fn world_to_grid(&self, pos: DVec3) -> (i64, i64, i64) {
        (
            (pos.x / self.cell_size).floor() as i64,
            (pos.y / self.cell_size).floor() as i64,
            (pos.z / self.cell_size).floor() as i64,
        )
    }

    pub fn clear(&mut self) {
        self.grid.clear();
    }

    pub fn insert(&mut self, proxy: usize, position: DVec3, radius: f64) {
        let min_cell = self.world_to_grid(position - DVec3::splat(radius));
        let max_cell = self.world_to_grid(position + DVec3::splat(radius));

        for x in min_cell.0..=max_cell.0 {
            for y in min_cell.1..=max_cell.1 {
                for z in min_cell.2..=max_cell.2 {
                    self.grid.entry((x, y, z)).or_default().push(proxy);
                }
            }
        }
    }

    pub fn query(&self, position: DVec3, radius: f64) -> Vec<usize> {
        let mut results = Vec::new();
        let min_cell = self.world_to_grid(position - DVec3::splat(radius));
        let max_cell = self.world_to_grid(position + DVec3::splat(radius));

        for x in min_cell.0..=max_cell.0 {
            for y in min_cell.1..=max_cell.1 {
                for z in min_cell.2..=max_cell.2 {
                    if let Some(proxies) = self.grid.get(&(x, y, z)) {
                        results.extend(proxies);
                    }
                }
            }
        }

        results.sort_unstable();
        results.dedup();
        results
    }
}

/// Broad phase returning candidate proxy pairs by index.
pub struct BroadPhase {
    grid: SpatialGrid,
    cell_size: f64,
}

impl BroadPhase {
    pub fn new(cell_size: f64) -> Self {
        Self {
            grid: SpatialGrid::new(cell_size),
            cell_size,
        }
    }

    /// Pairs `(i, j)` with `i < j`, sorted, excluding same-body and static-static pairs.
    ///
    /// Unbounded geoms (planes, or anything spanning too many cells) are tested
    /// against every other proxy.
    pub fn potential_pairs(&mut self, proxies: &[Proxy<'_>]) -> Vec<(usize, usize)> {
        self.grid.clear();

        let mut unbounded = Vec::new();
        for (index, proxy) in proxies.iter().enumerate() {
            let radius = proxy.bounding_radius();
            if self.fits_grid(radius) {
                self.grid
                    .insert(index, proxy.transform.origin, radius);
            } else {
                unbounded.push(index);
            }
        }

        let mut checked = HashSet::new();
        let mut pairs = Vec::new();
        let mut push = |i: usize, j: usize| {
            let key = if i < j { (i, j) } else { (j, i) };
            if i != j && Self::may_collide(&proxies[key.0], &proxies[key.1]) && checked.insert(key)
            {
                pairs.push(key);
            }
        };

        for (index, proxy) in proxies.iter().enumerate() {
            let radius = proxy.bounding_radius();
            if !self.fits_grid(radius) {
                continue;
            }
            for other in self.grid.query(proxy.transform.origin, radius) {
                push(index, other);
            }
        }
        for &wide in &unbounded {
            for other in 0..proxies.len() {
                push(wide, other);
            }
        }

        pairs.sort_unstable();
        pairs
    }

    fn fits_grid(&self, radius: f64) -> bool {
        radius.is_finite() && 2.0 * radius / self.cell_size <= MAX_CELLS_PER_AXIS
    }

    fn may_collide(a: &Proxy<'_>, b: &Proxy<'_>) -> bool {
        a.body != b.body && !(a.is_static && b.is_static)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::allocator::GenerationalId;

    fn proxy(body: u32, is_static: bool, origin: DVec3, shape: &GeomShape) -> Proxy<'_> {
        Proxy {
            geom: NativeGeomId(GenerationalId::new(body, 0)),
            body: NativeBodyId(GenerationalId::new(body, 0)),
            is_static,
            transform: NativeTransform::new(glam::DMat3::IDENTITY, origin),
            shape,
        }
    }

    #[test]
    fn nearby_spheres_pair_and_distant_ones_do_not() {
        let ball = GeomShape::sphere(0.5);
        let proxies = [
            proxy(0, false, DVec3::ZERO, &ball),
            proxy(1, false, DVec3::new(0.8, 0.0, 0.0), &ball),
            proxy(2, false, DVec3::new(50.0, 0.0, 0.0), &ball),
        ];
        let mut broadphase = BroadPhase::new(2.0);
        assert_eq!(broadphase.potential_pairs(&proxies), vec![(0, 1)]);
    }

    #[test]
    fn planes_pair_with_every_dynamic_proxy() {
        let ball = GeomShape::sphere(0.5);
        let ground = GeomShape::ground_plane(DVec3::Z);
        let proxies = [
            proxy(0, true, DVec3::ZERO, &ground),
            proxy(1, false, DVec3::new(0.0, 0.0, 100.0), &ball),
            proxy(2, true, DVec3::new(3.0, 0.0, 0.0), &ball),
        ];
        let mut broadphase = BroadPhase::new(2.0);
        assert_eq!(broadphase.potential_pairs(&proxies), vec![(0, 1)]);
    }

    #[test]
    fn wide_boxes_bypass_the_grid() {
        let floor = GeomShape::cuboid(DVec3::new(200.0, 200.0, 0.5));
        let ball = GeomShape::sphere(0.5);
        let proxies = [
            proxy(0, true, DVec3::ZERO, &floor),
            proxy(1, false, DVec3::new(150.0, -120.0, 1.0), &ball),
            proxy(2, false, DVec3::new(150.5, -120.0, 1.0), &ball),
        ];
        let mut broadphase = BroadPhase::new(2.0);
        assert_eq!(
            broadphase.potential_pairs(&proxies),
            vec![(0, 1), (0, 2), (1, 2)]
        );
        // Only the two small spheres were rasterized.
        assert!(broadphase.grid.grid.len() <= 8, "{} cells", broadphase.grid.grid.len());
    }
}
