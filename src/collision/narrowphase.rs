use glam::{DMat3, DVec3};

use super::{broadphase::Proxy, contact::ContactPoint};
use crate::{
    backend::{
        impulse::{NativeBodyId, NativeTransform},
        NativeContact,
    },
    core::GeomShape,
};

const EPSILON: f64 = 1e-12;
/// Slack when deciding whether a box vertex lies inside the other box.
const VERTEX_TOLERANCE: f64 = 1e-9;

/// Primitive-pair contact generation for spheres, boxes, capsules and planes.
pub struct NarrowPhase;

impl NarrowPhase {
    /// Runs every candidate pair, in pair order.
    pub fn run(
        proxies: &[Proxy<'_>],
        pairs: &[(usize, usize)],
    ) -> Vec<NativeContact<NativeBodyId>> {
        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            pairs
                .par_iter()
                .flat_map_iter(|&(a, b)| Self::collide(&proxies[a], &proxies[b]))
                .collect()
        }
        #[cfg(not(feature = "parallel"))]
        {
            pairs
                .iter()
                .flat_map(|&(a, b)| Self::collide(&proxies[a], &proxies[b]))
                .collect()
        }
    }

    pub fn collide(a: &Proxy<'_>, b: &Proxy<'_>) -> Vec<NativeContact<NativeBodyId>> {
        Self::manifold(a.shape, &a.transform, b.shape, &b.transform)
            .into_iter()
            .map(|p| NativeContact {
                body_a: a.body,
                body_b: b.body,
                point: p.point,
                normal: p.normal,
                depth: p.depth,
            })
            .collect()
    }

    /// Contact points between two placed shapes, normals pointing from `a` to `b`.
    pub fn manifold(
        a: &GeomShape,
        ta: &NativeTransform,
        b: &GeomShape,
        tb: &NativeTransform,
    ) -> Vec<ContactPoint> {
        use GeomShape::*;

        match (a, b) {
            (Sphere { radius: ra }, Sphere { radius: rb }) => {
                sphere_sphere(ta.origin, *ra, tb.origin, *rb).into_iter().collect()
            }
            (Plane { normal, offset }, Sphere { radius }) => {
                let (n, d) = world_plane(*normal, *offset, ta);
                plane_sphere(n, d, tb.origin, *radius).into_iter().collect()
            }
            (Sphere { .. }, Plane { .. }) => flip_all(Self::manifold(b, tb, a, ta)),
            (Box { half_extents }, Sphere { radius }) => {
                box_sphere(*half_extents, ta, tb.origin, *radius).into_iter().collect()
            }
            (Sphere { .. }, Box { .. }) => flip_all(Self::manifold(b, tb, a, ta)),
            (Plane { normal, offset }, Box { half_extents }) => {
                let (n, d) = world_plane(*normal, *offset, ta);
                plane_box(n, d, *half_extents, tb)
            }
            (Box { .. }, Plane { .. }) => flip_all(Self::manifold(b, tb, a, ta)),
            (Box { half_extents: ha }, Box { half_extents: hb }) => box_box(*ha, ta, *hb, tb),
            (Capsule { radius, length }, _) => {
                capsule_against(segment(ta, *length), *radius, b, tb)
            }
            (_, Capsule { .. }) => flip_all(Self::manifold(b, tb, a, ta)),
            _ => Vec::new(),
        }
    }
}

fn flip_all(points: Vec<ContactPoint>) -> Vec<ContactPoint> {
    points.into_iter().map(ContactPoint::flipped).collect()
}

/// World-frame unit normal and offset of a plane geom.
fn world_plane(normal: DVec3, offset: f64, transform: &NativeTransform) -> (DVec3, f64) {
    let length = normal.length();
    let n = transform.transform_vector(normal / length);
    (n, offset / length + n.dot(transform.origin))
}

fn segment(transform: &NativeTransform, length: f64) -> (DVec3, DVec3) {
    let half = DVec3::new(0.0, 0.0, 0.5 * length);
    (
        transform.transform_point(-half),
        transform.transform_point(half),
    )
}

fn sphere_sphere(ca: DVec3, ra: f64, cb: DVec3, rb: f64) -> Option<ContactPoint> {
    let delta = cb - ca;
    let distance = delta.length();
    let depth = ra + rb - distance;
    if depth <= 0.0 {
        return None;
    }
    let normal = if distance > EPSILON {
        delta / distance
    } else {
        DVec3::Z
    };
    Some(ContactPoint {
        point: ca + normal * (ra - 0.5 * depth),
        normal,
        depth,
    })
}

fn plane_sphere(n: DVec3, d: f64, center: DVec3, radius: f64) -> Option<ContactPoint> {
    let height = n.dot(center) - d;
    let depth = radius - height;
    if depth <= 0.0 {
        return None;
    }
    Some(ContactPoint {
        point: center - n * (0.5 * (radius + height)),
        normal: n,
        depth,
    })
}

fn box_vertices(half_extents: DVec3, transform: &NativeTransform) -> [DVec3; 8] {
    let mut vertices = [DVec3::ZERO; 8];
    for (i, vertex) in vertices.iter_mut().enumerate() {
        let sign = DVec3::new(
            if i & 1 == 0 { -1.0 } else { 1.0 },
            if i & 2 == 0 { -1.0 } else { 1.0 },
            if i & 4 == 0 { -1.0 } else { 1.0 },
        );
        *vertex = transform.transform_point(sign * half_extents);
    }
    vertices
}

fn plane_box(n: DVec3, d: f64, half_extents: DVec3, tb: &NativeTransform) -> Vec<ContactPoint> {
    box_vertices(half_extents, tb)
        .into_iter()
        .filter_map(|vertex| {
            let height = n.dot(vertex) - d;
            (height < 0.0).then(|| ContactPoint {
                point: vertex - n * (0.5 * height),
                normal: n,
                depth: -height,
            })
        })
        .collect()
}

/// Box first, sphere second.
fn box_sphere(
    half_extents: DVec3,
    ta: &NativeTransform,
    center: DVec3,
    radius: f64,
) -> Option<ContactPoint> {
    let local = ta.inverse_transform_point(center);
    let clamped = local.clamp(-half_extents, half_extents);
    let delta = local - clamped;
    let distance_sq = delta.length_squared();

    let (local_normal, depth) = if distance_sq > EPSILON * EPSILON {
        let distance = distance_sq.sqrt();
        if distance >= radius {
            return None;
        }
        (delta / distance, radius - distance)
    } else {
        // Centre inside the box: push out through the nearest face.
        let gaps = half_extents - local.abs();
        let axis = if gaps.x <= gaps.y && gaps.x <= gaps.z {
            0
        } else if gaps.y <= gaps.z {
            1
        } else {
            2
        };
        let mut normal = DVec3::ZERO;
        normal[axis] = if local[axis] < 0.0 { -1.0 } else { 1.0 };
        (normal, radius + gaps[axis])
    };

    let normal = ta.transform_vector(local_normal);
    Some(ContactPoint {
        point: center - normal * (radius - 0.5 * depth),
        normal,
        depth,
    })
}

fn projected_extent(axes: &DMat3, half_extents: DVec3, axis: DVec3) -> f64 {
    axes.x_axis.dot(axis).abs() * half_extents.x
        + axes.y_axis.dot(axis).abs() * half_extents.y
        + axes.z_axis.dot(axis).abs() * half_extents.z
}

fn inside_box(half_extents: DVec3, transform: &NativeTransform, point: DVec3) -> bool {
    let local = transform.inverse_transform_point(point).abs();
    let limit = half_extents + DVec3::splat(VERTEX_TOLERANCE);
    local.x <= limit.x && local.y <= limit.y && local.z <= limit.z
}

/// Separating-axis test over the 15 box axes, then vertex-in-box contact points.
fn box_box(
    ha: DVec3,
    ta: &NativeTransform,
    hb: DVec3,
    tb: &NativeTransform,
) -> Vec<ContactPoint> {
    let relative = tb.origin - ta.origin;
    let axes_a = ta.basis;
    let axes_b = tb.basis;

    let mut candidates = Vec::with_capacity(15);
    candidates.extend([axes_a.x_axis, axes_a.y_axis, axes_a.z_axis]);
    candidates.extend([axes_b.x_axis, axes_b.y_axis, axes_b.z_axis]);
    for edge_a in [axes_a.x_axis, axes_a.y_axis, axes_a.z_axis] {
        for edge_b in [axes_b.x_axis, axes_b.y_axis, axes_b.z_axis] {
            let axis = edge_a.cross(edge_b);
            if axis.length_squared() > 1e-10 {
                candidates.push(axis.normalize());
            }
        }
    }

    let mut min_overlap = f64::MAX;
    let mut normal = DVec3::ZERO;
    for axis in candidates {
        let extent_a = projected_extent(&axes_a, ha, axis);
        let extent_b = projected_extent(&axes_b, hb, axis);
        let projection = relative.dot(axis);
        let overlap = extent_a + extent_b - projection.abs();
        if overlap <= 0.0 {
            return Vec::new();
        }
        // Face axes come first and win ties, which keeps stacked boxes flat.
        if overlap < min_overlap - 1e-9 {
            min_overlap = overlap;
            normal = if projection < 0.0 { -axis } else { axis };
        }
    }

    let reach_a = normal.dot(ta.origin) + projected_extent(&axes_a, ha, normal);
    let reach_b = normal.dot(tb.origin) - projected_extent(&axes_b, hb, normal);

    let mut points = Vec::new();
    for vertex in box_vertices(hb, tb) {
        if inside_box(ha, ta, vertex) {
            let depth = (reach_a - normal.dot(vertex)).clamp(0.0, min_overlap);
            points.push(ContactPoint {
                point: vertex + normal * (0.5 * depth),
                normal,
                depth,
            });
        }
    }
    for vertex in box_vertices(ha, ta) {
        if inside_box(hb, tb, vertex) {
            let depth = (normal.dot(vertex) - reach_b).clamp(0.0, min_overlap);
            points.push(ContactPoint {
                point: vertex - normal * (0.5 * depth),
                normal,
                depth,
            });
        }
    }

    if points.is_empty() {
        // Edge against edge: a single point halfway between the deepest features.
        let support_a = ta.origin + normal * (projected_extent(&axes_a, ha, normal) - 0.5 * min_overlap);
        points.push(ContactPoint {
            point: support_a,
            normal,
            depth: min_overlap,
        });
    }
    points
}

fn closest_on_segment(p0: DVec3, p1: DVec3, point: DVec3) -> DVec3 {
    let edge = p1 - p0;
    let length_sq = edge.length_squared();
    if length_sq <= EPSILON {
        return p0;
    }
    let t = ((point - p0).dot(edge) / length_sq).clamp(0.0, 1.0);
    p0 + edge * t
}

/// Closest points between segments `p0-p1` and `q0-q1`.
fn closest_between_segments(p0: DVec3, p1: DVec3, q0: DVec3, q1: DVec3) -> (DVec3, DVec3) {
    let d1 = p1 - p0;
    let d2 = q1 - q0;
    let r = p0 - q0;
    let a = d1.length_squared();
    let e = d2.length_squared();
    let f = d2.dot(r);

    if a <= EPSILON && e <= EPSILON {
        return (p0, q0);
    }
    let (s, t) = if a <= EPSILON {
        (0.0, (f / e).clamp(0.0, 1.0))
    } else {
        let c = d1.dot(r);
        if e <= EPSILON {
            ((-c / a).clamp(0.0, 1.0), 0.0)
        } else {
            let b = d1.dot(d2);
            let denom = a * e - b * b;
            let mut s = if denom > EPSILON {
                ((b * f - c * e) / denom).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let mut t = (b * s + f) / e;
            if t < 0.0 {
                t = 0.0;
                s = (-c / a).clamp(0.0, 1.0);
            } else if t > 1.0 {
                t = 1.0;
                s = ((b - c) / a).clamp(0.0, 1.0);
            }
            (s, t)
        }
    };
    (p0 + d1 * s, q0 + d2 * t)
}

/// Capsule first (as a swept segment), any supported shape second.
fn capsule_against(
    (p0, p1): (DVec3, DVec3),
    radius: f64,
    other: &GeomShape,
    to: &NativeTransform,
) -> Vec<ContactPoint> {
    match other {
        GeomShape::Sphere { radius: rs } => {
            let core = closest_on_segment(p0, p1, to.origin);
            sphere_sphere(core, radius, to.origin, *rs).into_iter().collect()
        }
        GeomShape::Capsule {
            radius: rb,
            length,
        } => {
            let (q0, q1) = segment(to, *length);
            let (a, b) = closest_between_segments(p0, p1, q0, q1);
            sphere_sphere(a, radius, b, *rb).into_iter().collect()
        }
        GeomShape::Plane { normal, offset } => {
            let (n, d) = world_plane(*normal, *offset, to);
            [p0, p1]
                .into_iter()
                .filter_map(|end| plane_sphere(n, d, end, radius))
                .map(ContactPoint::flipped)
                .collect()
        }
        GeomShape::Box { half_extents } => {
            let middle = closest_on_segment(p0, p1, to.origin);
            let mut probes = vec![p0, p1];
            if middle.distance_squared(p0) > EPSILON && middle.distance_squared(p1) > EPSILON {
                probes.push(middle);
            }
            probes
                .into_iter()
                .filter_map(|center| box_sphere(*half_extents, to, center, radius))
                .map(ContactPoint::flipped)
                .collect()
        }
        _ => Vec::new(),
    }
}
