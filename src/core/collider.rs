use std::fmt;
use std::str::FromStr;

use glam::DVec3;
use serde::{Deserialize, Serialize};

use super::types::Pose;
use crate::error::{PhysicsError, Result};

/// Closed set of collision shape kinds a geom can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShapeType {
    Sphere,
    Box,
    Capsule,
    Cylinder,
    Plane,
    TriMesh,
    Heightfield,
}

impl ShapeType {
    pub const ALL: [ShapeType; 7] = [
        ShapeType::Sphere,
        ShapeType::Box,
        ShapeType::Capsule,
        ShapeType::Cylinder,
        ShapeType::Plane,
        ShapeType::TriMesh,
        ShapeType::Heightfield,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            ShapeType::Sphere => "sphere",
            ShapeType::Box => "box",
            ShapeType::Capsule => "capsule",
            ShapeType::Cylinder => "cylinder",
            ShapeType::Plane => "plane",
            ShapeType::TriMesh => "trimesh",
            ShapeType::Heightfield => "heightfield",
        }
    }
}

impl fmt::Display for ShapeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for ShapeType {
    type Err = PhysicsError;

    fn from_str(s: &str) -> Result<Self> {
        let tag = s.trim().to_ascii_lowercase();
        ShapeType::ALL
            .into_iter()
            .find(|kind| kind.tag() == tag)
            .ok_or_else(|| PhysicsError::UnsupportedShape(format!("unrecognized shape tag `{s}`")))
    }
}

/// Shape parameters, expressed in the geom's local frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GeomShape {
    Sphere {
        radius: f64,
    },
    Box {
        half_extents: DVec3,
    },
    /// Segment along local Z of the given length, swept by `radius`.
    Capsule {
        radius: f64,
        length: f64,
    },
    /// Cylinder aligned with local Z.
    Cylinder {
        radius: f64,
        length: f64,
    },
    /// Half-space `normal · p <= offset`; infinite, only meaningful on static bodies.
    Plane {
        normal: DVec3,
        offset: f64,
    },
    TriMesh {
        vertices: Vec<DVec3>,
        indices: Vec<[u32; 3]>,
    },
    Heightfield {
        rows: usize,
        columns: usize,
        heights: Vec<f64>,
        cell_size: f64,
    },
}

impl GeomShape {
    pub fn sphere(radius: f64) -> Self {
        GeomShape::Sphere { radius }
    }

    pub fn cuboid(half_extents: DVec3) -> Self {
        GeomShape::Box { half_extents }
    }

    pub fn capsule(radius: f64, length: f64) -> Self {
        GeomShape::Capsule { radius, length }
    }

    pub fn ground_plane(normal: DVec3) -> Self {
        GeomShape::Plane {
            normal,
            offset: 0.0,
        }
    }

    pub fn shape_type(&self) -> ShapeType {
        match self {
            GeomShape::Sphere { .. } => ShapeType::Sphere,
            GeomShape::Box { .. } => ShapeType::Box,
            GeomShape::Capsule { .. } => ShapeType::Capsule,
            GeomShape::Cylinder { .. } => ShapeType::Cylinder,
            GeomShape::Plane { .. } => ShapeType::Plane,
            GeomShape::TriMesh { .. } => ShapeType::TriMesh,
            GeomShape::Heightfield { .. } => ShapeType::Heightfield,
        }
    }

    /// Rejects non-finite or degenerate parameters.
    pub fn validate(&self) -> Result<()> {
        let positive = |name: &str, value: f64| {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(PhysicsError::InvalidGeometry(format!(
                    "{} {name} must be positive and finite, got {value}",
                    self.shape_type()
                )))
            }
        };

        match self {
            GeomShape::Sphere { radius } => positive("radius", *radius),
            GeomShape::Box { half_extents } => {
                positive("half extent x", half_extents.x)?;
                positive("half extent y", half_extents.y)?;
                positive("half extent z", half_extents.z)
            }
            GeomShape::Capsule { radius, length } | GeomShape::Cylinder { radius, length } => {
                positive("radius", *radius)?;
                if length.is_finite() && *length >= 0.0 {
                    Ok(())
                } else {
                    Err(PhysicsError::InvalidGeometry(format!(
                        "{} length must be non-negative, got {length}",
                        self.shape_type()
                    )))
                }
            }
            GeomShape::Plane { normal, offset } => {
                if !normal.is_finite() || !offset.is_finite() || normal.length() < 1e-12 {
                    return Err(PhysicsError::InvalidGeometry(
                        "plane needs a finite non-zero normal".to_string(),
                    ));
                }
                Ok(())
            }
            GeomShape::TriMesh { vertices, indices } => {
                if vertices.iter().any(|v| !v.is_finite()) {
                    return Err(PhysicsError::InvalidGeometry(
                        "trimesh has non-finite vertices".to_string(),
                    ));
                }
                let count = vertices.len() as u32;
                if indices.is_empty() || indices.iter().flatten().any(|i| *i >= count) {
                    return Err(PhysicsError::InvalidGeometry(
                        "trimesh indices are empty or out of range".to_string(),
                    ));
                }
                Ok(())
            }
            GeomShape::Heightfield {
                rows,
                columns,
                heights,
                cell_size,
            } => {
                positive("cell size", *cell_size)?;
                if *rows < 2 || *columns < 2 || heights.len() != rows * columns {
                    return Err(PhysicsError::InvalidGeometry(format!(
                        "heightfield needs at least 2x2 samples and {} heights, got {}",
                        rows * columns,
                        heights.len()
                    )));
                }
                Ok(())
            }
        }
    }

    /// Radius of a sphere around the local origin that encloses the shape.
    ///
    /// Infinite for planes.
    pub fn bounding_radius(&self) -> f64 {
        match self {
            GeomShape::Sphere { radius } => *radius,
            GeomShape::Box { half_extents } => half_extents.length(),
            GeomShape::Capsule { radius, length } => radius + 0.5 * length,
            GeomShape::Cylinder { radius, length } => (radius * radius + 0.25 * length * length).sqrt(),
            GeomShape::Plane { .. } => f64::INFINITY,
            GeomShape::TriMesh { vertices, .. } => {
                vertices.iter().map(|v| v.length()).fold(0.0, f64::max)
            }
            GeomShape::Heightfield {
                rows,
                columns,
                heights,
                cell_size,
            } => {
                let half_x = 0.5 * (*columns as f64 - 1.0) * cell_size;
                let half_y = 0.5 * (*rows as f64 - 1.0) * cell_size;
                let top = heights.iter().fold(0.0f64, |acc, h| acc.max(h.abs()));
                DVec3::new(half_x, half_y, top).length()
            }
        }
    }
}

/// A shape plus its placement relative to the owning body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeomDesc {
    pub shape: GeomShape,
    pub offset: Pose,
}

impl GeomDesc {
    pub fn new(shape: GeomShape) -> Self {
        Self {
            shape,
            offset: Pose::default(),
        }
    }

    pub fn with_offset(mut self, offset: Pose) -> Self {
        self.offset = offset;
        self
    }

    pub fn shape_type(&self) -> ShapeType {
        self.shape.shape_type()
    }
}

impl From<GeomShape> for GeomDesc {
    fn from(shape: GeomShape) -> Self {
        Self::new(shape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_round_trip() {
        for kind in ShapeType::ALL {
            assert_eq!(kind.tag().parse::<ShapeType>().unwrap(), kind);
        }
        assert_eq!(" Sphere ".parse::<ShapeType>().unwrap(), ShapeType::Sphere);
    }

    #[test]
    fn unknown_tag_is_unsupported() {
        assert!(matches!(
            "torus".parse::<ShapeType>(),
            Err(PhysicsError::UnsupportedShape(_))
        ));
    }

    #[test]
    fn degenerate_shapes_fail_validation() {
        assert!(GeomShape::sphere(0.0).validate().is_err());
        assert!(GeomShape::sphere(f64::NAN).validate().is_err());
        assert!(GeomShape::cuboid(DVec3::new(1.0, -1.0, 1.0)).validate().is_err());
        assert!(GeomShape::ground_plane(DVec3::ZERO).validate().is_err());
        assert!(GeomShape::capsule(0.5, 0.0).validate().is_ok());
    }
}
