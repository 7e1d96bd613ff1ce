use crate::error::{Error, Result};
use glam::DVec3;
use std::f64::{INFINITY, NEG_INFINITY};

/// Determinants below this are treated as a segment running parallel to a triangle.
const PARALLEL_EPSILON: f64 = 1e-12;

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Aabb {
    pub min: DVec3,
    pub max: DVec3,
}

impl Aabb {
    /// A box containing nothing, growing it with any point yields a box around just that point.
    pub fn empty() -> Self {
        Aabb {
            min: DVec3::splat(INFINITY),
            max: DVec3::splat(-INFINITY),
        }
    }

    pub fn grow(&mut self, point: DVec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Index of the axis along which the box is widest.
    pub fn longest_axis(&self) -> usize {
        let extent = self.max - self.min;
        if extent.x >= extent.y && extent.x >= extent.z {
            0
        } else if extent.y >= extent.z {
            1
        } else {
            2
        }
    }

    /// Slab test of the parametric segment `origin + t * delta`, `t` in `[0, t_max]`.
    ///
    /// `inv_delta` is the componentwise reciprocal of `delta`. Along axes the
    /// segment does not move on, it is infinite and the origin alone decides.
    pub fn hit_by(&self, origin: DVec3, inv_delta: DVec3, t_max: f64) -> bool {
        let mut enter = NEG_INFINITY;
        let mut exit = INFINITY;

        for axis in 0..3 {
            if inv_delta[axis].is_infinite() {
                if origin[axis] < self.min[axis] || origin[axis] > self.max[axis] {
                    return false;
                }
                continue;
            }

            let t1 = (self.min[axis] - origin[axis]) * inv_delta[axis];
            let t2 = (self.max[axis] - origin[axis]) * inv_delta[axis];
            enter = enter.max(t1.min(t2));
            exit = exit.min(t1.max(t2));
        }

        enter <= exit && exit >= 0.0 && enter <= t_max
    }
}

/// A straight motion from `origin` to `origin + delta`, parametrized over `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub origin: DVec3,
    pub delta: DVec3,
}

impl Segment {
    pub fn new(origin: DVec3, delta: DVec3) -> Self {
        Segment { origin, delta }
    }

    pub fn between(from: DVec3, to: DVec3) -> Self {
        Segment {
            origin: from,
            delta: to - from,
        }
    }

    pub fn point_at(&self, t: f64) -> DVec3 {
        self.origin + t * self.delta
    }

    pub fn end(&self) -> DVec3 {
        self.origin + self.delta
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    pub a: DVec3,
    pub b: DVec3,
    pub c: DVec3,
}

impl Triangle {
    pub fn new(a: DVec3, b: DVec3, c: DVec3) -> Self {
        Triangle { a, b, c }
    }

    /// Unit normal following counter-clockwise winding, zero for degenerate triangles.
    pub fn normal(&self) -> DVec3 {
        (self.b - self.a).cross(self.c - self.a).normalize_or_zero()
    }

    pub fn centroid(&self) -> DVec3 {
        (self.a + self.b + self.c) / 3.0
    }

    pub(crate) fn bounds(&self) -> Aabb {
        let mut bounds = Aabb::empty();
        bounds.grow(self.a);
        bounds.grow(self.b);
        bounds.grow(self.c);
        bounds
    }

    /// Möller-Trumbore intersection, returns the segment parameter of the hit in `[0, 1]`.
    pub fn intersect(&self, segment: &Segment) -> Option<f64> {
        let edge1 = self.b - self.a;
        let edge2 = self.c - self.a;
        let p = segment.delta.cross(edge2);
        let det = edge1.dot(p);

        if det.abs() < PARALLEL_EPSILON {
            return None;
        }

        let inv_det = det.recip();
        let s = segment.origin - self.a;
        let u = s.dot(p) * inv_det;
        if u < 0.0 || u > 1.0 {
            return None;
        }

        let q = s.cross(edge1);
        let v = segment.delta.dot(q) * inv_det;
        if v < 0.0 || u + v > 1.0 {
            return None;
        }

        let t = edge2.dot(q) * inv_det;
        if t >= 0.0 && t <= 1.0 {
            Some(t)
        } else {
            None
        }
    }
}

/// Solid obstacle surfaces as an indexed triangle list.
///
/// Winding is expected to be counter-clockwise seen from the free side so
/// that normals point out of the obstacles.
#[derive(Debug, Clone, Default)]
pub struct ObstacleMesh {
    vertices: Vec<DVec3>,
    indices: Vec<[usize; 3]>,
}

impl ObstacleMesh {
    pub fn new(vertices: Vec<DVec3>, indices: Vec<[usize; 3]>) -> Result<Self> {
        if let Some(bad) = vertices.iter().position(|v| !v.is_finite()) {
            return Err(Error::InvalidMesh(format!("vertex {} is not finite", bad)));
        }

        for (tri_idx, tri) in indices.iter().enumerate() {
            if let Some(&idx) = tri.iter().find(|&&idx| idx >= vertices.len()) {
                return Err(Error::InvalidMesh(format!(
                    "triangle {} references vertex {} but only {} vertices exist",
                    tri_idx,
                    idx,
                    vertices.len()
                )));
            }
        }

        Ok(ObstacleMesh { vertices, indices })
    }

    pub fn empty() -> Self {
        ObstacleMesh::default()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len()
    }

    pub fn triangles<'a>(&'a self) -> impl Iterator<Item = Triangle> + 'a {
        self.indices.iter().map(move |&[a, b, c]| {
            Triangle::new(self.vertices[a], self.vertices[b], self.vertices[c])
        })
    }

    /// Adds a planar quad given counter-clockwise as seen from the side its normal points to.
    pub fn add_quad(&mut self, corners: [DVec3; 4]) {
        let base = self.vertices.len();
        self.vertices.extend_from_slice(&corners);
        self.indices.push([base, base + 1, base + 2]);
        self.indices.push([base, base + 2, base + 3]);
    }

    /// Adds a horizontal rectangle at height `z` facing upward, e.g. the ground.
    pub fn add_ground(&mut self, min: (f64, f64), max: (f64, f64), z: f64) {
        let (x0, y0) = min;
        let (x1, y1) = max;
        self.add_quad([
            DVec3::new(x0, y0, z),
            DVec3::new(x1, y0, z),
            DVec3::new(x1, y1, z),
            DVec3::new(x0, y1, z),
        ]);
    }

    /// Adds the six faces of an axis aligned block with outward facing normals.
    pub fn add_block(&mut self, min: DVec3, max: DVec3) {
        let (x0, y0, z0) = (min.x, min.y, min.z);
        let (x1, y1, z1) = (max.x, max.y, max.z);
        let v = DVec3::new;

        // bottom, top
        self.add_quad([v(x0, y0, z0), v(x0, y1, z0), v(x1, y1, z0), v(x1, y0, z0)]);
        self.add_quad([v(x0, y0, z1), v(x1, y0, z1), v(x1, y1, z1), v(x0, y1, z1)]);
        // south, north
        self.add_quad([v(x0, y0, z0), v(x1, y0, z0), v(x1, y0, z1), v(x0, y0, z1)]);
        self.add_quad([v(x0, y1, z0), v(x0, y1, z1), v(x1, y1, z1), v(x1, y1, z0)]);
        // west, east
        self.add_quad([v(x0, y0, z0), v(x0, y0, z1), v(x0, y1, z1), v(x0, y1, z0)]);
        self.add_quad([v(x1, y0, z0), v(x1, y1, z0), v(x1, y1, z1), v(x1, y0, z1)]);
    }
}
