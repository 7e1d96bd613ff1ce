use crate::geom::{Aabb, Segment, Triangle};
use glam::DVec3;
use std::cmp::Ordering;

/// Subtrees with at most this many triangles are not split any further.
const MAX_LEAF_TRIANGLES: usize = 4;

/// Candidate intersection of a query segment with a mesh triangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitRecord {
    /// Segment parameter of the hit in `[0, 1]`.
    pub t: f64,
    pub point: DVec3,
    /// Unit normal of the hit triangle as wound in the mesh.
    pub normal: DVec3,
    /// Index of the triangle in the order it was passed to `Bvh::build`.
    pub triangle: usize,
}

#[derive(Debug, Clone)]
enum NodeKind {
    /// Range into `Bvh::order`.
    Leaf { first: usize, count: usize },
    Interior { left: usize, right: usize },
}

#[derive(Debug, Clone)]
struct Node {
    bounds: Aabb,
    kind: NodeKind,
}

/// Bounding volume hierarchy over a static triangle set.
///
/// Built once, immutable afterwards, so any number of threads may query it
/// at the same time.
#[derive(Debug, Clone)]
pub struct Bvh {
    triangles: Vec<Triangle>,
    normals: Vec<DVec3>,
    /// Triangle indices, permuted so that every leaf owns a contiguous range.
    order: Vec<usize>,
    /// Nodes in depth-first order, the root is at index 0 if there are any triangles.
    nodes: Vec<Node>,
}

impl Bvh {
    pub fn build<I>(triangles: I) -> Self
    where
        I: IntoIterator<Item = Triangle>,
    {
        // Degenerate triangles stay in place to keep indices stable, they are never hit
        let triangles: Vec<Triangle> = triangles.into_iter().collect();

        let normals = triangles.iter().map(Triangle::normal).collect();
        let centroids: Vec<DVec3> = triangles.iter().map(Triangle::centroid).collect();
        let mut order: Vec<usize> = (0..triangles.len()).collect();
        let mut nodes = Vec::with_capacity(2 * triangles.len() / MAX_LEAF_TRIANGLES + 1);

        if !triangles.is_empty() {
            Self::build_node(&triangles, &centroids, &mut order, 0, &mut nodes);
        }

        Bvh {
            triangles,
            normals,
            order,
            nodes,
        }
    }

    /// Recursively builds the subtree over `order[first..first + len]`, returns its node index.
    fn build_node(
        triangles: &[Triangle],
        centroids: &[DVec3],
        order: &mut [usize],
        first: usize,
        nodes: &mut Vec<Node>,
    ) -> usize {
        let bounds = order
            .iter()
            .fold(Aabb::empty(), |b, &idx| b.union(&triangles[idx].bounds()));

        let node_idx = nodes.len();
        nodes.push(Node {
            bounds,
            kind: NodeKind::Leaf {
                first,
                count: order.len(),
            },
        });

        if order.len() <= MAX_LEAF_TRIANGLES {
            return node_idx;
        }

        // Median split of centroids along the axis where centroids spread the most
        let centroid_bounds = order.iter().fold(Aabb::empty(), |mut b, &idx| {
            b.grow(centroids[idx]);
            b
        });
        let axis = centroid_bounds.longest_axis();
        let mid = order.len() / 2;
        order.select_nth_unstable_by(mid, |&l, &r| {
            centroids[l][axis]
                .partial_cmp(&centroids[r][axis])
                .unwrap_or(Ordering::Equal)
        });

        let (left_order, right_order) = order.split_at_mut(mid);
        let left = Self::build_node(triangles, centroids, left_order, first, nodes);
        let right = Self::build_node(triangles, centroids, right_order, first + mid, nodes);
        nodes[node_idx].kind = NodeKind::Interior { left, right };

        node_idx
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Length of the longest root to leaf path, counting the root.
    pub fn depth(&self) -> usize {
        if self.nodes.is_empty() {
            return 0;
        }

        let mut deepest = 0;
        let mut stack = vec![(0, 1)];
        while let Some((node_idx, depth)) = stack.pop() {
            deepest = deepest.max(depth);
            if let NodeKind::Interior { left, right } = self.nodes[node_idx].kind {
                stack.push((left, depth + 1));
                stack.push((right, depth + 1));
            }
        }
        deepest
    }

    /// All intersections of the segment with the mesh, ordered nearest first.
    pub fn query(&self, segment: &Segment) -> Vec<HitRecord> {
        let mut hits = Vec::new();
        self.traverse(segment, |hit, _| {
            hits.push(hit);
            1.0
        });
        hits.sort_by(|l, r| l.t.partial_cmp(&r.t).unwrap_or(Ordering::Equal));
        hits
    }

    /// Nearest intersection of the segment with the mesh.
    ///
    /// Subtrees behind the nearest hit found so far are skipped.
    pub fn nearest(&self, segment: &Segment) -> Option<HitRecord> {
        let mut nearest: Option<HitRecord> = None;
        self.traverse(segment, |hit, t_max| match nearest {
            Some(ref best) if best.t <= hit.t => t_max,
            _ => {
                nearest = Some(hit);
                hit.t
            }
        });
        nearest
    }

    /// Visits every triangle hit whose node boxes are hit within the current
    /// parametric limit. The visitor returns the new limit.
    fn traverse<F>(&self, segment: &Segment, mut visit: F)
    where
        F: FnMut(HitRecord, f64) -> f64,
    {
        if self.nodes.is_empty() {
            return;
        }

        let inv_delta = segment.delta.recip();
        let mut t_max = 1.0;
        let mut stack = Vec::with_capacity(64);
        stack.push(0);

        while let Some(node_idx) = stack.pop() {
            let node = &self.nodes[node_idx];
            if !node.bounds.hit_by(segment.origin, inv_delta, t_max) {
                continue;
            }

            match node.kind {
                NodeKind::Interior { left, right } => {
                    stack.push(right);
                    stack.push(left);
                }
                NodeKind::Leaf { first, count } => {
                    for &tri_idx in &self.order[first..first + count] {
                        if let Some(t) = self.triangles[tri_idx].intersect(segment) {
                            if t <= t_max {
                                let hit = HitRecord {
                                    t,
                                    point: segment.point_at(t),
                                    normal: self.normals[tri_idx],
                                    triangle: tri_idx,
                                };
                                t_max = visit(hit, t_max);
                            }
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::geom::ObstacleMesh;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use rayon::prelude::*;

    fn random_soup(count: usize, rng: &mut StdRng) -> Vec<Triangle> {
        (0..count)
            .map(|_| {
                let centre = DVec3::new(
                    rng.gen_range(0.0..100.0),
                    rng.gen_range(0.0..100.0),
                    rng.gen_range(0.0..100.0),
                );
                let mut corner = || {
                    centre
                        + DVec3::new(
                            rng.gen_range(-3.0..3.0),
                            rng.gen_range(-3.0..3.0),
                            rng.gen_range(-3.0..3.0),
                        )
                };
                Triangle::new(corner(), corner(), corner())
            })
            .collect()
    }

    fn random_segment(rng: &mut StdRng) -> Segment {
        let from = DVec3::new(
            rng.gen_range(0.0..100.0),
            rng.gen_range(0.0..100.0),
            rng.gen_range(0.0..100.0),
        );
        let delta = DVec3::new(
            rng.gen_range(-30.0..30.0),
            rng.gen_range(-30.0..30.0),
            rng.gen_range(-30.0..30.0),
        );
        Segment::new(from, delta)
    }

    fn brute_force(triangles: &[Triangle], segment: &Segment) -> Vec<(usize, f64)> {
        let mut hits: Vec<(usize, f64)> = triangles
            .iter()
            .enumerate()
            .filter_map(|(idx, tri)| tri.intersect(segment).map(|t| (idx, t)))
            .collect();
        hits.sort_by(|l, r| l.1.partial_cmp(&r.1).unwrap());
        hits
    }

    fn encloses(outer: &Aabb, inner: &Aabb) -> bool {
        outer.min.cmple(inner.min).all() && outer.max.cmpge(inner.max).all()
    }

    #[test]
    fn test_interior_bounds_contain_subtrees() {
        let mut rng = StdRng::seed_from_u64(7);
        let bvh = Bvh::build(random_soup(500, &mut rng));

        for node in &bvh.nodes {
            match node.kind {
                NodeKind::Interior { left, right } => {
                    assert!(encloses(&node.bounds, &bvh.nodes[left].bounds));
                    assert!(encloses(&node.bounds, &bvh.nodes[right].bounds));
                }
                NodeKind::Leaf { first, count } => {
                    assert!(count <= MAX_LEAF_TRIANGLES);
                    for &idx in &bvh.order[first..first + count] {
                        assert!(encloses(&node.bounds, &bvh.triangles[idx].bounds()));
                    }
                }
            }
        }

        let mut seen = bvh.order.clone();
        seen.sort();
        assert_eq!(seen, (0..500).collect::<Vec<_>>());
    }

    #[test]
    fn test_depth_is_logarithmic() {
        let mut rng = StdRng::seed_from_u64(3);
        let bvh = Bvh::build(random_soup(4096, &mut rng));
        // Median splits halve the triangle count at each level
        assert!(bvh.depth() <= 12, "depth {} too large", bvh.depth());
    }

    #[test]
    fn test_query_agrees_with_brute_force() {
        let mut rng = StdRng::seed_from_u64(11);
        let triangles = random_soup(300, &mut rng);
        let bvh = Bvh::build(triangles.clone());

        let mut total_hits = 0;
        for _ in 0..500 {
            let segment = random_segment(&mut rng);
            let expected = brute_force(&triangles, &segment);
            let actual: Vec<(usize, f64)> = bvh
                .query(&segment)
                .iter()
                .map(|h| (h.triangle, h.t))
                .collect();

            assert_eq!(expected.len(), actual.len());
            for (e, a) in expected.iter().zip(actual.iter()) {
                assert_relative_eq!(e.1, a.1);
            }

            match (bvh.nearest(&segment), expected.first()) {
                (Some(hit), Some(&(_, t))) => assert_relative_eq!(hit.t, t),
                (None, None) => {}
                (hit, exp) => panic!("nearest {:?} but expected {:?}", hit, exp),
            }
            total_hits += expected.len();
        }

        assert!(total_hits > 0, "test segments should hit something");
    }

    #[test]
    fn test_hits_ordered_nearest_first() {
        let mut mesh = ObstacleMesh::empty();
        mesh.add_ground((-5.0, -5.0), (5.0, 5.0), 0.0);
        mesh.add_ground((-5.0, -5.0), (5.0, 5.0), 1.0);
        mesh.add_ground((-5.0, -5.0), (5.0, 5.0), 2.0);
        let bvh = Bvh::build(mesh.triangles());

        let down = Segment::between(DVec3::new(0.1, 0.2, 3.0), DVec3::new(0.1, 0.2, -1.0));
        let hits = bvh.query(&down);
        assert_eq!(hits.len(), 3);
        assert_relative_eq!(hits[0].point.z, 2.0);
        assert_relative_eq!(hits[1].point.z, 1.0);
        assert_relative_eq!(hits[2].point.z, 0.0);
        assert_relative_eq!(hits[0].t, 0.25);
        assert_relative_eq!(hits[0].normal.z, 1.0);

        let nearest = bvh.nearest(&down).unwrap();
        assert_eq!(nearest, hits[0]);
    }

    #[test]
    fn test_segment_stopping_short_misses() {
        let mut mesh = ObstacleMesh::empty();
        mesh.add_ground((-5.0, -5.0), (5.0, 5.0), 0.0);
        let bvh = Bvh::build(mesh.triangles());

        let short = Segment::between(DVec3::new(0.0, 0.0, 1.0), DVec3::new(0.0, 0.0, 0.01));
        assert!(bvh.query(&short).is_empty());
        assert_eq!(bvh.nearest(&short), None);
    }

    #[test]
    fn test_vertical_segment_on_ground_edge_hits() {
        // Flat root box, the segment does not move in x and starts on its faces
        let mut mesh = ObstacleMesh::empty();
        mesh.add_ground((0.0, 0.0), (10.0, 10.0), 0.0);
        let bvh = Bvh::build(mesh.triangles());

        for &x in &[0.0, 10.0] {
            let seg = Segment::between(DVec3::new(x, 5.0, 1.0), DVec3::new(x, 5.0, -1.0));
            let hit = bvh.nearest(&seg).expect("edge of the ground is hit");
            assert_relative_eq!(hit.t, 0.5, epsilon = 1e-12);
            assert_relative_eq!(hit.point.z, 0.0, epsilon = 1e-12);
            assert!(!bvh.query(&seg).is_empty());
        }

        let outside = Segment::between(DVec3::new(10.5, 5.0, 1.0), DVec3::new(10.5, 5.0, -1.0));
        assert_eq!(bvh.nearest(&outside), None);
    }

    #[test]
    fn test_empty_hierarchy() {
        let bvh = Bvh::build(Vec::new());
        assert!(bvh.is_empty());
        assert_eq!(bvh.node_count(), 0);
        assert_eq!(bvh.depth(), 0);
        let seg = Segment::new(DVec3::ZERO, DVec3::ONE);
        assert!(bvh.query(&seg).is_empty());
    }

    #[test]
    fn test_concurrent_queries() {
        let mut rng = StdRng::seed_from_u64(5);
        let triangles = random_soup(200, &mut rng);
        let bvh = Bvh::build(triangles.clone());
        let segments: Vec<Segment> = (0..256).map(|_| random_segment(&mut rng)).collect();

        let sequential: Vec<Option<usize>> = segments
            .iter()
            .map(|s| bvh.nearest(s).map(|h| h.triangle))
            .collect();
        let parallel: Vec<Option<usize>> = segments
            .par_iter()
            .map(|s| bvh.nearest(s).map(|h| h.triangle))
            .collect();

        assert_eq!(sequential, parallel);
    }
}
