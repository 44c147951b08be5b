//! Voronoi cells built by clipping a bounding cube with the bisector planes
//! of neighbouring points.
//!
//! Each cell is a convex polyhedron stored as faces; its volume is the sum of
//! the tetrahedra joining the generating point to a fan triangulation of every
//! face, each contributing `|det(Δ)| / 3!`.

use super::linalg::{Matrix3, add, cross, determinant3, dot, norm, scale, sub, vec_mat3};
use crate::domain::Vec3;

const PLANE_EPSILON: f64 = 1.0e-12;
const MERGE_EPSILON: f64 = 1.0e-10;

#[derive(Debug, Clone, PartialEq)]
struct Face {
    vertices: Vec<Vec3>,
    neighbor: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VoronoiCell {
    pub volume: f64,
    /// Index of the point behind every face (periodic images repeat indices).
    pub neighbors: Vec<usize>,
    /// True when the cell still touches the initial bounding cube.
    pub bounded_by_box: bool,
}

fn cube(center: Vec3, half: f64) -> Vec<Face> {
    let corner = |sx: f64, sy: f64, sz: f64| add(center, [sx * half, sy * half, sz * half]);
    let quads = [
        [(-1., -1., -1.), (-1., 1., -1.), (1., 1., -1.), (1., -1., -1.)],
        [(-1., -1., 1.), (1., -1., 1.), (1., 1., 1.), (-1., 1., 1.)],
        [(-1., -1., -1.), (1., -1., -1.), (1., -1., 1.), (-1., -1., 1.)],
        [(-1., 1., -1.), (-1., 1., 1.), (1., 1., 1.), (1., 1., -1.)],
        [(-1., -1., -1.), (-1., -1., 1.), (-1., 1., 1.), (-1., 1., -1.)],
        [(1., -1., -1.), (1., 1., -1.), (1., 1., 1.), (1., -1., 1.)],
    ];
    quads
        .iter()
        .map(|quad| Face {
            vertices: quad.iter().map(|&(x, y, z)| corner(x, y, z)).collect(),
            neighbor: None,
        })
        .collect()
}

fn push_unique(points: &mut Vec<Vec3>, point: Vec3) {
    if !points
        .iter()
        .any(|existing| norm(sub(*existing, point)) < MERGE_EPSILON)
    {
        points.push(point);
    }
}

/// Keeps the part of the polyhedron with `n · x <= d`.
fn clip(faces: Vec<Face>, normal: Vec3, offset: f64, neighbor: usize) -> Vec<Face> {
    let mut clipped = Vec::with_capacity(faces.len() + 1);
    let mut cap = Vec::new();
    for face in faces {
        let mut kept = Vec::with_capacity(face.vertices.len() + 1);
        let count = face.vertices.len();
        for index in 0..count {
            let current = face.vertices[index];
            let next = face.vertices[(index + 1) % count];
            let dc = dot(normal, current) - offset;
            let dn = dot(normal, next) - offset;
            if dc <= PLANE_EPSILON {
                kept.push(current);
                if dc.abs() <= PLANE_EPSILON {
                    push_unique(&mut cap, current);
                }
            }
            if (dc < -PLANE_EPSILON && dn > PLANE_EPSILON) || (dc > PLANE_EPSILON && dn < -PLANE_EPSILON) {
                let t = dc / (dc - dn);
                let crossing = add(current, scale(sub(next, current), t));
                kept.push(crossing);
                push_unique(&mut cap, crossing);
            }
        }
        if kept.len() >= 3 {
            clipped.push(Face {
                vertices: kept,
                neighbor: face.neighbor,
            });
        }
    }
    if cap.len() >= 3 {
        clipped.push(Face {
            vertices: order_around(cap, normal),
            neighbor: Some(neighbor),
        });
    }
    clipped
}

fn order_around(points: Vec<Vec3>, normal: Vec3) -> Vec<Vec3> {
    let count = points.len() as f64;
    let centroid = scale(points.iter().fold([0.0; 3], |acc, p| add(acc, *p)), 1.0 / count);
    let reference = sub(points[0], centroid);
    let u = scale(reference, 1.0 / norm(reference).max(f64::MIN_POSITIVE));
    let v = cross(normal, u);
    let mut keyed: Vec<(f64, Vec3)> = points
        .into_iter()
        .map(|p| {
            let d = sub(p, centroid);
            (dot(d, v).atan2(dot(d, u)), p)
        })
        .collect();
    keyed.sort_by(|a, b| a.0.total_cmp(&b.0));
    keyed.into_iter().map(|(_, p)| p).collect()
}

fn face_area(face: &Face) -> f64 {
    let origin = face.vertices[0];
    let mut total = [0.0; 3];
    for pair in face.vertices[1..].windows(2) {
        total = add(total, cross(sub(pair[0], origin), sub(pair[1], origin)));
    }
    0.5 * norm(total)
}

/// Voronoi cell of `center` against `neighbors` (index, position), bounded by
/// a cube of half-width `half_extent`.
pub fn voronoi_cell(center: Vec3, neighbors: &[(usize, Vec3)], half_extent: f64) -> VoronoiCell {
    let mut faces = cube(center, half_extent);
    let mut sorted: Vec<&(usize, Vec3)> = neighbors.iter().collect();
    sorted.sort_by(|a, b| norm(sub(a.1, center)).total_cmp(&norm(sub(b.1, center))));
    for (index, position) in sorted {
        let normal = sub(*position, center);
        let distance = norm(normal);
        if distance < MERGE_EPSILON {
            continue;
        }
        let reach = faces
            .iter()
            .flat_map(|face| face.vertices.iter())
            .map(|vertex| norm(sub(*vertex, center)))
            .fold(0.0, f64::max);
        if distance / 2.0 > reach {
            break;
        }
        let offset = dot(normal, add(center, *position)) / 2.0;
        faces = clip(faces, normal, offset, *index);
    }

    let mut volume = 0.0;
    for face in &faces {
        let origin = face.vertices[0];
        for pair in face.vertices[1..].windows(2) {
            let simplex: Matrix3 = [sub(origin, center), sub(pair[0], center), sub(pair[1], center)];
            volume += determinant3(&simplex).abs() / 6.0;
        }
    }
    let mut neighbor_ids: Vec<usize> = faces
        .iter()
        .filter(|face| face_area(face) > MERGE_EPSILON)
        .filter_map(|face| face.neighbor)
        .collect();
    neighbor_ids.sort_unstable();
    VoronoiCell {
        volume,
        neighbors: neighbor_ids,
        bounded_by_box: faces.iter().any(|face| face.neighbor.is_none()),
    }
}

/// Cells of every point. With a periodic `cell` (rows `a, b, c`), the 26
/// surrounding images of every point are added as neighbours.
pub fn voronoi_cells(points: &[Vec3], cell: Option<&Matrix3>, padding: f64) -> Vec<VoronoiCell> {
    let mut images: Vec<(usize, Vec3)> = Vec::new();
    let half_extent = match cell {
        Some(cell) => {
            for i in -1..=1 {
                for j in -1..=1 {
                    for k in -1..=1 {
                        let shift = vec_mat3([i as f64, j as f64, k as f64], cell);
                        for (index, point) in points.iter().enumerate() {
                            images.push((index, add(*point, shift)));
                        }
                    }
                }
            }
            cell.iter().map(|row| norm(*row)).sum::<f64>()
        }
        None => {
            images.extend(points.iter().copied().enumerate());
            let span = points
                .iter()
                .flat_map(|p| points.iter().map(move |q| norm(sub(*p, *q))))
                .fold(0.0, f64::max);
            span + padding.max(0.0)
        }
    };

    points
        .iter()
        .enumerate()
        .map(|(index, point)| {
            let neighbors: Vec<(usize, Vec3)> = images
                .iter()
                .filter(|(other, position)| {
                    *other != index || norm(sub(*position, *point)) > MERGE_EPSILON
                })
                .copied()
                .collect();
            voronoi_cell(*point, &neighbors, half_extent.max(MERGE_EPSILON))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{voronoi_cell, voronoi_cells};

    #[test]
    fn isolated_point_keeps_the_bounding_cube() {
        let cell = voronoi_cell([0.0, 0.0, 0.0], &[], 1.0);
        assert!((cell.volume - 8.0).abs() < 1e-12);
        assert!(cell.neighbors.is_empty());
        assert!(cell.bounded_by_box);
    }

    #[test]
    fn bisector_halves_the_cube() {
        let cell = voronoi_cell([0.0, 0.0, 0.0], &[(1, [1.0, 0.0, 0.0])], 1.0);
        assert!((cell.volume - 6.0).abs() < 1e-12);
        assert_eq!(cell.neighbors, vec![1]);
    }

    #[test]
    fn simple_cubic_lattice_fills_the_box() {
        let side = 2.0;
        let mut points = Vec::new();
        for i in 0..2 {
            for j in 0..2 {
                for k in 0..2 {
                    points.push([i as f64, j as f64, k as f64]);
                }
            }
        }
        let cell = [[side, 0.0, 0.0], [0.0, side, 0.0], [0.0, 0.0, side]];
        let cells = voronoi_cells(&points, Some(&cell), 0.0);
        let total: f64 = cells.iter().map(|cell| cell.volume).sum();
        assert!((total - side.powi(3)).abs() < 1e-9);
        for cell in &cells {
            assert!((cell.volume - 1.0).abs() < 1e-9);
            assert_eq!(cell.neighbors.len(), 6);
            assert!(!cell.bounded_by_box);
        }
    }
}
