//! Q-vector generators grouping reciprocal-space vectors into |Q| shells.

use super::linalg::{Matrix3, add, dot, norm, scale, sub};
use crate::domain::Vec3;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

pub const QVECTOR_GENERATORS: [&str; 6] = [
    "spherical_lattice",
    "spherical",
    "circular",
    "linear",
    "grid",
    "miller_indices",
];

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QVectorError {
    #[error("shell range {first}..{last} step {step} is empty or invalid")]
    InvalidShells { first: f64, last: f64, step: f64 },
    #[error("shell width must be positive, got {0}")]
    InvalidWidth(f64),
    #[error("the '{0}' generator needs a periodic unit cell")]
    MissingCell(&'static str),
    #[error("axis vectors must be non-zero and non-parallel")]
    DegenerateAxes,
    #[error("index range {first}..{last} step {step} is invalid")]
    InvalidIndexRange { first: i32, last: i32, step: i32 },
    #[error("the generator produced no Q vectors")]
    NoVectors,
}

/// `first..last` by `step`, last excluded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShellRange {
    pub first: f64,
    pub last: f64,
    pub step: f64,
}

impl ShellRange {
    pub fn values(&self) -> Result<Vec<f64>, QVectorError> {
        let invalid = QVectorError::InvalidShells {
            first: self.first,
            last: self.last,
            step: self.step,
        };
        if self.step <= 0.0 || self.last <= self.first || self.first < 0.0 {
            return Err(invalid);
        }
        let count = ((self.last - self.first) / self.step - 1.0e-9).ceil() as usize;
        Ok((0..count)
            .map(|i| self.first + i as f64 * self.step)
            .collect())
    }
}

/// Inclusive Miller index range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndexRange {
    pub first: i32,
    pub last: i32,
    pub step: i32,
}

impl IndexRange {
    fn values(&self) -> Result<Vec<i32>, QVectorError> {
        if self.step <= 0 || self.last < self.first {
            return Err(QVectorError::InvalidIndexRange {
                first: self.first,
                last: self.last,
                step: self.step,
            });
        }
        Ok((self.first..=self.last).step_by(self.step as usize).collect())
    }
}

fn default_seed() -> u64 {
    0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "generator", rename_all = "snake_case")]
pub enum QVectorGenerator {
    SphericalLattice {
        shells: ShellRange,
        n_vectors: usize,
        width: f64,
        #[serde(default = "default_seed")]
        seed: u64,
    },
    Spherical {
        shells: ShellRange,
        n_vectors: usize,
        width: f64,
        #[serde(default = "default_seed")]
        seed: u64,
    },
    Circular {
        shells: ShellRange,
        n_vectors: usize,
        width: f64,
        axis_1: Vec3,
        axis_2: Vec3,
        #[serde(default = "default_seed")]
        seed: u64,
    },
    Linear {
        shells: ShellRange,
        n_vectors: usize,
        width: f64,
        axis: Vec3,
        #[serde(default = "default_seed")]
        seed: u64,
    },
    Grid {
        hrange: IndexRange,
        krange: IndexRange,
        lrange: IndexRange,
        qstep: f64,
    },
    MillerIndices {
        shells: ShellRange,
        width: f64,
        hrange: IndexRange,
        krange: IndexRange,
        lrange: IndexRange,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QShell {
    pub q: f64,
    pub vectors: Vec<Vec3>,
    #[serde(default)]
    pub hkls: Vec<[i32; 3]>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QVectorShells {
    pub generator: String,
    pub shells: Vec<QShell>,
}

impl QVectorShells {
    pub fn n_shells(&self) -> usize {
        self.shells.len()
    }

    pub fn q_values(&self) -> Vec<f64> {
        self.shells.iter().map(|shell| shell.q).collect()
    }
}

fn check_width(width: f64) -> Result<(), QVectorError> {
    if width > 0.0 {
        Ok(())
    } else {
        Err(QVectorError::InvalidWidth(width))
    }
}

fn unit(v: Vec3) -> Option<Vec3> {
    let length = norm(v);
    (length > 1.0e-12).then(|| scale(v, 1.0 / length))
}

fn random_magnitude(rng: &mut StdRng, q: f64, width: f64) -> f64 {
    (q + width * (rng.r#gen::<f64>() - 0.5)).max(0.0)
}

/// Reciprocal basis rows `b_j` with `a_i · b_j = 2π δ_ij`.
pub fn reciprocal_basis(inverse: &Matrix3) -> Matrix3 {
    let mut basis = [[0.0; 3]; 3];
    for (row, values) in basis.iter_mut().enumerate() {
        for (col, value) in values.iter_mut().enumerate() {
            *value = 2.0 * PI * inverse[col][row];
        }
    }
    basis
}

fn lattice_vector(basis: &Matrix3, hkl: [i32; 3]) -> Vec3 {
    let mut q = [0.0; 3];
    for (index, row) in basis.iter().enumerate() {
        q = add(q, scale(*row, hkl[index] as f64));
    }
    q
}

impl QVectorGenerator {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SphericalLattice { .. } => "spherical_lattice",
            Self::Spherical { .. } => "spherical",
            Self::Circular { .. } => "circular",
            Self::Linear { .. } => "linear",
            Self::Grid { .. } => "grid",
            Self::MillerIndices { .. } => "miller_indices",
        }
    }

    pub fn requires_cell(&self) -> bool {
        matches!(
            self,
            Self::SphericalLattice { .. } | Self::Grid { .. } | Self::MillerIndices { .. }
        )
    }

    /// Generates the shells; `cell` holds the direct cell rows and their inverse.
    pub fn generate(&self, cell: Option<(&Matrix3, &Matrix3)>) -> Result<QVectorShells, QVectorError> {
        let shells: Vec<QShell> = match self {
            Self::SphericalLattice {
                shells,
                n_vectors,
                width,
                seed,
            } => {
                check_width(*width)?;
                let (direct, inverse) = cell.ok_or(QVectorError::MissingCell("spherical_lattice"))?;
                let mut rng = StdRng::seed_from_u64(*seed);
                let basis = reciprocal_basis(inverse);
                let values = shells.values()?;
                let q_max = values.last().copied().unwrap_or(0.0) + width / 2.0;
                let bounds: Vec<i32> = direct
                    .iter()
                    .map(|row| (q_max * norm(*row) / (2.0 * PI)).ceil() as i32)
                    .collect();
                let mut candidates = Vec::new();
                for h in -bounds[0]..=bounds[0] {
                    for k in -bounds[1]..=bounds[1] {
                        for l in -bounds[2]..=bounds[2] {
                            if h == 0 && k == 0 && l == 0 {
                                continue;
                            }
                            let vector = lattice_vector(&basis, [h, k, l]);
                            candidates.push(([h, k, l], vector, norm(vector)));
                        }
                    }
                }
                values
                    .into_iter()
                    .map(|q| {
                        let mut members: Vec<([i32; 3], Vec3)> = candidates
                            .iter()
                            .filter(|(_, _, length)| (length - q).abs() <= width / 2.0)
                            .map(|(hkl, vector, _)| (*hkl, *vector))
                            .collect();
                        if members.len() > *n_vectors {
                            members.shuffle(&mut rng);
                            members.truncate(*n_vectors);
                        }
                        QShell {
                            q,
                            vectors: members.iter().map(|(_, v)| *v).collect(),
                            hkls: members.iter().map(|(hkl, _)| *hkl).collect(),
                        }
                    })
                    .collect()
            }
            Self::Spherical {
                shells,
                n_vectors,
                width,
                seed,
            } => {
                check_width(*width)?;
                let mut rng = StdRng::seed_from_u64(*seed);
                shells
                    .values()?
                    .into_iter()
                    .map(|q| {
                        let vectors = (0..*n_vectors)
                            .map(|_| {
                                let z: f64 = 2.0 * rng.r#gen::<f64>() - 1.0;
                                let phi = 2.0 * PI * rng.r#gen::<f64>();
                                let radial = (1.0 - z * z).max(0.0).sqrt();
                                let direction = [radial * phi.cos(), radial * phi.sin(), z];
                                scale(direction, random_magnitude(&mut rng, q, *width))
                            })
                            .collect();
                        QShell {
                            q,
                            vectors,
                            hkls: Vec::new(),
                        }
                    })
                    .collect()
            }
            Self::Circular {
                shells,
                n_vectors,
                width,
                axis_1,
                axis_2,
                seed,
            } => {
                check_width(*width)?;
                let first = unit(*axis_1).ok_or(QVectorError::DegenerateAxes)?;
                let projected = sub(*axis_2, scale(first, dot(*axis_2, first)));
                let second = unit(projected).ok_or(QVectorError::DegenerateAxes)?;
                let mut rng = StdRng::seed_from_u64(*seed);
                shells
                    .values()?
                    .into_iter()
                    .map(|q| {
                        let vectors = (0..*n_vectors)
                            .map(|_| {
                                let theta = 2.0 * PI * rng.r#gen::<f64>();
                                let direction =
                                    add(scale(first, theta.cos()), scale(second, theta.sin()));
                                scale(direction, random_magnitude(&mut rng, q, *width))
                            })
                            .collect();
                        QShell {
                            q,
                            vectors,
                            hkls: Vec::new(),
                        }
                    })
                    .collect()
            }
            Self::Linear {
                shells,
                n_vectors,
                width,
                axis,
                seed,
            } => {
                check_width(*width)?;
                let direction = unit(*axis).ok_or(QVectorError::DegenerateAxes)?;
                let mut rng = StdRng::seed_from_u64(*seed);
                shells
                    .values()?
                    .into_iter()
                    .map(|q| QShell {
                        q,
                        vectors: (0..*n_vectors)
                            .map(|_| scale(direction, random_magnitude(&mut rng, q, *width)))
                            .collect(),
                        hkls: Vec::new(),
                    })
                    .collect()
            }
            Self::Grid {
                hrange,
                krange,
                lrange,
                qstep,
            } => {
                check_width(*qstep)?;
                let (_, inverse) = cell.ok_or(QVectorError::MissingCell("grid"))?;
                let basis = reciprocal_basis(inverse);
                let mut binned: std::collections::BTreeMap<usize, QShell> = Default::default();
                for hkl in miller_triples(hrange, krange, lrange)? {
                    let vector = lattice_vector(&basis, hkl);
                    let length = norm(vector);
                    if length == 0.0 {
                        continue;
                    }
                    let index = (length / qstep).floor() as usize;
                    let shell = binned.entry(index).or_insert_with(|| QShell {
                        q: (index as f64 + 0.5) * qstep,
                        vectors: Vec::new(),
                        hkls: Vec::new(),
                    });
                    shell.vectors.push(vector);
                    shell.hkls.push(hkl);
                }
                binned.into_values().collect()
            }
            Self::MillerIndices {
                shells,
                width,
                hrange,
                krange,
                lrange,
            } => {
                check_width(*width)?;
                let (_, inverse) = cell.ok_or(QVectorError::MissingCell("miller_indices"))?;
                let basis = reciprocal_basis(inverse);
                let triples = miller_triples(hrange, krange, lrange)?;
                shells
                    .values()?
                    .into_iter()
                    .map(|q| {
                        let mut shell = QShell {
                            q,
                            vectors: Vec::new(),
                            hkls: Vec::new(),
                        };
                        for hkl in &triples {
                            let vector = lattice_vector(&basis, *hkl);
                            let length = norm(vector);
                            if length > 0.0 && (length - q).abs() <= width / 2.0 {
                                shell.vectors.push(vector);
                                shell.hkls.push(*hkl);
                            }
                        }
                        shell
                    })
                    .collect()
            }
        };

        let shells: Vec<QShell> = shells
            .into_iter()
            .filter(|shell: &QShell| !shell.vectors.is_empty())
            .collect();
        if shells.is_empty() {
            return Err(QVectorError::NoVectors);
        }
        Ok(QVectorShells {
            generator: self.name().to_string(),
            shells,
        })
    }
}

fn miller_triples(
    hrange: &IndexRange,
    krange: &IndexRange,
    lrange: &IndexRange,
) -> Result<Vec<[i32; 3]>, QVectorError> {
    let hs = hrange.values()?;
    let ks = krange.values()?;
    let ls = lrange.values()?;
    let mut triples = Vec::with_capacity(hs.len() * ks.len() * ls.len());
    for &h in &hs {
        for &k in &ks {
            for &l in &ls {
                triples.push([h, k, l]);
            }
        }
    }
    Ok(triples)
}

#[cfg(test)]
mod tests {
    use super::{IndexRange, QVectorError, QVectorGenerator, ShellRange};
    use crate::numerics::linalg::norm;
    use std::f64::consts::PI;

    fn cubic(side: f64) -> ([[f64; 3]; 3], [[f64; 3]; 3]) {
        let direct = [[side, 0.0, 0.0], [0.0, side, 0.0], [0.0, 0.0, side]];
        let inverse = [
            [1.0 / side, 0.0, 0.0],
            [0.0, 1.0 / side, 0.0],
            [0.0, 0.0, 1.0 / side],
        ];
        (direct, inverse)
    }

    #[test]
    fn spherical_vectors_stay_inside_their_shell() {
        let generator = QVectorGenerator::Spherical {
            shells: ShellRange {
                first: 1.0,
                last: 3.0,
                step: 1.0,
            },
            n_vectors: 25,
            width: 0.2,
            seed: 7,
        };
        let shells = generator.generate(None).expect("shells");
        assert_eq!(shells.q_values(), vec![1.0, 2.0]);
        for shell in &shells.shells {
            assert_eq!(shell.vectors.len(), 25);
            for vector in &shell.vectors {
                assert!((norm(*vector) - shell.q).abs() <= 0.1 + 1e-12);
            }
        }
        assert_eq!(generator.generate(None).expect("repeat"), shells);
    }

    #[test]
    fn lattice_vectors_are_reciprocal_lattice_points() {
        let (direct, inverse) = cubic(2.0 * PI);
        let generator = QVectorGenerator::SphericalLattice {
            shells: ShellRange {
                first: 1.0,
                last: 2.0,
                step: 1.0,
            },
            n_vectors: 50,
            width: 0.1,
            seed: 1,
        };
        let shells = generator.generate(Some((&direct, &inverse))).expect("shells");
        assert_eq!(shells.n_shells(), 1);
        assert_eq!(shells.shells[0].vectors.len(), 6);
        assert_eq!(shells.shells[0].hkls.len(), 6);

        let error = generator.generate(None).expect_err("needs a cell");
        assert_eq!(error, QVectorError::MissingCell("spherical_lattice"));
    }

    #[test]
    fn grid_bins_vectors_by_magnitude() {
        let (direct, inverse) = cubic(2.0 * PI);
        let range = IndexRange {
            first: 0,
            last: 1,
            step: 1,
        };
        let generator = QVectorGenerator::Grid {
            hrange: range,
            krange: range,
            lrange: range,
            qstep: 0.3,
        };
        let shells = generator.generate(Some((&direct, &inverse))).expect("grid");
        let total: usize = shells.shells.iter().map(|shell| shell.vectors.len()).sum();
        assert_eq!(total, 7);
        assert_eq!(shells.shells[0].vectors.len(), 3);
    }

    #[test]
    fn linear_generator_rejects_zero_axis() {
        let generator = QVectorGenerator::Linear {
            shells: ShellRange {
                first: 0.5,
                last: 1.0,
                step: 0.5,
            },
            n_vectors: 3,
            width: 0.1,
            axis: [0.0, 0.0, 0.0],
            seed: 0,
        };
        assert_eq!(generator.generate(None), Err(QVectorError::DegenerateAxes));
    }
}
