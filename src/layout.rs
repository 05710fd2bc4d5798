//! Trap layouts.
//!
//! A layout is the fixed set of optical trap positions a device can load
//! atoms into. Registers on layout-bound devices must sit on those traps.

use serde::{Deserialize, Serialize};

use crate::error::{ProviderError, ProviderResult};
use crate::register::{Atom, Register};

/// Positions closer than this (µm) are the same trap.
pub const TRAP_TOLERANCE: f64 = 1e-6;

/// A set of trap coordinates in µm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterLayout {
    #[serde(rename = "coordinates")]
    trap_coordinates: Vec<[f64; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    slug: Option<String>,
}

impl RegisterLayout {
    /// A layout from arbitrary trap positions.
    pub fn free(trap_coordinates: Vec<[f64; 2]>, slug: Option<String>) -> ProviderResult<Self> {
        if trap_coordinates.is_empty() {
            return Err(ProviderError::InvalidLayout(
                "a layout needs at least one trap".into(),
            ));
        }
        if trap_coordinates.iter().flatten().any(|c| !c.is_finite()) {
            return Err(ProviderError::InvalidLayout(
                "trap coordinates must be finite".into(),
            ));
        }
        for (i, a) in trap_coordinates.iter().enumerate() {
            if trap_coordinates[i + 1..]
                .iter()
                .any(|b| distance(*a, *b) < TRAP_TOLERANCE)
            {
                return Err(ProviderError::InvalidLayout(format!(
                    "trap {i} at ({}, {}) is duplicated",
                    a[0], a[1]
                )));
            }
        }
        Ok(Self {
            trap_coordinates,
            slug,
        })
    }

    /// `n_traps` traps of a triangular lattice, filled ring by ring
    /// around the origin.
    pub fn triangular(n_traps: usize, spacing: f64) -> ProviderResult<Self> {
        check_spacing(spacing)?;
        if n_traps == 0 {
            return Err(ProviderError::InvalidLayout(
                "a layout needs at least one trap".into(),
            ));
        }
        Ok(Self::triangular_lattice(n_traps, spacing))
    }

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_wrap)]
    pub(crate) fn triangular_lattice(n_traps: usize, spacing: f64) -> Self {
        let mut rings = 0_i64;
        while 1 + 3 * rings * (rings + 1) < n_traps as i64 {
            rings += 1;
        }

        let row_height = spacing * 3f64.sqrt() / 2.0;
        let mut points = Vec::new();
        for q in -rings..=rings {
            for r in -rings..=rings {
                let ring = q.abs().max(r.abs()).max((q + r).abs());
                if ring > rings {
                    continue;
                }
                let (x, y) = (
                    spacing * q as f64 + spacing / 2.0 * r as f64,
                    row_height * r as f64,
                );
                points.push((ring, y.atan2(x), [x, y]));
            }
        }
        points.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.total_cmp(&b.1)));
        points.truncate(n_traps);

        Self {
            trap_coordinates: points.into_iter().map(|(_, _, p)| p).collect(),
            slug: Some(format!("TriangularLatticeLayout({n_traps}, {spacing}µm)")),
        }
    }

    /// A centered `rows` x `columns` grid.
    #[allow(clippy::cast_precision_loss)]
    pub fn rectangular(
        rows: usize,
        columns: usize,
        col_spacing: f64,
        row_spacing: f64,
    ) -> ProviderResult<Self> {
        check_spacing(col_spacing)?;
        check_spacing(row_spacing)?;
        if rows == 0 || columns == 0 {
            return Err(ProviderError::InvalidLayout(
                "rows and columns must be positive".into(),
            ));
        }

        let (x0, y0) = (
            (columns - 1) as f64 * col_spacing / 2.0,
            (rows - 1) as f64 * row_spacing / 2.0,
        );
        let mut traps = Vec::with_capacity(rows * columns);
        for row in 0..rows {
            for col in 0..columns {
                traps.push([
                    col as f64 * col_spacing - x0,
                    row as f64 * row_spacing - y0,
                ]);
            }
        }

        Ok(Self {
            trap_coordinates: traps,
            slug: Some(format!(
                "RectangularLatticeLayout({rows}x{columns}, {col_spacing}x{row_spacing}µm)"
            )),
        })
    }

    /// A centered grid with equal spacing in both directions.
    pub fn square(rows: usize, columns: usize, spacing: f64) -> ProviderResult<Self> {
        let mut layout = Self::rectangular(rows, columns, spacing, spacing)?;
        layout.slug = Some(format!("SquareLatticeLayout({rows}x{columns}, {spacing}µm)"));
        Ok(layout)
    }

    pub fn number_of_traps(&self) -> usize {
        self.trap_coordinates.len()
    }

    pub fn traps(&self) -> &[[f64; 2]] {
        &self.trap_coordinates
    }

    pub fn slug(&self) -> Option<&str> {
        self.slug.as_deref()
    }

    /// Traps are always planar.
    pub fn dimensionality(&self) -> u8 {
        2
    }

    /// Same set of traps, in any order.
    pub fn matches(&self, other: &RegisterLayout) -> bool {
        if self.number_of_traps() != other.number_of_traps() {
            return false;
        }
        let (a, b) = (self.sorted_traps(), other.sorted_traps());
        a.iter().zip(&b).all(|(p, q)| distance(*p, *q) < TRAP_TOLERANCE)
    }

    fn sorted_traps(&self) -> Vec<[f64; 2]> {
        let mut traps = self.trap_coordinates.clone();
        traps.sort_by_key(|p| (quantize(p[1]), quantize(p[0])));
        traps
    }

    fn trap_at(&self, point: [f64; 2]) -> Option<usize> {
        self.trap_coordinates
            .iter()
            .position(|t| distance(*t, point) < TRAP_TOLERANCE)
    }

    /// Translate `register` so every atom sits on a trap.
    ///
    /// Returns `None` when no translation fits. The returned register uses
    /// the exact trap positions and carries this layout.
    pub fn embed(&self, register: &Register) -> Option<Register> {
        let anchor = register.atoms().first()?;
        for trap in &self.trap_coordinates {
            let shift = [trap[0] - anchor.x, trap[1] - anchor.y];
            let placed: Option<Vec<Atom>> = register
                .atoms()
                .iter()
                .map(|atom| {
                    let idx = self.trap_at([atom.x + shift[0], atom.y + shift[1]])?;
                    let [x, y] = self.trap_coordinates[idx];
                    Some(Atom::new(atom.id.clone(), x, y))
                })
                .collect();
            if let Some(atoms) = placed {
                return Some(Register::new(atoms).with_layout(self.clone()));
            }
        }
        None
    }

    /// Build a register from the given traps. Qubits are named `q0, q1, ...`
    /// unless ids are supplied.
    pub fn define_register(
        &self,
        trap_ids: &[usize],
        qubit_ids: Option<Vec<String>>,
    ) -> ProviderResult<Register> {
        let ids = match qubit_ids {
            Some(ids) if ids.len() != trap_ids.len() => {
                return Err(ProviderError::InvalidRegister(format!(
                    "{} qubit ids given for {} traps",
                    ids.len(),
                    trap_ids.len()
                )));
            }
            Some(ids) => ids,
            None => (0..trap_ids.len()).map(|i| format!("q{i}")).collect(),
        };

        let mut seen = vec![false; self.number_of_traps()];
        let mut atoms = Vec::with_capacity(trap_ids.len());
        for (&trap, id) in trap_ids.iter().zip(ids) {
            let Some(&[x, y]) = self.trap_coordinates.get(trap) else {
                return Err(ProviderError::InvalidRegister(format!(
                    "trap {trap} does not exist in a layout of {} traps",
                    self.number_of_traps()
                )));
            };
            if std::mem::replace(&mut seen[trap], true) {
                return Err(ProviderError::InvalidRegister(format!(
                    "trap {trap} is used twice"
                )));
            }
            atoms.push(Atom::new(id, x, y));
        }
        Ok(Register::new(atoms).with_layout(self.clone()))
    }
}

fn check_spacing(spacing: f64) -> ProviderResult<()> {
    if !(spacing.is_finite() && spacing > 0.0) {
        return Err(ProviderError::InvalidLayout(format!(
            "spacing must be positive, got {spacing}"
        )));
    }
    Ok(())
}

pub(crate) fn distance(a: [f64; 2], b: [f64; 2]) -> f64 {
    (a[0] - b[0]).hypot(a[1] - b[1])
}

#[allow(clippy::cast_possible_truncation)]
fn quantize(v: f64) -> i64 {
    (v / TRAP_TOLERANCE).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_triangular_layout_rings() {
        let layout = RegisterLayout::triangular(61, 5.0).unwrap();
        assert_eq!(layout.number_of_traps(), 61);
        assert_eq!(layout.traps()[0], [0.0, 0.0]);

        // the first ring sits one spacing away from the center
        for trap in &layout.traps()[1..7] {
            assert!((distance(*trap, [0.0, 0.0]) - 5.0).abs() < 1e-9);
        }
        let radius = layout
            .traps()
            .iter()
            .map(|t| distance(*t, [0.0, 0.0]))
            .fold(0.0, f64::max);
        assert!((radius - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_partial_triangular_layout() {
        let layout = RegisterLayout::triangular(10, 4.0).unwrap();
        assert_eq!(layout.number_of_traps(), 10);
    }

    #[test]
    fn test_square_layout_is_centered() {
        assert_eq!(RegisterLayout::square(2, 2, 5.0).unwrap().dimensionality(), 2);
        let layout = RegisterLayout::square(7, 4, 5.0).unwrap();
        assert_eq!(layout.number_of_traps(), 28);
        let (sx, sy) = layout
            .traps()
            .iter()
            .fold((0.0, 0.0), |(sx, sy), t| (sx + t[0], sy + t[1]));
        assert!(sx.abs() < 1e-9 && sy.abs() < 1e-9);
    }

    #[test]
    fn test_matches_ignores_order() {
        let a = RegisterLayout::free(vec![[0.0, 0.0], [5.0, 0.0]], None).unwrap();
        let b = RegisterLayout::free(vec![[5.0, 0.0], [0.0, 0.0]], Some("b".into())).unwrap();
        let c = RegisterLayout::free(vec![[0.0, 0.0], [6.0, 0.0]], None).unwrap();
        assert!(a.matches(&b));
        assert!(!a.matches(&c));
    }

    #[test]
    fn test_free_layout_rejects_duplicates() {
        assert!(RegisterLayout::free(vec![[1.0, 1.0], [1.0, 1.0]], None).is_err());
        assert!(RegisterLayout::free(vec![], None).is_err());
    }

    #[test]
    fn test_embed_translates_register() {
        let layout = RegisterLayout::square(3, 3, 5.0).unwrap();
        let register = Register::from_coordinates(&[(0.0, 0.0), (5.0, 0.0)], "q").unwrap();

        let embedded = layout.embed(&register).unwrap();
        assert_eq!(embedded.len(), 2);
        assert!(embedded.layout().is_some());
        for atom in embedded.atoms() {
            assert!(layout.trap_at([atom.x, atom.y]).is_some());
        }

        let too_close = Register::from_coordinates(&[(0.0, 0.0), (1.0, 0.0)], "q").unwrap();
        assert!(layout.embed(&too_close).is_none());
    }

    #[test]
    fn test_define_register() {
        let layout = RegisterLayout::triangular(7, 5.0).unwrap();
        let register = layout.define_register(&[0, 1, 2], None).unwrap();
        assert_eq!(register.qubit_ids(), vec!["q0", "q1", "q2"]);

        assert!(layout.define_register(&[0, 0], None).is_err());
        assert!(layout.define_register(&[99], None).is_err());
        assert!(layout
            .define_register(&[0, 1], Some(vec!["a".into()]))
            .is_err());
    }
}
