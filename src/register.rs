//! Atom registers and grid transforms.
//!
//! A [`Register`] names each atom and fixes its position in µm. Gates build
//! their register from user coordinates, optionally passed through a
//! [`RegisterTransform`] first so that small integer grids land on
//! physically sensible distances.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::device::Device;
use crate::error::{ProviderError, ProviderResult};
use crate::layout::RegisterLayout;

/// An atom with its position in µm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Atom {
    #[serde(rename = "name")]
    pub id: String,
    pub x: f64,
    pub y: f64,
}

impl Atom {
    pub fn new(id: impl Into<String>, x: f64, y: f64) -> Self {
        Self { id: id.into(), x, y }
    }

    pub fn position(&self) -> [f64; 2] {
        [self.x, self.y]
    }
}

/// An ordered set of atoms, optionally tied to a trap layout.
///
/// The atom order is the bit order of measured bitstrings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Register {
    atoms: Vec<Atom>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    layout: Option<RegisterLayout>,
}

impl Register {
    pub(crate) fn new(atoms: Vec<Atom>) -> Self {
        Self {
            atoms,
            layout: None,
        }
    }

    /// A register from named atoms, kept at their given positions.
    pub fn from_atoms(atoms: Vec<Atom>) -> ProviderResult<Self> {
        if atoms.is_empty() {
            return Err(ProviderError::InvalidRegister(
                "a register needs at least one atom".into(),
            ));
        }
        for (i, atom) in atoms.iter().enumerate() {
            if !(atom.x.is_finite() && atom.y.is_finite()) {
                return Err(ProviderError::InvalidRegister(format!(
                    "atom '{}' has a non-finite position",
                    atom.id
                )));
            }
            if atoms[..i].iter().any(|a| a.id == atom.id) {
                return Err(ProviderError::InvalidRegister(format!(
                    "atom id '{}' is used twice",
                    atom.id
                )));
            }
        }
        Ok(Self::new(atoms))
    }

    /// A register from (x, y) coordinates, centered on their mean.
    ///
    /// Atoms are named `{prefix}0`, `{prefix}1`, ... in input order.
    #[allow(clippy::cast_precision_loss)]
    pub fn from_coordinates(coords: &[(f64, f64)], prefix: &str) -> ProviderResult<Self> {
        if coords.is_empty() {
            return Err(ProviderError::InvalidRegister(
                "a register needs at least one atom".into(),
            ));
        }
        let n = coords.len() as f64;
        let (cx, cy) = coords
            .iter()
            .fold((0.0, 0.0), |(sx, sy), (x, y)| (sx + x, sy + y));
        let (cx, cy) = (cx / n, cy / n);

        Self::from_atoms(
            coords
                .iter()
                .enumerate()
                .map(|(i, (x, y))| Atom::new(format!("{prefix}{i}"), x - cx, y - cy))
                .collect(),
        )
    }

    /// Attach a trap layout.
    pub fn with_layout(mut self, layout: RegisterLayout) -> Self {
        self.layout = Some(layout);
        self
    }

    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    pub fn layout(&self) -> Option<&RegisterLayout> {
        self.layout.as_ref()
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    /// Atom ids in register order.
    pub fn qubit_ids(&self) -> Vec<String> {
        self.atoms.iter().map(|a| a.id.clone()).collect()
    }

    /// (id, position) pairs in register order.
    pub fn qubits(&self) -> Vec<(&str, [f64; 2])> {
        self.atoms
            .iter()
            .map(|a| (a.id.as_str(), a.position()))
            .collect()
    }

    /// Smallest distance between two atoms, `None` for a single atom.
    pub fn min_distance(&self) -> Option<f64> {
        let mut min: Option<f64> = None;
        for (i, a) in self.atoms.iter().enumerate() {
            for b in &self.atoms[i + 1..] {
                let d = (a.x - b.x).hypot(a.y - b.y);
                min = Some(min.map_or(d, |m| m.min(d)));
            }
        }
        min
    }

    /// Largest distance of an atom from the origin.
    pub fn max_radial_distance(&self) -> f64 {
        self.atoms
            .iter()
            .map(|a| a.x.hypot(a.y))
            .fold(0.0, f64::max)
    }

    /// Place the register on a layout the device can run.
    ///
    /// Devices that accept new layouts get a layout made of the register's
    /// own positions. Otherwise the register is embedded into the first
    /// pre-calibrated layout that holds it.
    pub fn with_automatic_layout(&self, device: &Device) -> ProviderResult<Register> {
        if device.accepts_new_layouts {
            let traps = self.atoms.iter().map(Atom::position).collect();
            let layout = RegisterLayout::free(traps, Some("automatic".into()))?;
            return Ok(self.clone().with_layout(layout));
        }
        device
            .pre_calibrated_layouts
            .iter()
            .find_map(|layout| layout.embed(self))
            .ok_or_else(|| {
                ProviderError::InvalidLayout(format!(
                    "register does not fit any pre-calibrated layout of {} and the device \
                     does not accept new layouts",
                    device.name
                ))
            })
    }
}

/// Grid the user's integer coordinates are mapped onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GridTransform {
    Linear,
    #[default]
    Triangular,
    Square,
}

impl GridTransform {
    pub fn as_str(&self) -> &'static str {
        match self {
            GridTransform::Linear => "linear",
            GridTransform::Triangular => "triangular",
            GridTransform::Square => "square",
        }
    }
}

impl fmt::Display for GridTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GridTransform {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "linear" => Ok(GridTransform::Linear),
            "triangular" => Ok(GridTransform::Triangular),
            "square" => Ok(GridTransform::Square),
            _ => Err(ProviderError::InvalidRegister(
                "grid_transform should be 'linear', 'triangular', or 'square'.".into(),
            )),
        }
    }
}

/// Maps grid coordinates to atom positions in µm.
///
/// Every grid step becomes `grid_scale * SCALE_FACTOR` µm.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisterTransform {
    grid: GridTransform,
    grid_scale: f64,
    raw_coords: Vec<(f64, f64)>,
    coords: Vec<(f64, f64)>,
}

impl RegisterTransform {
    /// µm per grid step at scale 1.
    pub const SCALE_FACTOR: f64 = 5.0;

    /// Rows of the triangular lattice basis.
    const TRIANGULAR: [[f64; 2]; 2] = [[1.0, 0.0], [0.5, 0.866_025_403_784_438_6]];

    /// Transform `coords`, or a centered row of `num_qubits` points when no
    /// coordinates are given.
    pub fn new(
        grid: GridTransform,
        grid_scale: f64,
        coords: Option<&[(f64, f64)]>,
        num_qubits: Option<usize>,
    ) -> ProviderResult<Self> {
        if !(grid_scale.is_finite() && grid_scale > 0.0) {
            return Err(ProviderError::InvalidRegister(format!(
                "grid_scale must be positive, got {grid_scale}"
            )));
        }
        let raw_coords = match (coords, num_qubits) {
            (Some(coords), _) if !coords.is_empty() => coords.to_vec(),
            (_, Some(n)) if n > 0 => Self::fill_coords(n),
            _ => {
                return Err(ProviderError::InvalidRegister(
                    "must provide coords or num_qubits.".into(),
                ));
            }
        };

        let step = grid_scale * Self::SCALE_FACTOR;
        let coords = match grid {
            GridTransform::Triangular => {
                let [r0, r1] = Self::TRIANGULAR;
                raw_coords
                    .iter()
                    .map(|&(x, y)| {
                        let (x, y) = (x * step, y * step);
                        (x * r0[0] + y * r1[0], x * r0[1] + y * r1[1])
                    })
                    .collect()
            }
            GridTransform::Square => raw_coords
                .iter()
                .map(|&(x, y)| (x * step, y * step))
                .collect(),
            GridTransform::Linear => Self::linear_coords(raw_coords.len(), step),
        };

        Ok(Self {
            grid,
            grid_scale,
            raw_coords,
            coords,
        })
    }

    /// `n` points on a row, `(p - n / 2, 0)`.
    #[allow(clippy::cast_precision_loss)]
    pub fn fill_coords(n: usize) -> Vec<(f64, f64)> {
        let shift = (n / 2) as f64;
        (0..n).map(|p| (p as f64 - shift, 0.0)).collect()
    }

    /// Atoms in input order along the x axis, one step apart and centered.
    #[allow(clippy::cast_precision_loss)]
    fn linear_coords(n: usize, step: f64) -> Vec<(f64, f64)> {
        let center = (n - 1) as f64 / 2.0;
        (0..n).map(|p| ((p as f64 - center) * step, 0.0)).collect()
    }

    pub fn grid(&self) -> GridTransform {
        self.grid
    }

    pub fn grid_scale(&self) -> f64 {
        self.grid_scale
    }

    pub fn raw_coords(&self) -> &[(f64, f64)] {
        &self.raw_coords
    }

    pub fn coords(&self) -> &[(f64, f64)] {
        &self.coords
    }
}
