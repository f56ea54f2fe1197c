//! Data model for atomic elements, base and composite materials, and the
//! shared kinetic-energy grid (spec §3).

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// An immutable atomic element, as parsed from the MDF.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct AtomicElement {
    /// Element name, as given in the MDF.
    pub name: String,
    /// Atomic number.
    pub z: u32,
    /// Atomic mass, g/mol.
    pub a: f64,
    /// Mean excitation energy, GeV.
    pub mean_excitation: f64,
    /// Index into the tabulator's element array.
    pub index: usize,
}

impl AtomicElement {
    /// Constructs a new element. `mean_excitation_ev` is converted to GeV.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `z` is zero or `a`/`mean_excitation_ev`
    /// are not strictly positive.
    pub fn new(name: impl Into<String>, z: u32, a: f64, mean_excitation_ev: f64, index: usize) -> Result<Self> {
        if z == 0 {
            return Err(Error::configuration("atomic number must be positive".into()));
        }
        if !(a > 0.0) || !(mean_excitation_ev > 0.0) {
            return Err(Error::configuration("atomic mass and mean excitation energy must be positive".into()));
        }
        Ok(Self {
            name: name.into(),
            z,
            a,
            mean_excitation: mean_excitation_ev * 1e-9,
            index,
        })
    }
}

/// A single component of a base material: a reference to an element, with a
/// mass fraction.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct MaterialComponent {
    /// Index into the element table.
    pub element: usize,
    /// Mass fraction, in `(0, 1]`.
    pub fraction: f64,
}

/// A base material: an ordered list of elemental components at a given
/// reference density.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct BaseMaterial {
    /// Material name.
    pub name: String,
    /// Elemental composition; fractions sum to approximately 1.
    pub components: Vec<MaterialComponent>,
    /// Reference density, kg/m^3.
    pub density: f64,
    /// Mean excitation energy override, GeV, if the MDF specified one.
    pub mean_excitation_override: Option<f64>,
    /// `<Z/A>`, the mean charge-to-mass ratio.
    pub z_over_a: f64,
    /// Sternheimer-like density-effect scaling `a_S`.
    pub a_sternheimer: f64,
}

impl BaseMaterial {
    /// Builds a base material and its derived `<Z/A>`; `a_sternheimer` must
    /// be filled in later by [`crate::electronic`] once the oscillator model
    /// has been built, since it depends on the plasma energy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `components` is empty, fractions
    /// do not sum to approximately 1, or `density` is not strictly positive.
    pub fn new(
        name: impl Into<String>,
        components: Vec<MaterialComponent>,
        density: f64,
        mean_excitation_override: Option<f64>,
        elements: &[AtomicElement],
    ) -> Result<Self> {
        if components.is_empty() {
            return Err(Error::configuration("base material has no components".into()));
        }
        if !(density > 0.0) {
            return Err(Error::physics("base material density must be positive".into()));
        }
        let sum: f64 = components.iter().map(|c| c.fraction).sum();
        if (sum - 1.0).abs() > 1e-3 {
            return Err(Error::configuration(format!("component fractions sum to {sum}, expected 1")));
        }

        let z_over_a: f64 = components
            .iter()
            .map(|c| c.fraction * f64::from(elements[c.element].z) / elements[c.element].a)
            .sum();

        Ok(Self {
            name: name.into(),
            components,
            density,
            mean_excitation_override,
            z_over_a,
            a_sternheimer: 1.0,
        })
    }
}

/// A composite material: a mixture of already-declared base materials.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CompositeMaterial {
    /// Material name.
    pub name: String,
    /// `(base material index, mass fraction)` pairs.
    pub components: Vec<(usize, f64)>,
    /// Density, derived from the inverse-density-weighted sum (kg/m^3).
    pub density: f64,
}

impl CompositeMaterial {
    /// Builds a composite material, deriving its density from the
    /// inverse-density weighted sum of its base-material components:
    /// `1/rho = sum_i f_i / rho_i`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `components` is empty or
    /// fractions do not sum to approximately 1; [`Error::Physics`] if any
    /// referenced base material has non-positive density.
    pub fn new(name: impl Into<String>, components: Vec<(usize, f64)>, bases: &[BaseMaterial]) -> Result<Self> {
        if components.is_empty() {
            return Err(Error::configuration("composite material has no components".into()));
        }
        let sum: f64 = components.iter().map(|(_, f)| f).sum();
        if (sum - 1.0).abs() > 1e-3 {
            return Err(Error::configuration(format!("component fractions sum to {sum}, expected 1")));
        }

        let mut inv_density = 0.0;
        for &(base, fraction) in &components {
            let rho = bases[base].density;
            if !(rho > 0.0) {
                return Err(Error::physics("composite component density must be positive".into()));
            }
            inv_density += fraction / rho;
        }
        if !(inv_density > 0.0) {
            return Err(Error::physics("composite material density must be positive".into()));
        }

        Ok(Self {
            name: name.into(),
            components,
            density: 1.0 / inv_density,
        })
    }

    /// Flattens the composite down to per-element mass fractions, recursing
    /// through its base-material components.
    #[must_use]
    pub fn element_fractions(&self, bases: &[BaseMaterial]) -> Vec<(usize, f64)> {
        let mut out: Vec<(usize, f64)> = Vec::new();
        for &(base_idx, base_fraction) in &self.components {
            for comp in &bases[base_idx].components {
                let contribution = base_fraction * comp.fraction;
                if let Some(existing) = out.iter_mut().find(|(e, _)| *e == comp.element) {
                    existing.1 += contribution;
                } else {
                    out.push((comp.element, contribution));
                }
            }
        }
        out
    }
}

/// Index of a material in the combined `[0, N_base + N_composite)` space.
pub type MaterialIndex = usize;

/// The strictly increasing kinetic-energy grid (GeV) shared by every
/// tabulated quantity.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct KineticGrid {
    nodes: Vec<f64>,
}

impl KineticGrid {
    /// Builds a grid from an explicit, strictly increasing node list.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `nodes` has fewer than two
    /// entries or is not strictly increasing.
    pub fn new(nodes: Vec<f64>) -> Result<Self> {
        if nodes.len() < 2 {
            return Err(Error::configuration("kinetic grid needs at least two nodes".into()));
        }
        if !nodes.windows(2).all(|w| w[0] < w[1]) {
            return Err(Error::configuration("kinetic grid must be strictly increasing".into()));
        }
        Ok(Self { nodes })
    }

    /// Builds a log-spaced grid over `[k_min, k_max]` with `n` nodes,
    /// matching the `n_energies`/`energy` construction settings of §6.
    ///
    /// # Errors
    ///
    /// See [`Self::new`].
    pub fn log_spaced(k_min: f64, k_max: f64, n: usize) -> Result<Self> {
        let (lmin, lmax) = (k_min.ln(), k_max.ln());
        let nodes = (0..n)
            .map(|i| (lmin + (lmax - lmin) * i as f64 / (n - 1) as f64).exp())
            .collect();
        Self::new(nodes)
    }

    /// The grid nodes.
    #[must_use]
    pub fn nodes(&self) -> &[f64] {
        &self.nodes
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True only for a grid with no nodes (never true for a constructed
    /// grid, kept for API symmetry with other containers).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hydrogen() -> AtomicElement {
        AtomicElement::new("H", 1, 1.008, 19.2, 0).unwrap()
    }
    fn oxygen() -> AtomicElement {
        AtomicElement::new("O", 8, 15.999, 95.0, 1).unwrap()
    }

    #[test]
    fn water_z_over_a() {
        let elements = vec![hydrogen(), oxygen()];
        let water = BaseMaterial::new(
            "water",
            vec![
                MaterialComponent { element: 0, fraction: 2.0 * 1.008 / (2.0 * 1.008 + 15.999) },
                MaterialComponent { element: 1, fraction: 15.999 / (2.0 * 1.008 + 15.999) },
            ],
            1000.0,
            None,
            &elements,
        )
        .unwrap();
        assert!((water.z_over_a - 0.5551).abs() < 1e-3);
    }

    #[test]
    fn composite_of_one_base_with_fraction_one_is_linear() {
        let elements = vec![hydrogen()];
        let base = BaseMaterial::new(
            "h",
            vec![MaterialComponent { element: 0, fraction: 1.0 }],
            70.0,
            None,
            &elements,
        )
        .unwrap();
        let composite = CompositeMaterial::new("h-composite", vec![(0, 1.0)], &[base.clone()]).unwrap();
        assert!((composite.density - base.density).abs() < 1e-9);
        let fracs = composite.element_fractions(&[base]);
        assert_eq!(fracs, vec![(0, 1.0)]);
    }

    #[test]
    fn rejects_non_normalised_fractions() {
        let elements = vec![hydrogen(), oxygen()];
        let err = BaseMaterial::new(
            "bad",
            vec![MaterialComponent { element: 0, fraction: 0.3 }],
            1.0,
            None,
            &elements,
        );
        assert!(err.is_err());
    }
}
