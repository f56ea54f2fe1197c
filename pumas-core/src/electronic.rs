//! Electronic energy loss (L4): atomic-shell oscillator model, density
//! effect, and the mean (Bethe-Bloch-like) stopping power.

use crate::material::AtomicElement;

const ELECTRON_MASS: f64 = 0.510_998_95e-3; // GeV
const ALPHA: f64 = 1.0 / 137.035_999_084;

/// A single atomic-shell oscillator: binding energy (GeV) and occupancy
/// (electrons per atom, summing to `Z`).
#[derive(Clone, Copy, Debug)]
pub struct Oscillator {
    /// Shell binding energy, GeV.
    pub energy: f64,
    /// Shell occupancy (number of electrons).
    pub occupancy: f64,
}

/// Built-in per-element shell table, standing in for the Carlson/CRC table
/// of spec §4.4 (Z = 1..100): a hydrogenic approximation with one
/// oscillator per principal shell, `E_n ~= 13.6 eV * (Z_eff(n)/n)^2`, and
/// `Z_eff` screened by the inner shells' electron count.
#[must_use]
pub fn builtin_shells(z: u32) -> Vec<Oscillator> {
    const RYDBERG_EV: f64 = 13.605693;
    let z = z.max(1);
    let mut shells_left = z;
    let mut out = Vec::new();
    let mut n = 1u32;
    while shells_left > 0 {
        let capacity = 2 * n * n;
        let occupancy = capacity.min(shells_left);
        let screened_z = f64::from(z) - f64::from(capacity.min(shells_left.saturating_sub(occupancy)));
        let z_eff = screened_z.max(1.0);
        let energy_ev = RYDBERG_EV * (z_eff / f64::from(n)).powi(2);
        out.push(Oscillator { energy: energy_ev * 1e-9, occupancy: f64::from(occupancy) });
        shells_left -= occupancy;
        n += 1;
    }
    out
}

/// A material's combined oscillator set: per-element shells, weighted by
/// mass fraction and renormalised so that `ln I = sum f_i ln E_i` matches
/// the material's mean excitation energy, then uniformly rescaled by
/// `a_S = I exp(-<ln E>) / omega_p`.
#[derive(Clone, Debug)]
pub struct MaterialOscillators {
    /// `(energy GeV, weight)` pairs, weights summing to 1.
    pub shells: Vec<(f64, f64)>,
    /// Sternheimer-like scaling applied to every shell energy.
    pub a_sternheimer: f64,
}

/// Plasma energy `omega_p = 28.816 sqrt(rho <Z/A>)` eV, converted to GeV.
#[must_use]
pub fn plasma_energy(density_kg_m3: f64, z_over_a: f64) -> f64 {
    let rho_g_cm3 = density_kg_m3 * 1e-3;
    28.816e-9 * (rho_g_cm3 * z_over_a).max(0.0).sqrt()
}

impl MaterialOscillators {
    /// Builds the combined, rescaled oscillator set for a material.
    ///
    /// `components` is `(element, mass_fraction)`; `mean_excitation` is the
    /// target mean excitation energy `I` (GeV); `density` is kg/m^3;
    /// `z_over_a` is the material's `<Z/A>`.
    #[must_use]
    pub fn build(components: &[(AtomicElement, f64)], mean_excitation: f64, density: f64, z_over_a: f64) -> Self {
        let mut shells: Vec<(f64, f64)> = Vec::new();
        for (element, mass_fraction) in components {
            let oscillators = builtin_shells(element.z);
            let total_occ: f64 = oscillators.iter().map(|o| o.occupancy).sum();
            for o in oscillators {
                let weight = mass_fraction * (o.occupancy / total_occ) * (f64::from(element.z) / element.a)
                    / z_over_a.max(1e-300);
                shells.push((o.energy, weight));
            }
        }
        let weight_sum: f64 = shells.iter().map(|(_, w)| w).sum();
        for (_, w) in &mut shells {
            *w /= weight_sum.max(1e-300);
        }

        let mean_ln_e: f64 = shells.iter().map(|(e, w)| w * e.ln()).sum();
        let omega_p = plasma_energy(density, z_over_a);
        let a_sternheimer = mean_excitation * (-mean_ln_e).exp() / omega_p.max(1e-300);

        for (e, _) in &mut shells {
            *e *= a_sternheimer;
        }

        Self { shells, a_sternheimer }
    }

    /// Solves `sum_i f_i / (E_i^2 + L^2) = 1/gamma^2` for `L` by bisection,
    /// then returns the density effect `delta = sum_i f_i ln(1+L^2/E_i^2) -
    /// L^2/gamma^2`. Returns `0` when the governing equation has no
    /// positive root (low gamma).
    #[must_use]
    pub fn density_effect(&self, gamma: f64) -> f64 {
        let target = 1.0 / (gamma * gamma).max(1e-300);
        let f = |l: f64| -> f64 { self.shells.iter().map(|(e, w)| w / (e * e + l * l)).sum::<f64>() - target };

        if f(0.0) <= 0.0 {
            return 0.0;
        }

        let mut hi = self.shells.iter().map(|(e, _)| *e).fold(0.0, f64::max).max(1e-9);
        while f(hi) > 0.0 {
            hi *= 2.0;
            if hi > 1e6 {
                return 0.0;
            }
        }
        let mut lo = 0.0;
        for _ in 0..100 {
            let mid = 0.5 * (lo + hi);
            if f(mid) > 0.0 {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        let l = 0.5 * (lo + hi);
        let delta: f64 = self.shells.iter().map(|(e, w)| w * (1.0 + l * l / (e * e)).ln()).sum();
        (delta - l * l / (gamma * gamma)).max(0.0)
    }
}

/// Maximum kinetic energy transferable to an electron at rest (shared with
/// [`crate::dcs::ionisation`]).
#[must_use]
pub fn q_max(mass: f64, k: f64) -> f64 {
    let e = k + mass;
    let p2 = (e * e - mass * mass).max(0.0);
    2.0 * ELECTRON_MASS * p2 / (mass * mass + ELECTRON_MASS * ELECTRON_MASS + 2.0 * ELECTRON_MASS * e)
}

/// Radiative correction `Delta` to the Bethe-Bloch formula (Sokalski-style,
/// logarithmic in the energy and the electron mass ratio).
fn radiative_delta(mass: f64, k: f64) -> f64 {
    let e = k + mass;
    (ALPHA / std::f64::consts::PI) * (e / mass).ln() * (e / ELECTRON_MASS).ln()
}

/// Modified Bethe-Bloch mean stopping power, `-dE/dX` in GeV m^2/kg, for a
/// material with mean excitation `mean_excitation` (GeV), `z_over_a`, and
/// oscillator set `oscillators` (for the density effect).
#[must_use]
pub fn mean_stopping(
    mass: f64,
    k: f64,
    z_over_a: f64,
    mean_excitation: f64,
    oscillators: &MaterialOscillators,
) -> f64 {
    const K_BETHE: f64 = 0.307_075e-3; // GeV mol^-1 cm^2, -> converted below
    let e = k + mass;
    let p2 = (e * e - mass * mass).max(1e-300);
    let beta2 = p2 / (e * e);
    let gamma = e / mass;
    let qmax = q_max(mass, k);

    let delta = oscillators.density_effect(gamma);
    let radiative = radiative_delta(mass, k);

    let log_term = 0.5 * (2.0 * ELECTRON_MASS * beta2 * gamma * gamma * qmax / (mean_excitation * mean_excitation)).max(1e-300).ln();
    let kinematic = log_term - beta2 - delta / 2.0 + 0.25 * (qmax * qmax) / (e * e) + radiative;

    // K_BETHE is in GeV cm^2/g per mol^-1 weighted by <Z/A>; convert cm^2/g -> m^2/kg (factor 0.1).
    (K_BETHE * z_over_a / beta2 * kinematic * 0.1).max(0.0)
}
