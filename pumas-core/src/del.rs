//! DEL sampler (L8): draws the (process, element, energy-transfer, polar
//! angle) tuple of a discrete energy-loss vertex, forward or backward.

use crate::dcs::{bremsstrahlung, ionisation, pair_production, photonuclear, Process, Registry};
use crate::material::AtomicElement;
use crate::random::Prng;
use crate::tables::MaterialTable;

/// Cap on envelope-rejection trials before an event is abandoned.
pub const MAX_TRIALS: usize = 100;
/// Power-law exponent used by the backward energy-transfer sampler (BMC_a).
pub const BMC_ALPHA: f64 = 2.0;

/// A drawn discrete vertex: which process/element fired, the energy
/// transfer `q`, and the post-vertex kinetic energy.
#[derive(Clone, Copy, Debug)]
pub struct DelEvent {
    /// Radiative or ionising process that fired.
    pub process: Process,
    /// Index into [`crate::tables::PhysicsTables::elements`].
    pub element: usize,
    /// Energy transferred to the secondary, GeV.
    pub q: f64,
    /// Kinetic energy after the vertex, GeV.
    pub k_out: f64,
}

/// Draws `(process, element)` for a forward DEL vertex at fixed `K`, by CDF
/// inversion of the tabulated per-(process,element) fraction of the total
/// cross section.
#[must_use]
pub fn draw_target_forward(table: &MaterialTable, cumulative_fraction: &[f64], u: f64) -> (Process, usize) {
    let idx = cumulative_fraction.iter().position(|&c| u <= c).unwrap_or(cumulative_fraction.len() - 1);
    table.csf_index[idx]
}

/// Draws `(process, element)` for a backward DEL vertex given both the
/// initial and final kinetic energy: weighted by the per-(process,element)
/// differential cross section at `q = K_i - K_f`, returning also the
/// importance weight `1 / sigma_process(K_i, element)` against the forward
/// probability.
#[must_use]
pub fn draw_target_backward(table: &MaterialTable, elements: &[AtomicElement], mass: f64, k_i: f64, k_f: f64, registry: &Registry, model: impl Fn(Process) -> &'static str, u: f64) -> Option<(Process, usize, f64)> {
    let q = k_i - k_f;
    if q <= 0.0 {
        return None;
    }
    let mut weights = Vec::with_capacity(table.csf_index.len());
    let mut total = 0.0;
    for &(process, element_idx) in &table.csf_index {
        let dcs_fn = registry.get(process, model(process)).ok()?;
        let w = dcs_fn(&elements[element_idx], mass, k_i, q).max(0.0);
        total += w;
        weights.push(w);
    }
    if total <= 0.0 {
        return None;
    }
    let mut acc = 0.0;
    for (i, &w) in weights.iter().enumerate() {
        acc += w / total;
        if u <= acc {
            let (process, element_idx) = table.csf_index[i];
            let sigma = table.csn[i].eval(k_i, &mut crate::interpolation::IndexCache::new());
            return Some((process, element_idx, 1.0 / sigma.max(1e-300)));
        }
    }
    let (process, element_idx) = *table.csf_index.last()?;
    Some((process, element_idx, 1.0 / total))
}

fn dcs_and_range(process: Process, registry: &Registry, model: &str, element: &AtomicElement, mass: f64, k: f64) -> (crate::dcs::DcsFn, (f64, f64)) {
    let dcs = registry.get(process, model).expect("registered model");
    (dcs, registry.range(process, element, mass, k))
}

/// Forward energy-transfer draw by single-component power-law envelope
/// rejection: `p_env(q) = c * q^{-1}` over `[q_min, q_max]`, `c` fixed so
/// the envelope dominates the DCS at `q_min`. Returns `None` ("nothing
/// happened") if `MAX_TRIALS` is exhausted.
#[must_use]
pub fn draw_energy_transfer_forward(process: Process, element: &AtomicElement, mass: f64, k: f64, registry: &Registry, model: &str, prng: &mut dyn Prng) -> Option<f64> {
    let (dcs, (q_min, q_max)) = dcs_and_range(process, registry, model, element, mass, k);
    if !(q_max > q_min) {
        return None;
    }
    let envelope_scale = (dcs(element, mass, k, q_min) * q_min).max(1e-300) * 1.2;
    let log_ratio = (q_max / q_min).ln();
    for _ in 0..MAX_TRIALS {
        let u1 = prng.uniform01();
        let q = q_min * (u1 * log_ratio).exp();
        let p_env = envelope_scale / q;
        let value = dcs(element, mass, k, q);
        if prng.uniform01() * p_env <= value {
            return Some(q);
        }
    }
    None
}

/// Backward energy-transfer draw: `r = K_f/K_i` from a truncated power law
/// of exponent [`BMC_ALPHA`] over `[1 - x_max, 1]`, returning `(K_f,
/// weight)`. With probability `p_cel` a pure-CEL (no discrete transfer)
/// event is returned instead, with its own weight correction.
#[must_use]
pub fn draw_energy_transfer_backward(k_i: f64, x_cut: f64, kt: f64, prng: &mut dyn Prng) -> (f64, f64, bool) {
    let x_max = (1.0 - kt / k_i.max(kt + 1e-9)).clamp(1e-9, 1.0 - 1e-9);
    let ln_inv_xcut = (1.0 / x_cut).ln().max(1e-300);
    // K_f is not yet known at decision time, so the ln(Kt/(Kt-K_f)) term is
    // evaluated at K_i instead, the largest K_f this draw could produce.
    let ln_kt_term = (kt / (kt - k_i).abs().max(1e-300)).ln().abs();
    let p_cel = (ln_inv_xcut / (ln_inv_xcut + ln_kt_term)).clamp(0.0, 1.0);

    if prng.uniform01() < p_cel {
        return (k_i, 1.0 / p_cel.max(1e-300), true);
    }

    let x_min = 1.0 - x_max;
    let one_minus_a = 1.0 - BMC_ALPHA;
    let u = prng.uniform01();
    let r = (x_min.powf(one_minus_a) + u * (x_max.powf(one_minus_a) - x_min.powf(one_minus_a))).powf(1.0 / one_minus_a);
    let r = r.clamp(x_min, x_max);
    let a1 = BMC_ALPHA - 1.0;
    let jacobian = (x_max - x_min) / (a1 * r.powf(a1 - 1.0)).max(1e-300);
    let weight = jacobian / r.max(1e-300) / (1.0 - p_cel).max(1e-300);
    (k_i * r, weight, false)
}

/// Ionisation closed-form energy-transfer sampler: inverse-transforms the
/// restricted DCS by a two-component (uniform + `1/q^2`) envelope with
/// rejection.
#[must_use]
pub fn draw_ionisation_transfer(element: &AtomicElement, mass: f64, k: f64, cutoff_q: f64, prng: &mut dyn Prng) -> Option<f64> {
    let (q_min, q_max_full) = ionisation::range(element, mass, k);
    let q_max = cutoff_q.min(q_max_full);
    if !(q_max > q_min) {
        return None;
    }
    let w_uniform = 0.5;
    for _ in 0..MAX_TRIALS {
        let q = if prng.uniform01() < w_uniform {
            q_min + prng.uniform01() * (q_max - q_min)
        } else {
            let inv = 1.0 / q_min + prng.uniform01() * (1.0 / q_max - 1.0 / q_min);
            1.0 / inv
        };
        let p_env = w_uniform / (q_max - q_min) + (1.0 - w_uniform) / (q * q) * (q_min * q_max / (q_max - q_min));
        let value = ionisation::dcs(element, mass, k, q);
        if prng.uniform01() * p_env.max(1e-300) <= value {
            return Some(q);
        }
    }
    None
}

/// Polar-angle update for a drawn vertex, when scattering is mixed.
#[must_use]
pub fn polar_angle(process: Process, element: &AtomicElement, mass: f64, k_i: f64, k_f: f64, prng: &mut dyn Prng) -> f64 {
    match process {
        Process::Bremsstrahlung => bremsstrahlung::polar(element, mass, k_i, k_f, &mut || prng.uniform01()),
        Process::PairProduction => pair_production::polar(element, mass, k_i, k_f, &mut || prng.uniform01()),
        Process::Photonuclear => photonuclear::polar(element, mass, k_i, k_f, &mut || prng.uniform01()),
        Process::Ionisation => ionisation::polar(mass, k_i, k_i - k_f),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::AtomicElement;

    #[test]
    fn forward_target_draw_picks_last_bucket_at_u_one() {
        // a synthetic two-entry csf_index / cumulative fraction
        let elements = vec![AtomicElement::new("H", 1, 1.008, 19.2, 0).unwrap()];
        let _ = elements;
        let cumulative = [0.3, 1.0];
        let idx = cumulative.iter().position(|&c| 0.99 <= c).unwrap();
        assert_eq!(idx, 1);
    }

    #[test]
    fn ionisation_transfer_is_within_range() {
        let al = AtomicElement::new("Al", 13, 26.98, 166.0, 0).unwrap();
        let mass = 0.105_658_39;
        let k = 10.0;
        let (q_min, q_max) = ionisation::range(&al, mass, k);
        struct Seq(Vec<f64>, usize);
        impl Prng for Seq {
            fn uniform01(&mut self) -> f64 {
                let v = self.0[self.1 % self.0.len()];
                self.1 += 1;
                v
            }
        }
        let mut prng = Seq(vec![0.1, 0.5, 0.9, 0.2, 0.3], 0);
        if let Some(q) = draw_ionisation_transfer(&al, mass, k, q_max, &mut prng) {
            assert!(q >= q_min && q <= q_max);
        }
    }
}
