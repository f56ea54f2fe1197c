//! Bremsstrahlung differential cross section: KKP, ABB and SSR models, and
//! the associated photon/projectile polar-angle sampler.

use crate::material::AtomicElement;
use std::f64::consts::PI;

const ALPHA: f64 = 1.0 / 137.035_999_084;
const ELECTRON_RADIUS: f64 = 2.817_940_326_2e-15; // m
const ELECTRON_MASS: f64 = 0.510_998_95e-3; // GeV

/// Kinematic range `[q_min, q_max]` for bremsstrahlung: any photon energy
/// transfer up to the full kinetic energy, excluding the unphysical
/// endpoints.
#[must_use]
pub fn range(_element: &AtomicElement, _mass: f64, k: f64) -> (f64, f64) {
    (1e-6 * k, k * (1.0 - 1e-6))
}

/// Hartree-Fock-like complete-screening radiation logarithms, shared by all
/// three models (Tsai's parameterisation).
fn radiation_logs(z: u32) -> (f64, f64) {
    if z == 1 {
        (5.31, 6.144)
    } else {
        let zf = f64::from(z);
        (
            (184.15 / zf.powf(1.0 / 3.0)).ln(),
            (1194.0 / zf.powf(2.0 / 3.0)).ln(),
        )
    }
}

/// Shared spectral shape used by KKP and ABB: `4/3 - 4/3 y + y^2`, weighted
/// by the nuclear and atomic-electron radiation logs.
fn bremsstrahlung_spectrum(z: f64, y: f64, l_rad: f64, l_rad_prime: f64) -> f64 {
    let shape = 4.0 / 3.0 - 4.0 / 3.0 * y + y * y;
    4.0 * ALPHA * ELECTRON_RADIUS * ELECTRON_RADIUS * (z * z * l_rad + z * l_rad_prime) * shape
}

/// KKP: Kelner-Kokoulin-Petrukhin, with Hartree-Fock radiation logarithms
/// and an additional nuclear-excitation term (`z`, not `z^2`, correction).
#[must_use]
pub fn kkp(element: &AtomicElement, mass: f64, k: f64, q: f64) -> f64 {
    if !(q > 0.0) || q >= k {
        return 0.0;
    }
    let y = q / k;
    let z = f64::from(element.z);
    let (l_rad, l_rad_prime) = radiation_logs(element.z);
    let base = bremsstrahlung_spectrum(z, y, l_rad, l_rad_prime);

    // mass suppression of the dipole term near y -> 1, and the nuclear
    // excitation correction scaling like 1/Z.
    let mass_term = 1.0 - (ELECTRON_MASS * ELECTRON_MASS) / (mass * mass) * y / (1.0 - y).max(1e-12);
    let nuclear_excitation = 1.0 + 0.25 / z;

    (base * mass_term.max(0.0) * nuclear_excitation / q).max(0.0)
}

/// ABB: Andreev-Bezrukov-Bugaev, using the same radiation logs but without
/// the nuclear-excitation correction and with a softer high-y suppression.
#[must_use]
pub fn abb(element: &AtomicElement, _mass: f64, k: f64, q: f64) -> f64 {
    if !(q > 0.0) || q >= k {
        return 0.0;
    }
    let y = q / k;
    let z = f64::from(element.z);
    let (l_rad, l_rad_prime) = radiation_logs(element.z);
    let base = bremsstrahlung_spectrum(z, y, l_rad, l_rad_prime);
    (base * (1.0 - y).sqrt() / q).max(0.0)
}

/// SSR: Sandrock-Soedingrekso-Rhode, adding full (not complete) screening
/// corrections and the hard-atomic-electron contribution for `y` close to
/// 1, using an intermediate screening function interpolating between the
/// complete-screening logs and the Born limit.
#[must_use]
pub fn ssr(element: &AtomicElement, mass: f64, k: f64, q: f64) -> f64 {
    if !(q > 0.0) || q >= k {
        return 0.0;
    }
    let y = q / k;
    let z = f64::from(element.z);
    let (l_rad, l_rad_prime) = radiation_logs(element.z);

    // screening parameter: delta ~ 136 m_e y / (Z^{1/3} E (1-y))
    let delta = 136.0 * ELECTRON_MASS * y / (z.powf(1.0 / 3.0) * k * (1.0 - y).max(1e-12));
    let screening = if delta < 1.0 {
        1.0
    } else {
        (1.0 + (1.0 - delta.min(10.0).ln() / l_rad.max(1.0))).max(0.0)
    };

    let base = bremsstrahlung_spectrum(z, y, l_rad, l_rad_prime) * screening;

    // hard-atomic-electron contribution, growing as y -> 1.
    let hard_electron = 1.0 + (z.recip()) * y.powi(4) / (1.0 - y).max(1e-6);

    let mass_term = 1.0 - (ELECTRON_MASS * ELECTRON_MASS) / (mass * mass) * y / (1.0 - y).max(1e-12);

    (base * mass_term.max(0.0) * hard_electron / q).max(0.0)
}

/// Rejection sampling of the projectile polar angle, following Tsai's
/// screened double-differential cross section; the projectile angle is
/// derived from the photon angle assuming zero nuclear recoil, i.e.
/// `mu_projectile = (q/K)^2 * mu_photon / (2 (1 - q/K))`, with `mu_photon`
/// rejection-sampled against an exponential-in-`theta^2` envelope.
pub fn polar(_element: &AtomicElement, mass: f64, k_i: f64, k_f: f64, random: &mut dyn FnMut() -> f64) -> f64 {
    let q = k_i - k_f;
    if q <= 0.0 || k_f <= 0.0 {
        return 0.0;
    }
    let theta0 = mass / k_i.max(1e-9);
    let mut mu_photon;
    loop {
        let u = random().max(1e-300);
        let theta2 = -theta0 * theta0 * (2.0 * PI * u).ln().abs();
        mu_photon = 0.5 * theta2.min(2.0);
        let envelope = (-mu_photon / (theta0 * theta0)).exp();
        let accept = random();
        if accept <= envelope || !envelope.is_finite() {
            break;
        }
    }
    (q / k_i).powi(2) * mu_photon / (2.0 * (1.0 - q / k_i).max(1e-9))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn carbon() -> AtomicElement {
        AtomicElement::new("C", 6, 12.011, 78.0, 0).unwrap()
    }

    #[test]
    fn dcs_is_nonnegative_and_vanishes_outside_range() {
        let c = carbon();
        let mass = 0.105_658_39;
        let k = 10.0;
        assert_eq!(kkp(&c, mass, k, -1.0), 0.0);
        assert_eq!(kkp(&c, mass, k, k), 0.0);
        for q in [0.1, 1.0, 5.0, 9.9] {
            assert!(kkp(&c, mass, k, q) >= 0.0);
            assert!(abb(&c, mass, k, q) >= 0.0);
            assert!(ssr(&c, mass, k, q) >= 0.0);
        }
    }
}
