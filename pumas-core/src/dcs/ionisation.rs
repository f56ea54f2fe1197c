//! Ionisation (close-collision) differential cross section: analytic
//! Moller-like term with a Sokalski radiative correction and an electronic
//! bremsstrahlung factor `Delta`, plus the closed-form 0/1/2-moment partial
//! integrals used directly by the tabulator.

use crate::material::AtomicElement;

const ALPHA: f64 = 1.0 / 137.035_999_084;
const ELECTRON_RADIUS: f64 = 2.817_940_326_2e-15; // m
const ELECTRON_MASS: f64 = 0.510_998_95e-3; // GeV

/// Maximum kinetic energy transferable to an electron at rest, per spec
/// §4.4: `Q_max = 2 m_e p^2 / (m^2 + m_e^2 + 2 m_e E)`.
#[must_use]
pub fn q_max(mass: f64, k: f64) -> f64 {
    let e = k + mass;
    let p2 = (e * e - mass * mass).max(0.0);
    2.0 * ELECTRON_MASS * p2 / (mass * mass + ELECTRON_MASS * ELECTRON_MASS + 2.0 * ELECTRON_MASS * e)
}

/// Kinematic range for ionisation: a nominal lower cut a few eV above zero
/// (the free-electron approximation breaks down there) up to `Q_max`.
#[must_use]
pub fn range(_element: &AtomicElement, mass: f64, k: f64) -> (f64, f64) {
    (1e-9, q_max(mass, k))
}

/// Sokalski radiative correction times the electronic-bremsstrahlung factor
/// `Delta`, applied multiplicatively to the non-radiative Moller-like term.
fn radiative_factor(mass: f64, k: f64, q: f64) -> f64 {
    let e = k + mass;
    let delta = (1.0 + 2.0 * q / ELECTRON_MASS).ln();
    1.0 + (ALPHA / (2.0 * std::f64::consts::PI)) * delta * (2.0 * (e / mass).ln() - 1.0)
}

/// The differential cross section itself, `m^2/GeV`.
#[must_use]
pub fn dcs(element: &AtomicElement, mass: f64, k: f64, q: f64) -> f64 {
    let qmax = q_max(mass, k);
    if !(q > 0.0) || q >= qmax {
        return 0.0;
    }
    let e = k + mass;
    let p2 = (e * e - mass * mass).max(1e-12);
    let beta2 = p2 / (e * e);
    let z = f64::from(element.z);

    let prefactor = 2.0 * std::f64::consts::PI * ELECTRON_RADIUS * ELECTRON_RADIUS * ELECTRON_MASS * z / (beta2 * q * q);
    let kinematic = 1.0 - beta2 * q / qmax + 0.5 * (q / e) * (q / e);

    (prefactor * kinematic.max(0.0) * radiative_factor(mass, k, q)).max(0.0)
}

/// Closed-form `integral_{q_lo}^{q_hi} q^n dq`, handling the `n = -1`
/// logarithmic case.
fn power_integral(n: i32, q_lo: f64, q_hi: f64) -> f64 {
    if n == -1 {
        (q_hi / q_lo).ln()
    } else {
        (q_hi.powi(n + 1) - q_lo.powi(n + 1)) / f64::from(n + 1)
    }
}

/// Closed-form integral of `q^order * dcs(q) dq` over `[q_lo, q_hi]`,
/// ignoring the (slowly varying) radiative correction, which is evaluated
/// at the geometric mean of the interval instead of integrated exactly —
/// the same trick spec §4.5 uses to keep the per-element integrals
/// analytic. `order in {0, 1, 2}`.
#[must_use]
pub fn moment(element: &AtomicElement, mass: f64, k: f64, q_lo: f64, q_hi: f64, order: i32) -> f64 {
    if q_hi <= q_lo {
        return 0.0;
    }
    let e = k + mass;
    let p2 = (e * e - mass * mass).max(1e-12);
    let beta2 = p2 / (e * e);
    let z = f64::from(element.z);
    let qmax = q_max(mass, k);

    let prefactor = 2.0 * std::f64::consts::PI * ELECTRON_RADIUS * ELECTRON_RADIUS * ELECTRON_MASS * z;
    let radiative = radiative_factor(mass, k, (q_lo * q_hi).sqrt());

    let term0 = power_integral(order - 2, q_lo, q_hi);
    let term1 = (beta2 / qmax) * power_integral(order - 1, q_lo, q_hi);
    let term2 = (0.5 / (e * e)) * power_integral(order, q_lo, q_hi);

    (prefactor * radiative * (term0 - term1 + term2)).max(0.0)
}

/// Closed-form polar angle from two-body kinematics with the electron
/// initially at rest: the squared momentum transfer to the electron is
/// `Q^2 = q(q + 2 m_e)` exactly, and to leading (forward-peaked) order
/// `Q^2 ~= 2 p_i^2 mu`, giving `mu = q(q + 2 m_e) / (2 p_i^2)`.
#[must_use]
pub fn polar(mass: f64, k_i: f64, q: f64) -> f64 {
    let e_i = k_i + mass;
    let p_i2 = (e_i * e_i - mass * mass).max(1e-12);
    (q * (q + 2.0 * ELECTRON_MASS) / (2.0 * p_i2)).clamp(0.0, 1.0)
}
