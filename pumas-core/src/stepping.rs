//! Stepping engine (L7): advances a projectile by one step, driven by an
//! event bitset, under a pluggable geometry (medium/locals callbacks).

use crate::accessors::{self, AccessorCaches};
use crate::material::MaterialIndex;
use crate::random::Prng;
use crate::tables::{MaterialTable, Particle, PhysicsTables, Scheme};
use bitflags::bitflags;

bitflags! {
    /// Discrete events a step can terminate on; also used as a user
    /// stop-mask.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct EventFlags: u32 {
        /// Geometry reported a medium change.
        const MEDIUM = 1 << 0;
        /// The user distance limit was reached.
        const LIMIT_DISTANCE = 1 << 1;
        /// The user grammage limit was reached.
        const LIMIT_GRAMMAGE = 1 << 2;
        /// The user proper-time limit was reached.
        const LIMIT_TIME = 1 << 3;
        /// The user kinetic-energy limit was reached.
        const LIMIT_ENERGY = 1 << 4;
        /// A hard (elastic, EHS) Coulomb scattering vertex.
        const VERTEX_COULOMB = 1 << 5;
        /// A discrete energy loss (DEL) vertex.
        const VERTEX_DEL = 1 << 6;
        /// A decay vertex.
        const VERTEX_DECAY = 1 << 7;
        /// The step weight was updated.
        const WEIGHT = 1 << 8;
    }
}

/// Minimum step length, m.
pub const STEP_MIN: f64 = 1e-7;
/// `c` in natural units used by the Larmor radius formula, `GeV/(T.m)`.
const LARMOR_FACTOR: f64 = 0.299_792_458;

/// Transport direction.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Direction {
    /// Standard time-ordered transport.
    Forward,
    /// Transport integrated backward from a final state.
    Backward,
}

/// Energy-loss mode.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EnergyLoss {
    /// No energy loss: `K` is constant.
    Disabled,
    /// Continuously-slowing-down approximation.
    Csda,
    /// CSDA below the cutoff, discrete losses above it.
    Mixed,
    /// Mixed with PENELOPE-style stochastic straggling below the cutoff.
    Straggled,
}

impl EnergyLoss {
    fn scheme(self) -> Scheme {
        match self {
            Self::Disabled => Scheme::Disabled,
            Self::Csda => Scheme::Csda,
            Self::Mixed | Self::Straggled => Scheme::Mixed,
        }
    }
}

/// Multiple-scattering mode.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Scattering {
    /// Straight-line propagation.
    Disabled,
    /// Soft multiple scattering plus hard (EHS) single scatters.
    Mixed,
}

/// Decay weighting mode.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Decay {
    /// Decay is ignored.
    Disabled,
    /// Weight is corrected by the survival probability, no vertex drawn.
    Weighted,
    /// A decay vertex is drawn explicitly.
    Randomised,
}

/// Per-context transport configuration (spec §6 "Modes").
#[derive(Clone, Copy, Debug)]
pub struct Settings {
    /// Transported particle.
    pub particle: Particle,
    /// Transport direction.
    pub direction: Direction,
    /// Energy-loss mode.
    pub energy_loss: EnergyLoss,
    /// Multiple-scattering mode.
    pub scattering: Scattering,
    /// Decay mode.
    pub decay: Decay,
    /// Step-length accuracy, in `(0, 1]`.
    pub accuracy: f64,
    /// Event bitset at which the transport driver should stop.
    pub stop_mask: EventFlags,
}

/// External limits on a transport, any of which may be absent.
#[derive(Clone, Copy, Debug, Default)]
pub struct Limits {
    /// Maximum travelled distance, m.
    pub distance: Option<f64>,
    /// Maximum travelled grammage, kg/m^2.
    pub grammage: Option<f64>,
    /// Maximum elapsed proper time, m/c.
    pub time: Option<f64>,
    /// Kinetic-energy limit (a floor forward, a ceiling backward), GeV.
    pub energy: Option<f64>,
}

/// Local medium properties, filled by the `locals` callback.
#[derive(Clone, Copy, Debug)]
pub struct LocalProperties {
    /// Mass density, kg/m^3.
    pub density: f64,
    /// Magnetic field, tesla, in the lab frame.
    pub magnet: [f64; 3],
}

/// How precisely a medium boundary needs to be located.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StepKind {
    /// No boundary refinement: the reported step hint is trusted as-is.
    Raw,
    /// Refine the boundary crossing by bisection to `STEP_MIN`.
    CheckExact,
}

/// The mutable projectile state advanced by [`step`].
#[derive(Clone, Copy, Debug)]
pub struct ProjectileState {
    /// Lab-frame position, m.
    pub position: [f64; 3],
    /// Unit direction of travel.
    pub direction: [f64; 3],
    /// Kinetic energy, GeV.
    pub kinetic: f64,
    /// Monte Carlo weight.
    pub weight: f64,
    /// Cumulative travelled distance, m.
    pub distance: f64,
    /// Cumulative travelled grammage, kg/m^2.
    pub grammage: f64,
    /// Cumulative elapsed proper time, m/c.
    pub time: f64,
}

/// Persistent per-context scratch for the straggling sampler (PENELOPE-style
/// Box-Muller reuses its second deviate between calls).
#[derive(Clone, Copy, Debug, Default)]
pub struct StragglingState {
    spare: Option<f64>,
}

impl StragglingState {
    fn gaussian(&mut self, prng: &mut dyn Prng) -> f64 {
        if let Some(z) = self.spare.take() {
            return z;
        }
        let (mut u1, u2);
        loop {
            let a = prng.uniform01().max(1e-300);
            let b = prng.uniform01();
            u1 = a;
            u2 = b;
            if u1 > 1e-300 {
                break;
            }
        }
        let r = (-2.0 * u1.ln()).sqrt();
        let theta = std::f64::consts::TAU * u2;
        self.spare = Some(r * theta.sin());
        r * theta.cos()
    }
}

fn norm(v: [f64; 3]) -> f64 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}

fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [a[1] * b[2] - a[2] * b[1], a[2] * b[0] - a[0] * b[2], a[0] * b[1] - a[1] * b[0]]
}

fn normalise(v: [f64; 3]) -> [f64; 3] {
    let n = norm(v).max(1e-300);
    [v[0] / n, v[1] / n, v[2] / n]
}

/// Rotates unit vector `dir` by polar angle `mu = (1-cos theta)/2` around
/// axis `axis` (assumed unit and perpendicular to `dir`), with azimuth
/// `phi`.
fn rotate_about(dir: [f64; 3], axis: [f64; 3], mu: f64, phi: f64) -> [f64; 3] {
    let cos_t = (1.0 - 2.0 * mu).clamp(-1.0, 1.0);
    let sin_t = (1.0 - cos_t * cos_t).max(0.0).sqrt();
    // orthonormal frame (dir, e1, e2) to rotate within
    let e1 = normalise(cross(axis, dir));
    let e2 = cross(dir, e1);
    let c = phi.cos();
    let s = phi.sin();
    normalise([
        dir[0] * cos_t + sin_t * (c * e1[0] + s * e2[0]),
        dir[1] * cos_t + sin_t * (c * e1[1] + s * e2[1]),
        dir[2] * cos_t + sin_t * (c * e1[2] + s * e2[2]),
    ])
}

fn momentum(mass: f64, k: f64) -> f64 {
    (k * (k + 2.0 * mass)).max(1e-300).sqrt()
}

/// Rotates `direction` by the Larmor precession angle accumulated over a
/// geometric `step` in field `magnet`, averaging `1/r_L` between the
/// initial and final momentum.
fn magnetic_rotation(direction: [f64; 3], magnet: [f64; 3], mass: f64, k_i: f64, k_f: f64, step: f64) -> [f64; 3] {
    let b_perp_vec = {
        let along = direction[0] * magnet[0] + direction[1] * magnet[1] + direction[2] * magnet[2];
        [magnet[0] - along * direction[0], magnet[1] - along * direction[1], magnet[2] - along * direction[2]]
    };
    let b_perp = norm(b_perp_vec);
    if b_perp < 1e-300 {
        return direction;
    }
    let axis = normalise(cross(direction, b_perp_vec));
    let inv_rl = |k: f64| b_perp * LARMOR_FACTOR / momentum(mass, k);
    let theta = 0.5 * (inv_rl(k_i) + inv_rl(k_f)) * step;
    rotate_about(direction, axis, 0.5 * (1.0 - theta.cos()), if theta >= 0.0 { 0.0 } else { std::f64::consts::PI })
}

/// Closed-form CSDA magnetic deflection via the `N_LARMOR`-order Taylor
/// series over the Larmor moments, for a homogeneous field. Returns the
/// rotation angle (not the full 3D direction) about `axis = (dir x B)/|dir
/// x B|`, to be applied with [`rotate_about`] using `mu = (1-cos theta)/2`.
#[must_use]
pub fn larmor_taylor_angle(table: &MaterialTable, mass: f64, charge: f64, b_perp: f64, k_i: f64, k_f: f64, cache: &mut AccessorCaches) -> f64 {
    let omega_factor = charge * b_perp * LARMOR_FACTOR;
    let mut angle = 0.0;
    let mut sign = 1.0;
    for (order, li) in table.li.iter().enumerate() {
        let moment = li.eval(k_f, &mut cache.k) - li.eval(k_i, &mut cache.k);
        let term = omega_factor.powi(order as i32 + 1) * moment / factorial(order + 1) * sign;
        angle += term;
        sign *= -1.0;
    }
    let _ = mass;
    angle
}

fn factorial(n: usize) -> f64 {
    (1..=n).map(|i| i as f64).product::<f64>().max(1.0)
}

fn limit_to_distance(k: f64, limits: &Limits, table: &MaterialTable, scheme: Scheme, density: f64, cache: &mut AccessorCaches) -> f64 {
    limits.energy.map_or(f64::INFINITY, |k_limit| {
        let x_now = accessors::grammage(table, scheme, k, cache);
        let x_limit = accessors::grammage(table, scheme, k_limit, cache);
        ((x_now - x_limit).abs() / density.max(1e-300)).max(0.0)
    })
}

/// Advances `state` in-place by one step of the engine. Returns the event
/// bitset that terminated the step (possibly empty, meaning a full-length
/// step with no boundary hit, the normal "keep stepping" case).
///
/// # Errors
///
/// Returns [`crate::error::Error::Physics`] if the direction vector
/// degenerates to zero length, or the magnetic rotation in a single step
/// exceeds `2*pi`.
#[allow(clippy::too_many_arguments)]
pub fn step(
    tables: &PhysicsTables,
    material: MaterialIndex,
    settings: &Settings,
    locals: LocalProperties,
    geometry_step_hint: f64,
    boundary_kind: StepKind,
    mut medium_after: impl FnMut([f64; 3]) -> Option<MaterialIndex>,
    limits: &Limits,
    cache: &mut AccessorCaches,
    straggling: &mut StragglingState,
    prng: &mut dyn Prng,
    state: &mut ProjectileState,
) -> crate::error::Result<EventFlags> {
    if norm(state.direction) < 1e-6 {
        return Err(crate::error::Error::physics("direction vector is not normalised".into()));
    }
    state.direction = normalise(state.direction);

    let table = tables.table(material);
    let mass = settings.particle.mass();
    let k_i = state.kinetic;
    let scheme = settings.energy_loss.scheme();
    let density = locals.density.max(1e-300);
    let p_i = momentum(mass, k_i);

    let x_tot = accessors::grammage(table, scheme, k_i, cache);

    let mut candidates = vec![geometry_step_hint.max(0.0)];
    if !matches!(settings.energy_loss, EnergyLoss::Disabled) {
        let mut d_x = settings.accuracy * x_tot / density;
        if matches!(settings.energy_loss, EnergyLoss::Straggled) {
            let damping = (1.0 / k_i.max(1e-9)).clamp(1.0, 10.0);
            d_x /= damping;
        }
        candidates.push(d_x);
    }
    if matches!(settings.scattering, Scattering::Mixed) {
        let inv_lambda1 = accessors::ms1(table, scheme, k_i, cache);
        if inv_lambda1 > 1e-300 {
            candidates.push(settings.accuracy / (density * inv_lambda1));
        }
    }
    let b_perp = {
        let along = state.direction[0] * locals.magnet[0] + state.direction[1] * locals.magnet[1] + state.direction[2] * locals.magnet[2];
        let perp = [locals.magnet[0] - along * state.direction[0], locals.magnet[1] - along * state.direction[1], locals.magnet[2] - along * state.direction[2]];
        norm(perp)
    };
    if b_perp > 1e-300 {
        let r_larmor = p_i / (b_perp * LARMOR_FACTOR);
        candidates.push(settings.accuracy * r_larmor);
    }

    let mut raw_step = candidates.into_iter().fold(f64::INFINITY, f64::min).max(STEP_MIN);

    let mut boundary = f64::INFINITY;
    let mut boundary_event = EventFlags::empty();

    if let Some(limit) = limits.distance {
        let d = (limit - state.distance).max(0.0);
        if d < boundary {
            boundary = d;
            boundary_event = EventFlags::LIMIT_DISTANCE;
        }
    }
    if let Some(limit) = limits.grammage {
        let d = ((limit - state.grammage) / density).max(0.0);
        if d < boundary {
            boundary = d;
            boundary_event = EventFlags::LIMIT_GRAMMAGE;
        }
    }
    if let Some(limit) = limits.time {
        let beta = p_i / (k_i + mass).max(1e-300);
        let d = ((limit - state.time) / beta.max(1e-6)).max(0.0);
        if d < boundary {
            boundary = d;
            boundary_event = EventFlags::LIMIT_TIME;
        }
    }
    {
        let d = limit_to_distance(k_i, limits, table, scheme, density, cache);
        if d < boundary {
            boundary = d;
            boundary_event = EventFlags::LIMIT_ENERGY;
        }
    }

    if matches!(settings.energy_loss, EnergyLoss::Mixed | EnergyLoss::Straggled) && k_i > table.kt {
        let sigma_del = accessors::cross_section(table, k_i, cache);
        if sigma_del > 1e-300 {
            let u = prng.uniform01().max(1e-300);
            let d = (-u.ln() / sigma_del / density).max(0.0);
            if d < boundary {
                boundary = d;
                boundary_event = EventFlags::VERTEX_DEL;
            }
        }
    }
    if matches!(settings.scattering, Scattering::Mixed) {
        let lb = accessors::lb(table, k_i, cache);
        if lb > 1e-300 {
            let lambda_ehs = lb / (p_i * p_i);
            let u = prng.uniform01().max(1e-300);
            let d = (-u.ln() * lambda_ehs / density).max(0.0);
            if d < boundary {
                boundary = d;
                boundary_event = EventFlags::VERTEX_COULOMB;
            }
        }
    }
    if matches!(settings.decay, Decay::Randomised) {
        let gamma = (k_i + mass) / mass;
        let mean_length = settings.particle.ctau() * gamma;
        let u = prng.uniform01().max(1e-300);
        let d = (-u.ln() * mean_length).max(0.0);
        if d < boundary {
            boundary = d;
            boundary_event = EventFlags::VERTEX_DECAY;
        }
    }

    let mut event = EventFlags::empty();
    if boundary < raw_step {
        raw_step = boundary;
        event = boundary_event;
    }

    let mut tentative = [
        state.position[0] + raw_step * state.direction[0],
        state.position[1] + raw_step * state.direction[1],
        state.position[2] + raw_step * state.direction[2],
    ];

    if let Some(new_material) = medium_after(tentative) {
        if new_material != material && boundary_kind == StepKind::CheckExact {
            let (mut lo, mut hi) = (0.0, raw_step);
            while hi - lo > STEP_MIN {
                let mid = 0.5 * (lo + hi);
                let p = [
                    state.position[0] + mid * state.direction[0],
                    state.position[1] + mid * state.direction[1],
                    state.position[2] + mid * state.direction[2],
                ];
                if medium_after(p) == Some(material) {
                    lo = mid;
                } else {
                    hi = mid;
                }
            }
            raw_step = lo;
            event = EventFlags::MEDIUM;
            tentative = [
                state.position[0] + raw_step * state.direction[0],
                state.position[1] + raw_step * state.direction[1],
                state.position[2] + raw_step * state.direction[2],
            ];
        }
    } else {
        event = EventFlags::MEDIUM;
    }

    state.position = tentative;
    state.distance += raw_step;
    state.grammage += raw_step * density;

    let forward = matches!(settings.direction, Direction::Forward);
    let k_f = match settings.energy_loss {
        EnergyLoss::Disabled => k_i,
        EnergyLoss::Csda | EnergyLoss::Mixed => {
            let dx = raw_step * density;
            let x_new = if forward { x_tot - dx } else { x_tot + dx };
            accessors::k_of_grammage(table, scheme, x_new.max(0.0), cache)
        }
        EnergyLoss::Straggled => {
            let dx = raw_step * density;
            let x_new = if forward { x_tot - dx } else { x_tot + dx };
            let k_mean = accessors::k_of_grammage(table, scheme, x_new.max(0.0), cache);
            let dk_mean = (k_i - k_mean).abs();
            let omega = accessors::straggling(table, k_i, cache);
            let sigma2 = (omega * dx).max(0.0);
            let sigma = sigma2.sqrt();
            let dk = if dk_mean >= 3.0 * sigma {
                dk_mean + sigma * straggling.gaussian(prng)
            } else if dk_mean >= 3f64.sqrt() * sigma {
                let u = prng.uniform01();
                dk_mean + (2.0 * u - 1.0) * 3f64.sqrt() * sigma
            } else {
                let b = dk_mean.max(1e-9);
                let p_mass = (3.0 * sigma2 - dk_mean * dk_mean) / (3.0 * sigma2 + 3.0 * dk_mean * dk_mean).max(1e-300);
                if prng.uniform01() < p_mass {
                    0.0
                } else {
                    prng.uniform01() * b
                }
            };
            if forward { (k_i - dk).max(0.0) } else { k_i + dk }
        }
    };
    state.kinetic = k_f;

    let t_i = accessors::proper_time(table, scheme, k_i, mass, cache);
    let t_f = accessors::proper_time(table, scheme, k_f, mass, cache);
    state.time += (t_f - t_i).abs();

    if b_perp > 1e-300 {
        let rotated = if matches!(scheme, Scheme::Csda) {
            let b_perp_vec = {
                let along = state.direction[0] * locals.magnet[0] + state.direction[1] * locals.magnet[1] + state.direction[2] * locals.magnet[2];
                [
                    locals.magnet[0] - along * state.direction[0],
                    locals.magnet[1] - along * state.direction[1],
                    locals.magnet[2] - along * state.direction[2],
                ]
            };
            let axis = normalise(cross(state.direction, b_perp_vec));
            let angle = larmor_taylor_angle(table, mass, 1.0, b_perp, k_i, k_f, cache);
            rotate_about(state.direction, axis, 0.5 * (1.0 - angle.cos()), if angle >= 0.0 { 0.0 } else { std::f64::consts::PI })
        } else {
            magnetic_rotation(state.direction, locals.magnet, mass, k_i, k_f, raw_step)
        };
        let dot = (rotated[0] * state.direction[0] + rotated[1] * state.direction[1] + rotated[2] * state.direction[2]).clamp(-1.0, 1.0);
        if dot.acos() > std::f64::consts::TAU {
            return Err(crate::error::Error::physics("magnetic rotation exceeded 2 pi in one step".into()));
        }
        state.direction = rotated;
    }

    if matches!(settings.scattering, Scattering::Mixed) {
        let inv1_i = accessors::ms1(table, scheme, k_i, cache);
        let inv1_f = accessors::ms1(table, scheme, k_f, cache);
        for _ in 0..8 {
            let u = prng.uniform01().max(1e-300);
            let mu = -0.25 * raw_step * (inv1_i + inv1_f) * u.ln();
            if mu <= 1.0 {
                let phi = std::f64::consts::TAU * prng.uniform01();
                let axis = {
                    let mut a = cross(state.direction, [0.0, 0.0, 1.0]);
                    if norm(a) < 1e-6 {
                        a = cross(state.direction, [1.0, 0.0, 0.0]);
                    }
                    normalise(a)
                };
                state.direction = rotate_about(state.direction, axis, mu, phi);
                break;
            }
        }
    }

    if !forward {
        let d_i = accessors::dedx(table, scheme, k_i, cache);
        let d_f = accessors::dedx(table, scheme, k_f, cache);
        if d_i > 1e-300 && (d_f - d_i).abs() > 0.0 {
            state.weight *= d_f / d_i;
            event |= EventFlags::WEIGHT;
        }
    }
    if matches!(settings.decay, Decay::Weighted) {
        let dt = (t_f - t_i).abs();
        state.weight *= (-dt / settings.particle.ctau()).exp();
        event |= EventFlags::WEIGHT;
    }

    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dcs::Registry;
    use crate::mdf::MdfDocument;
    use crate::material::{AtomicElement, BaseMaterial, KineticGrid, MaterialComponent};
    use crate::tables::TabulatorSettings;
    use rand_pcg::Pcg64Mcg;
    use rand::{RngCore, SeedableRng};

    struct TestPrng(Pcg64Mcg);
    impl Prng for TestPrng {
        fn uniform01(&mut self) -> f64 {
            (self.0.next_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
        }
    }

    fn rock_tables() -> PhysicsTables {
        let elements = vec![AtomicElement::new("O", 8, 15.999, 95.0, 0).unwrap(), AtomicElement::new("Si", 14, 28.085, 173.0, 1).unwrap()];
        let base = BaseMaterial::new(
            "rock",
            vec![MaterialComponent { element: 0, fraction: 0.52 }, MaterialComponent { element: 1, fraction: 0.48 }],
            2650.0,
            Some(136.4),
            &elements,
        )
        .unwrap();
        let mdf = MdfDocument { elements, bases: vec![base], base_files: vec!["rock.txt".into()], composites: vec![] };
        let grid = KineticGrid::log_spaced(1e-3, 1e4, 40).unwrap();
        PhysicsTables::build(Particle::Muon, mdf, vec![vec![]], grid, TabulatorSettings::default(), &Registry::with_defaults()).unwrap()
    }

    #[test]
    fn csda_step_loses_energy_forward() {
        let tables = rock_tables();
        let settings = Settings {
            particle: Particle::Muon,
            direction: Direction::Forward,
            energy_loss: EnergyLoss::Csda,
            scattering: Scattering::Disabled,
            decay: Decay::Disabled,
            accuracy: 0.1,
            stop_mask: EventFlags::empty(),
        };
        let mut state = ProjectileState { position: [0.0; 3], direction: [0.0, 0.0, 1.0], kinetic: 10.0, weight: 1.0, distance: 0.0, grammage: 0.0, time: 0.0 };
        let mut cache = AccessorCaches::default();
        let mut strag = StragglingState::default();
        let mut rng = TestPrng(Pcg64Mcg::seed_from_u64(1));
        let locals = LocalProperties { density: 2650.0, magnet: [0.0; 3] };
        let event = step(&tables, 0, &settings, locals, 10.0, StepKind::Raw, |_| Some(0), &Limits::default(), &mut cache, &mut strag, &mut rng, &mut state).unwrap();
        assert!(event.is_empty() || event == EventFlags::LIMIT_ENERGY);
        assert!(state.kinetic <= 10.0);
        assert!(state.distance > 0.0);
    }

    #[test]
    fn medium_exit_raises_medium_event() {
        let tables = rock_tables();
        let settings = Settings {
            particle: Particle::Muon,
            direction: Direction::Forward,
            energy_loss: EnergyLoss::Disabled,
            scattering: Scattering::Disabled,
            decay: Decay::Disabled,
            accuracy: 0.1,
            stop_mask: EventFlags::MEDIUM,
        };
        let mut state = ProjectileState { position: [0.0; 3], direction: [0.0, 0.0, 1.0], kinetic: 1.0, weight: 1.0, distance: 0.0, grammage: 0.0, time: 0.0 };
        let mut cache = AccessorCaches::default();
        let mut strag = StragglingState::default();
        let mut rng = TestPrng(Pcg64Mcg::seed_from_u64(2));
        let locals = LocalProperties { density: 2650.0, magnet: [0.0; 3] };
        let event = step(&tables, 0, &settings, locals, 1.0, StepKind::Raw, |_| None, &Limits::default(), &mut cache, &mut strag, &mut rng, &mut state).unwrap();
        assert!(event.contains(EventFlags::MEDIUM));
    }
}
