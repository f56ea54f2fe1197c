//! Transport driver (L9): the outer loop that repeatedly calls the
//! stepping engine, records frames, and applies the user stop-mask, plus
//! the closed-form CSDA fast path for the common disabled-scattering case.

use crate::accessors::AccessorCaches;
use crate::error::{Error, Result};
use crate::material::MaterialIndex;
use crate::random::Prng;
use crate::stepping::{
    self, Direction, EnergyLoss, EventFlags, Limits, LocalProperties, ProjectileState, Scattering, Settings, StepKind, StragglingState,
};
use crate::tables::{PhysicsTables, Scheme};

/// A single recorded transport frame.
#[derive(Clone, Copy, Debug)]
pub struct Frame {
    /// Projectile state at the frame.
    pub state: ProjectileState,
    /// Material the frame was recorded in.
    pub material: MaterialIndex,
    /// Event(s) that produced this frame (empty for the start frame).
    pub event: EventFlags,
}

/// User recorder callback, invoked at every boundary/event and at the
/// configured record period.
pub trait Recorder {
    /// Called with each frame, in chronological order.
    fn record(&mut self, frame: Frame);
}

impl<F: FnMut(Frame)> Recorder for F {
    fn record(&mut self, frame: Frame) {
        self(frame);
    }
}

const UNIT_TOLERANCE: f64 = 1e-6;

fn is_unit_normalised(v: [f64; 3]) -> bool {
    let n2 = v[0] * v[0] + v[1] * v[1] + v[2] * v[2];
    (n2 - 1.0).abs() <= UNIT_TOLERANCE.sqrt()
}

/// A single transport call: physics tables, mode settings, and the
/// geometry/PRNG collaborators, bundled for repeated use across many
/// projectiles.
pub struct SimulationContext<'a> {
    /// Immutable physics tables, shared across contexts/threads.
    pub tables: &'a PhysicsTables,
    /// Mode configuration.
    pub settings: Settings,
    /// Record period in steps (0 disables periodic recording; boundary
    /// events are always recorded).
    pub record_period: u32,
    caches: AccessorCaches,
    straggling: StragglingState,
}

impl<'a> SimulationContext<'a> {
    /// Creates a new context over `tables` with the given mode `settings`.
    #[must_use]
    pub fn new(tables: &'a PhysicsTables, settings: Settings) -> Self {
        Self { tables, settings, record_period: 0, caches: AccessorCaches::default(), straggling: StragglingState::default() }
    }

    /// Runs a full transport from `state` until a stop-mask event fires or
    /// the geometry reports leaving it (medium callback returns `None`).
    ///
    /// `medium` maps a position to `(material, geometric step hint,
    /// boundary kind)`; `locals` maps `(material, state)` to local
    /// properties and a uniformity step hint; `limits` bound the
    /// trajectory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the initial direction is not
    /// unit-normalised, or if a backward tau is requested with
    /// decay-weighted mode. Propagates [`Error::Physics`] from the
    /// stepping engine.
    pub fn run(
        &mut self,
        mut state: ProjectileState,
        mut medium: impl FnMut([f64; 3]) -> Option<(MaterialIndex, f64, StepKind)>,
        mut locals: impl FnMut(MaterialIndex, &ProjectileState) -> (LocalProperties, f64),
        limits: &Limits,
        prng: &mut dyn Prng,
        mut recorder: impl Recorder,
    ) -> Result<ProjectileState> {
        if !is_unit_normalised(state.direction) {
            return Err(Error::configuration("initial direction is not unit-normalised".into()));
        }
        if matches!(self.settings.particle, crate::tables::Particle::Tau)
            && matches!(self.settings.direction, Direction::Backward)
            && matches!(self.settings.decay, crate::stepping::Decay::Weighted)
        {
            return Err(Error::configuration("backward tau cannot use decay-weighted mode".into()));
        }

        let Some((material0, _, _)) = medium(state.position) else {
            return Err(Error::configuration("initial position is outside the geometry".into()));
        };

        if self.mode_allows_fast_path(material0) {
            let (local_props0, _) = locals(material0, &state);
            if local_props0.magnet == [0.0; 3] {
                if let Some(result) = self.try_csda_fast_path(material0, state, limits, &mut medium)? {
                    return Ok(result);
                }
            }
        }

        recorder.record(Frame { state, material: material0, event: EventFlags::empty() });

        let mut material = material0;
        let mut steps_since_record = 0u32;
        loop {
            let Some((current_material, geometry_hint, step_kind)) = medium(state.position) else {
                recorder.record(Frame { state, material, event: EventFlags::MEDIUM });
                return Ok(state);
            };
            material = current_material;
            let (local_props, locals_hint) = locals(material, &state);
            let hint = if locals_hint > 0.0 { geometry_hint.min(locals_hint) } else { geometry_hint };

            let event = stepping::step(
                self.tables,
                material,
                &self.settings,
                local_props,
                hint,
                step_kind,
                |p| medium(p).map(|(m, _, _)| m),
                limits,
                &mut self.caches,
                &mut self.straggling,
                prng,
                &mut state,
            )?;

            steps_since_record += 1;
            let periodic_due = self.record_period > 0 && steps_since_record >= self.record_period;
            if !event.is_empty() || periodic_due {
                recorder.record(Frame { state, material, event });
                steps_since_record = 0;
            }

            if event.intersects(self.settings.stop_mask) || event.contains(EventFlags::MEDIUM) {
                return Ok(state);
            }
        }
    }

    /// Mode-only prefilter: scattering disabled and energy loss at most
    /// CSDA. Does not by itself establish that the medium is infinite or
    /// unmagnetised; callers must additionally check the local field and
    /// probe the medium for a crossing (see [`Self::try_csda_fast_path`]).
    fn mode_allows_fast_path(&self, material: MaterialIndex) -> bool {
        matches!(self.settings.scattering, Scattering::Disabled)
            && matches!(self.settings.energy_loss, EnergyLoss::Disabled | EnergyLoss::Csda)
            && self.tables.n_materials() > material
    }

    /// Closed-form CSDA branch: advances `K`, `X`, `T`, position and weight
    /// in one shot via the analytical inverse tables. Only valid for an
    /// infinite, non-magnetised, scatter-disabled, at-most-CSDA medium; the
    /// caller has already checked the field, and this probes the medium
    /// callback at the prospective end position to confirm no boundary was
    /// crossed over the whole step. Returns `Ok(None)` (no state mutated)
    /// when the probe finds a crossing, so the caller can fall back to the
    /// general stepping loop instead.
    fn try_csda_fast_path(
        &mut self,
        material: MaterialIndex,
        mut state: ProjectileState,
        limits: &Limits,
        medium: &mut impl FnMut([f64; 3]) -> Option<(MaterialIndex, f64, StepKind)>,
    ) -> Result<Option<ProjectileState>> {
        let table = self.tables.table(material);
        let mass = self.settings.particle.mass();
        let scheme = Scheme::Csda;
        let k_i = state.kinetic;
        let x_i = crate::accessors::grammage(table, scheme, k_i, &mut self.caches);

        let Some(k_limit) = limits.energy else {
            return Err(Error::configuration("infinite uniform medium requires an energy limit".into()));
        };
        let forward = matches!(self.settings.direction, Direction::Forward);
        let x_limit = crate::accessors::grammage(table, scheme, k_limit, &mut self.caches);
        let dx = (x_limit - x_i).abs();

        let x_f = if forward { (x_i - dx).max(0.0) } else { x_i + dx };
        let k_f = crate::accessors::k_of_grammage(table, scheme, x_f, &mut self.caches);
        let ds = (x_f - x_i).abs();

        let end_position =
            [state.position[0] + ds * state.direction[0], state.position[1] + ds * state.direction[1], state.position[2] + ds * state.direction[2]];
        match medium(end_position) {
            Some((end_material, _, _)) if end_material == material => {}
            _ => return Ok(None),
        }

        state.kinetic = k_f;
        state.distance += ds;
        state.grammage += ds;
        state.position = end_position;
        let t_i = crate::accessors::proper_time(table, scheme, k_i, mass, &mut self.caches);
        let t_f = crate::accessors::proper_time(table, scheme, k_f, mass, &mut self.caches);
        state.time += (t_f - t_i).abs();

        Ok(Some(state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dcs::Registry;
    use crate::mdf::MdfDocument;
    use crate::material::{AtomicElement, BaseMaterial, KineticGrid, MaterialComponent};
    use crate::stepping::Decay;
    use crate::tables::{Particle, TabulatorSettings};

    struct SeqPrng(u64);
    impl Prng for SeqPrng {
        fn uniform01(&mut self) -> f64 {
            self.0 = self.0.wrapping_add(1);
            0.5
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
    fn csda_fast_path_reaches_energy_limit() {
        let tables = rock_tables();
        let settings = Settings {
            particle: Particle::Muon,
            direction: Direction::Forward,
            energy_loss: EnergyLoss::Csda,
            scattering: Scattering::Disabled,
            decay: Decay::Disabled,
            accuracy: 0.1,
            stop_mask: EventFlags::LIMIT_ENERGY,
        };
        let mut ctx = SimulationContext::new(&tables, settings);
        let state = ProjectileState { position: [0.0; 3], direction: [0.0, 0.0, 1.0], kinetic: 1.0, weight: 1.0, distance: 0.0, grammage: 0.0, time: 0.0 };
        let limits = Limits { energy: Some(1e-3), ..Limits::default() };
        let mut prng = SeqPrng(0);
        let out = ctx
            .run(state, |_| Some((0, 1e9, StepKind::Raw)), |_, _| (LocalProperties { density: 2650.0, magnet: [0.0; 3] }, -1.0), &limits, &mut prng, |_: Frame| {})
            .unwrap();
        assert!(out.kinetic <= 1.0);
        assert!(out.distance > 0.0);
    }

    #[test]
    fn rejects_non_unit_direction() {
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
        let mut ctx = SimulationContext::new(&tables, settings);
        let state = ProjectileState { position: [0.0; 3], direction: [0.0, 0.0, 2.0], kinetic: 1.0, weight: 1.0, distance: 0.0, grammage: 0.0, time: 0.0 };
        let mut prng = SeqPrng(0);
        let result = ctx.run(state, |_| Some((0, 1.0, StepKind::Raw)), |_, _| (LocalProperties { density: 2650.0, magnet: [0.0; 3] }, -1.0), &Limits::default(), &mut prng, |_: Frame| {});
        assert!(result.is_err());
    }
}
