//! DCS library (L2): per-element differential cross sections for the four
//! radiative/ionising processes, each with a selectable model, plus their
//! polar-angle samplers. A small process registry seeds the built-in models
//! at start-up and allows runtime registration of additional ones.

pub mod bremsstrahlung;
pub mod ionisation;
pub mod pair_production;
pub mod photonuclear;

use crate::error::{Error, Result};
use crate::material::AtomicElement;
use std::collections::HashMap;

/// A radiative or ionising process.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
pub enum Process {
    /// Bremsstrahlung photon emission.
    Bremsstrahlung,
    /// e+e- pair production.
    PairProduction,
    /// Photonuclear interaction.
    Photonuclear,
    /// Ionisation (close collisions with atomic electrons).
    Ionisation,
}

impl Process {
    /// All processes, in the fixed enumeration order used by `CSn`/`CSf`.
    pub const ALL: [Process; 4] = [
        Process::Bremsstrahlung,
        Process::PairProduction,
        Process::Photonuclear,
        Process::Ionisation,
    ];
}

/// Signature shared by every DCS model: `dcs(element, projectile_mass, K, q)
/// -> m^2/GeV`, where `q` is the kinetic energy transferred.
pub type DcsFn = fn(&AtomicElement, f64, f64, f64) -> f64;

/// Lower/upper bound of the kinematically allowed energy transfer for a
/// process, given the projectile mass and kinetic energy.
pub type RangeFn = fn(&AtomicElement, f64, f64) -> (f64, f64);

/// A `(process, model name) -> function pointer` lookup table. Seeded with
/// the built-in models at construction and open to runtime registration
/// (e.g. from a plugin crate).
pub struct Registry {
    dcs: HashMap<(Process, &'static str), DcsFn>,
    range: HashMap<Process, RangeFn>,
}

impl Registry {
    /// Builds a registry seeded with the built-in models.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut dcs: HashMap<(Process, &'static str), DcsFn> = HashMap::new();
        dcs.insert((Process::Bremsstrahlung, "KKP"), bremsstrahlung::kkp);
        dcs.insert((Process::Bremsstrahlung, "ABB"), bremsstrahlung::abb);
        dcs.insert((Process::Bremsstrahlung, "SSR"), bremsstrahlung::ssr);
        dcs.insert((Process::PairProduction, "KKP"), pair_production::kkp);
        dcs.insert((Process::PairProduction, "SSR"), pair_production::ssr);
        dcs.insert((Process::Photonuclear, "DRSS"), photonuclear::drss);
        dcs.insert((Process::Photonuclear, "BM"), photonuclear::bm);
        dcs.insert((Process::Photonuclear, "BBKS"), photonuclear::bbks);
        dcs.insert((Process::Ionisation, "default"), ionisation::dcs);

        let mut range: HashMap<Process, RangeFn> = HashMap::new();
        range.insert(Process::Bremsstrahlung, bremsstrahlung::range);
        range.insert(Process::PairProduction, pair_production::range);
        range.insert(Process::Photonuclear, photonuclear::range);
        range.insert(Process::Ionisation, ionisation::range);

        Self { dcs, range }
    }

    /// Registers (or overrides) a model for a process at runtime.
    pub fn register(&mut self, process: Process, name: &'static str, f: DcsFn) {
        self.dcs.insert((process, name), f);
    }

    /// Looks up the DCS function for `(process, model)`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the model is unknown for that
    /// process.
    pub fn get(&self, process: Process, model: &str) -> Result<DcsFn> {
        self.dcs
            .get(&(process, model))
            .copied()
            .ok_or_else(|| Error::configuration(format!("unknown model `{model}` for {process:?}")))
    }

    /// Returns the kinematic range `[q_min, q_max]` for a process at a given
    /// `(element, projectile_mass, K)`.
    #[must_use]
    pub fn range(&self, process: Process, element: &AtomicElement, mass: f64, k: f64) -> (f64, f64) {
        (self.range[&process])(element, mass, k)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// The default model triple from spec §6: SSR / SSR / DRSS.
#[must_use]
pub const fn default_models() -> (&'static str, &'static str, &'static str) {
    ("SSR", "SSR", "DRSS")
}
