//! `pumas-core`: a Monte Carlo transport engine for high-energy muons and
//! taus through matter.
//!
//! The crate is layered bottom-up, each module building on the ones above
//! it: [`interpolation`] (monotone cubic interpolation), [`dcs`] (the
//! differential cross section library), [`coulomb`] (Coulomb scattering),
//! [`electronic`] (Bethe-Bloch stopping power), [`tables`] (the physics
//! tabulator), [`accessors`] (property lookups), [`stepping`] (the stepping
//! engine), [`del`] (the discrete energy loss sampler), and [`transport`]
//! (the outer driver). [`material`], [`mdf`], [`dedx`] and [`dump`] handle
//! the data model and its text/binary serialisations; [`error`] and
//! [`random`] are shared infrastructure.

pub mod accessors;
pub mod convert;
pub mod coulomb;
pub mod dcs;
pub mod dedx;
pub mod del;
pub mod dump;
pub mod electronic;
pub mod error;
pub mod interpolation;
pub mod material;
pub mod mdf;
pub mod random;
pub mod stepping;
pub mod tables;
pub mod transport;

pub use error::{Error, Result};
pub use material::MaterialIndex;
pub use tables::{Particle, PhysicsTables, Scheme, TabulatorSettings};

/// Builds [`PhysicsTables`] from an MDF document, a directory of
/// stopping-power tables (one per base material, in MDF order), and the
/// tabulation settings.
///
/// # Errors
///
/// Returns [`Error::Io`] if a stopping-power file cannot be read,
/// [`Error::Format`] if the MDF or a stopping-power file fails to parse,
/// and whatever [`PhysicsTables::build`] itself returns for an invalid
/// configuration.
pub fn build_physics(particle: Particle, mdf_path: &std::path::Path, dedx_dir: &std::path::Path, grid: material::KineticGrid, settings: TabulatorSettings) -> Result<PhysicsTables> {
    let mdf_text = std::fs::read_to_string(mdf_path)?;
    let doc = mdf::parse(&mdf_text)?;

    let mut dedx_rows = Vec::with_capacity(doc.bases.len());
    for file in &doc.base_files {
        let path = dedx_dir.join(file);
        let text = std::fs::read_to_string(&path)?;
        dedx_rows.push(dedx::parse(&text)?);
    }

    let registry = dcs::Registry::with_defaults();
    PhysicsTables::build(particle, doc, dedx_rows, grid, settings, &registry)
}
