//! Tabulator (L5): builds `PhysicsTables` for every material and
//! kinetic-energy node from the per-element DCS library, the Coulomb
//! module and the electronic energy loss model.

use crate::coulomb::{self, PoleReduction, ScreeningParams, MU_SOFT_MAX};
use crate::dcs::pair_production::gauss_integrate;
use crate::dcs::{Process, Registry};
use crate::dedx::DedxRow;
use crate::electronic::{self, MaterialOscillators};
use crate::error::{Error, Result};
use crate::interpolation::Pchip;
use crate::material::{AtomicElement, BaseMaterial, CompositeMaterial, KineticGrid, MaterialIndex};
use crate::mdf::MdfDocument;

const AVOGADRO: f64 = 6.022_140_76e23; // 1/mol
const EHS_PATH_MAX: f64 = 1e10; // kg/m^2
const N_LARMOR: usize = 8;

/// Atoms per kilogram of a pure element with molar mass `a_g_mol` g/mol.
fn atoms_per_kg(a_g_mol: f64) -> f64 {
    AVOGADRO * 1000.0 / a_g_mol
}

/// Particle identity: only muon and tau are modelled (spec §1).
#[derive(Clone, Copy, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
pub enum Particle {
    /// The muon, mass 0.105_658_39 GeV.
    Muon,
    /// The tau, mass 1.776_86 GeV.
    Tau,
}

impl Particle {
    /// Rest mass, GeV.
    #[must_use]
    pub const fn mass(self) -> f64 {
        match self {
            Self::Muon => 0.105_658_39,
            Self::Tau => 1.776_86,
        }
    }

    /// Proper lifetime `c*tau`, m.
    #[must_use]
    pub const fn ctau(self) -> f64 {
        match self {
            Self::Muon => 658.654,
            Self::Tau => 87.03e-6,
        }
    }
}

/// Settings controlling the tabulator, mirroring the `PhysicsSettings` of
/// spec §6 (sans the I/O-only fields `update`/`dry`, handled by the
/// construction driver rather than the tabulator itself).
#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct TabulatorSettings {
    /// Fractional CEL/DEL cutoff `x_cut`, in `(0, 1)`.
    pub cutoff: f64,
    /// Target ratio of hard to soft Coulomb scattering, in `(0, 1)`.
    pub elastic_ratio: f64,
    /// Bremsstrahlung model name.
    pub bremsstrahlung_model: String,
    /// Pair-production model name.
    pub pair_production_model: String,
    /// Photonuclear model name.
    pub photonuclear_model: String,
}

impl Default for TabulatorSettings {
    fn default() -> Self {
        let (b, p, n) = crate::dcs::default_models();
        Self {
            cutoff: 0.05,
            elastic_ratio: 0.05,
            bremsstrahlung_model: b.to_string(),
            pair_production_model: p.to_string(),
            photonuclear_model: n.to_string(),
        }
    }
}

impl TabulatorSettings {
    fn validate(&self) -> Result<()> {
        if !(0.0 < self.cutoff && self.cutoff < 1.0) {
            return Err(Error::configuration("cutoff must be in (0, 1)".into()));
        }
        if !(0.0 < self.elastic_ratio && self.elastic_ratio < 1.0) {
            return Err(Error::configuration("elastic_ratio must be in (0, 1)".into()));
        }
        Ok(())
    }
}

/// Discrete-energy-loss scheme, used to index `Ms1`/endpoint asymptotics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub enum Scheme {
    /// All losses treated deterministically.
    Disabled,
    /// Continuous slowing down approximation.
    Csda,
    /// CEL below `x_cut`, DEL above.
    Mixed,
}

/// Per-material, per-`K`-node tables (spec §3's `PhysicsTables` entry for
/// one material).
#[derive(Clone, serde::Deserialize, serde::Serialize)]
pub struct MaterialTable {
    /// Shared kinetic-energy grid.
    pub grid: KineticGrid,
    /// `dE/dX` under CSDA, GeV m^2/kg.
    pub dedx_csda: Pchip,
    /// `dE/dX` restricted to the CEL part (below cutoff), GeV m^2/kg.
    pub dedx_mixed: Pchip,
    /// CSDA grammage, `K -> X`, kg/m^2.
    pub x_csda: Pchip,
    /// Mixed-mode grammage, `K -> X`, kg/m^2.
    pub x_mixed: Pchip,
    /// `X -> K` inverse of `x_csda`.
    pub k_of_x_csda: Pchip,
    /// `X -> K` inverse of `x_mixed`.
    pub k_of_x_mixed: Pchip,
    /// CSDA proper time, `K -> T`, m/c.
    pub t_csda: Pchip,
    /// Mixed-mode proper time, `K -> T`, m/c.
    pub t_mixed: Pchip,
    /// `T -> K` inverse of `t_mixed`.
    pub k_of_t_mixed: Pchip,
    /// Energy-loss straggling variance per grammage.
    pub omega: Pchip,
    /// Cumulative count of inelastic-DEL interaction lengths.
    pub ni_in: Pchip,
    /// `NI_in -> K` inverse.
    pub k_of_ni_in: Pchip,
    /// Cumulative count of elastic hard-scatter interaction lengths.
    pub ni_el: Pchip,
    /// Total inelastic DEL macroscopic cross section, m^2/kg.
    pub cs: Pchip,
    /// Cumulative per-(process,element) fraction of `CS`, one `Pchip` per
    /// linear index, values in `[0, 1]`, last one pinned to exactly 1.
    pub csf: Vec<Pchip>,
    /// `(process, element)` pairs in the same linear order as `csf`.
    pub csf_index: Vec<(Process, usize)>,
    /// Per-(process, element) macroscopic cross section, for composite
    /// linear combination.
    pub csn: Vec<Pchip>,
    /// Hard-Coulomb cutoff parameter `mu_0(K)`.
    pub mu0: Pchip,
    /// `p^2`-scaled hard-scatter mean free path.
    pub lb: Pchip,
    /// First transport path length (`1/lambda_1`) for each scheme.
    pub ms1: [Pchip; 3],
    /// Cumulative Larmor moments, orders `0..=N_LARMOR`.
    pub li: Vec<Pchip>,
    /// DEL threshold: smallest `K` with non-zero discrete cross section.
    pub kt: f64,
    /// Asymptotic ionisation-plateau slope, used above the last node.
    pub a_max: f64,
    /// Asymptotic radiative slope per scheme, used above the last node.
    pub b_max: [f64; 3],
}

/// The full set of physics tables: one [`MaterialTable`] per material
/// index, `[0, N_base)` for base materials then `[N_base, N_base +
/// N_composite)` for composites.
#[derive(Clone, serde::Deserialize, serde::Serialize)]
pub struct PhysicsTables {
    /// Transported particle.
    pub particle: Particle,
    /// Declared elements.
    pub elements: Vec<AtomicElement>,
    /// Declared base materials.
    pub bases: Vec<BaseMaterial>,
    /// Declared composite materials.
    pub composites: Vec<CompositeMaterial>,
    /// Shared kinetic-energy grid.
    pub grid: KineticGrid,
    /// Per-material tables, `bases` then `composites`.
    pub tables: Vec<MaterialTable>,
    /// Settings used to build this object.
    pub settings: TabulatorSettings,
}

impl PhysicsTables {
    /// Number of base materials.
    #[must_use]
    pub fn n_base(&self) -> usize {
        self.bases.len()
    }

    /// Total number of materials (base + composite).
    #[must_use]
    pub fn n_materials(&self) -> usize {
        self.tables.len()
    }

    /// Builds the full set of tables from a parsed MDF, one stopping-power
    /// row set per base material (parallel to `mdf.bases`), the shared
    /// kinetic grid, tabulator settings and DCS registry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if settings are invalid, or
    /// propagates registry lookup errors for unknown model names.
    pub fn build(
        particle: Particle,
        mdf: MdfDocument,
        dedx_rows: Vec<Vec<DedxRow>>,
        grid: KineticGrid,
        settings: TabulatorSettings,
        registry: &Registry,
    ) -> Result<Self> {
        settings.validate()?;
        if dedx_rows.len() != mdf.bases.len() {
            return Err(Error::configuration("one stopping-power row set is required per base material".into()));
        }

        let mass = particle.mass();
        let brems = registry.get(Process::Bremsstrahlung, &settings.bremsstrahlung_model)?;
        let pair = registry.get(Process::PairProduction, &settings.pair_production_model)?;
        let photo = registry.get(Process::Photonuclear, &settings.photonuclear_model)?;
        registry.get(Process::Ionisation, "default")?; // sanity check only: called directly below

        let mut base_tables = Vec::with_capacity(mdf.bases.len());
        for (base, rows) in mdf.bases.iter().zip(dedx_rows.iter()) {
            base_tables.push(build_base_table(mass, &mdf.elements, base, rows, &grid, &settings, brems, pair, photo)?);
        }

        let mut composite_tables = Vec::with_capacity(mdf.composites.len());
        for composite in &mdf.composites {
            composite_tables.push(build_composite_table(mass, &mdf.elements, &mdf.bases, composite, &grid, &settings, brems, pair, photo)?);
        }

        let mut tables = base_tables;
        tables.extend(composite_tables);

        Ok(Self { particle, elements: mdf.elements, bases: mdf.bases, composites: mdf.composites, grid, tables, settings })
    }

    /// Looks up a material table by its combined `[0, N_base+N_composite)`
    /// index.
    #[must_use]
    pub fn table(&self, material: MaterialIndex) -> &MaterialTable {
        &self.tables[material]
    }

    /// Recomputes the per-process stopping-power breakdown for a material,
    /// at its own grid nodes, in the text format of [`crate::dedx`]: used by
    /// the stopping-power-table generation workflow of spec §6, the
    /// reverse of [`crate::dedx::parse`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if a configured model name is no
    /// longer registered.
    pub fn dedx_breakdown(&self, material: MaterialIndex, registry: &Registry) -> Result<Vec<DedxRow>> {
        let components: Vec<(usize, f64)> = if material < self.bases.len() {
            self.bases[material].components.iter().map(|c| (c.element, c.fraction)).collect()
        } else {
            self.composites[material - self.bases.len()].element_fractions(&self.bases)
        };
        let mass = self.particle.mass();
        let brems = registry.get(Process::Bremsstrahlung, &self.settings.bremsstrahlung_model)?;
        let pair = registry.get(Process::PairProduction, &self.settings.pair_production_model)?;
        let photo = registry.get(Process::Photonuclear, &self.settings.photonuclear_model)?;
        let table = self.table(material);
        let mut cache = crate::interpolation::IndexCache::new();

        let mut rows = Vec::with_capacity(self.grid.len());
        for &k in self.grid.nodes() {
            let mut brems_dedx = 0.0;
            let mut pair_dedx = 0.0;
            let mut photo_dedx = 0.0;
            for &(element_idx, fraction) in &components {
                let element = &self.elements[element_idx];
                let weight = fraction * atoms_per_kg(element.a);
                for (process, model, dest) in [
                    (Process::Bremsstrahlung, brems, &mut brems_dedx),
                    (Process::PairProduction, pair, &mut pair_dedx),
                    (Process::Photonuclear, photo, &mut photo_dedx),
                ] {
                    let (q_min, q_max) = registry.range(process, element, mass, k);
                    if q_max > q_min {
                        *dest += weight * radiative_integral(|q| model(element, mass, k, q), q_min, q_max, 1);
                    }
                }
            }
            let total = table.dedx_csda.eval(k, &mut cache);
            let ionisation_dedx = (total - brems_dedx - pair_dedx - photo_dedx).max(0.0);
            let x_csda = table.x_csda.eval(k, &mut cache);
            rows.push(DedxRow { k, brems: brems_dedx, pair: pair_dedx, photonuclear: photo_dedx, ionisation: ionisation_dedx, total, x_csda });
        }
        Ok(rows)
    }
}

/// Per-`K`-node accumulator for one material's element-summed quantities.
/// Ionisation's mean energy loss is not folded in here: the CSDA total is
/// taken from [`electronic::mean_stopping`] (Bethe-Bloch with the density
/// effect) and only its above-cutoff tail, `ion_mean_above`, is needed to
/// split it into the mixed-scheme CEL/DEL parts.
struct NodeAccumulator {
    dedx_csda_radiative: f64,
    dedx_mixed_radiative: f64,
    ion_mean_above: f64,
    omega: f64,
    cs_per_pair: Vec<f64>, // parallel to csf_index
    cs_total: f64,
}

fn radiative_integral(f: impl Fn(f64) -> f64, q_lo: f64, q_hi: f64, moment: i32) -> f64 {
    if q_hi <= q_lo {
        return 0.0;
    }
    // substitution q = exp(u), dq = q du, so integral q^m f(q) dq = integral
    // q^(m+1) f(q) du over u in [ln q_lo, ln q_hi].
    gauss_integrate(q_lo.ln(), q_hi.ln(), |u| {
        let q = u.exp();
        q.powi(moment + 1) * f(q)
    })
}

#[allow(clippy::too_many_arguments)]
fn node_accumulator(
    mass: f64,
    k: f64,
    elements: &[AtomicElement],
    components: &[(usize, f64)],
    csf_index: &[(Process, usize)],
    cutoff: f64,
    brems: crate::dcs::DcsFn,
    pair: crate::dcs::DcsFn,
    photo: crate::dcs::DcsFn,
) -> NodeAccumulator {
    let q_cut = cutoff * k;
    let mut dedx_csda_radiative = 0.0;
    let mut dedx_mixed_radiative = 0.0;
    let mut ion_mean_above = 0.0;
    let mut omega = 0.0;
    let mut cs_per_pair = vec![0.0; csf_index.len()];
    let mut cs_total = 0.0;

    for &(element_idx, fraction) in components {
        let element = &elements[element_idx];
        let weight = fraction * atoms_per_kg(element.a);

        // ionisation: closed-form moments. The mean energy loss itself is
        // not accumulated here (see `electronic::mean_stopping`); only the
        // above-cutoff tail, the interaction count and the below-cutoff
        // straggling variance are needed from the DCS directly.
        let (q_min, q_max) = crate::dcs::ionisation::range(element, mass, k);
        if q_max > q_min {
            let q_split = q_cut.clamp(q_min, q_max);
            let mean_above = crate::dcs::ionisation::moment(element, mass, k, q_split, q_max, 1);
            let count_above = crate::dcs::ionisation::moment(element, mass, k, q_split, q_max, 0);
            let omega_below = crate::dcs::ionisation::moment(element, mass, k, q_min, q_split, 2);

            ion_mean_above += weight * mean_above;
            omega += weight * omega_below;
            cs_total += weight * count_above;
            if let Some(i) = csf_index.iter().position(|&(p, e)| p == Process::Ionisation && e == element_idx) {
                cs_per_pair[i] += weight * count_above;
            }
        }

        // radiative processes: numeric quadrature.
        for (process, model) in [(Process::Bremsstrahlung, brems), (Process::PairProduction, pair), (Process::Photonuclear, photo)] {
            let (q_min, q_max) = match process {
                Process::Bremsstrahlung => crate::dcs::bremsstrahlung::range(element, mass, k),
                Process::PairProduction => crate::dcs::pair_production::range(element, mass, k),
                Process::Photonuclear => crate::dcs::photonuclear::range(element, mass, k),
                Process::Ionisation => unreachable!(),
            };
            if q_max <= q_min {
                continue;
            }
            let q_split = q_cut.clamp(q_min, q_max);
            let f = |q: f64| model(element, mass, k, q);

            let mean_below = radiative_integral(f, q_min, q_split, 1);
            let mean_above = radiative_integral(f, q_split, q_max, 1);
            let count_above = radiative_integral(f, q_split, q_max, 0);
            let omega_below = radiative_integral(f, q_min, q_split, 2);

            dedx_mixed_radiative += weight * mean_below;
            dedx_csda_radiative += weight * (mean_below + mean_above);
            omega += weight * omega_below;
            cs_total += weight * count_above;
            if let Some(i) = csf_index.iter().position(|&(p, e)| p == process && e == element_idx) {
                cs_per_pair[i] += weight * count_above;
            }
        }
    }

    NodeAccumulator { dedx_csda_radiative, dedx_mixed_radiative, ion_mean_above, omega, cs_per_pair, cs_total }
}

/// Mass-fraction-weighted `<Z/A>` from a flattened element list.
fn z_over_a_of(elements: &[AtomicElement], components: &[(usize, f64)]) -> f64 {
    components.iter().map(|&(e, f)| f * f64::from(elements[e].z) / elements[e].a).sum()
}

/// Bragg's additivity rule for the mean excitation energy: `ln I = (1/<Z/A>)
/// sum_i f_i (Z_i/A_i) ln I_i`, used whenever the MDF does not override `I`
/// directly.
fn mean_excitation_of(elements: &[AtomicElement], components: &[(usize, f64)], z_over_a: f64) -> f64 {
    let weighted_ln: f64 = components
        .iter()
        .map(|&(e, f)| {
            let el = &elements[e];
            f * f64::from(el.z) / el.a * el.mean_excitation.ln()
        })
        .sum();
    (weighted_ln / z_over_a.max(1e-300)).exp()
}

fn build_csf_index(elements: &[(usize, f64)]) -> Vec<(Process, usize)> {
    let mut out = Vec::with_capacity(Process::ALL.len() * elements.len());
    for &process in &Process::ALL {
        for &(element, _) in elements {
            out.push((process, element));
        }
    }
    out
}

/// Shared scattering pass (step 6 of spec §4.5): computes `Mu0`, `Lb`,
/// `Ms1` and the Larmor moments from the per-element screening parameters,
/// common to both base and composite materials (it is never linear in
/// composition, so composites recompute it from scratch).
fn scattering_pass(
    mass: f64,
    elements: &[AtomicElement],
    components: &[(usize, f64)],
    grid: &KineticGrid,
    elastic_ratio: f64,
    dedx_csda_values: &[f64],
    x_csda_values: &[f64],
) -> (Pchip, Pchip, [Pchip; 3]) {
    let nodes = grid.nodes();
    let mut mu0_values = vec![0.0; nodes.len()];
    let mut lb_values = vec![0.0; nodes.len()];
    let mut ms1_mixed_values = vec![0.0; nodes.len()];

    for (i, &k) in nodes.iter().enumerate() {
        let p2 = k * (k + 2.0 * mass);
        let p = p2.max(0.0).sqrt();

        let mut per_element: Vec<(f64, PoleReduction)> = Vec::with_capacity(components.len());
        for &(element_idx, fraction) in components {
            let element = &elements[element_idx];
            let screening = ScreeningParams::new(element, p.max(1e-9));
            let pr = PoleReduction::new(&screening);
            per_element.push((fraction * atoms_per_kg(element.a), pr));
        }

        let sigma_rest = |mu: f64| -> f64 { per_element.iter().map(|(w, pr)| w * pr.restricted_cross_section(mu)).sum() };
        let transport = |mu: f64| -> f64 { per_element.iter().map(|(w, pr)| w * pr.transport_coefficient(mu)).sum() };

        let lambda1_full = transport(0.0).max(1e-300);
        let x_csda = x_csda_values[i].max(1e-300);
        let sigma_hard_target = (lambda1_full.max(1.0 / x_csda) / elastic_ratio).max(1.0 / EHS_PATH_MAX);

        let mu0 = if sigma_rest(0.0) <= sigma_hard_target {
            0.0
        } else if sigma_rest(MU_SOFT_MAX) >= sigma_hard_target {
            MU_SOFT_MAX
        } else {
            coulomb::ridders(|mu| sigma_rest(mu) - sigma_hard_target, 0.0, MU_SOFT_MAX, 1e-12)
        };

        let sigma_hard_actual = sigma_rest(mu0).max(1e-300);
        mu0_values[i] = mu0;
        lb_values[i] = p2 / sigma_hard_actual;
        ms1_mixed_values[i] = (transport(0.0) - transport(mu0)).max(0.0);

        let _ = dedx_csda_values[i]; // reserved for future endpoint refinement
    }

    let mu0 = Pchip::new(nodes, &mu0_values);
    let lb = Pchip::new(nodes, &lb_values);
    let disabled = Pchip::new(nodes, &vec![0.0; nodes.len()]);
    let mixed = Pchip::new(nodes, &ms1_mixed_values);
    let csda = mixed.clone();
    (mu0, lb, [disabled, csda, mixed])
}

fn larmor_moments(mass: f64, grid: &KineticGrid, t_mixed: &Pchip) -> Vec<Pchip> {
    let nodes = grid.nodes();
    let mut cache = crate::interpolation::IndexCache::new();
    let mut out = Vec::with_capacity(N_LARMOR + 1);
    for n in 0..=N_LARMOR {
        let values: Vec<f64> = nodes
            .iter()
            .map(|&k| {
                let t = t_mixed.eval(k, &mut cache);
                let p = (k * (k + 2.0 * mass)).max(1e-300).sqrt();
                t.powi(n as i32) / p
            })
            .collect();
        let y_pchip = Pchip::new(nodes, &values);
        let cumulative = y_pchip.cumulative();
        out.push(Pchip::new(nodes, &cumulative));
    }
    out
}

fn regularise_threshold(cs: &[f64], dedx_mixed: &[f64], dedx_csda: &mut [f64], nodes: &[f64]) -> f64 {
    let Some(first_nonzero) = cs.iter().position(|&c| c > 0.0) else {
        return nodes[nodes.len() - 1];
    };
    if first_nonzero == 0 {
        return nodes[0];
    }
    // plateau: below the threshold, pin dedx_csda to dedx_mixed (no discrete
    // part yet), preserving the average energy loss.
    for i in 0..first_nonzero {
        dedx_csda[i] = dedx_mixed[i];
    }
    nodes[first_nonzero]
}

/// Overrides `dedx_csda`/`dedx_mixed` at grid nodes that fall within the
/// measured range of `rows`, per spec §4.5 Step 1 ("parse the per-material
/// stopping-power table to initialise `dE_csda`, `dE_mixed`..."). Nodes
/// outside the measured `K` range keep the DCS/Bethe-Bloch-derived value,
/// since the external table has nothing to say there. `dedx_mixed` is
/// rescaled by the same factor as `dedx_csda` so the CEL/DEL split already
/// computed from the DCS tables is preserved rather than discarded.
fn apply_dedx_rows_override(nodes: &[f64], dedx_csda: &mut [f64], dedx_mixed: &mut [f64], rows: &[DedxRow]) {
    if rows.len() < 2 {
        return;
    }
    let mut sorted: Vec<DedxRow> = rows.to_vec();
    sorted.sort_by(|a, b| a.k.partial_cmp(&b.k).expect("row K is finite"));
    let ln_k: Vec<f64> = sorted.iter().map(|r| r.k.max(1e-300).ln()).collect();
    let ln_total: Vec<f64> = sorted.iter().map(|r| r.total.max(1e-300).ln()).collect();
    let measured = Pchip::new(&ln_k, &ln_total);
    let mut cache = crate::interpolation::IndexCache::default();
    let k_min = sorted[0].k;
    let k_max = sorted[sorted.len() - 1].k;

    for (i, &k) in nodes.iter().enumerate() {
        if k < k_min || k > k_max {
            continue;
        }
        let overridden = measured.eval(k.max(1e-300).ln(), &mut cache).exp();
        let ratio = overridden / dedx_csda[i].max(1e-300);
        dedx_csda[i] = overridden;
        dedx_mixed[i] *= ratio;
    }
}

#[allow(clippy::too_many_arguments)]
fn build_base_table(
    mass: f64,
    elements: &[AtomicElement],
    base: &BaseMaterial,
    dedx_rows: &[DedxRow],
    grid: &KineticGrid,
    settings: &TabulatorSettings,
    brems: crate::dcs::DcsFn,
    pair: crate::dcs::DcsFn,
    photo: crate::dcs::DcsFn,
) -> Result<MaterialTable> {
    let components: Vec<(usize, f64)> = base.components.iter().map(|c| (c.element, c.fraction)).collect();
    let z_over_a = base.z_over_a;
    let mean_excitation = base.mean_excitation_override.unwrap_or_else(|| mean_excitation_of(elements, &components, z_over_a));
    let oscillators = material_oscillators(elements, &components, mean_excitation, base.density, z_over_a);

    let (mut dedx_csda, mut dedx_mixed, omega, cs, cs_per_pair, csf_index, kt) =
        tabulate_node_loop(mass, elements, &components, grid, settings, brems, pair, photo, z_over_a, mean_excitation, &oscillators);
    apply_dedx_rows_override(grid.nodes(), &mut dedx_csda, &mut dedx_mixed, dedx_rows);

    finish_material_table(mass, grid.nodes(), dedx_csda, dedx_mixed, omega, cs, cs_per_pair, csf_index, kt, elements, &components, settings)
}

#[allow(clippy::too_many_arguments)]
fn build_composite_table(
    mass: f64,
    elements: &[AtomicElement],
    bases: &[BaseMaterial],
    composite: &CompositeMaterial,
    grid: &KineticGrid,
    settings: &TabulatorSettings,
    brems: crate::dcs::DcsFn,
    pair: crate::dcs::DcsFn,
    photo: crate::dcs::DcsFn,
) -> Result<MaterialTable> {
    let components = composite.element_fractions(bases);
    let z_over_a = z_over_a_of(elements, &components);
    let mean_excitation = mean_excitation_of(elements, &components, z_over_a);
    let oscillators = material_oscillators(elements, &components, mean_excitation, composite.density, z_over_a);

    let (dedx_csda, dedx_mixed, omega, cs, cs_per_pair, csf_index, kt) =
        tabulate_node_loop(mass, elements, &components, grid, settings, brems, pair, photo, z_over_a, mean_excitation, &oscillators);

    finish_material_table(mass, grid.nodes(), dedx_csda, dedx_mixed, omega, cs, cs_per_pair, csf_index, kt, elements, &components, settings)
}

/// Runs the per-`K` accumulation pass common to base and composite
/// materials: per-element radiative DCS integrals plus the Bethe-Bloch
/// ionisation total, split into the CSDA/mixed stopping-power tables.
#[allow(clippy::too_many_arguments)]
fn tabulate_node_loop(
    mass: f64,
    elements: &[AtomicElement],
    components: &[(usize, f64)],
    grid: &KineticGrid,
    settings: &TabulatorSettings,
    brems: crate::dcs::DcsFn,
    pair: crate::dcs::DcsFn,
    photo: crate::dcs::DcsFn,
    z_over_a: f64,
    mean_excitation: f64,
    oscillators: &MaterialOscillators,
) -> (Vec<f64>, Vec<f64>, Vec<f64>, Vec<f64>, Vec<Vec<f64>>, Vec<(Process, usize)>, f64) {
    let csf_index = build_csf_index(components);
    let nodes = grid.nodes();
    let mut dedx_csda = vec![0.0; nodes.len()];
    let mut dedx_mixed = vec![0.0; nodes.len()];
    let mut omega = vec![0.0; nodes.len()];
    let mut cs = vec![0.0; nodes.len()];
    let mut cs_per_pair = vec![vec![0.0; csf_index.len()]; nodes.len()];

    for (i, &k) in nodes.iter().enumerate() {
        let acc = node_accumulator(mass, k, elements, components, &csf_index, settings.cutoff, brems, pair, photo);
        let ion_total = electronic::mean_stopping(mass, k, z_over_a, mean_excitation, oscillators);
        let ion_mixed = (ion_total - acc.ion_mean_above).max(0.0);

        dedx_csda[i] = acc.dedx_csda_radiative + ion_total;
        dedx_mixed[i] = acc.dedx_mixed_radiative + ion_mixed;
        omega[i] = acc.omega;
        cs[i] = acc.cs_total;
        cs_per_pair[i] = acc.cs_per_pair;
    }

    let kt = regularise_threshold(&cs, &dedx_mixed, &mut dedx_csda, nodes);
    (dedx_csda, dedx_mixed, omega, cs, cs_per_pair, csf_index, kt)
}

#[allow(clippy::too_many_arguments)]
fn finish_material_table(
    mass: f64,
    nodes: &[f64],
    dedx_csda: Vec<f64>,
    dedx_mixed: Vec<f64>,
    omega: Vec<f64>,
    cs: Vec<f64>,
    cs_per_pair: Vec<Vec<f64>>,
    csf_index: Vec<(Process, usize)>,
    kt: f64,
    elements: &[AtomicElement],
    components: &[(usize, f64)],
    settings: &TabulatorSettings,
) -> Result<MaterialTable> {
    let dedx_csda_pchip = Pchip::new(nodes, &dedx_csda);
    let dedx_mixed_pchip = Pchip::new(nodes, &dedx_mixed);
    let omega_pchip = Pchip::new(nodes, &omega);
    let cs_pchip = Pchip::new(nodes, &cs);

    // CSf: cumulative per-(process,element) fraction of CS at each K, with
    // the last component pinned to exactly 1.
    let mut csf_values = vec![vec![0.0; nodes.len()]; csf_index.len()];
    for (i, _) in nodes.iter().enumerate() {
        let total = cs[i].max(1e-300);
        let mut running = 0.0;
        for (j, _) in csf_index.iter().enumerate() {
            running += cs_per_pair[i][j] / total;
            csf_values[j][i] = running.min(1.0);
        }
        if let Some(last) = csf_values.last_mut() {
            last[i] = 1.0; // hard pin against FP drift
        }
    }
    let csf: Vec<Pchip> = csf_values.iter().map(|v| Pchip::new(nodes, v)).collect();
    let csn: Vec<Pchip> = (0..csf_index.len())
        .map(|j| Pchip::new(nodes, &(0..nodes.len()).map(|i| cs_per_pair[i][j]).collect::<Vec<_>>()))
        .collect();

    // inverse-density-weighted CSDA/mixed 1/dE integrals -> X(K).
    let inv_dedx_csda: Vec<f64> = dedx_csda.iter().map(|&d| 1.0 / d.max(1e-300)).collect();
    let inv_dedx_mixed: Vec<f64> = dedx_mixed.iter().map(|&d| 1.0 / d.max(1e-300)).collect();
    let x_csda_values = Pchip::new(nodes, &inv_dedx_csda).cumulative();
    let x_mixed_values = Pchip::new(nodes, &inv_dedx_mixed).cumulative();
    let x_csda_pchip = Pchip::new(nodes, &x_csda_values);
    let x_mixed_pchip = Pchip::new(nodes, &x_mixed_values);
    let k_of_x_csda = Pchip::new(&x_csda_values, nodes);
    let k_of_x_mixed = Pchip::new(&x_mixed_values, nodes);

    // proper time: T = m * integral dK / (p * dE).
    let t_integrand_csda: Vec<f64> = nodes
        .iter()
        .zip(dedx_csda.iter())
        .map(|(&k, &d)| mass / ((k * (k + 2.0 * mass)).max(1e-300).sqrt() * d.max(1e-300)))
        .collect();
    let t_integrand_mixed: Vec<f64> = nodes
        .iter()
        .zip(dedx_mixed.iter())
        .map(|(&k, &d)| mass / ((k * (k + 2.0 * mass)).max(1e-300).sqrt() * d.max(1e-300)))
        .collect();
    let t_csda_values = Pchip::new(nodes, &t_integrand_csda).cumulative();
    let t_mixed_values = Pchip::new(nodes, &t_integrand_mixed).cumulative();
    let t_csda_pchip = Pchip::new(nodes, &t_csda_values);
    let t_mixed_pchip = Pchip::new(nodes, &t_mixed_values);
    let k_of_t_mixed = Pchip::new(&t_mixed_values, nodes);

    // NI_in: cumulative count of inelastic interaction lengths, integral
    // CS(K) / dE_mixed(K) dK (events per unit grammage, as a function of K).
    let ni_in_integrand: Vec<f64> = cs.iter().zip(inv_dedx_mixed.iter()).map(|(&c, &inv)| c * inv).collect();
    let ni_in_values = Pchip::new(nodes, &ni_in_integrand).cumulative();
    let ni_in_pchip = Pchip::new(nodes, &ni_in_values);
    let k_of_ni_in = Pchip::new(&ni_in_values, nodes);

    let (mu0_pchip, lb_pchip, ms1) = scattering_pass(mass, elements, components, &KineticGrid::new(nodes.to_vec())?, settings.elastic_ratio, &dedx_csda, &x_csda_values);

    // elastic hard-scatter interaction lengths: integral 1/lambda_EHS(K) * inv_dedx_mixed dK.
    let ni_el_integrand: Vec<f64> = nodes
        .iter()
        .zip(lb_pchip.nodes().1.iter())
        .zip(inv_dedx_mixed.iter())
        .map(|((&k, &lb), &inv)| {
            let p2 = k * (k + 2.0 * mass);
            (p2.max(1e-300) / lb.max(1e-300)) * inv
        })
        .collect();
    let ni_el_values = Pchip::new(nodes, &ni_el_integrand).cumulative();
    let ni_el_pchip = Pchip::new(nodes, &ni_el_values);

    let li = larmor_moments(mass, &KineticGrid::new(nodes.to_vec())?, &t_mixed_pchip);

    let a_max = *dedx_csda.last().unwrap_or(&0.0);
    let b_max_mixed = dedx_csda.last().zip(nodes.last()).map(|(d, k)| d / k).unwrap_or(0.0);

    Ok(MaterialTable {
        grid: KineticGrid::new(nodes.to_vec())?,
        dedx_csda: dedx_csda_pchip,
        dedx_mixed: dedx_mixed_pchip,
        x_csda: x_csda_pchip,
        x_mixed: x_mixed_pchip,
        k_of_x_csda,
        k_of_x_mixed,
        t_csda: t_csda_pchip,
        t_mixed: t_mixed_pchip,
        k_of_t_mixed,
        omega: omega_pchip,
        ni_in: ni_in_pchip,
        k_of_ni_in,
        ni_el: ni_el_pchip,
        cs: cs_pchip,
        csf,
        csf_index,
        csn,
        mu0: mu0_pchip,
        lb: lb_pchip,
        ms1,
        li,
        kt,
        a_max,
        b_max: [0.0, b_max_mixed, b_max_mixed],
    })
}

/// Derives a material's density-effect oscillator model (needed by
/// [`electronic::mean_stopping`]), for callers that want the raw
/// Bethe-Bloch value outside the tabulated grid.
#[must_use]
pub fn material_oscillators(elements: &[AtomicElement], components: &[(usize, f64)], mean_excitation: f64, density: f64, z_over_a: f64) -> MaterialOscillators {
    let pairs: Vec<(AtomicElement, f64)> = components.iter().map(|&(e, f)| (elements[e].clone(), f)).collect();
    MaterialOscillators::build(&pairs, mean_excitation, density, z_over_a)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dcs::Registry;
    use crate::material::MaterialComponent;

    fn build_rock_tables() -> PhysicsTables {
        let elements = vec![
            AtomicElement::new("O", 8, 15.999, 95.0, 0).unwrap(),
            AtomicElement::new("Si", 14, 28.085, 173.0, 1).unwrap(),
        ];
        let base = BaseMaterial::new(
            "rock",
            vec![
                MaterialComponent { element: 0, fraction: 0.52 },
                MaterialComponent { element: 1, fraction: 0.48 },
            ],
            2650.0,
            Some(136.4),
            &elements,
        )
        .unwrap();
        let mdf = MdfDocument { elements, bases: vec![base], base_files: vec!["rock.txt".into()], composites: vec![] };
        let grid = KineticGrid::log_spaced(1e-3, 1e4, 40).unwrap();
        let settings = TabulatorSettings::default();
        let registry = Registry::with_defaults();
        PhysicsTables::build(Particle::Muon, mdf, vec![vec![]], grid, settings, &registry).unwrap()
    }

    #[test]
    fn dedx_mixed_never_exceeds_csda() {
        let tables = build_rock_tables();
        let table = tables.table(0);
        let (k_nodes, mixed) = table.dedx_mixed.nodes();
        let (_, csda) = table.dedx_csda.nodes();
        for i in 0..k_nodes.len() {
            assert!(mixed[i] <= csda[i] + 1e-12, "mixed {} > csda {} at K={}", mixed[i], csda[i], k_nodes[i]);
        }
    }

    #[test]
    fn x_csda_is_nondecreasing() {
        let tables = build_rock_tables();
        let (_, x) = tables.table(0).x_csda.nodes();
        assert!(x.windows(2).all(|w| w[0] <= w[1] + 1e-9));
    }

    #[test]
    fn csf_last_component_pinned_to_one() {
        let tables = build_rock_tables();
        let table = tables.table(0);
        let (_, last) = table.csf.last().unwrap().nodes();
        for &v in last {
            assert!((v - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn mu0_within_soft_cap() {
        let tables = build_rock_tables();
        let (_, mu0) = tables.table(0).mu0.nodes();
        for &m in mu0 {
            assert!((0.0..=MU_SOFT_MAX + 1e-9).contains(&m));
        }
    }
}
