//! Property accessors (L6): turns the raw [`MaterialTable`] PCHIP arrays
//! into the `(material, scheme, K)` lookups used by the stepping engine,
//! handling the three regimes the interpolation kernel itself does not
//! cover:
//!
//! - below the first tabulated node, quantities are extrapolated assuming
//!   the node-0 stopping power stays constant;
//! - inside the tabulated range, the PCHIP interpolant is evaluated
//!   directly;
//! - above the last tabulated node, the asymptotic linear `dE/dX = a_max +
//!   b_max K` model is integrated in closed form.

use crate::interpolation::IndexCache;
use crate::material::MaterialIndex;
use crate::tables::{MaterialTable, PhysicsTables, Scheme};

fn scheme_index(scheme: Scheme) -> usize {
    match scheme {
        Scheme::Disabled => 0,
        Scheme::Csda => 1,
        Scheme::Mixed => 2,
    }
}

/// The three index caches shared by a transport context: one for `K`-keyed
/// tables, one for `X`-keyed (grammage) tables, one for `T`-keyed
/// (proper-time) tables.
#[derive(Clone, Debug, Default)]
pub struct AccessorCaches {
    /// Cache for lookups keyed by kinetic energy.
    pub k: IndexCache,
    /// Cache for lookups keyed by grammage.
    pub x: IndexCache,
    /// Cache for lookups keyed by proper time.
    pub t: IndexCache,
}

fn first_node(table: &MaterialTable) -> f64 {
    table.grid.nodes()[0]
}

fn last_node(table: &MaterialTable) -> f64 {
    table.grid.nodes()[table.grid.len() - 1]
}

/// Stopping power `-dE/dX`, GeV m^2/kg, for the given scheme.
#[must_use]
pub fn dedx(table: &MaterialTable, scheme: Scheme, k: f64, cache: &mut AccessorCaches) -> f64 {
    let pchip = match scheme {
        Scheme::Disabled | Scheme::Csda => &table.dedx_csda,
        Scheme::Mixed => &table.dedx_mixed,
    };
    let (k0, kmax) = (first_node(table), last_node(table));
    if k <= k0 {
        return pchip.eval(k0, &mut cache.k);
    }
    if k >= kmax {
        let i = scheme_index(scheme);
        return table.a_max + table.b_max[i] * k;
    }
    pchip.eval(k, &mut cache.k)
}

/// CSDA/mixed grammage `X(K)`, kg/m^2.
#[must_use]
pub fn grammage(table: &MaterialTable, scheme: Scheme, k: f64, cache: &mut AccessorCaches) -> f64 {
    let pchip = match scheme {
        Scheme::Disabled | Scheme::Csda => &table.x_csda,
        Scheme::Mixed => &table.x_mixed,
    };
    let (k0, kmax) = (first_node(table), last_node(table));

    if k <= k0 {
        let d0 = dedx(table, scheme, k0, cache);
        let x0 = pchip.eval(k0, &mut cache.k);
        return (x0 - (k0 - k) / d0.max(1e-300)).max(0.0);
    }
    if k >= kmax {
        let i = scheme_index(scheme);
        let (a, b) = (table.a_max, table.b_max[i]);
        let x_max = pchip.eval(kmax, &mut cache.k);
        return x_max + asymptotic_grammage_delta(a, b, kmax, k);
    }
    pchip.eval(k, &mut cache.k)
}

/// Closed-form `integral_{k0}^{k} dK' / (a + b K')`.
fn asymptotic_grammage_delta(a: f64, b: f64, k0: f64, k: f64) -> f64 {
    if b.abs() < 1e-300 {
        return (k - k0) / a.max(1e-300);
    }
    ((a + b * k) / (a + b * k0)).max(1e-300).ln() / b
}

/// Inverse of [`grammage`]: `K(X)`.
#[must_use]
pub fn k_of_grammage(table: &MaterialTable, scheme: Scheme, x: f64, cache: &mut AccessorCaches) -> f64 {
    let (inverse, x0, x_max) = match scheme {
        Scheme::Disabled | Scheme::Csda => (&table.k_of_x_csda, grammage(table, scheme, first_node(table), cache), grammage(table, scheme, last_node(table), cache)),
        Scheme::Mixed => (&table.k_of_x_mixed, grammage(table, scheme, first_node(table), cache), grammage(table, scheme, last_node(table), cache)),
    };
    if x <= x0 {
        let d0 = dedx(table, scheme, first_node(table), cache);
        return (first_node(table) - (x0 - x) * d0).max(0.0);
    }
    if x >= x_max {
        let i = scheme_index(scheme);
        let (a, b) = (table.a_max, table.b_max[i]);
        let kmax = last_node(table);
        return if b.abs() < 1e-300 { kmax + (x - x_max) * a } else { ((a + b * kmax) * ((x - x_max) * b).exp() - a) / b };
    }
    inverse.eval(x, &mut cache.x)
}

/// Proper time `T(K)`, m/c.
#[must_use]
pub fn proper_time(table: &MaterialTable, scheme: Scheme, k: f64, mass: f64, cache: &mut AccessorCaches) -> f64 {
    let pchip = match scheme {
        Scheme::Disabled | Scheme::Csda => &table.t_csda,
        Scheme::Mixed => &table.t_mixed,
    };
    let (k0, kmax) = (first_node(table), last_node(table));
    if k <= k0 {
        let t0 = pchip.eval(k0, &mut cache.k);
        let d0 = dedx(table, scheme, k0, cache);
        let p0 = (k0 * (k0 + 2.0 * mass)).max(1e-300).sqrt();
        return (t0 - (k0 - k) * mass / (p0 * d0.max(1e-300))).max(0.0);
    }
    if k >= kmax {
        // secant slope from the last two nodes, extended linearly: the
        // ultra-relativistic T'(K) = m/(p dE/dX) is already nearly flat
        // there, so a local linear model is an adequate extrapolation.
        let nodes = table.grid.nodes();
        let n = nodes.len();
        let t_last = pchip.eval(nodes[n - 1], &mut cache.k);
        let t_prev = pchip.eval(nodes[n - 2], &mut cache.k);
        let slope = (t_last - t_prev) / (nodes[n - 1] - nodes[n - 2]).max(1e-300);
        return t_last + slope * (k - kmax);
    }
    pchip.eval(k, &mut cache.k)
}

/// Inverse of [`proper_time`] restricted to the mixed scheme (the only
/// scheme the stepping engine needs to invert `T`).
#[must_use]
pub fn k_of_proper_time(table: &MaterialTable, t: f64, cache: &mut AccessorCaches) -> f64 {
    let (_, t_values) = table.t_mixed.nodes();
    let t0 = t_values[0];
    let t_max = *t_values.last().unwrap_or(&0.0);
    if t <= t0 {
        return first_node(table);
    }
    if t >= t_max {
        let nodes = table.grid.nodes();
        let n = nodes.len();
        let slope = (t_values[n - 1] - t_values[n - 2]) / (nodes[n - 1] - nodes[n - 2]).max(1e-300);
        return nodes[n - 1] + (t - t_max) / slope.max(1e-300);
    }
    table.k_of_t_mixed.eval(t, &mut cache.t)
}

/// Energy-loss straggling variance per grammage, `Omega(K)`.
#[must_use]
pub fn straggling(table: &MaterialTable, k: f64, cache: &mut AccessorCaches) -> f64 {
    table.omega.eval(k.max(first_node(table)).min(last_node(table)), &mut cache.k)
}

/// Total inelastic DEL macroscopic cross section, m^2/kg.
#[must_use]
pub fn cross_section(table: &MaterialTable, k: f64, cache: &mut AccessorCaches) -> f64 {
    if k < table.kt {
        return 0.0;
    }
    table.cs.eval(k.max(first_node(table)).min(last_node(table)), &mut cache.k)
}

/// Cumulative per-(process,element) fraction of [`cross_section`] at `K`,
/// for the forward DEL target draw.
#[must_use]
pub fn cumulative_fraction(table: &MaterialTable, k: f64, cache: &mut AccessorCaches) -> Vec<f64> {
    let k = k.max(first_node(table)).min(last_node(table));
    table.csf.iter().map(|p| p.eval(k, &mut cache.k)).collect()
}

/// Hard-Coulomb cutoff angle `mu_0(K)`.
#[must_use]
pub fn mu0(table: &MaterialTable, k: f64, cache: &mut AccessorCaches) -> f64 {
    table.mu0.eval(k.clamp(first_node(table), last_node(table)), &mut cache.k)
}

/// `p^2`-scaled hard-scatter mean free path, `Lb(K)`.
#[must_use]
pub fn lb(table: &MaterialTable, k: f64, cache: &mut AccessorCaches) -> f64 {
    table.lb.eval(k.clamp(first_node(table), last_node(table)), &mut cache.k)
}

/// First transport path length `1/lambda_1(K)` for the given scheme.
#[must_use]
pub fn ms1(table: &MaterialTable, scheme: Scheme, k: f64, cache: &mut AccessorCaches) -> f64 {
    table.ms1[scheme_index(scheme)].eval(k.clamp(first_node(table), last_node(table)), &mut cache.k)
}

/// Cumulative count of inelastic-DEL interaction lengths up to `K`.
#[must_use]
pub fn ni_in(table: &MaterialTable, k: f64, cache: &mut AccessorCaches) -> f64 {
    table.ni_in.eval(k.clamp(first_node(table), last_node(table)), &mut cache.k)
}

/// Inverse of [`ni_in`].
#[must_use]
pub fn k_of_ni_in(table: &MaterialTable, ni: f64, cache: &mut AccessorCaches) -> f64 {
    let (_, values) = table.ni_in.nodes();
    let ni = ni.clamp(values[0], *values.last().unwrap_or(&0.0));
    table.k_of_ni_in.eval(ni, &mut cache.x)
}

/// Cumulative count of elastic hard-scatter interaction lengths up to `K`.
#[must_use]
pub fn ni_el(table: &MaterialTable, k: f64, cache: &mut AccessorCaches) -> f64 {
    table.ni_el.eval(k.clamp(first_node(table), last_node(table)), &mut cache.k)
}

/// Cumulative Larmor moment of the given `order` (`0..=8`), used by the
/// magnetic-deflection Taylor series.
#[must_use]
pub fn larmor_moment(table: &MaterialTable, order: usize, k: f64, cache: &mut AccessorCaches) -> f64 {
    table.li[order].eval(k.clamp(first_node(table), last_node(table)), &mut cache.k)
}

/// Looks up a material's table by index and evaluates [`dedx`] on it; a
/// convenience wrapper over the common `(tables, material_index, ...)`
/// calling pattern used throughout the stepping engine.
#[must_use]
pub fn dedx_of(tables: &PhysicsTables, material: MaterialIndex, scheme: Scheme, k: f64, cache: &mut AccessorCaches) -> f64 {
    dedx(tables.table(material), scheme, k, cache)
}
