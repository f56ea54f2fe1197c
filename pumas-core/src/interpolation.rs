//! Interpolation kernel (L1): monotone cubic Hermite (PCHIP) construction,
//! evaluation and cumulative integration, plus the dichotomic index lookup
//! with per-context memoisation used by every higher layer.

const MIN_NODES: usize = 2;

/// A two-slot index cache, remembering the two most-recently returned
/// bracket indices for a dichotomic lookup. Two independent instances are
/// kept by a [`SimulationContext`](crate::transport::SimulationContext): one
/// for `K`-keyed tables, one for `X`-keyed tables.
#[derive(Clone, Copy, Debug, Default, serde::Deserialize, serde::Serialize)]
pub struct IndexCache {
    slots: [Option<usize>; 2],
}

impl IndexCache {
    /// Creates an empty cache.
    #[must_use]
    pub const fn new() -> Self {
        Self { slots: [None, None] }
    }

    /// Locates the bracket index `i` such that `nodes[i] <= x < nodes[i+1]`
    /// (clamped to `[0, nodes.len()-2]`), consulting the cache first.
    pub fn locate(&mut self, nodes: &[f64], x: f64) -> usize {
        let n = nodes.len();
        debug_assert!(n >= MIN_NODES);
        let last = n - 2;

        for slot in self.slots.iter().flatten() {
            let i = *slot;
            if i <= last && nodes[i] <= x && x < nodes[i + 1] {
                return i;
            }
        }

        let i = dichotomy(nodes, x).min(last);
        self.remember(i);
        i
    }

    fn remember(&mut self, index: usize) {
        if self.slots[0] != Some(index) {
            self.slots[1] = self.slots[0];
            self.slots[0] = Some(index);
        }
    }
}

/// Plain `O(log N)` dichotomic bracket search, unclamped.
fn dichotomy(nodes: &[f64], x: f64) -> usize {
    if x <= nodes[0] {
        return 0;
    }
    let n = nodes.len();
    if x >= nodes[n - 1] {
        return n - 2;
    }
    let (mut lo, mut hi) = (0usize, n - 1);
    while hi - lo > 1 {
        let mid = (lo + hi) / 2;
        if nodes[mid] <= x {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    lo
}

/// A monotone cubic Hermite (PCHIP) interpolant over a fixed node set.
///
/// The first span (`[x0, x1]`) is always evaluated linearly: it straddles
/// the non-physical `K = 0` node in every table that uses this kernel, so a
/// cubic fit there would not be monotone.
#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct Pchip {
    x: Vec<f64>,
    y: Vec<f64>,
    m: Vec<f64>,
}

impl Pchip {
    /// Builds the interpolant, deriving slopes with the Fritsch-Butland
    /// harmonic mean at interior nodes and a second-order one-sided
    /// difference at the endpoints.
    ///
    /// # Panics
    ///
    /// Panics if fewer than two nodes are given, or if `x` is not strictly
    /// increasing.
    #[must_use]
    pub fn new(x: &[f64], y: &[f64]) -> Self {
        assert!(x.len() >= MIN_NODES, "need at least two nodes");
        assert_eq!(x.len(), y.len());
        assert!(x.windows(2).all(|w| w[0] < w[1]), "x must be strictly increasing");

        let m = fritsch_butland_derivatives(x, y);
        Self { x: x.to_vec(), y: y.to_vec(), m }
    }

    /// Builds the interpolant from externally supplied slopes, clamped at
    /// each node to the range that preserves monotonicity on its two
    /// adjacent spans (the "derivative-provided" mode of spec §4.1).
    ///
    /// # Panics
    ///
    /// Panics under the same conditions as [`Self::new`].
    #[must_use]
    pub fn with_derivatives(x: &[f64], y: &[f64], derivative: &[f64]) -> Self {
        assert!(x.len() >= MIN_NODES);
        assert_eq!(x.len(), y.len());
        assert_eq!(x.len(), derivative.len());

        let slopes = secant_slopes(x, y);
        let mut m = derivative.to_vec();
        for i in 0..x.len() {
            let bounds = [
                i.checked_sub(1).map(|j| slopes[j]),
                slopes.get(i).copied(),
            ];
            m[i] = clamp_monotone(m[i], bounds[0], bounds[1]);
        }
        Self { x: x.to_vec(), y: y.to_vec(), m }
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.x.len()
    }

    /// True if there are no nodes (never for a constructed `Pchip`).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Node coordinates.
    #[must_use]
    pub fn nodes(&self) -> (&[f64], &[f64]) {
        (&self.x, &self.y)
    }

    /// Evaluates the interpolant at `x`, using `cache` to avoid a fresh
    /// dichotomic search when `x` falls in a recently visited span. `x` is
    /// clamped to `[x_0, x_{n-1}]`; callers needing asymptotic extrapolation
    /// (L6) must handle that themselves.
    pub fn eval(&self, x: f64, cache: &mut IndexCache) -> f64 {
        let x = x.clamp(self.x[0], self.x[self.x.len() - 1]);
        let i = cache.locate(&self.x, x);
        self.eval_in_span(i, x)
    }

    fn eval_in_span(&self, i: usize, x: f64) -> f64 {
        let dx = self.x[i + 1] - self.x[i];
        let t = (x - self.x[i]) / dx;

        if i == 0 {
            // first span: linear, straddles the non-physical K=0 node.
            return self.y[0] + t * (self.y[1] - self.y[0]);
        }

        hermite(self.y[i], self.y[i + 1], self.m[i] * dx, self.m[i + 1] * dx, t)
    }

    /// Returns the cumulative integral `F(x) = integral_{x0}^{x} y dt`,
    /// tabulated at every node: `F[0] = 0`, `F[i] = F[i-1] + span integral`.
    /// The first span is integrated by the trapezoid rule (consistent with
    /// its linear evaluation); the rest use the analytic Hermite
    /// antiderivative.
    #[must_use]
    pub fn cumulative(&self) -> Vec<f64> {
        let n = self.x.len();
        let mut out = vec![0.0; n];
        for i in 0..n - 1 {
            let dx = self.x[i + 1] - self.x[i];
            let span_integral = if i == 0 {
                0.5 * (self.y[0] + self.y[1]) * dx
            } else {
                hermite_integral(self.y[i], self.y[i + 1], self.m[i] * dx, self.m[i + 1] * dx) * dx
            };
            out[i + 1] = out[i] + span_integral;
        }
        out
    }
}

fn secant_slopes(x: &[f64], y: &[f64]) -> Vec<f64> {
    (0..x.len() - 1).map(|i| (y[i + 1] - y[i]) / (x[i + 1] - x[i])).collect()
}

fn clamp_monotone(m: f64, lower: Option<f64>, upper: Option<f64>) -> f64 {
    // both adjacent secants must have the same sign as `m`, or `m` is
    // flattened to zero; the magnitude is capped by 3x the smaller secant
    // (standard PCHIP monotonicity region).
    let secants: Vec<f64> = [lower, upper].into_iter().flatten().collect();
    if secants.iter().any(|s| *s == 0.0) || secants.iter().any(|s| s.signum() != m.signum() && m != 0.0) {
        return 0.0;
    }
    let cap = 3.0 * secants.iter().fold(f64::INFINITY, |a, b| a.min(b.abs()));
    m.abs().min(cap) * m.signum()
}

/// Fritsch-Butland harmonic-mean derivative estimate at every node.
fn fritsch_butland_derivatives(x: &[f64], y: &[f64]) -> Vec<f64> {
    let n = x.len();
    let h: Vec<f64> = (0..n - 1).map(|i| x[i + 1] - x[i]).collect();
    let s: Vec<f64> = (0..n - 1).map(|i| (y[i + 1] - y[i]) / h[i]).collect();

    let mut m = vec![0.0; n];

    for i in 1..n - 1 {
        let (s0, s1) = (s[i - 1], s[i]);
        m[i] = if s0 * s1 > 0.0 {
            let w = (h[i - 1] + 2.0 * h[i]) / (3.0 * (h[i - 1] + h[i]));
            s0 * s1 / ((1.0 - w) * s0 + w * s1)
        } else {
            0.0
        };
    }

    // endpoint derivatives: second-order one-sided finite difference,
    // clamped to preserve monotonicity against the adjacent secant.
    m[0] = endpoint_derivative(h[0], h.get(1).copied(), s[0], s.get(1).copied());
    let last = n - 1;
    m[last] = endpoint_derivative(
        h[last - 1],
        if last >= 2 { Some(h[last - 2]) } else { None },
        s[last - 1],
        if last >= 2 { Some(s[last - 2]) } else { None },
    );

    m
}

fn endpoint_derivative(h0: f64, h1: Option<f64>, s0: f64, s1: Option<f64>) -> f64 {
    let Some(h1) = h1 else { return s0 };
    let Some(s1) = s1 else { return s0 };
    let mut d = ((2.0 * h0 + h1) * s0 - h0 * s1) / (h0 + h1);
    if d.signum() != s0.signum() {
        d = 0.0;
    } else if (s1.signum() != s0.signum()) && d.abs() > 3.0 * s0.abs() {
        d = 3.0 * s0;
    }
    d
}

/// Cubic Hermite basis evaluation for `t in [0, 1]`, slopes already scaled
/// by the span width.
fn hermite(p0: f64, p1: f64, m0: f64, m1: f64, t: f64) -> f64 {
    p0 + t * (m0 + t * (-3.0 * (p0 - p1) - 2.0 * m0 - m1 + t * (2.0 * (p0 - p1) + m0 + m1)))
}

/// Analytic integral of the same Hermite polynomial over `t in [0, 1]`,
/// already divided by the span width so the caller multiplies by `dx` once.
fn hermite_integral(p0: f64, p1: f64, m0: f64, m1: f64) -> f64 {
    // integral_0^1 H(t) dt for the cubic above.
    let c3 = 2.0 * (p0 - p1) + m0 + m1;
    let c2 = -3.0 * (p0 - p1) - 2.0 * m0 - m1;
    p0 + m0 / 2.0 + c2 / 3.0 + c3 / 4.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linspace(a: f64, b: f64, n: usize) -> Vec<f64> {
        (0..n).map(|i| a + (b - a) * i as f64 / (n - 1) as f64).collect()
    }

    #[test]
    fn reproduces_linear_and_quadratic_away_from_first_span() {
        let x: Vec<f64> = linspace(1.0, 10.0, 20);
        for f in [
            |x: f64| x,
            |x: f64| x * x,
        ] {
            let y: Vec<f64> = x.iter().map(|&xi| f(xi)).collect();
            let dy: Vec<f64> = x
                .iter()
                .map(|&xi| {
                    // exact derivative, fed through the clamped constructor
                    // so the quadratic is reproduced exactly away from the
                    // forced-linear first span.
                    let h = 1e-6;
                    (f(xi + h) - f(xi - h)) / (2.0 * h)
                })
                .collect();
            let p = Pchip::with_derivatives(&x, &y, &dy);
            let mut cache = IndexCache::new();
            for &xi in x.iter().skip(2) {
                let got = p.eval(xi, &mut cache);
                assert!((got - f(xi)).abs() < 1e-6, "{got} vs {}", f(xi));
            }
        }
    }

    #[test]
    fn monotone_data_gives_monotone_reconstruction() {
        let x: Vec<f64> = linspace(0.0, 1.0, 8);
        let y: Vec<f64> = x.iter().map(|&xi| xi.powi(3) + xi).collect();
        let p = Pchip::new(&x, &y);
        let mut cache = IndexCache::new();
        let dense: Vec<f64> = linspace(x[1], x[x.len() - 1], 400)
            .iter()
            .map(|&xi| p.eval(xi, &mut cache))
            .collect();
        assert!(dense.windows(2).all(|w| w[0] <= w[1] + 1e-12));
    }

    #[test]
    fn matches_nodes_exactly() {
        let x: Vec<f64> = linspace(1.0, 5.0, 10);
        let y: Vec<f64> = x.iter().map(|&xi| xi.sin()).collect();
        let p = Pchip::new(&x, &y);
        let mut cache = IndexCache::new();
        for i in 0..x.len() {
            assert!((p.eval(x[i], &mut cache) - y[i]).abs() < 1e-13);
        }
    }

    #[test]
    fn cumulative_integration_recovers_antiderivative() {
        // F(x) = x*log(1+x), y = dF/dx = log(1+x) + x/(1+x)
        let x: Vec<f64> = (0..150)
            .map(|i| {
                let t = i as f64 / 149.0;
                10f64.powf(-3.0 + t * 9.0)
            })
            .collect();
        let y: Vec<f64> = x.iter().map(|&xi| (1.0 + xi).ln() + xi / (1.0 + xi)).collect();
        let p = Pchip::new(&x, &y);
        let cum = p.cumulative();
        let f_exact: Vec<f64> = x.iter().map(|&xi| xi * (1.0 + xi).ln()).collect();
        // skip the first forced-linear span and the extreme tail, where the
        // log-spaced grid is coarsest relative to curvature.
        for i in 5..x.len() - 1 {
            let f0 = f_exact[0];
            let got = cum[i] + f0;
            let err = (got - f_exact[i]).abs() / f_exact[i].abs().max(1.0);
            assert!(err < 1e-3, "i={i} err={err}");
        }
    }

    #[test]
    fn index_cache_hits_recent_bracket() {
        let nodes = linspace(0.0, 10.0, 11);
        let mut cache = IndexCache::new();
        let i0 = cache.locate(&nodes, 3.5);
        let i1 = cache.locate(&nodes, 3.6);
        assert_eq!(i0, i1);
    }
}
