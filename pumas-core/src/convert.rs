//! Small numeric conversion helpers, used throughout the tabulator and
//! stepping engine to keep casts explicit and panic-free.

#[allow(clippy::cast_precision_loss)]
pub fn f64_from_usize(x: usize) -> f64 {
    x as f64
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn usize_from_f64(x: f64) -> usize {
    x.max(0.0) as usize
}
