//! Stopping-power text-table reader (spec §6): fixed-width rows of
//! `K[MeV], (unused), dE/dx_brems, dE/dx_pair, dE/dx_photonuc, dE/dx_ion,
//! dE/dx_total, X_csda`, all in `MeV cm^2/g`, with an auto-detected header
//! and a couple of annotation lines to skip.

use crate::error::{Error, Result};

/// One parsed stopping-power row, converted to GeV and kg/m^2.
#[derive(Clone, Copy, Debug)]
pub struct DedxRow {
    /// Kinetic energy, GeV.
    pub k: f64,
    /// Bremsstrahlung stopping power, GeV m^2/kg.
    pub brems: f64,
    /// Pair-production stopping power, GeV m^2/kg.
    pub pair: f64,
    /// Photonuclear stopping power, GeV m^2/kg.
    pub photonuclear: f64,
    /// Ionisation stopping power, GeV m^2/kg.
    pub ionisation: f64,
    /// Total stopping power, GeV m^2/kg.
    pub total: f64,
    /// CSDA range, kg/m^2.
    pub x_csda: f64,
}

const MEV_TO_GEV: f64 = 1e-3;
/// `MeV cm^2/g -> GeV m^2/kg`: `1e-3 (GeV/MeV) * 1e-1 (m^2/kg per cm^2/g)`.
const MEV_CM2_G_TO_GEV_M2_KG: f64 = 1e-3 * 0.1;
/// `g/cm^2 -> kg/m^2`.
const G_CM2_TO_KG_M2: f64 = 10.0;

fn is_header_line(line: &str) -> bool {
    match line.trim_start().chars().next() {
        Some(c) => !c.is_ascii_digit(),
        None => true,
    }
}

fn is_annotation_line(line: &str) -> bool {
    line.contains("Minimum ionization") || line.contains("critical energy")
}

/// Parses the whole stopping-power table, skipping auto-detected header and
/// annotation lines.
///
/// # Errors
///
/// Returns [`Error::Format`] if a data row does not have the expected
/// number of whitespace-separated fields, or a field fails to parse as a
/// number.
pub fn parse(text: &str) -> Result<Vec<DedxRow>> {
    let mut rows = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        if line.trim().is_empty() || is_header_line(line) || is_annotation_line(line) {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 8 {
            return Err(Error::format(format!("line {}: expected 8 fields, found {}", lineno + 1, fields.len())));
        }
        let parse_f = |s: &str| -> Result<f64> {
            s.parse::<f64>().map_err(|_| Error::format(format!("line {}: invalid number `{s}`", lineno + 1)))
        };

        let k_mev = parse_f(fields[0])?;
        let brems = parse_f(fields[2])?;
        let pair = parse_f(fields[3])?;
        let photonuclear = parse_f(fields[4])?;
        let ionisation = parse_f(fields[5])?;
        let total = parse_f(fields[6])?;
        let x_csda_g_cm2 = parse_f(fields[7])?;

        rows.push(DedxRow {
            k: k_mev * MEV_TO_GEV,
            brems: brems * MEV_CM2_G_TO_GEV_M2_KG,
            pair: pair * MEV_CM2_G_TO_GEV_M2_KG,
            photonuclear: photonuclear * MEV_CM2_G_TO_GEV_M2_KG,
            ionisation: ionisation * MEV_CM2_G_TO_GEV_M2_KG,
            total: total * MEV_CM2_G_TO_GEV_M2_KG,
            x_csda: x_csda_g_cm2 * G_CM2_TO_KG_M2,
        });
    }

    if rows.is_empty() {
        return Err(Error::format("stopping-power table has no data rows".into()));
    }
    if !rows.windows(2).all(|w| w[0].k < w[1].k) {
        return Err(Error::format("stopping-power table K column is not strictly increasing".into()));
    }

    Ok(rows)
}

/// Renders `rows` back to the fixed-width `MeV cm^2/g` text format, with a
/// header line; the inverse of [`parse`], used by the stopping-power-table
/// generation workflow.
#[must_use]
pub fn write(rows: &[DedxRow]) -> String {
    let mut out = String::from(" Kinetic energy    (unused)     brems      pair     photonuc     ioniz       total     CSDA range\n");
    out.push_str(" MeV                            MeV cm2/g  MeV cm2/g  MeV cm2/g  MeV cm2/g  MeV cm2/g  g/cm2\n");
    for row in rows {
        out.push_str(&format!(
            " {:.6E} {:.6E} {:.6E} {:.6E} {:.6E} {:.6E} {:.6E} {:.6E}\n",
            row.k / MEV_TO_GEV,
            0.0,
            row.brems / MEV_CM2_G_TO_GEV_M2_KG,
            row.pair / MEV_CM2_G_TO_GEV_M2_KG,
            row.photonuclear / MEV_CM2_G_TO_GEV_M2_KG,
            row.ionisation / MEV_CM2_G_TO_GEV_M2_KG,
            row.total / MEV_CM2_G_TO_GEV_M2_KG,
            row.x_csda / G_CM2_TO_KG_M2,
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_table_with_header_and_annotations() {
        let text = "\
 Kinetic energy   dE/dx ...      brems      pair     photonuc   ioniz     total     CSDA range
 MeV                             MeV cm2/g  MeV cm2/g MeV cm2/g MeV cm2/g MeV cm2/g g/cm2
 Minimum ionization at some energy
 1.000E+01 0.0 1.0E-04 2.0E-04 3.0E-04 1.5000E+00 1.5010E+00 4.000E+01
 1.000E+02 0.0 1.5E-03 2.5E-03 3.5E-03 2.0000E+00 2.0075E+00 3.000E+02
 critical energy is reached here
";
        let rows = parse(text).unwrap();
        assert_eq!(rows.len(), 2);
        assert!((rows[0].k - 0.01).abs() < 1e-12);
        assert!((rows[1].k - 0.1).abs() < 1e-12);
    }

    #[test]
    fn rejects_non_monotone_energy_column() {
        let text = "\
 header
 2.0 0.0 0.0 0.0 0.0 0.0 1.0 1.0
 1.0 0.0 0.0 0.0 0.0 0.0 1.0 1.0
";
        assert!(parse(text).is_err());
    }

    #[test]
    fn write_then_parse_round_trips() {
        let rows = vec![
            DedxRow { k: 0.01, brems: 1e-7, pair: 2e-7, photonuclear: 3e-7, ionisation: 1.5e-3, total: 1.501e-3, x_csda: 400.0 },
            DedxRow { k: 0.1, brems: 1.5e-6, pair: 2.5e-6, photonuclear: 3.5e-6, ionisation: 2.0e-3, total: 2.0075e-3, x_csda: 3000.0 },
        ];
        let text = write(&rows);
        let reparsed = parse(&text).unwrap();
        assert_eq!(reparsed.len(), rows.len());
        for (a, b) in rows.iter().zip(reparsed.iter()) {
            assert!((a.k - b.k).abs() / a.k < 1e-6);
            assert!((a.total - b.total).abs() / a.total < 1e-6);
        }
    }
}
