//! Binary dump/load (spec §6): `[u32 version_tag][u32 total_size][bytes]`
//! framing around a `bincode`-serialised [`PhysicsTables`]. Since the DCS
//! registry is resolved by `(process, model name)` string lookups rather
//! than stored function pointers, the model names carried in
//! `TabulatorSettings` are all a reload needs to re-resolve them.

use crate::error::{Error, Result};
use crate::tables::PhysicsTables;
use std::io::{Read, Write};

/// Bumped whenever the on-disk layout of [`PhysicsTables`] changes
/// incompatibly.
pub const VERSION_TAG: u32 = 1;

/// Serialises `tables` to the framed binary dump format.
///
/// # Errors
///
/// Returns [`Error::Format`] if `bincode` serialisation fails.
pub fn serialize(tables: &PhysicsTables) -> Result<Vec<u8>> {
    let payload = bincode::serialize(tables).map_err(|e| Error::format(format!("dump serialisation failed: {e}")))?;
    let mut out = Vec::with_capacity(8 + payload.len());
    out.extend_from_slice(&VERSION_TAG.to_le_bytes());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Parses a framed binary dump, checking the version tag and declared size.
///
/// # Errors
///
/// Returns [`Error::Format`] on a short buffer, a version mismatch, a size
/// mismatch, or a `bincode` decode failure.
pub fn deserialize(bytes: &[u8]) -> Result<PhysicsTables> {
    if bytes.len() < 8 {
        return Err(Error::format("dump is shorter than the 8-byte frame header".into()));
    }
    let version = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
    if version != VERSION_TAG {
        return Err(Error::format(format!("dump version mismatch: expected {VERSION_TAG}, found {version}")));
    }
    let declared_size = u32::from_le_bytes(bytes[4..8].try_into().unwrap()) as usize;
    let payload = &bytes[8..];
    if payload.len() != declared_size {
        return Err(Error::format(format!("dump size mismatch: header says {declared_size}, found {}", payload.len())));
    }
    bincode::deserialize(payload).map_err(|e| Error::format(format!("dump deserialisation failed: {e}")))
}

/// Writes a dump to `writer`.
///
/// # Errors
///
/// Propagates [`Error::Format`] from [`serialize`] or [`Error::Io`] from the
/// write.
pub fn dump_to(tables: &PhysicsTables, writer: &mut impl Write) -> Result<()> {
    let bytes = serialize(tables)?;
    writer.write_all(&bytes)?;
    Ok(())
}

/// Reads a dump from `reader`.
///
/// # Errors
///
/// Propagates [`Error::Io`] from the read or [`Error::Format`] from
/// [`deserialize`].
pub fn load_from(reader: &mut impl Read) -> Result<PhysicsTables> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    deserialize(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dcs::Registry;
    use crate::mdf::MdfDocument;
    use crate::material::{AtomicElement, BaseMaterial, KineticGrid, MaterialComponent};
    use crate::tables::{Particle, TabulatorSettings};

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
    fn round_trips_through_the_framed_format() {
        let tables = rock_tables();
        let bytes = serialize(&tables).unwrap();
        let reloaded = deserialize(&bytes).unwrap();
        assert_eq!(reloaded.tables.len(), tables.tables.len());
        assert_eq!(reloaded.settings.bremsstrahlung_model, tables.settings.bremsstrahlung_model);
    }

    #[test]
    fn rejects_wrong_version_tag() {
        let tables = rock_tables();
        let mut bytes = serialize(&tables).unwrap();
        bytes[0] = bytes[0].wrapping_add(1);
        assert!(deserialize(&bytes).is_err());
    }

    #[test]
    fn rejects_truncated_buffer() {
        assert!(deserialize(&[0u8; 4]).is_err());
    }
}
