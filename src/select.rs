//! Drawing a compatible set of stems from the catalog.

use itertools::Itertools;
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;

use crate::catalog::StemCatalog;
use crate::error::SelectionFailure;
use crate::types::{SoundClass, StemRecord};

/// Outcome of a successful draw: `[base, ...percussive, ...harmonic]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub stems: Vec<StemRecord>,
    pub base_tempo: f64,
}

impl Selection {
    pub fn base(&self) -> &StemRecord {
        &self.stems[0]
    }
}

/// Picks a base stem and companions sharing its tempo bin, with no
/// instrument appearing twice.
///
/// The base stem counts toward its own class. When no base is given it is
/// drawn from the percussive pool if any percussive stems are requested,
/// since percussion sets the grid the harmonic stems lock to.
pub fn select<R: Rng + ?Sized>(
    catalog: &StemCatalog,
    n_harmonic: usize,
    n_percussive: usize,
    base_stem_id: Option<&str>,
    rng: &mut R,
) -> Result<Selection, SelectionFailure> {
    let base = match base_stem_id {
        Some(id) => {
            let record = catalog
                .get(id)
                .ok_or_else(|| SelectionFailure::UnknownStem(id.to_string()))?;
            if !record.is_eligible() {
                return Err(SelectionFailure::IneligibleStem(id.to_string()));
            }
            record
        }
        None => {
            let class = if n_percussive > 0 {
                SoundClass::Percussive
            } else {
                SoundClass::Harmonic
            };
            catalog.sample_one(rng, |r| r.sound_class == class)?
        }
    };

    let (mut n_harmonic, mut n_percussive) = (n_harmonic, n_percussive);
    match base.sound_class {
        SoundClass::Percussive => n_percussive = n_percussive.saturating_sub(1),
        SoundClass::Harmonic => n_harmonic = n_harmonic.saturating_sub(1),
        _ => {}
    }

    let base_bin = base
        .tempo_bin
        .as_ref()
        .ok_or_else(|| SelectionFailure::IneligibleStem(base.stem_id.clone()))?;
    // a non-numeric bin falls back to the base stem's own tempo
    let base_tempo = base_bin
        .bpm()
        .or(base.tempo.filter(|t| t.is_finite() && *t > 0.0))
        .ok_or_else(|| SelectionFailure::NoBaseTempo(base.stem_id.clone()))?;
    let pool = catalog.remove(&base.stem_id);
    let compatible = pool.filter(Some(base_bin), None, base.instrument_name.as_deref());

    let mut used: Vec<&str> = base.instrument_name.as_deref().into_iter().collect();
    let percussive = draw_class(&compatible, SoundClass::Percussive, n_percussive, &mut used, rng)?;
    let harmonic = draw_class(&compatible, SoundClass::Harmonic, n_harmonic, &mut used, rng)?;

    let stems: Vec<StemRecord> = std::iter::once(base)
        .chain(percussive)
        .chain(harmonic)
        .cloned()
        .collect();

    check_selection(&stems, n_harmonic + n_percussive + 1)?;
    debug!(
        base = %base.stem_id,
        tempo_bin = %base_bin,
        n_stems = stems.len(),
        "selected stems"
    );

    Ok(Selection {
        stems,
        base_tempo,
    })
}

/// Draws `count` rows of `class` without replacement, skipping any row whose
/// instrument is already in `used`.
fn draw_class<'a, R: Rng + ?Sized>(
    compatible: &[&'a StemRecord],
    class: SoundClass,
    count: usize,
    used: &mut Vec<&'a str>,
    rng: &mut R,
) -> Result<Vec<&'a StemRecord>, SelectionFailure> {
    if count == 0 {
        return Ok(Vec::new());
    }

    let mut candidates: Vec<&'a StemRecord> = compatible
        .iter()
        .copied()
        .filter(|r| r.sound_class == class)
        .collect();
    candidates.shuffle(rng);

    let mut picked = Vec::with_capacity(count);
    for record in candidates {
        if picked.len() == count {
            break;
        }
        if let Some(name) = record.instrument_name.as_deref() {
            if used.contains(&name) {
                continue;
            }
            used.push(name);
        }
        picked.push(record);
    }

    if picked.len() < count {
        return Err(SelectionFailure::InsufficientPool {
            class,
            requested: count,
            available: picked.len(),
        });
    }
    Ok(picked)
}

/// Rejects a draw with a repeated instrument or the wrong stem count.
pub fn check_selection(stems: &[StemRecord], expected: usize) -> Result<(), SelectionFailure> {
    if let Some(name) = stems
        .iter()
        .filter_map(|s| s.instrument_name.as_deref())
        .duplicates()
        .next()
    {
        return Err(SelectionFailure::DuplicateInstrument(name.to_string()));
    }
    if stems.len() != expected {
        return Err(SelectionFailure::CountMismatch {
            expected,
            actual: stems.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TempoBin;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::path::PathBuf;

    fn record(id: &str, bin: u32, instrument: Option<&str>, class: SoundClass) -> StemRecord {
        StemRecord {
            stem_id: id.to_string(),
            data_home: PathBuf::from("/stems"),
            tempo: Some(bin as f64),
            tempo_bin: Some(TempoBin::from(bin)),
            instrument_name: instrument.map(String::from),
            sound_class: class,
            key: None,
        }
    }

    #[test]
    fn test_check_selection_flags_duplicates() {
        let stems = vec![
            record("a", 100, Some("bass"), SoundClass::Harmonic),
            record("b", 100, Some("bass"), SoundClass::Harmonic),
        ];
        assert_eq!(
            check_selection(&stems, 2),
            Err(SelectionFailure::DuplicateInstrument("bass".to_string()))
        );
    }

    #[test]
    fn test_check_selection_ignores_absent_instruments() {
        let stems = vec![
            record("a", 100, None, SoundClass::Harmonic),
            record("b", 100, None, SoundClass::Harmonic),
        ];
        assert!(check_selection(&stems, 2).is_ok());
        assert_eq!(
            check_selection(&stems, 3),
            Err(SelectionFailure::CountMismatch { expected: 3, actual: 2 })
        );
    }

    #[test]
    fn test_draw_skips_used_instruments() {
        let a = record("a", 100, Some("guitar"), SoundClass::Harmonic);
        let b = record("b", 100, Some("guitar"), SoundClass::Harmonic);
        let c = record("c", 100, Some("piano"), SoundClass::Harmonic);
        let compatible = vec![&a, &b, &c];
        let mut used = Vec::new();
        let mut rng = rand::thread_rng();

        let picked = draw_class(&compatible, SoundClass::Harmonic, 2, &mut used, &mut rng).unwrap();
        let mut names: Vec<&str> = picked.iter().filter_map(|r| r.instrument_name.as_deref()).collect();
        names.sort();
        assert_eq!(names, vec!["guitar", "piano"]);

        let mut used = Vec::new();
        let err = draw_class(&compatible, SoundClass::Harmonic, 3, &mut used, &mut rng).unwrap_err();
        assert_eq!(
            err,
            SelectionFailure::InsufficientPool {
                class: SoundClass::Harmonic,
                requested: 3,
                available: 2
            }
        );
    }

    #[test]
    fn test_base_tempo_comes_from_the_bin() {
        let mut drums = record("drums", 0, Some("drums"), SoundClass::Percussive);
        drums.tempo = Some(97.2);
        drums.tempo_bin = TempoBin::parse("97.5");
        let mut bass = record("bass", 0, Some("bass"), SoundClass::Harmonic);
        bass.tempo_bin = TempoBin::parse("97.50");
        let catalog = StemCatalog::from_records(vec![drums, bass]).unwrap();

        let selection = select(&catalog, 1, 1, None, &mut StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(selection.base_tempo, 97.5);
        assert_eq!(selection.stems.len(), 2);
    }

    #[test]
    fn test_string_bin_falls_back_to_base_tempo() {
        let mut drums = record("drums", 0, Some("drums"), SoundClass::Percussive);
        drums.tempo = Some(71.0);
        drums.tempo_bin = TempoBin::parse("slow");
        let mut bass = record("bass", 0, Some("bass"), SoundClass::Harmonic);
        bass.tempo_bin = TempoBin::parse("slow");
        let catalog = StemCatalog::from_records(vec![drums.clone(), bass]).unwrap();

        let selection = select(&catalog, 1, 1, None, &mut StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(selection.base_tempo, 71.0);

        drums.tempo = None;
        let catalog = StemCatalog::from_records(vec![drums]).unwrap();
        let err = select(&catalog, 0, 1, None, &mut StdRng::seed_from_u64(1)).unwrap_err();
        assert_eq!(err, SelectionFailure::NoBaseTempo("drums".to_string()));
    }
}
