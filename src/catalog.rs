//! Read-only view over the stem index.
//!
//! The index is loaded once into an arena of [`StemRecord`]s with secondary
//! indices by tempo bin and sound class. Nothing here mutates after load;
//! "removing" a stem yields a [`CatalogView`] that skips it.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::error::{CatalogError, SelectionFailure};
use crate::types::{SoundClass, StemRecord, TempoBin};

pub const REQUIRED_COLUMNS: [&str; 6] = [
    "stem_name",
    "data_home",
    "tempo",
    "tempo_bin",
    "instrument_name",
    "sound_class",
];

/// One line of `index.csv`, exactly as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRow {
    pub stem_name: String,
    pub data_home: Option<String>,
    pub tempo: Option<f64>,
    pub tempo_bin: Option<String>,
    pub instrument_name: Option<String>,
    pub sound_class: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
}

impl IndexRow {
    fn into_record(self, default_home: &Path) -> StemRecord {
        let data_home = match self.data_home {
            Some(home) if !home.trim().is_empty() => PathBuf::from(home),
            _ => default_home.to_path_buf(),
        };
        let tempo_bin = self.tempo_bin.as_deref().and_then(TempoBin::parse);

        StemRecord {
            stem_id: self.stem_name,
            data_home,
            tempo: self.tempo.filter(|t| t.is_finite()),
            tempo_bin,
            instrument_name: non_empty(self.instrument_name),
            sound_class: self
                .sound_class
                .as_deref()
                .map(SoundClass::parse)
                .unwrap_or(SoundClass::Unknown),
            key: non_empty(self.key),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[derive(Debug, Clone, Default)]
pub struct StemCatalog {
    records: Vec<StemRecord>,
    by_id: HashMap<String, usize>,
    by_tempo_bin: HashMap<TempoBin, Vec<usize>>,
    by_class: HashMap<SoundClass, Vec<usize>>,
}

impl StemCatalog {
    /// Loads `index.csv`. Rows with an empty `data_home` resolve against the
    /// directory holding the index.
    pub fn load(path: &Path) -> Result<StemCatalog, CatalogError> {
        let file = File::open(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let default_home = path.parent().unwrap_or_else(|| Path::new("."));
        StemCatalog::from_reader(file, default_home)
    }

    pub fn from_reader<R: Read>(reader: R, default_home: &Path) -> Result<StemCatalog, CatalogError> {
        let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

        let headers = reader.headers()?.clone();
        for column in REQUIRED_COLUMNS {
            if !headers.iter().any(|h| h == column) {
                return Err(CatalogError::MissingColumn(column));
            }
        }

        let mut records = Vec::new();
        for row in reader.deserialize::<IndexRow>() {
            records.push(row?.into_record(default_home));
        }
        StemCatalog::from_records(records)
    }

    pub fn from_records(records: Vec<StemRecord>) -> Result<StemCatalog, CatalogError> {
        let mut catalog = StemCatalog::default();

        for (idx, record) in records.iter().enumerate() {
            if catalog.by_id.insert(record.stem_id.clone(), idx).is_some() {
                return Err(CatalogError::DuplicateStem(record.stem_id.clone()));
            }
            if !record.is_eligible() {
                continue;
            }
            if let Some(bin) = &record.tempo_bin {
                catalog.by_tempo_bin.entry(bin.clone()).or_default().push(idx);
            }
            catalog.by_class.entry(record.sound_class).or_default().push(idx);
        }

        catalog.records = records;
        Ok(catalog)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[StemRecord] {
        &self.records
    }

    pub fn get(&self, stem_id: &str) -> Option<&StemRecord> {
        self.by_id.get(stem_id).map(|&idx| &self.records[idx])
    }

    /// Number of rows that can take part in selection.
    pub fn eligible_count(&self) -> usize {
        self.by_class.values().map(Vec::len).sum()
    }

    pub fn view(&self) -> CatalogView<'_> {
        CatalogView {
            catalog: self,
            excluded: Vec::new(),
        }
    }

    pub fn filter(
        &self,
        tempo_bin: Option<&TempoBin>,
        sound_class: Option<SoundClass>,
        exclude_instrument: Option<&str>,
    ) -> Vec<&StemRecord> {
        self.view().filter(tempo_bin, sound_class, exclude_instrument)
    }

    pub fn sample_one<R, P>(&self, rng: &mut R, predicate: P) -> Result<&StemRecord, SelectionFailure>
    where
        R: Rng + ?Sized,
        P: Fn(&StemRecord) -> bool,
    {
        self.view().sample_one(rng, predicate)
    }

    pub fn remove(&self, stem_id: &str) -> CatalogView<'_> {
        self.view().remove(stem_id)
    }
}

/// The catalog minus a set of excluded stems.
#[derive(Debug, Clone)]
pub struct CatalogView<'a> {
    catalog: &'a StemCatalog,
    excluded: Vec<usize>,
}

impl<'a> CatalogView<'a> {
    pub fn remove(mut self, stem_id: &str) -> CatalogView<'a> {
        if let Some(&idx) = self.catalog.by_id.get(stem_id) {
            if !self.excluded.contains(&idx) {
                self.excluded.push(idx);
            }
        }
        self
    }

    fn candidates(&self, tempo_bin: Option<&TempoBin>, sound_class: Option<SoundClass>) -> Vec<usize> {
        let pool: Vec<usize> = match (tempo_bin, sound_class) {
            (Some(bin), _) => self.catalog.by_tempo_bin.get(bin).cloned().unwrap_or_default(),
            (None, Some(class)) => self.catalog.by_class.get(&class).cloned().unwrap_or_default(),
            (None, None) => (0..self.catalog.records.len())
                .filter(|&idx| self.catalog.records[idx].is_eligible())
                .collect(),
        };
        pool.into_iter().filter(|idx| !self.excluded.contains(idx)).collect()
    }

    /// Eligible rows matching every given criterion, in index order.
    /// An empty result is not an error.
    pub fn filter(
        &self,
        tempo_bin: Option<&TempoBin>,
        sound_class: Option<SoundClass>,
        exclude_instrument: Option<&str>,
    ) -> Vec<&'a StemRecord> {
        let catalog = self.catalog;
        self.candidates(tempo_bin, sound_class)
            .into_iter()
            .map(|idx| &catalog.records[idx])
            .filter(|r| sound_class.map_or(true, |c| r.sound_class == c))
            .filter(|r| !r.shares_instrument(exclude_instrument))
            .collect()
    }

    /// Uniform draw among eligible rows accepted by `predicate`.
    pub fn sample_one<R, P>(&self, rng: &mut R, predicate: P) -> Result<&'a StemRecord, SelectionFailure>
    where
        R: Rng + ?Sized,
        P: Fn(&StemRecord) -> bool,
    {
        let matches: Vec<&'a StemRecord> = self
            .filter(None, None, None)
            .into_iter()
            .filter(|r| predicate(r))
            .collect();
        matches.choose(rng).copied().ok_or(SelectionFailure::EmptyPool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const INDEX: &str = "\
stem_name,data_home,tempo,tempo_bin,instrument_name,sound_class,key
kick.wav,/stems,100.2,100,drums,percussive,
bass.wav,/stems,99.7,100.0,bass,harmonic,E
keys.wav,,101,100,piano,harmonic,
shaker.wav,/stems,120,120,shaker,percussive,
mystery.wav,/stems,90,,,harmonic,
vox.wav,/stems,,,vocals,vocals,
";

    fn catalog() -> StemCatalog {
        StemCatalog::from_reader(INDEX.as_bytes(), Path::new("/index-home")).unwrap()
    }

    #[test]
    fn test_load_parses_rows() {
        let catalog = catalog();
        assert_eq!(catalog.len(), 6);
        assert_eq!(catalog.eligible_count(), 4);

        let bass = catalog.get("bass.wav").unwrap();
        assert_eq!(bass.tempo_bin, Some(TempoBin::from(100)));
        assert_eq!(bass.key.as_deref(), Some("E"));
        assert_eq!(bass.sound_class, SoundClass::Harmonic);

        let keys = catalog.get("keys.wav").unwrap();
        assert_eq!(keys.data_home, PathBuf::from("/index-home"));
        assert_eq!(keys.key, None);

        let mystery = catalog.get("mystery.wav").unwrap();
        assert_eq!(mystery.instrument_name, None);
        assert!(!mystery.is_eligible());
    }

    #[test]
    fn test_missing_column_is_rejected() {
        let index = "stem_name,data_home,tempo,instrument_name,sound_class\nkick.wav,/s,100,drums,percussive\n";
        let err = StemCatalog::from_reader(index.as_bytes(), Path::new("/")).unwrap_err();
        assert!(matches!(err, CatalogError::MissingColumn("tempo_bin")));
    }

    #[test]
    fn test_duplicate_stem_is_rejected() {
        let index = "\
stem_name,data_home,tempo,tempo_bin,instrument_name,sound_class,key
kick.wav,/s,100,100,drums,percussive,
kick.wav,/s,100,100,drums,percussive,
";
        let err = StemCatalog::from_reader(index.as_bytes(), Path::new("/")).unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateStem(id) if id == "kick.wav"));
    }

    #[test]
    fn test_unreadable_index() {
        let err = StemCatalog::load(Path::new("/definitely/not/here/index.csv")).unwrap_err();
        assert!(matches!(err, CatalogError::Io { .. }));
    }

    #[test]
    fn test_filter_by_bin_class_and_instrument() {
        let catalog = catalog();

        let bin_100: Vec<&str> = catalog
            .filter(Some(&TempoBin::from(100)), None, None)
            .iter()
            .map(|r| r.stem_id.as_str())
            .collect();
        assert_eq!(bin_100, vec!["kick.wav", "bass.wav", "keys.wav"]);

        let harmonic = catalog.filter(Some(&TempoBin::from(100)), Some(SoundClass::Harmonic), Some("bass"));
        assert_eq!(harmonic.len(), 1);
        assert_eq!(harmonic[0].stem_id, "keys.wav");

        assert!(catalog.filter(Some(&TempoBin::from(70)), None, None).is_empty());
        assert_eq!(catalog.filter(None, Some(SoundClass::Percussive), None).len(), 2);
    }

    #[test]
    fn test_remove_hides_stem() {
        let catalog = catalog();
        let view = catalog.remove("kick.wav");
        let ids: Vec<&str> = view
            .filter(Some(&TempoBin::from(100)), None, None)
            .iter()
            .map(|r| r.stem_id.as_str())
            .collect();
        assert_eq!(ids, vec!["bass.wav", "keys.wav"]);
        // the catalog itself is untouched
        assert_eq!(catalog.filter(Some(&TempoBin::from(100)), None, None).len(), 3);
    }

    #[test]
    fn test_sample_one() {
        let catalog = catalog();
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..20 {
            let pick = catalog
                .sample_one(&mut rng, |r| r.sound_class == SoundClass::Percussive)
                .unwrap();
            assert_eq!(pick.sound_class, SoundClass::Percussive);
        }

        let err = catalog
            .sample_one(&mut rng, |r| r.sound_class == SoundClass::Vocals)
            .unwrap_err();
        assert_eq!(err, SelectionFailure::EmptyPool);
    }

    #[test]
    fn test_fractional_bins_stay_distinct() {
        let index = "\
stem_name,data_home,tempo,tempo_bin,instrument_name,sound_class,key
a.wav,/s,97.5,97.5,drums,percussive,
b.wav,/s,98,98,bass,harmonic,
c.wav,/s,98.1,98.0,piano,harmonic,
";
        let catalog = StemCatalog::from_reader(index.as_bytes(), Path::new("/")).unwrap();
        let a = catalog.get("a.wav").unwrap();
        let b = catalog.get("b.wav").unwrap();
        assert_ne!(a.tempo_bin, b.tempo_bin);
        assert_eq!(catalog.get("c.wav").unwrap().tempo_bin, b.tempo_bin);

        let with_a = catalog.filter(a.tempo_bin.as_ref(), None, None);
        assert_eq!(with_a.len(), 1);
        assert_eq!(catalog.filter(b.tempo_bin.as_ref(), None, None).len(), 2);
    }

    #[test]
    fn test_string_bins_are_opaque_keys() {
        let index = "\
stem_name,data_home,tempo,tempo_bin,instrument_name,sound_class,key
a.wav,/s,70,slow,drums,percussive,
b.wav,/s,72,slow,bass,harmonic,
c.wav,/s,140,fast,piano,harmonic,
";
        let catalog = StemCatalog::from_reader(index.as_bytes(), Path::new("/")).unwrap();
        assert_eq!(catalog.eligible_count(), 3);

        let slow = TempoBin::parse("slow").unwrap();
        let ids: Vec<&str> = catalog
            .filter(Some(&slow), None, None)
            .iter()
            .map(|r| r.stem_id.as_str())
            .collect();
        assert_eq!(ids, vec!["a.wav", "b.wav"]);
    }
}
