//! Calendar-day reading sources consumed by the engine.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use cgm_core::{CgmDay, PatternError, Reading, Result};
use tracing::debug;

/// Yields one patient's readings grouped by calendar day.
///
/// Implementations may return fewer days than requested but must return
/// them in chronological order and never outside `start..=end`.
/// Failures are reported as [`PatternError::DataSource`].
pub trait DailyCgmSource: Send + Sync {
    fn get_days(&self, patient_id: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<CgmDay>>;

    /// Called once a patient's run is finished so per-patient state can
    /// be dropped.
    fn release(&self, _patient_id: &str) {}
}

fn group_by_day(
    readings: impl IntoIterator<Item = Reading>,
    start: NaiveDate,
    end: NaiveDate,
) -> Vec<CgmDay> {
    let mut by_day: BTreeMap<NaiveDate, Vec<Reading>> = BTreeMap::new();
    for reading in readings {
        let date = reading.date();
        if date >= start && date <= end {
            by_day.entry(date).or_default().push(reading);
        }
    }
    by_day
        .into_iter()
        .map(|(date, readings)| CgmDay::new(date, readings))
        .collect()
}

// ── In-memory ─────────────────────────────────────────────────

/// Readings held in memory, keyed by patient.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    patients: HashMap<String, Vec<Reading>>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_readings(
        mut self,
        patient_id: impl Into<String>,
        readings: impl IntoIterator<Item = Reading>,
    ) -> Self {
        self.insert(patient_id, readings);
        self
    }

    pub fn insert(&mut self, patient_id: impl Into<String>, readings: impl IntoIterator<Item = Reading>) {
        self.patients
            .entry(patient_id.into())
            .or_default()
            .extend(readings);
    }

    pub fn patient_ids(&self) -> impl Iterator<Item = &str> {
        self.patients.keys().map(String::as_str)
    }
}

impl DailyCgmSource for InMemorySource {
    fn get_days(&self, patient_id: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<CgmDay>> {
        Ok(self
            .patients
            .get(patient_id)
            .map(|readings| group_by_day(readings.iter().copied(), start, end))
            .unwrap_or_default())
    }
}

// ── JSON directory ────────────────────────────────────────────

/// Reads `<data_dir>/<patient_id>.json`, a JSON array of
/// `{"timestamp": "2024-01-01T08:05:00", "glucose_mg_dl": 112.0}`.
///
/// A missing file means the patient has no data. An unreadable or
/// malformed file is a `DataSource` error.
///
/// Each file is parsed once and kept until the patient is released, so a
/// run's per-date fetches do not re-read it.
#[derive(Debug)]
pub struct JsonDirSource {
    data_dir: PathBuf,
    loaded: Mutex<HashMap<String, Arc<Vec<Reading>>>>,
    loads: AtomicUsize,
}

impl JsonDirSource {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            loaded: Mutex::new(HashMap::new()),
            loads: AtomicUsize::new(0),
        }
    }

    /// Number of files read and parsed so far.
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::Relaxed)
    }

    /// Patients whose readings are currently held in memory.
    pub fn cached_patients(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<Vec<Reading>>>> {
        self.loaded.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn load(&self, patient_id: &str, path: &Path) -> std::result::Result<Vec<Reading>, String> {
        self.loads.fetch_add(1, Ordering::Relaxed);
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(patient_id, path = %path.display(), "no reading file");
                return Ok(Vec::new());
            }
            Err(e) => return Err(format!("{}: {}", path.display(), e)),
        };
        let readings: Vec<Reading> = serde_json::from_str(&contents)
            .map_err(|e| format!("{}: {}", path.display(), e))?;
        debug!(patient_id, readings = readings.len(), "loaded reading file");
        Ok(readings)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn path_for(&self, patient_id: &str) -> Option<PathBuf> {
        let valid = !patient_id.is_empty()
            && !patient_id.contains(['/', '\\'])
            && patient_id != "."
            && patient_id != "..";
        valid.then(|| self.data_dir.join(format!("{}.json", patient_id)))
    }
}

impl DailyCgmSource for JsonDirSource {
    fn get_days(&self, patient_id: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<CgmDay>> {
        let source_error = |message: String| PatternError::DataSource {
            patient_id: patient_id.to_string(),
            start,
            end,
            message,
        };

        let path = self
            .path_for(patient_id)
            .ok_or_else(|| source_error("invalid patient id".to_string()))?;

        let cached = self.lock().get(patient_id).cloned();
        let readings = match cached {
            Some(readings) => readings,
            None => {
                let readings = Arc::new(self.load(patient_id, &path).map_err(source_error)?);
                self.lock()
                    .insert(patient_id.to_string(), Arc::clone(&readings));
                readings
            }
        };

        Ok(group_by_day(readings.iter().copied(), start, end))
    }

    fn release(&self, patient_id: &str) {
        self.lock().remove(patient_id);
    }
}
