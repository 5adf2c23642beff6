//! Current-dataset ownership and snapshot persistence.
//!
//! A [`DatasetRepository`] holds the dataset the analysis requests run
//! against. Every replacement is offered to an optional [`SnapshotStore`];
//! the outcome is reported in the returned [`LoadReport`] instead of being
//! swallowed.
//!
//! ```
//! use u_attribution::session::{DatasetRepository, Persistence};
//!
//! let mut repo = DatasetRepository::ephemeral();
//! assert!(repo.current().is_err());
//!
//! let report = repo.load(b"T,Y\n1,3\n0,1\n", "campaign.csv").unwrap();
//! assert_eq!(report.columns, vec!["T", "Y"]);
//! assert_eq!(report.persistence, Persistence::Ephemeral);
//! assert_eq!(repo.current().unwrap().row_count(), 2);
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::csv_parser::{load_dataset, write_csv, CsvParser};
use crate::dataframe::DataFrame;
use crate::error::AttributionError;
use crate::simulate::{preprocess_retail, simulate_dataset};

/// Snapshot persistence settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory for CSV snapshots; `None` keeps datasets in memory only.
    pub snapshot_dir: Option<PathBuf>,
}

// ── Snapshot store ────────────────────────────────────────────────────

/// Content-addressed storage for dataset snapshots.
pub trait SnapshotStore: Send + Sync {
    /// Stores CSV bytes and marks them as the latest snapshot. Returns the
    /// snapshot id.
    fn put(&self, csv: &[u8]) -> Result<String, AttributionError>;

    /// Reads a snapshot by id.
    fn get(&self, id: &str) -> Result<Vec<u8>, AttributionError>;

    /// Id of the most recent snapshot, if any.
    fn latest(&self) -> Result<Option<String>, AttributionError>;
}

/// Filesystem store: `<dir>/<blake3-hex>.csv` plus a `LATEST` pointer file.
#[derive(Debug, Clone)]
pub struct FsSnapshotStore {
    dir: PathBuf,
}

const LATEST: &str = "LATEST";

impl FsSnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> Result<PathBuf, AttributionError> {
        if id.len() != 64 || !id.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(AttributionError::Snapshot(format!("invalid snapshot id '{id}'")));
        }
        Ok(self.dir.join(format!("{id}.csv")))
    }
}

fn store_err(path: &Path, e: std::io::Error) -> AttributionError {
    AttributionError::Snapshot(format!("{}: {e}", path.display()))
}

impl SnapshotStore for FsSnapshotStore {
    fn put(&self, csv: &[u8]) -> Result<String, AttributionError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| store_err(&self.dir, e))?;
        let id = blake3::hash(csv).to_hex().to_string();
        let path = self.path_for(&id)?;
        if !path.exists() {
            std::fs::write(&path, csv).map_err(|e| store_err(&path, e))?;
        }
        let latest = self.dir.join(LATEST);
        std::fs::write(&latest, &id).map_err(|e| store_err(&latest, e))?;
        Ok(id)
    }

    fn get(&self, id: &str) -> Result<Vec<u8>, AttributionError> {
        let path = self.path_for(id)?;
        let bytes = std::fs::read(&path).map_err(|e| store_err(&path, e))?;
        if blake3::hash(&bytes).to_hex().as_str() != id {
            return Err(AttributionError::Snapshot(format!(
                "{}: content does not match its id",
                path.display()
            )));
        }
        Ok(bytes)
    }

    fn latest(&self) -> Result<Option<String>, AttributionError> {
        let path = self.dir.join(LATEST);
        match std::fs::read_to_string(&path) {
            Ok(s) => Ok(Some(s.trim().to_string()).filter(|s| !s.is_empty())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(store_err(&path, e)),
        }
    }
}

// ── Repository ────────────────────────────────────────────────────────

/// What happened to a dataset's snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Persistence {
    /// No store configured.
    Ephemeral,
    Persisted { id: String },
    /// The dataset is loaded but its snapshot was not written.
    Failed { reason: String },
}

/// Summary returned by every operation that replaces the dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadReport {
    pub columns: Vec<String>,
    pub rows: usize,
    pub persistence: Persistence,
}

/// Owns the dataset that analysis requests run against.
pub struct DatasetRepository {
    current: Option<Arc<DataFrame>>,
    store: Option<Box<dyn SnapshotStore>>,
    retail_seed: u64,
}

impl std::fmt::Debug for DatasetRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatasetRepository")
            .field("rows", &self.current.as_ref().map(|d| d.row_count()))
            .field("persistent", &self.store.is_some())
            .finish()
    }
}

impl DatasetRepository {
    /// A repository with an optional snapshot store.
    pub fn new(store: Option<Box<dyn SnapshotStore>>) -> Self {
        Self {
            current: None,
            store,
            retail_seed: 42,
        }
    }

    /// In-memory only.
    pub fn ephemeral() -> Self {
        Self::new(None)
    }

    /// Builds a repository from config, with a filesystem store when a
    /// snapshot directory is set.
    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(
            config
                .snapshot_dir
                .as_ref()
                .map(|d| Box::new(FsSnapshotStore::new(d)) as Box<dyn SnapshotStore>),
        )
    }

    /// Seed for the simulated campaign attached to retail uploads.
    pub fn with_retail_seed(mut self, seed: u64) -> Self {
        self.retail_seed = seed;
        self
    }

    /// Makes `df` the current dataset and snapshots it.
    pub fn replace(&mut self, df: DataFrame) -> LoadReport {
        let persistence = match &self.store {
            None => Persistence::Ephemeral,
            Some(store) => match store.put(write_csv(&df).as_bytes()) {
                Ok(id) => {
                    tracing::info!(snapshot = %id, "dataset snapshot persisted");
                    Persistence::Persisted { id }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "dataset snapshot not persisted");
                    Persistence::Failed {
                        reason: e.to_string(),
                    }
                }
            },
        };
        let report = LoadReport {
            columns: df.column_names().to_vec(),
            rows: df.row_count(),
            persistence,
        };
        self.current = Some(Arc::new(df));
        report
    }

    /// Parses an uploaded file and makes it current. File names containing
    /// "retail" are aggregated with [`preprocess_retail`] first.
    pub fn load(&mut self, content: &[u8], filename: &str) -> Result<LoadReport, AttributionError> {
        let mut df = load_dataset(content, filename)?;
        if filename.to_ascii_lowercase().contains("retail") {
            df = preprocess_retail(&df, self.retail_seed)?;
        }
        Ok(self.replace(df))
    }

    /// Generates a synthetic dataset and makes it current.
    pub fn simulate(&mut self, samples: usize, seed: u64) -> Result<LoadReport, AttributionError> {
        let df = simulate_dataset(samples, seed)?;
        Ok(self.replace(df))
    }

    /// The current dataset.
    pub fn current(&self) -> Result<Arc<DataFrame>, AttributionError> {
        self.current.clone().ok_or(AttributionError::NoDataset)
    }

    /// The current dataset, restoring the latest snapshot when nothing is
    /// loaded yet.
    ///
    /// An empty store yields [`AttributionError::NoDataset`]; a snapshot
    /// that cannot be read or verified is returned as its own error.
    pub fn current_or_restore(&mut self) -> Result<Arc<DataFrame>, AttributionError> {
        if self.current.is_none() && self.store.is_some() {
            match self.restore_latest() {
                Ok(_) | Err(AttributionError::NoDataset) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "snapshot restore failed");
                    return Err(e);
                }
            }
        }
        self.current()
    }

    /// Column names of the current dataset.
    pub fn columns(&self) -> Result<Vec<String>, AttributionError> {
        Ok(self.current()?.column_names().to_vec())
    }

    /// Reloads the most recent snapshot from the store.
    pub fn restore_latest(&mut self) -> Result<LoadReport, AttributionError> {
        let store = self
            .store
            .as_ref()
            .ok_or_else(|| AttributionError::Snapshot("no snapshot store configured".into()))?;
        let id = store.latest()?.ok_or(AttributionError::NoDataset)?;
        let bytes = store.get(&id)?;
        let df = CsvParser::new().parse_str(&String::from_utf8_lossy(&bytes))?;
        tracing::info!(snapshot = %id, rows = df.row_count(), "dataset restored from snapshot");

        let report = LoadReport {
            columns: df.column_names().to_vec(),
            rows: df.row_count(),
            persistence: Persistence::Persisted { id },
        };
        self.current = Some(Arc::new(df));
        Ok(report)
    }
}

impl Default for DatasetRepository {
    fn default() -> Self {
        Self::ephemeral()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenStore;

    impl SnapshotStore for BrokenStore {
        fn put(&self, _: &[u8]) -> Result<String, AttributionError> {
            Err(AttributionError::Snapshot("disk full".into()))
        }
        fn get(&self, _: &str) -> Result<Vec<u8>, AttributionError> {
            Err(AttributionError::Snapshot("disk full".into()))
        }
        fn latest(&self) -> Result<Option<String>, AttributionError> {
            Ok(None)
        }
    }

    const CSV: &[u8] = b"Treatment,Outcome,Region\n1,10,north\n1,20,south\n0,5,north\n0,7,north\n";

    #[test]
    fn empty_repository_has_no_dataset() {
        let repo = DatasetRepository::ephemeral();
        assert_eq!(repo.current().unwrap_err(), AttributionError::NoDataset);
        assert_eq!(repo.columns().unwrap_err(), AttributionError::NoDataset);
    }

    #[test]
    fn replace_swaps_current_dataset() {
        let mut repo = DatasetRepository::ephemeral();
        repo.load(CSV, "a.csv").unwrap();
        let first = repo.current().unwrap();
        let report = repo.simulate(25, 1).unwrap();
        assert_eq!(report.rows, 25);
        assert_eq!(repo.current().unwrap().row_count(), 25);
        // readers keep their snapshot
        assert_eq!(first.row_count(), 4);
    }

    #[test]
    fn unsupported_upload_keeps_previous_dataset() {
        let mut repo = DatasetRepository::ephemeral();
        repo.load(CSV, "a.csv").unwrap();
        assert!(matches!(
            repo.load(b"whatever", "book.xlsx"),
            Err(AttributionError::UnsupportedFormat { .. })
        ));
        assert_eq!(repo.columns().unwrap(), vec!["Treatment", "Outcome", "Region"]);
    }

    #[test]
    fn retail_file_names_trigger_preprocessing() {
        let csv = b"InvoiceNo,Quantity,InvoiceDate,UnitPrice,CustomerID,Country\n\
1,2,2011-01-01 10:00,3.0,100,UK\n2,1,2011-01-02 10:00,4.0,200,UK\n";
        let mut repo = DatasetRepository::ephemeral();
        let report = repo.load(csv, "Online_RETAIL.csv").unwrap();
        assert_eq!(report.rows, 2);
        assert!(report.columns.contains(&"Recency".to_string()));
        assert!(report.columns.contains(&"Treatment".to_string()));
    }

    #[test]
    fn persistence_failure_is_reported() {
        let mut repo = DatasetRepository::new(Some(Box::new(BrokenStore)));
        let report = repo.load(CSV, "a.csv").unwrap();
        assert_eq!(
            report.persistence,
            Persistence::Failed {
                reason: "snapshot store: disk full".into()
            }
        );
        // the dataset is still usable
        assert_eq!(repo.current().unwrap().row_count(), 4);
    }

    #[test]
    fn fs_store_round_trip_and_restore() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            snapshot_dir: Some(dir.path().join("snapshots")),
        };

        let mut repo = DatasetRepository::from_config(&config);
        let report = repo.load(CSV, "a.csv").unwrap();
        let Persistence::Persisted { id } = &report.persistence else {
            panic!("expected persisted, got {:?}", report.persistence);
        };
        assert_eq!(id.len(), 64);

        let mut fresh = DatasetRepository::from_config(&config);
        let restored = fresh.restore_latest().unwrap();
        assert_eq!(restored.columns, report.columns);
        assert_eq!(restored.rows, 4);
        assert_eq!(*fresh.current().unwrap(), *repo.current().unwrap());
    }

    #[test]
    fn current_or_restore_falls_back_to_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = || Some(Box::new(FsSnapshotStore::new(dir.path())) as Box<dyn SnapshotStore>);

        let mut empty = DatasetRepository::new(store());
        assert_eq!(empty.current_or_restore().unwrap_err(), AttributionError::NoDataset);

        DatasetRepository::new(store()).load(CSV, "a.csv").unwrap();
        let mut fresh = DatasetRepository::new(store());
        assert_eq!(fresh.current_or_restore().unwrap().row_count(), 4);
    }

    #[test]
    fn current_or_restore_reports_corrupt_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = || Some(Box::new(FsSnapshotStore::new(dir.path())) as Box<dyn SnapshotStore>);

        let report = DatasetRepository::new(store()).load(CSV, "a.csv").unwrap();
        let Persistence::Persisted { id } = report.persistence else {
            panic!("expected persisted, got {:?}", report.persistence);
        };
        std::fs::write(dir.path().join(format!("{id}.csv")), b"x\n2\n").unwrap();

        let mut fresh = DatasetRepository::new(store());
        let err = fresh.current_or_restore().unwrap_err();
        assert!(matches!(err, AttributionError::Snapshot(_)), "got {err:?}");
        assert_eq!(fresh.current().unwrap_err(), AttributionError::NoDataset);
    }

    #[test]
    fn identical_content_shares_an_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsSnapshotStore::new(dir.path());
        let a = store.put(b"x\n1\n").unwrap();
        let b = store.put(b"x\n1\n").unwrap();
        assert_eq!(a, b);
        assert_eq!(store.latest().unwrap(), Some(a.clone()));
        assert_eq!(store.get(&a).unwrap(), b"x\n1\n");
    }

    #[test]
    fn fs_store_rejects_bad_ids_and_tampering() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsSnapshotStore::new(dir.path());
        assert!(store.get("../etc/passwd").is_err());
        assert_eq!(store.latest().unwrap(), None);

        let id = store.put(b"x\n1\n").unwrap();
        std::fs::write(dir.path().join(format!("{id}.csv")), b"x\n2\n").unwrap();
        assert!(matches!(store.get(&id), Err(AttributionError::Snapshot(_))));
    }

    #[test]
    fn restore_without_store_or_snapshot() {
        let mut repo = DatasetRepository::ephemeral();
        assert!(matches!(repo.restore_latest(), Err(AttributionError::Snapshot(_))));

        let dir = tempfile::tempdir().unwrap();
        let mut repo = DatasetRepository::new(Some(Box::new(FsSnapshotStore::new(dir.path()))));
        assert_eq!(repo.restore_latest().unwrap_err(), AttributionError::NoDataset);
    }

    #[test]
    fn persistence_serializes_with_status_tag() {
        let json = serde_json::to_value(Persistence::Persisted { id: "ab".into() }).unwrap();
        assert_eq!(json, serde_json::json!({"status": "persisted", "id": "ab"}));
        let json = serde_json::to_value(Persistence::Ephemeral).unwrap();
        assert_eq!(json, serde_json::json!({"status": "ephemeral"}));
    }
}
