use crate::migration::run::{Run, StepRecord};
use crate::migration::store::{ensure_steps_belong_to, sort_newest_first, RunStore, StoreError};
use crate::shared::ids::RunId;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// A run and every step record it owns, stored as one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RunDocument {
    run: Run,
    #[serde(default)]
    steps: Vec<StepRecord>,
}

impl RunDocument {
    fn merge_steps(&mut self, rows: &[StepRecord]) {
        for row in rows {
            match self.steps.iter_mut().find(|step| step.order == row.order) {
                Some(existing) => *existing = row.clone(),
                None => self.steps.push(row.clone()),
            }
        }
        self.steps.sort_by_key(|step| step.order);
    }
}

/// One JSON document per run at `<state_root>/runs/<run_id>.json` holding the
/// run and its step records. A save rewrites the whole document through a temp
/// file and a rename, so readers see either the previous save or the new one.
#[derive(Debug, Clone)]
pub struct FileRunStore {
    state_root: PathBuf,
}

impl FileRunStore {
    pub fn new(state_root: impl Into<PathBuf>) -> Self {
        Self {
            state_root: state_root.into(),
        }
    }

    pub fn state_root(&self) -> &Path {
        &self.state_root
    }

    fn runs_root(&self) -> PathBuf {
        self.state_root.join("runs")
    }

    fn run_path(&self, run_id: &RunId) -> PathBuf {
        self.runs_root().join(format!("{run_id}.json"))
    }

    fn load_document(&self, run_id: &RunId) -> Result<Option<RunDocument>, StoreError> {
        read_document(&self.run_path(run_id))
    }
}

impl RunStore for FileRunStore {
    fn save(&self, run: &Run, steps: &[StepRecord]) -> Result<(), StoreError> {
        ensure_steps_belong_to(run, steps)?;
        let mut document = self
            .load_document(&run.id)?
            .unwrap_or_else(|| RunDocument {
                run: run.clone(),
                steps: Vec::new(),
            });
        document.run = run.clone();
        document.merge_steps(steps);
        write_document(&self.run_path(&run.id), &document)
    }

    fn load_run(&self, run_id: &RunId) -> Result<Option<Run>, StoreError> {
        Ok(self.load_document(run_id)?.map(|document| document.run))
    }

    fn load_steps(&self, run_id: &RunId) -> Result<Vec<StepRecord>, StoreError> {
        Ok(self
            .load_document(run_id)?
            .map(|document| document.steps)
            .unwrap_or_default())
    }

    fn list_runs(&self) -> Result<Vec<Run>, StoreError> {
        let mut runs = Vec::new();
        for path in json_files_in(&self.runs_root())? {
            if let Some(document) = read_document(&path)? {
                runs.push(document.run);
            }
        }
        sort_newest_first(&mut runs);
        Ok(runs)
    }

    fn delete_run(&self, run_id: &RunId) -> Result<bool, StoreError> {
        let run_path = self.run_path(run_id);
        match fs::remove_file(&run_path) {
            Ok(()) => Ok(true),
            Err(source) if source.kind() == ErrorKind::NotFound => Ok(false),
            Err(source) => Err(io_error(&run_path, source)),
        }
    }
}

fn read_document(path: &Path) -> Result<Option<RunDocument>, StoreError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(source) if source.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => return Err(io_error(path, source)),
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|e| json_error(path, e))
}

/// Temp file in the same directory, fsync, rename over `path`, fsync the
/// directory.
fn write_document(path: &Path, document: &RunDocument) -> Result<(), StoreError> {
    let parent = path
        .parent()
        .ok_or_else(|| StoreError::Corrupt(format!("{} has no parent", path.display())))?;
    fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
    let body = serde_json::to_vec_pretty(document).map_err(|e| json_error(path, e))?;

    let tmp_path = parent.join(format!(
        ".{}.tmp-{}-{}",
        document.run.id,
        std::process::id(),
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0),
    ));
    let written = fs::OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(&tmp_path)
        .and_then(|mut file| {
            file.write_all(&body)?;
            file.sync_all()
        })
        .and_then(|()| fs::rename(&tmp_path, path));
    if let Err(source) = written {
        let _ = fs::remove_file(&tmp_path);
        return Err(io_error(path, source));
    }
    sync_dir(parent).map_err(|e| io_error(parent, e))
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> std::io::Result<()> {
    fs::File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

fn json_files_in(dir: &Path) -> Result<Vec<PathBuf>, StoreError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(source) if source.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => return Err(io_error(dir, source)),
    };
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| io_error(dir, source))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if path.extension().and_then(|value| value.to_str()) != Some("json") {
            continue;
        }
        files.push(path);
    }
    Ok(files)
}

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}

fn json_error(path: &Path, source: serde_json::Error) -> StoreError {
    StoreError::Json {
        path: path.display().to_string(),
        source,
    }
}
