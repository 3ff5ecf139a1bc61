//! Persistent per-mode result cache.
//!
//! One bincode file per aggregation mode, reused verbatim on later runs. The key is
//! the mode alone, never the input files: stale results after an input change are a
//! documented operational caveat, cleared manually (see the `clear_cache` binary).

use qu::ick_use::*;
use serde::{de::DeserializeOwned, Serialize};
use std::{
    fs, io,
    path::{Path, PathBuf},
};

use crate::{path_exists, Result};

pub struct ResultCache {
    dir: PathBuf,
}

impl ResultCache {
    /// The cache keys in use, for maintenance tooling.
    pub const KEYS: [&'static str; 2] = ["onset", "vaxfreq"];

    pub fn new(dir: impl Into<PathBuf>) -> Self {
        ResultCache { dir: dir.into() }
    }

    pub fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("vax_data_{}.bin", key))
    }

    /// Return the persisted entry for `key` verbatim, or compute, persist and return
    /// it. `compute` is not invoked on a cache hit.
    pub fn get_or_compute<T, F>(&self, key: &str, compute: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T>,
    {
        let path = self.entry_path(key);
        if path_exists(&path)? {
            event!(Level::INFO, "opened cache \"{}\"", path.display());
            return load(&path);
        }
        let value = compute()?;
        save(&value, &path)?;
        event!(Level::INFO, "cached result to \"{}\"", path.display());
        Ok(value)
    }

    /// Remove the entry for `key`. Returns whether anything was removed.
    pub fn clear(&self, key: &str) -> Result<bool> {
        let path = self.entry_path(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if matches!(e.kind(), io::ErrorKind::NotFound) => Ok(false),
            Err(e) => {
                Err(Error::from(e).context(format!("removing cache \"{}\"", path.display())))
            }
        }
    }
}

fn load<T: DeserializeOwned>(path: &Path) -> Result<T> {
    fn inner<T: DeserializeOwned>(path: &Path) -> Result<T> {
        let reader = io::BufReader::new(fs::File::open(path)?);
        bincode::deserialize_from(reader).map_err(Into::into)
    }
    inner(path).with_context(|| format!("unable to load cache from \"{}\"", path.display()))
}

fn save<T: Serialize>(contents: &T, path: &Path) -> Result {
    fn inner<T: Serialize>(contents: &T, path: &Path) -> Result {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("could not create parent")?;
        }
        let mut out = io::BufWriter::new(fs::File::create(path)?);
        bincode::serialize_into(&mut out, contents)?;
        Ok(())
    }
    inner(contents, path).with_context(|| format!("unable to save cache to \"{}\"", path.display()))
}
