//! # Reference Payloads
//!
//! Named expected-response files, loaded on first lookup and shared
//! read-only by every worker afterwards.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::validation::types::body_from_text;

/// Read-through cache keyed by file name.
///
/// Concurrent misses on the same name may both load the file; the second
/// insert overwrites an equivalent value.
#[derive(Debug)]
pub struct ReferenceCache {
    root: PathBuf,
    entries: RwLock<HashMap<String, Arc<Value>>>,
}

impl ReferenceCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn get(&self, name: &str) -> Result<Arc<Value>> {
        {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(value) = entries.get(name) {
                return Ok(Arc::clone(value));
            }
        }

        let value = Arc::new(self.load(name)?);
        debug!(name, "Cached reference payload");
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), Arc::clone(&value));
        Ok(value)
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn load(&self, name: &str) -> Result<Value> {
        let path = self.root.join(name);
        if !path.is_file() {
            warn!(name, path = %path.display(), "Reference payload file not found");
            return Err(Error::MissingReferenceFile {
                name: name.to_string(),
                path,
            });
        }
        let raw = fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
        Ok(body_from_text(&raw))
    }
}
