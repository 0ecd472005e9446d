/*!
Policy store backends that do not need the Windows registry
*/

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::StoreError;
use crate::policy::{PolicyStore, PolicyValue, render_reg_export};

/// In-process store. Clones share the same values, so a caller can keep a
/// handle and inspect what a driver wrote through its own copy.
#[derive(Debug, Clone, Default)]
pub struct MemoryPolicyStore {
    key: String,
    values: Rc<RefCell<BTreeMap<String, PolicyValue>>>,
    failing: Rc<RefCell<BTreeSet<String>>>,
}

impl MemoryPolicyStore {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }

    /// Make every later write or delete of `value` fail.
    pub fn fail_on(&self, value: &str) {
        self.failing.borrow_mut().insert(value.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.values.borrow().is_empty()
    }

    fn check(&self, value: &str) -> Result<(), StoreError> {
        if self.failing.borrow().contains(value) {
            return Err(StoreError::Command(format!("access to {value} denied")));
        }
        Ok(())
    }
}

impl PolicyStore for MemoryPolicyStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn get(&self, value: &str) -> Result<Option<PolicyValue>, StoreError> {
        Ok(self.values.borrow().get(value).cloned())
    }

    fn set(&mut self, value: &str, data: PolicyValue) -> Result<(), StoreError> {
        self.check(value)?;
        self.values.borrow_mut().insert(value.to_string(), data);
        Ok(())
    }

    fn delete(&mut self, value: &str) -> Result<(), StoreError> {
        self.check(value)?;
        self.values.borrow_mut().remove(value);
        Ok(())
    }

    fn export(&self, destination: &Path) -> Result<(), StoreError> {
        let values = self.values.borrow();
        fs::write(destination, render_reg_export(&self.key, values.iter()))?;
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PolicyFile {
    key: String,
    values: BTreeMap<String, PolicyValue>,
}

/// Store persisted as a JSON file, for dry runs on machines without the registry.
#[derive(Debug, Clone)]
pub struct JsonFilePolicyStore {
    key: String,
    path: PathBuf,
}

impl JsonFilePolicyStore {
    pub fn new(key: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            key: key.into(),
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<PolicyFile, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => Ok(self.empty()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(self.empty()),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, file: &PolicyFile) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(file)?)?;
        debug!("Saved {} policy value(s) to {}", file.values.len(), self.path.display());
        Ok(())
    }

    fn empty(&self) -> PolicyFile {
        PolicyFile {
            key: self.key.clone(),
            values: BTreeMap::new(),
        }
    }
}

impl PolicyStore for JsonFilePolicyStore {
    fn name(&self) -> &'static str {
        "json-file"
    }

    fn get(&self, value: &str) -> Result<Option<PolicyValue>, StoreError> {
        Ok(self.load()?.values.remove(value))
    }

    fn set(&mut self, value: &str, data: PolicyValue) -> Result<(), StoreError> {
        let mut file = self.load()?;
        file.values.insert(value.to_string(), data);
        self.save(&file)
    }

    fn delete(&mut self, value: &str) -> Result<(), StoreError> {
        let mut file = self.load()?;
        if file.values.remove(value).is_some() {
            self.save(&file)?;
        }
        Ok(())
    }

    fn export(&self, destination: &Path) -> Result<(), StoreError> {
        let file = self.load()?;
        fs::write(destination, render_reg_export(&file.key, file.values.iter()))?;
        Ok(())
    }
}
