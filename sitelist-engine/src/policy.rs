/*!
Mirrors the active list into the Edge policy store
*/

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{PolicyError, StoreError, ValueFailure};
use crate::list::SiteList;

/// Policy subtree holding both values.
pub const EDGE_POLICY_KEY: &str = r"HKLM\SOFTWARE\Policies\Microsoft\Edge";

/// `InternetExplorerIntegrationLevel` value that turns IE mode on.
pub const IE_MODE_LEVEL: u32 = 1;

/// File name of the policy backup written beside the site list document.
pub const BACKUP_FILE_NAME: &str = "ie_mode_registry_backup.reg";

/// Typed data stored under a policy value name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum PolicyValue {
    String(String),
    Dword(u32),
}

/// Key/value sink for policy values under a single subtree.
pub trait PolicyStore {
    /// Name of the backend, for logs.
    fn name(&self) -> &'static str;

    fn get(&self, value: &str) -> Result<Option<PolicyValue>, StoreError>;

    fn set(&mut self, value: &str, data: PolicyValue) -> Result<(), StoreError>;

    /// Remove a value. Removing a value that does not exist succeeds.
    fn delete(&mut self, value: &str) -> Result<(), StoreError>;

    /// Export the whole subtree to a `.reg` file at `destination`.
    fn export(&self, destination: &Path) -> Result<(), StoreError>;
}

/// Names of the two values the mirror manages.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PolicyNames {
    /// String value pointing at the site list document
    pub site_list: String,
    /// DWORD value enabling IE mode
    pub level: String,
}

impl Default for PolicyNames {
    fn default() -> Self {
        Self {
            site_list: "InternetExplorerIntegrationSiteList".to_string(),
            level: "InternetExplorerIntegrationLevel".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyOutcome {
    /// Both values point at the document.
    Applied,
    /// Both values are absent.
    Cleared,
}

/// Result of the best-effort backup export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BackupOutcome {
    Saved { path: PathBuf },
    Failed { destination: PathBuf, reason: String },
}

pub struct PolicyMirror {
    store: Box<dyn PolicyStore>,
    names: PolicyNames,
}

impl PolicyMirror {
    pub fn new(store: Box<dyn PolicyStore>, names: PolicyNames) -> Self {
        Self { store, names }
    }

    /// Make the policy values agree with `list`.
    ///
    /// A non-empty list sets the document pointer and the level; an empty list
    /// removes both. Each value is attempted even if the other fails.
    pub fn converge(&mut self, list: &SiteList, document: &Path) -> Result<PolicyOutcome, PolicyError> {
        let (outcome, steps) = if list.is_empty() {
            let steps = vec![
                (self.names.site_list.clone(), self.store.delete(&self.names.site_list)),
                (self.names.level.clone(), self.store.delete(&self.names.level)),
            ];
            (PolicyOutcome::Cleared, steps)
        } else {
            let pointer = PolicyValue::String(document.display().to_string());
            let steps = vec![
                (self.names.site_list.clone(), self.store.set(&self.names.site_list, pointer)),
                (
                    self.names.level.clone(),
                    self.store.set(&self.names.level, PolicyValue::Dword(IE_MODE_LEVEL)),
                ),
            ];
            (PolicyOutcome::Applied, steps)
        };

        let mut succeeded = Vec::new();
        let mut failed = Vec::new();
        for (value, result) in steps {
            match result {
                Ok(()) => succeeded.push(value),
                Err(error) => failed.push(ValueFailure { value, error }),
            }
        }

        if failed.is_empty() {
            info!("Policy store ({}) converged: {:?}", self.store.name(), outcome);
            Ok(outcome)
        } else if succeeded.is_empty() {
            Err(PolicyError::TotalFailure { failed })
        } else {
            Err(PolicyError::PartialFailure { succeeded, failed })
        }
    }

    /// Export the policy subtree beside the document for manual rollback.
    pub fn snapshot_and_backup(&self, document: &Path) -> BackupOutcome {
        let destination = document
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(BACKUP_FILE_NAME);

        match self.store.export(&destination) {
            Ok(()) => {
                info!("Policy backup written to {}", destination.display());
                BackupOutcome::Saved { path: destination }
            }
            Err(e) => {
                warn!("Policy backup failed: {}", e);
                BackupOutcome::Failed {
                    destination,
                    reason: e.to_string(),
                }
            }
        }
    }
}

/// Render values in the `regedit` export format.
pub fn render_reg_export<'a, I>(key: &str, values: I) -> String
where
    I: IntoIterator<Item = (&'a String, &'a PolicyValue)>,
{
    let mut out = String::from("Windows Registry Editor Version 5.00\r\n\r\n");
    out.push_str(&format!("[{}]\r\n", expand_hive(key)));
    for (name, value) in values {
        let data = match value {
            PolicyValue::String(s) => format!("\"{}\"", escape_reg(s)),
            PolicyValue::Dword(n) => format!("dword:{n:08x}"),
        };
        out.push_str(&format!("\"{}\"={}\r\n", escape_reg(name), data));
    }
    out
}

fn expand_hive(key: &str) -> String {
    const HIVES: [(&str, &str); 4] = [
        ("HKLM\\", "HKEY_LOCAL_MACHINE\\"),
        ("HKCU\\", "HKEY_CURRENT_USER\\"),
        ("HKCR\\", "HKEY_CLASSES_ROOT\\"),
        ("HKU\\", "HKEY_USERS\\"),
    ];
    for (short, long) in HIVES {
        if let Some(rest) = key.strip_prefix(short) {
            return format!("{long}{rest}");
        }
    }
    key.to_string()
}

fn escape_reg(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Entry;
    use crate::store::MemoryPolicyStore;

    fn mirror(store: &MemoryPolicyStore) -> PolicyMirror {
        PolicyMirror::new(Box::new(store.clone()), PolicyNames::default())
    }

    fn one_site() -> SiteList {
        SiteList::from_entries([Entry::normalize("https://a.example").unwrap()])
    }

    #[test]
    fn non_empty_list_sets_both_values() {
        let store = MemoryPolicyStore::new(EDGE_POLICY_KEY);
        let document = Path::new(r"C:\ProgramData\Microsoft\Edge\ie-sitelist.xml");

        let outcome = mirror(&store).converge(&one_site(), document).unwrap();
        assert_eq!(outcome, PolicyOutcome::Applied);
        assert_eq!(
            store.get("InternetExplorerIntegrationSiteList").unwrap(),
            Some(PolicyValue::String(document.display().to_string()))
        );
        assert_eq!(
            store.get("InternetExplorerIntegrationLevel").unwrap(),
            Some(PolicyValue::Dword(1))
        );
    }

    #[test]
    fn empty_list_clears_and_clearing_twice_is_fine() {
        let store = MemoryPolicyStore::new(EDGE_POLICY_KEY);
        let document = Path::new("ie-sitelist.xml");
        let mut mirror = mirror(&store);
        mirror.converge(&one_site(), document).unwrap();

        for _ in 0..2 {
            assert_eq!(mirror.converge(&SiteList::new(), document).unwrap(), PolicyOutcome::Cleared);
            assert!(store.is_empty());
        }
    }

    #[test]
    fn one_failed_value_is_a_partial_failure() {
        let store = MemoryPolicyStore::new(EDGE_POLICY_KEY);
        store.fail_on("InternetExplorerIntegrationLevel");

        let err = mirror(&store).converge(&one_site(), Path::new("x.xml")).unwrap_err();
        match err {
            PolicyError::PartialFailure { succeeded, failed } => {
                assert_eq!(succeeded, vec!["InternetExplorerIntegrationSiteList".to_string()]);
                assert_eq!(failed.len(), 1);
                assert_eq!(failed[0].value, "InternetExplorerIntegrationLevel");
            }
            other => panic!("expected partial failure, got {other:?}"),
        }
    }

    #[test]
    fn both_failed_values_are_a_total_failure() {
        let store = MemoryPolicyStore::new(EDGE_POLICY_KEY);
        store.fail_on("InternetExplorerIntegrationLevel");
        store.fail_on("InternetExplorerIntegrationSiteList");

        let err = mirror(&store).converge(&SiteList::new(), Path::new("x.xml")).unwrap_err();
        assert!(matches!(err, PolicyError::TotalFailure { ref failed } if failed.len() == 2));
    }

    #[test]
    fn backup_lands_beside_the_document() {
        let dir = tempfile::tempdir().expect("must create tempdir");
        let store = MemoryPolicyStore::new(EDGE_POLICY_KEY);
        let document = dir.path().join("ie-sitelist.xml");
        let mut mirror = mirror(&store);
        mirror.converge(&one_site(), &document).unwrap();

        let outcome = mirror.snapshot_and_backup(&document);
        let expected = dir.path().join(BACKUP_FILE_NAME);
        assert_eq!(outcome, BackupOutcome::Saved { path: expected.clone() });

        let exported = std::fs::read_to_string(expected).unwrap();
        assert!(exported.starts_with("Windows Registry Editor Version 5.00"));
        assert!(exported.contains("[HKEY_LOCAL_MACHINE\\SOFTWARE\\Policies\\Microsoft\\Edge]"));
        assert!(exported.contains("\"InternetExplorerIntegrationLevel\"=dword:00000001"));
    }

    #[test]
    fn failed_backup_is_reported_not_raised() {
        let dir = tempfile::tempdir().expect("must create tempdir");
        let store = MemoryPolicyStore::new(EDGE_POLICY_KEY);
        let document = dir.path().join("missing-dir").join("ie-sitelist.xml");

        let outcome = mirror(&store).snapshot_and_backup(&document);
        assert!(matches!(outcome, BackupOutcome::Failed { .. }));
    }

    #[test]
    fn reg_export_escapes_strings() {
        let name = "InternetExplorerIntegrationSiteList".to_string();
        let value = PolicyValue::String(r"C:\Edge\ie-sitelist.xml".to_string());
        let text = render_reg_export(EDGE_POLICY_KEY, [(&name, &value)]);
        assert!(text.contains(r#""InternetExplorerIntegrationSiteList"="C:\\Edge\\ie-sitelist.xml""#));
    }
}
