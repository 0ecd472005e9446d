/*!
Reconciliation driver: load, edit, then converge the document and policy store
*/

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::collaborators::{Elevator, Notice, NotificationSink};
use crate::document::SiteListDocument;
use crate::entry::Entry;
use crate::error::{EngineError, PolicyError, Result};
use crate::ledger::{DeletionLedger, LedgerRecord, RestoreOutcome};
use crate::list::SiteList;
use crate::policy::{BackupOutcome, PolicyMirror, PolicyNames, PolicyOutcome, PolicyStore};

/// Where the document and the ledger live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    pub document: PathBuf,
    pub ledger: PathBuf,
}

impl StorageLayout {
    pub fn in_dir(dir: &Path, site_list_file: &str, ledger_file: &str) -> Self {
        Self {
            document: dir.join(site_list_file),
            ledger: dir.join(ledger_file),
        }
    }
}

/// Driver lifecycle. `Editing` is re-entered after every mutating action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Loaded,
    Editing,
    Finalizing,
    Converged,
}

/// External services injected into the driver.
pub struct Collaborators {
    pub policy: Box<dyn PolicyStore>,
    pub elevator: Box<dyn Elevator>,
    pub notifier: Box<dyn NotificationSink>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DocumentReport {
    Written { path: PathBuf },
    Removed { path: PathBuf },
    AlreadyAbsent,
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PolicyReport {
    Applied,
    Cleared,
    /// Not attempted because the document it would point at was not written.
    Skipped,
    PartialFailure { succeeded: Vec<String>, failed: Vec<String> },
    TotalFailure { failed: Vec<String> },
}

impl From<std::result::Result<PolicyOutcome, PolicyError>> for PolicyReport {
    fn from(result: std::result::Result<PolicyOutcome, PolicyError>) -> Self {
        match result {
            Ok(PolicyOutcome::Applied) => PolicyReport::Applied,
            Ok(PolicyOutcome::Cleared) => PolicyReport::Cleared,
            Err(PolicyError::PartialFailure { succeeded, failed }) => PolicyReport::PartialFailure {
                succeeded,
                failed: failed.iter().map(ToString::to_string).collect(),
            },
            Err(PolicyError::TotalFailure { failed }) => PolicyReport::TotalFailure {
                failed: failed.iter().map(ToString::to_string).collect(),
            },
        }
    }
}

/// Per-artifact outcome of finalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FinalizeReport {
    pub document: DocumentReport,
    pub policy: PolicyReport,
    /// `None` when no backup was attempted.
    pub backup: Option<BackupOutcome>,
}

impl FinalizeReport {
    /// Document and policy both persisted. Backup failures do not count.
    pub fn is_success(&self) -> bool {
        !matches!(self.document, DocumentReport::Failed { .. })
            && matches!(self.policy, PolicyReport::Applied | PolicyReport::Cleared)
    }
}

/// Terminal state of a run.
#[derive(Debug, Clone)]
pub struct Converged {
    pub entries: SiteList,
    pub report: FinalizeReport,
}

pub struct Reconciler {
    list: SiteList,
    ledger: DeletionLedger,
    document: SiteListDocument,
    mirror: PolicyMirror,
    notifier: Box<dyn NotificationSink>,
    dropped: Vec<String>,
    phase: Phase,
}

impl Reconciler {
    /// Load the active list and open the ledger.
    ///
    /// An unreadable document is logged and treated as an empty list.
    pub fn load(layout: &StorageLayout, names: PolicyNames, collaborators: Collaborators) -> Result<Self> {
        if !collaborators.elevator.is_elevated() {
            return Err(EngineError::NotElevated);
        }

        let document = SiteListDocument::new(&layout.document);
        let (list, dropped) = match document.read_with_dropped() {
            Ok((state, dropped)) => (state.into_list(), dropped),
            Err(source) => {
                let err = EngineError::ConfigRead {
                    path: layout.document.clone(),
                    source,
                };
                warn!("{}; starting from an empty list", err);
                (SiteList::new(), Vec::new())
            }
        };
        info!("Loaded {} site(s) from {}", list.len(), layout.document.display());

        Ok(Self {
            list,
            ledger: DeletionLedger::new(&layout.ledger),
            document,
            mirror: PolicyMirror::new(collaborators.policy, names),
            notifier: collaborators.notifier,
            dropped,
            phase: Phase::Loaded,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn entries(&self) -> &SiteList {
        &self.list
    }

    pub fn ledger(&self) -> &DeletionLedger {
        &self.ledger
    }

    /// `url` values in the loaded document that are not usable entries.
    /// The next finish writes the document without them.
    pub fn dropped_on_load(&self) -> &[String] {
        &self.dropped
    }

    /// Deleted entries available for restore or purge.
    pub fn deleted(&self) -> Result<Vec<LedgerRecord>> {
        self.ledger.live_view()
    }

    /// Normalize and append a new entry.
    pub fn add(&mut self, raw: &str) -> Result<Entry> {
        let entry = Entry::normalize(raw)?;
        self.list.add(entry.clone())?;
        self.transition(Phase::Editing);
        info!("Added {}", entry);
        Ok(entry)
    }

    /// Delete by 1-based display positions. The removals are in the ledger
    /// before the list changes; if the ledger write fails nothing is removed.
    pub fn delete(&mut self, indices: &[usize]) -> Result<Vec<Entry>> {
        let targets = self.list.resolve_indices(indices);
        self.ledger.append_all(targets.iter().map(|(_, entry)| entry))?;
        let removed = self.list.remove_by_indices(indices);
        self.transition(Phase::Editing);
        info!("Deleted {} site(s)", removed.len());
        Ok(removed)
    }

    pub fn delete_all(&mut self) -> Result<Vec<Entry>> {
        self.ledger.append_all(&self.list)?;
        let removed = self.list.remove_all();
        self.transition(Phase::Editing);
        info!("Deleted all {} site(s)", removed.len());
        Ok(removed)
    }

    pub fn restore(&mut self, entry: &Entry) -> Result<RestoreOutcome> {
        let outcome = self.ledger.restore(entry, &mut self.list)?;
        self.transition(Phase::Editing);
        Ok(outcome)
    }

    /// Forget every ledger record of `entry` without restoring it.
    pub fn purge(&mut self, entry: &Entry) -> Result<usize> {
        let removed = self.ledger.remove_record(entry)?;
        self.transition(Phase::Editing);
        Ok(removed)
    }

    pub fn purge_all(&mut self) -> Result<()> {
        self.ledger.clear()?;
        self.transition(Phase::Editing);
        Ok(())
    }

    /// Write or delete the document, converge the policy store and, when
    /// entries exist, back the policy up. There is no way back to editing.
    pub fn finish(mut self) -> Converged {
        self.transition(Phase::Finalizing);
        announce(&mut *self.notifier, &Notice::Saving { entries: &self.list });

        let document = self.converge_document();
        let policy = if self.list.is_empty() || !matches!(document, DocumentReport::Failed { .. }) {
            PolicyReport::from(self.mirror.converge(&self.list, self.document.path()))
        } else {
            warn!("Skipping policy update because the site list was not written");
            PolicyReport::Skipped
        };
        let backup = (!self.list.is_empty() && policy == PolicyReport::Applied)
            .then(|| self.mirror.snapshot_and_backup(self.document.path()));

        let report = FinalizeReport {
            document,
            policy,
            backup,
        };
        if report.is_success() {
            info!("✅ Site list and policy converged");
        } else {
            error!("Convergence incomplete: {:?}", report);
        }

        self.transition(Phase::Converged);
        let notice = Notice::Finished {
            entries: &self.list,
            report: &report,
        };
        announce(&mut *self.notifier, &notice);

        Converged {
            entries: self.list,
            report,
        }
    }

    fn converge_document(&self) -> DocumentReport {
        let path = self.document.path().to_path_buf();
        let result = if self.list.is_empty() {
            self.document.delete().map(|removed| {
                if removed {
                    DocumentReport::Removed { path: path.clone() }
                } else {
                    DocumentReport::AlreadyAbsent
                }
            })
        } else {
            self.document.write(&self.list).map(|path| DocumentReport::Written { path })
        };

        result.unwrap_or_else(|source| {
            let err = EngineError::ConfigWrite { path, source };
            error!("{}", err);
            DocumentReport::Failed {
                reason: err.to_string(),
            }
        })
    }

    fn transition(&mut self, next: Phase) {
        if self.phase != next {
            debug!("Driver phase {:?} -> {:?}", self.phase, next);
            self.phase = next;
        }
    }
}

fn announce(notifier: &mut dyn NotificationSink, notice: &Notice<'_>) {
    if let Err(e) = notifier.notify(notice) {
        error!("Notifier {} failed: {}", notifier.name(), e);
    }
}
