/*!
Site-list reconciliation engine for Microsoft Edge IE mode.

The engine keeps an ordered list of URLs that Edge should open in IE mode,
records every removal in an append-only ledger so it can be restored later,
and converges two persisted artifacts from the list when a session finishes:

- the XML site list document Edge reads (`document`), written only while the
  list is non-empty and removed otherwise;
- the `InternetExplorerIntegrationSiteList` / `InternetExplorerIntegrationLevel`
  policy values (`policy`), set while the list is non-empty and cleared otherwise.

[`Reconciler`] ties these together; the policy backend, elevation check and
user notifications are injected through the traits in [`collaborators`].
*/

pub mod collaborators;
pub mod document;
pub mod driver;
pub mod entry;
pub mod error;
pub mod ledger;
pub mod list;
pub mod policy;
pub mod store;

pub use collaborators::{AssumeElevated, Elevator, Notice, NotificationSink, Silent};
pub use document::{DocumentState, SiteListDocument};
pub use driver::{Collaborators, Converged, DocumentReport, FinalizeReport, Phase, PolicyReport, Reconciler, StorageLayout};
pub use entry::Entry;
pub use error::{DocumentError, EngineError, PolicyError, Result, StoreError};
pub use ledger::{DeletionLedger, LedgerRecord, RestoreOutcome};
pub use list::SiteList;
pub use policy::{BackupOutcome, PolicyMirror, PolicyNames, PolicyOutcome, PolicyStore, PolicyValue};
pub use store::{JsonFilePolicyStore, MemoryPolicyStore};
