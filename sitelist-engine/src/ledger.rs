/*!
Append-only ledger of removed entries, with restore and purge support
*/

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use crate::entry::Entry;
use crate::error::{EngineError, Result};
use crate::list::SiteList;

/// Separator between the timestamp and the URL on each ledger line.
pub const SEPARATOR: &str = " | ";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One removal, as stored on a single ledger line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerRecord {
    timestamp: String,
    entry: Entry,
}

impl LedgerRecord {
    pub fn new(timestamp: impl Into<String>, entry: Entry) -> Self {
        Self {
            timestamp: timestamp.into(),
            entry,
        }
    }

    /// A record stamped with the current local time.
    pub fn now(entry: Entry) -> Self {
        Self::new(chrono::Local::now().format(TIMESTAMP_FORMAT).to_string(), entry)
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    pub fn to_line(&self) -> String {
        format!("{}{SEPARATOR}{}", self.timestamp, self.entry)
    }

    /// Lines without the separator, or whose URL is not a valid entry, are opaque.
    fn parse(line: &str) -> Option<Self> {
        let (timestamp, url) = line.trim().split_once(SEPARATOR)?;
        let entry = Entry::normalize(url).ok()?;
        Some(Self::new(timestamp, entry))
    }
}

/// Result of asking the ledger to restore an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    Restored,
    /// The entry was already active; neither the list nor the ledger changed.
    AlreadyActive,
}

/// Durable history of removed entries backed by a plain text file.
///
/// Every mutation re-reads and rewrites (or appends to) the whole file, so the
/// ledger must not be touched by another process during a call.
#[derive(Debug, Clone)]
pub struct DeletionLedger {
    path: PathBuf,
}

impl DeletionLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record a removal, persisting it before returning.
    pub fn append(&self, entry: &Entry) -> Result<LedgerRecord> {
        self.append_record(LedgerRecord::now(entry.clone()))
    }

    pub fn append_record(&self, record: LedgerRecord) -> Result<LedgerRecord> {
        self.write_records(std::slice::from_ref(&record))?;
        Ok(record)
    }

    /// Record several removals with a single write, so either all of them
    /// reach the file or none do.
    pub fn append_all<'a, I>(&self, entries: I) -> Result<Vec<LedgerRecord>>
    where
        I: IntoIterator<Item = &'a Entry>,
    {
        let records: Vec<LedgerRecord> = entries.into_iter().cloned().map(LedgerRecord::now).collect();
        if !records.is_empty() {
            self.write_records(&records)?;
        }
        Ok(records)
    }

    fn write_records(&self, records: &[LedgerRecord]) -> Result<()> {
        let needs_newline = match fs::read(&self.path) {
            Ok(bytes) => !bytes.is_empty() && !bytes.ends_with(b"\n"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => return Err(self.io_error(e)),
        };

        let mut block = String::new();
        if needs_newline {
            block.push('\n');
        }
        for record in records {
            block.push_str(&record.to_line());
            block.push('\n');
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_error(e))?;
        file.write_all(block.as_bytes()).map_err(|e| self.io_error(e))?;
        file.flush().map_err(|e| self.io_error(e))?;

        debug!("Ledger appended {} record(s)", records.len());
        Ok(())
    }

    /// Every parsable record in file (chronological) order, superseded ones included.
    pub fn history(&self) -> Result<Vec<LedgerRecord>> {
        Ok(self
            .read_lines()?
            .iter()
            .filter_map(|line| LedgerRecord::parse(line))
            .collect())
    }

    /// The most recent record per entry, in chronological order of those records.
    pub fn live_view(&self) -> Result<Vec<LedgerRecord>> {
        let mut seen = HashSet::new();
        let mut kept: Vec<LedgerRecord> = self
            .history()?
            .into_iter()
            .rev()
            .filter(|record| seen.insert(record.entry.clone()))
            .collect();
        kept.reverse();
        Ok(kept)
    }

    /// Drop every record of `entry`. Returns how many lines were removed.
    ///
    /// Opaque lines are written back untouched. Removing an entry that has no
    /// records leaves the file as it was.
    pub fn remove_record(&self, entry: &Entry) -> Result<usize> {
        let lines = self.read_lines()?;
        let retained: Vec<&String> = lines
            .iter()
            .filter(|line| LedgerRecord::parse(line).is_none_or(|record| record.entry != *entry))
            .collect();

        let removed = lines.len() - retained.len();
        if removed == 0 {
            return Ok(0);
        }

        let mut content = String::new();
        for line in retained {
            content.push_str(line);
            content.push('\n');
        }
        fs::write(&self.path, content).map_err(|e| self.io_error(e))?;

        info!("Removed {} ledger record(s) for {}", removed, entry);
        Ok(removed)
    }

    /// Take `entry` out of the ledger and put it back on the active list.
    pub fn restore(&self, entry: &Entry, list: &mut SiteList) -> Result<RestoreOutcome> {
        if list.contains(entry) {
            return Ok(RestoreOutcome::AlreadyActive);
        }
        self.remove_record(entry)?;
        list.add(entry.clone())?;
        Ok(RestoreOutcome::Restored)
    }

    /// Truncate the ledger. A missing ledger stays missing.
    pub fn clear(&self) -> Result<()> {
        match fs::metadata(&self.path) {
            Ok(_) => fs::write(&self.path, "").map_err(|e| self.io_error(e))?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(self.io_error(e)),
        }
        info!("Cleared deletion ledger {}", self.path.display());
        Ok(())
    }

    fn read_lines(&self) -> Result<Vec<String>> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(content.lines().map(String::from).collect()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(self.io_error(e)),
        }
    }

    fn io_error(&self, source: io::Error) -> EngineError {
        EngineError::Ledger {
            path: self.path.clone(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn entry(s: &str) -> Entry {
        Entry::normalize(s).unwrap()
    }

    fn ledger_in(dir: &tempfile::TempDir) -> DeletionLedger {
        DeletionLedger::new(dir.path().join("old-site.txt"))
    }

    #[test]
    fn missing_ledger_is_empty() {
        let dir = tempfile::tempdir().expect("must create tempdir");
        let ledger = ledger_in(&dir);
        assert!(ledger.live_view().unwrap().is_empty());
        assert_eq!(ledger.remove_record(&entry("https://a.example")).unwrap(), 0);
        ledger.clear().unwrap();
        assert!(!ledger.path().exists());
    }

    #[test]
    fn live_view_keeps_latest_record_per_entry() {
        let dir = tempfile::tempdir().expect("must create tempdir");
        let ledger = ledger_in(&dir);
        let (a, b) = (entry("https://a.example"), entry("https://b.example"));
        ledger.append_record(LedgerRecord::new("2024-01-01 10:00:00", a.clone())).unwrap();
        ledger.append_record(LedgerRecord::new("2024-01-02 10:00:00", b.clone())).unwrap();
        ledger.append_record(LedgerRecord::new("2024-01-03 10:00:00", a.clone())).unwrap();

        assert_eq!(
            ledger.live_view().unwrap(),
            vec![
                LedgerRecord::new("2024-01-02 10:00:00", b),
                LedgerRecord::new("2024-01-03 10:00:00", a),
            ]
        );
        assert_eq!(ledger.history().unwrap().len(), 3);
    }

    #[test]
    fn remove_record_drops_all_occurrences_and_is_idempotent() {
        let dir = tempfile::tempdir().expect("must create tempdir");
        let ledger = ledger_in(&dir);
        let (a, b) = (entry("https://a.example"), entry("https://b.example"));
        for target in [&a, &b, &a] {
            ledger.append(target).unwrap();
        }

        assert_eq!(ledger.remove_record(&a).unwrap(), 2);
        let after_first = fs::read_to_string(ledger.path()).unwrap();
        assert_eq!(ledger.remove_record(&a).unwrap(), 0);
        assert_eq!(fs::read_to_string(ledger.path()).unwrap(), after_first);

        let view = ledger.live_view().unwrap();
        assert_eq!(view.len(), 1);
        assert_eq!(view[0].entry(), &b);
    }

    #[test]
    fn opaque_lines_survive_rewrites() {
        let dir = tempfile::tempdir().expect("must create tempdir");
        let ledger = ledger_in(&dir);
        fs::write(
            ledger.path(),
            "legacy header\n2024-01-01 10:00:00 | https://a.example\n2024-01-01 11:00:00 | not-a-url\n2024-01-02 10:00:00 | https://b.example",
        )
        .unwrap();

        ledger.remove_record(&entry("https://a.example")).unwrap();
        assert_eq!(
            fs::read_to_string(ledger.path()).unwrap(),
            "legacy header\n2024-01-01 11:00:00 | not-a-url\n2024-01-02 10:00:00 | https://b.example\n"
        );
    }

    #[test]
    fn append_repairs_missing_trailing_newline() {
        let dir = tempfile::tempdir().expect("must create tempdir");
        let ledger = ledger_in(&dir);
        fs::write(ledger.path(), "2024-01-01 10:00:00 | https://a.example").unwrap();
        ledger
            .append_record(LedgerRecord::new("2024-01-02 10:00:00", entry("https://b.example")))
            .unwrap();
        assert_eq!(ledger.history().unwrap().len(), 2);
    }

    #[test]
    fn append_all_writes_every_record_or_none() {
        let dir = tempfile::tempdir().expect("must create tempdir");
        let ledger = ledger_in(&dir);
        fs::write(ledger.path(), "2024-01-01 10:00:00 | https://a.example").unwrap();
        let targets = [entry("https://b.example"), entry("https://c.example")];

        let records = ledger.append_all(&targets).unwrap();
        assert_eq!(records.len(), 2);
        let urls: Vec<String> = ledger.history().unwrap().iter().map(|r| r.entry().to_string()).collect();
        assert_eq!(urls, vec!["https://a.example", "https://b.example", "https://c.example"]);

        let blocked = DeletionLedger::new(dir.path());
        assert!(matches!(blocked.append_all(&targets), Err(EngineError::Ledger { .. })));
    }

    #[test]
    fn restore_moves_entry_back_unless_already_active() {
        let dir = tempfile::tempdir().expect("must create tempdir");
        let ledger = ledger_in(&dir);
        let a = entry("https://a.example");
        ledger.append(&a).unwrap();

        let mut list = SiteList::from_entries([a.clone()]);
        assert_eq!(ledger.restore(&a, &mut list).unwrap(), RestoreOutcome::AlreadyActive);
        assert_eq!(ledger.live_view().unwrap().len(), 1);

        let mut list = SiteList::new();
        assert_eq!(ledger.restore(&a, &mut list).unwrap(), RestoreOutcome::Restored);
        assert!(list.contains(&a));
        assert!(ledger.live_view().unwrap().is_empty());
    }

    #[test]
    fn clear_empties_any_ledger() {
        let dir = tempfile::tempdir().expect("must create tempdir");
        let ledger = ledger_in(&dir);
        fs::write(ledger.path(), "junk\n2024-01-01 10:00:00 | https://a.example\n").unwrap();
        ledger.clear().unwrap();
        assert!(ledger.live_view().unwrap().is_empty());
        assert_eq!(fs::read_to_string(ledger.path()).unwrap(), "");
    }
}
