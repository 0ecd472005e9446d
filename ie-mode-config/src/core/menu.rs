/*!
Line-based interactive menu driving a reconciliation session
*/

use std::io::{self, BufRead, Write};

use sitelist_engine::{Entry, LedgerRecord, Reconciler, RestoreOutcome, StorageLayout};
use tracing::warn;

const RULE: &str = "--------------------------------------------------";

/// How the menu loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuOutcome {
    /// The user chose to finish; the session should be converged.
    Finish,
    /// Input ended before the user finished; nothing should be saved.
    Abort,
}

enum Action {
    Add,
    Delete,
    ManageDeleted,
    Finish,
}

pub struct Menu<R: BufRead, W: Write> {
    input: R,
    output: W,
}

impl Menu<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> Menu<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Explain what will be modified and wait for Enter.
    pub fn show_security_notice(&mut self, layout: &StorageLayout, policy_key: &str) -> io::Result<()> {
        writeln!(self.output, "{}", "=".repeat(RULE.len()))?;
        writeln!(self.output, "  Changes this tool makes")?;
        writeln!(self.output, "{}", "=".repeat(RULE.len()))?;
        writeln!(self.output, "  1. Site list file: {}", layout.document.display())?;
        writeln!(self.output, "  2. Deletion history: {}", layout.ledger.display())?;
        writeln!(self.output, "  3. Policy values under: {}", policy_key)?;
        writeln!(self.output)?;
        writeln!(self.output, "  Some antivirus products flag policy changes; allow this tool if prompted.")?;
        writeln!(self.output, "{}", "=".repeat(RULE.len()))?;
        self.prompt("Press Enter to continue...")?;
        Ok(())
    }

    /// Run the menu until the user finishes or input ends.
    pub fn run(&mut self, driver: &mut Reconciler) -> io::Result<MenuOutcome> {
        self.show_dropped(driver.dropped_on_load())?;
        self.show_state(driver)?;
        loop {
            let Some(action) = self.read_action()? else {
                return Ok(MenuOutcome::Abort);
            };
            let completed = match action {
                Action::Add => self.add(driver)?,
                Action::Delete => self.delete(driver)?,
                Action::ManageDeleted => self.manage_deleted(driver)?,
                Action::Finish => return Ok(MenuOutcome::Finish),
            };
            if !completed {
                return Ok(MenuOutcome::Abort);
            }
            self.show_state(driver)?;
        }
    }

    fn read_action(&mut self) -> io::Result<Option<Action>> {
        writeln!(self.output, "\nChoose an action:")?;
        writeln!(self.output, "  [A] Add a site")?;
        writeln!(self.output, "  [D] Delete sites")?;
        writeln!(self.output, "  [R] Restore or manage deleted sites")?;
        writeln!(self.output, "  [F] Finish and save")?;
        loop {
            let Some(choice) = self.prompt("Option (A/D/R/F): ")? else {
                return Ok(None);
            };
            match choice.to_ascii_uppercase().as_str() {
                "A" => return Ok(Some(Action::Add)),
                "D" => return Ok(Some(Action::Delete)),
                "R" => return Ok(Some(Action::ManageDeleted)),
                "F" => return Ok(Some(Action::Finish)),
                _ => writeln!(self.output, "Unknown option, try again")?,
            }
        }
    }

    /// Returns `false` if input ended.
    fn add(&mut self, driver: &mut Reconciler) -> io::Result<bool> {
        writeln!(self.output, "\nExample: https://intranet.example.com or http://192.168.1.100")?;
        writeln!(self.output, "The http:// or https:// prefix is required; ports are removed.")?;
        loop {
            let Some(raw) = self.prompt("Site URL (or 'back'): ")? else {
                return Ok(false);
            };
            if raw.eq_ignore_ascii_case("back") {
                return Ok(true);
            }
            match driver.add(&raw) {
                Ok(entry) => {
                    if entry.as_str() != raw {
                        writeln!(self.output, "Normalized to {}", entry)?;
                    }
                    writeln!(self.output, "✅ Added: {}", entry)?;
                    return Ok(true);
                }
                Err(e) => writeln!(self.output, "❌ {}", e)?,
            }
        }
    }

    fn delete(&mut self, driver: &mut Reconciler) -> io::Result<bool> {
        if driver.entries().is_empty() {
            writeln!(self.output, "No sites to delete")?;
            return Ok(true);
        }
        let urls: Vec<String> = driver.entries().iter().map(Entry::to_string).collect();
        self.show_list("Configured sites", &urls)?;
        writeln!(self.output, "Enter numbers separated by spaces, or 'all'")?;
        let Some(choice) = self.prompt("Delete: ")? else {
            return Ok(false);
        };

        let result = if choice.eq_ignore_ascii_case("all") {
            driver.delete_all()
        } else {
            let indices: Vec<usize> = choice.split_whitespace().filter_map(|s| s.parse().ok()).collect();
            if indices.is_empty() {
                writeln!(self.output, "No valid numbers selected")?;
                return Ok(true);
            }
            driver.delete(&indices)
        };

        match result {
            Ok(removed) => {
                for entry in removed {
                    writeln!(self.output, "Deleted: {}", entry)?;
                }
            }
            Err(e) => {
                warn!("Delete failed: {}", e);
                writeln!(self.output, "❌ {}", e)?;
            }
        }
        Ok(true)
    }

    fn manage_deleted(&mut self, driver: &mut Reconciler) -> io::Result<bool> {
        let records = match driver.deleted() {
            Ok(records) => records,
            Err(e) => {
                writeln!(self.output, "❌ {}", e)?;
                return Ok(true);
            }
        };
        if records.is_empty() {
            writeln!(self.output, "No deleted sites to manage")?;
            return Ok(true);
        }

        self.show_list("Deleted sites", &urls_of(&records))?;
        writeln!(self.output, "  [1] Restore a site")?;
        writeln!(self.output, "  [2] Delete a history record")?;
        writeln!(self.output, "  [3] Clear all history")?;
        writeln!(self.output, "  [0] Back")?;

        loop {
            let Some(choice) = self.prompt("Option (0/1/2/3): ")? else {
                return Ok(false);
            };
            let result: sitelist_engine::Result<String> = match choice.parse::<u8>() {
                Ok(0) => return Ok(true),
                Ok(1) => match self.pick(&records, "Number to restore: ")? {
                    Pick::Eof => return Ok(false),
                    Pick::Invalid => return Ok(true),
                    Pick::Record(entry) => driver.restore(&entry).map(|outcome| match outcome {
                        RestoreOutcome::Restored => format!("Restored: {entry}"),
                        RestoreOutcome::AlreadyActive => format!("{entry} is already in the site list"),
                    }),
                },
                Ok(2) => match self.pick(&records, "Number of the record to delete: ")? {
                    Pick::Eof => return Ok(false),
                    Pick::Invalid => return Ok(true),
                    Pick::Record(entry) => driver.purge(&entry).map(|_| format!("Deleted record: {entry}")),
                },
                Ok(3) => {
                    let Some(confirm) = self.prompt("Clear all deleted records? (y/n): ")? else {
                        return Ok(false);
                    };
                    if !confirm.eq_ignore_ascii_case("y") {
                        return Ok(true);
                    }
                    driver.purge_all().map(|()| "Cleared all deleted records".to_string())
                }
                Ok(_) => {
                    writeln!(self.output, "Unknown option, enter 0/1/2/3")?;
                    continue;
                }
                Err(_) => {
                    writeln!(self.output, "Please enter a number")?;
                    continue;
                }
            };

            match result {
                Ok(message) => writeln!(self.output, "{}", message)?,
                Err(e) => {
                    warn!("Ledger action failed: {}", e);
                    writeln!(self.output, "❌ {}", e)?;
                }
            }
            return Ok(true);
        }
    }

    fn pick(&mut self, records: &[LedgerRecord], prompt: &str) -> io::Result<Pick> {
        let Some(raw) = self.prompt(prompt)? else {
            return Ok(Pick::Eof);
        };
        match raw.parse::<usize>() {
            Ok(idx) if idx >= 1 && idx <= records.len() => Ok(Pick::Record(records[idx - 1].entry().clone())),
            _ => {
                writeln!(self.output, "Invalid number")?;
                Ok(Pick::Invalid)
            }
        }
    }

    fn show_state(&mut self, driver: &Reconciler) -> io::Result<()> {
        let urls: Vec<String> = driver.entries().iter().map(Entry::to_string).collect();
        self.show_list("Configured sites", &urls)?;
        match driver.deleted() {
            Ok(records) if !records.is_empty() => self.show_list("Deleted sites (restorable)", &urls_of(&records)),
            Ok(_) => Ok(()),
            Err(e) => {
                warn!("Could not read the deletion ledger: {}", e);
                Ok(())
            }
        }
    }

    fn show_dropped(&mut self, dropped: &[String]) -> io::Result<()> {
        if dropped.is_empty() {
            return Ok(());
        }
        writeln!(self.output, "\n⚠️  These sites are not http(s) URLs and will be removed when you save:")?;
        for url in dropped {
            writeln!(self.output, "  - {}", url)?;
        }
        Ok(())
    }

    fn show_list(&mut self, title: &str, items: &[String]) -> io::Result<()> {
        writeln!(self.output, "\n{}\n{}", title, RULE)?;
        if items.is_empty() {
            writeln!(self.output, "  (none)")?;
        }
        for (i, item) in items.iter().enumerate() {
            writeln!(self.output, "  {}. {}", i + 1, item)?;
        }
        writeln!(self.output, "{}", RULE)
    }

    /// `None` once input is exhausted.
    fn prompt(&mut self, text: &str) -> io::Result<Option<String>> {
        write!(self.output, "{}", text)?;
        self.output.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }
}

enum Pick {
    Record(Entry),
    Invalid,
    Eof,
}

fn urls_of(records: &[LedgerRecord]) -> Vec<String> {
    records
        .iter()
        .map(|record| format!("{} (deleted {})", record.entry(), record.timestamp()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitelist_engine::policy::EDGE_POLICY_KEY;
    use sitelist_engine::{AssumeElevated, Collaborators, MemoryPolicyStore, PolicyNames, Silent};

    fn session(dir: &tempfile::TempDir) -> Reconciler {
        let layout = StorageLayout::in_dir(dir.path(), "ie-sitelist.xml", "old-site.txt");
        let collaborators = Collaborators {
            policy: Box::new(MemoryPolicyStore::new(EDGE_POLICY_KEY)),
            elevator: Box::new(AssumeElevated),
            notifier: Box::new(Silent),
        };
        Reconciler::load(&layout, PolicyNames::default(), collaborators).expect("must load")
    }

    fn run(driver: &mut Reconciler, script: &str) -> (MenuOutcome, String) {
        let mut output = Vec::new();
        let outcome = Menu::new(script.as_bytes(), &mut output).run(driver).unwrap();
        (outcome, String::from_utf8(output).unwrap())
    }

    fn urls(driver: &Reconciler) -> Vec<&str> {
        driver.entries().iter().map(Entry::as_str).collect()
    }

    #[test]
    fn add_retries_until_valid_then_finishes() {
        let dir = tempfile::tempdir().expect("must create tempdir");
        let mut driver = session(&dir);
        let (outcome, output) = run(&mut driver, "a\nintranet.example\nhttps://intranet.example:8080/app\nf\n");

        assert_eq!(outcome, MenuOutcome::Finish);
        assert_eq!(urls(&driver), vec!["https://intranet.example/app"]);
        assert!(output.contains("must start with http:// or https://"));
        assert!(output.contains("Normalized to https://intranet.example/app"));
    }

    #[test]
    fn duplicate_add_is_reported() {
        let dir = tempfile::tempdir().expect("must create tempdir");
        let mut driver = session(&dir);
        let (_, output) = run(&mut driver, "A\nhttps://a.example\nA\nhttps://a.example\nback\nF\n");
        assert_eq!(urls(&driver), vec!["https://a.example"]);
        assert!(output.contains("already in the site list"));
    }

    #[test]
    fn delete_then_restore_through_the_menu() {
        let dir = tempfile::tempdir().expect("must create tempdir");
        let mut driver = session(&dir);
        let script = "A\nhttps://a.example\nA\nhttps://b.example\nA\nhttps://c.example\n\
                      D\n1 3 x 7\n\
                      R\nfoo\n1\n2\n\
                      F\n";
        let (outcome, output) = run(&mut driver, script);

        assert_eq!(outcome, MenuOutcome::Finish);
        assert!(output.contains("Please enter a number"));
        assert_eq!(driver.deleted().unwrap().len(), 1);
        assert_eq!(urls(&driver).len(), 2);
        assert_eq!(urls(&driver)[0], "https://b.example");
    }

    #[test]
    fn purge_all_requires_confirmation() {
        let dir = tempfile::tempdir().expect("must create tempdir");
        let mut driver = session(&dir);
        run(&mut driver, "A\nhttps://a.example\nD\nall\nR\n3\nn\nF\n");
        assert_eq!(driver.deleted().unwrap().len(), 1);

        run(&mut driver, "R\n3\ny\nF\n");
        assert!(driver.deleted().unwrap().is_empty());
    }

    #[test]
    fn deleted_sites_show_when_they_were_deleted() {
        let dir = tempfile::tempdir().expect("must create tempdir");
        std::fs::write(
            dir.path().join("old-site.txt"),
            "2024-03-04 05:06:07 | https://old.example\n",
        )
        .unwrap();
        let mut driver = session(&dir);
        let (_, output) = run(&mut driver, "F\n");
        assert!(output.contains("https://old.example (deleted 2024-03-04 05:06:07)"));
    }

    #[test]
    fn unusable_sites_are_announced_before_editing() {
        let dir = tempfile::tempdir().expect("must create tempdir");
        std::fs::write(
            dir.path().join("ie-sitelist.xml"),
            r#"<site-list version="1"><site url="ftp://legacy.example"/></site-list>"#,
        )
        .unwrap();
        let mut driver = session(&dir);
        let (_, output) = run(&mut driver, "F\n");
        assert!(output.contains("will be removed when you save"));
        assert!(output.contains("  - ftp://legacy.example"));
    }

    #[test]
    fn closed_input_aborts() {
        let dir = tempfile::tempdir().expect("must create tempdir");
        let mut driver = session(&dir);
        let (outcome, _) = run(&mut driver, "A\nhttps://a.example\n");
        assert_eq!(outcome, MenuOutcome::Abort);
    }

    #[test]
    fn security_notice_waits_for_enter() {
        let dir = tempfile::tempdir().expect("must create tempdir");
        let layout = StorageLayout::in_dir(dir.path(), "ie-sitelist.xml", "old-site.txt");
        let mut output = Vec::new();
        Menu::new("\n".as_bytes(), &mut output)
            .show_security_notice(&layout, EDGE_POLICY_KEY)
            .unwrap();
        let text = String::from_utf8(output).unwrap();
        assert!(text.contains("ie-sitelist.xml"));
        assert!(text.contains("Press Enter to continue"));
    }
}
