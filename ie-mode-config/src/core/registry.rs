/*!
Policy store backed by the Windows registry through `reg.exe`
*/

use std::path::Path;
use std::process::{Command, Output};

use sitelist_engine::{PolicyStore, PolicyValue, StoreError};
use tracing::debug;

/// Writes policy values with `reg add`/`reg delete` and exports with `reg export`.
pub struct RegCommandStore {
    key: String,
}

impl RegCommandStore {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    fn run(&self, args: &[&str]) -> Result<Output, StoreError> {
        debug!("reg {}", args.join(" "));
        Ok(Command::new("reg").args(args).output()?)
    }

    fn run_checked(&self, args: &[&str]) -> Result<(), StoreError> {
        let output = self.run(args)?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(StoreError::Command(format!(
            "reg {} exited with {}: {}",
            args.first().copied().unwrap_or_default(),
            output.status,
            stderr.trim()
        )))
    }
}

impl PolicyStore for RegCommandStore {
    fn name(&self) -> &'static str {
        "registry"
    }

    fn get(&self, value: &str) -> Result<Option<PolicyValue>, StoreError> {
        let output = self.run(&["query", &self.key, "/v", value])?;
        if !output.status.success() {
            return Ok(None);
        }
        Ok(parse_query_output(&String::from_utf8_lossy(&output.stdout), value))
    }

    fn set(&mut self, value: &str, data: PolicyValue) -> Result<(), StoreError> {
        let (kind, text) = match data {
            PolicyValue::String(s) => ("REG_SZ", s),
            PolicyValue::Dword(n) => ("REG_DWORD", n.to_string()),
        };
        self.run_checked(&["add", &self.key, "/v", value, "/t", kind, "/d", &text, "/f"])
    }

    fn delete(&mut self, value: &str) -> Result<(), StoreError> {
        if self.get(value)?.is_none() {
            return Ok(());
        }
        self.run_checked(&["delete", &self.key, "/v", value, "/f"])
    }

    fn export(&self, destination: &Path) -> Result<(), StoreError> {
        let destination = destination.to_string_lossy();
        self.run_checked(&["export", &self.key, &destination, "/y"])
    }
}

/// Pull one value out of `reg query` output.
///
/// Data lines look like `    Name    REG_SZ    Data`, columns separated by four spaces.
fn parse_query_output(stdout: &str, value: &str) -> Option<PolicyValue> {
    stdout.lines().find_map(|line| {
        let mut columns = line.trim_start().splitn(3, "    ");
        if !columns.next()?.eq_ignore_ascii_case(value) {
            return None;
        }
        let kind = columns.next()?.trim();
        let data = columns.next().unwrap_or_default().trim_end();
        match kind {
            "REG_SZ" | "REG_EXPAND_SZ" => Some(PolicyValue::String(data.to_string())),
            "REG_DWORD" => {
                let digits = data.trim_start_matches("0x");
                u32::from_str_radix(digits, 16).ok().map(PolicyValue::Dword)
            }
            _ => None,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUERY: &str = "\r\nHKEY_LOCAL_MACHINE\\SOFTWARE\\Policies\\Microsoft\\Edge\r\n    InternetExplorerIntegrationSiteList    REG_SZ    C:\\ProgramData\\Microsoft\\Edge\\ie sitelist.xml\r\n    InternetExplorerIntegrationLevel    REG_DWORD    0x1\r\n\r\n";

    #[test]
    fn parses_string_values_with_spaces() {
        assert_eq!(
            parse_query_output(QUERY, "InternetExplorerIntegrationSiteList"),
            Some(PolicyValue::String(r"C:\ProgramData\Microsoft\Edge\ie sitelist.xml".to_string()))
        );
    }

    #[test]
    fn parses_dword_values() {
        assert_eq!(
            parse_query_output(QUERY, "InternetExplorerIntegrationLevel"),
            Some(PolicyValue::Dword(1))
        );
    }

    #[test]
    fn missing_value_is_none() {
        assert_eq!(parse_query_output(QUERY, "SomethingElse"), None);
    }
}
