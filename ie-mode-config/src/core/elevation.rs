/*!
Administrator detection and relaunch
*/

use std::io;
use std::process::{Command, Stdio};

use sitelist_engine::Elevator;
use tracing::info;

/// Uses the platform's own tools to detect and obtain administrator rights.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemElevator;

impl Elevator for SystemElevator {
    fn is_elevated(&self) -> bool {
        probe_elevation()
    }

    fn relaunch_elevated(&self) -> io::Result<()> {
        let exe = std::env::current_exe()?;
        let args: Vec<String> = std::env::args().skip(1).collect();
        info!("Relaunching {} with administrator rights", exe.display());
        relaunch(&exe.to_string_lossy(), &args)
    }
}

#[cfg(windows)]
fn probe_elevation() -> bool {
    // `net session` only succeeds for administrators
    Command::new("net")
        .arg("session")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

#[cfg(not(windows))]
fn probe_elevation() -> bool {
    Command::new("id")
        .arg("-u")
        .stderr(Stdio::null())
        .output()
        .map(|output| String::from_utf8_lossy(&output.stdout).trim() == "0")
        .unwrap_or(false)
}

#[cfg(windows)]
fn relaunch(exe: &str, args: &[String]) -> io::Result<()> {
    let mut script = format!("Start-Process -FilePath {} -Verb RunAs", quote_powershell(exe));
    if !args.is_empty() {
        let list = args.iter().map(|arg| quote_powershell(arg)).collect::<Vec<_>>().join(",");
        script.push_str(&format!(" -ArgumentList {list}"));
    }
    let status = Command::new("powershell")
        .args(["-NoProfile", "-Command", script.as_str()])
        .status()?;
    if status.success() {
        Ok(())
    } else {
        Err(io::Error::other(format!("elevation request failed: {status}")))
    }
}

#[cfg(not(windows))]
fn relaunch(_exe: &str, _args: &[String]) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "automatic elevation is only available on Windows; rerun with sudo or use a JSON policy file",
    ))
}

#[cfg_attr(not(windows), allow(dead_code))]
fn quote_powershell(arg: &str) -> String {
    format!("'{}'", arg.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn powershell_quoting_doubles_single_quotes() {
        assert_eq!(quote_powershell(r"C:\Tools\it's.exe"), r"'C:\Tools\it''s.exe'");
    }
}
