/*!
Interfaces to the outside world that the driver depends on
*/

use std::io;

use crate::driver::FinalizeReport;
use crate::list::SiteList;

/// Knows whether the process may write machine policy, and how to get there.
pub trait Elevator {
    fn is_elevated(&self) -> bool;

    /// Start an elevated copy of the current process. The caller exits afterwards.
    fn relaunch_elevated(&self) -> io::Result<()>;
}

/// For backends that need no elevation, and for tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeElevated;

impl Elevator for AssumeElevated {
    fn is_elevated(&self) -> bool {
        true
    }

    fn relaunch_elevated(&self) -> io::Result<()> {
        Ok(())
    }
}

/// Messages shown to the user around finalization.
#[derive(Debug, Clone, Copy)]
pub enum Notice<'a> {
    /// About to write the document and policy; changes apply after Edge restarts.
    Saving { entries: &'a SiteList },
    Finished { entries: &'a SiteList, report: &'a FinalizeReport },
}

/// Presents notices. Failures are logged by the driver and never stop a run.
pub trait NotificationSink {
    fn name(&self) -> &'static str;

    fn notify(&mut self, notice: &Notice<'_>) -> io::Result<()>;
}

/// Drops every notice.
#[derive(Debug, Clone, Copy, Default)]
pub struct Silent;

impl NotificationSink for Silent {
    fn name(&self) -> &'static str {
        "silent"
    }

    fn notify(&mut self, _notice: &Notice<'_>) -> io::Result<()> {
        Ok(())
    }
}
