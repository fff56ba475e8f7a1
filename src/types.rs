use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Fixed execution stages of a batch run.
///
/// The declaration order is the barrier order: every task of a phase reaches
/// a terminal state before any task of the next phase starts.
///
/// - `Cleanup` is special: it is attempted even after an earlier phase
///   failed, and failures inside it are reported as warnings only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Setup,
    Initialize,
    Import,
    Prologue,
    #[default]
    Main,
    Epilogue,
    Export,
    Finalize,
    Cleanup,
}

impl Phase {
    /// All phases in barrier order.
    pub const ALL: [Phase; 9] = [
        Phase::Setup,
        Phase::Initialize,
        Phase::Import,
        Phase::Prologue,
        Phase::Main,
        Phase::Epilogue,
        Phase::Export,
        Phase::Finalize,
        Phase::Cleanup,
    ];

    pub fn is_cleanup(self) -> bool {
        self == Phase::Cleanup
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Setup => "setup",
            Phase::Initialize => "initialize",
            Phase::Import => "import",
            Phase::Prologue => "prologue",
            Phase::Main => "main",
            Phase::Epilogue => "epilogue",
            Phase::Export => "export",
            Phase::Finalize => "finalize",
            Phase::Cleanup => "cleanup",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Phase::ALL
            .into_iter()
            .find(|phase| phase.as_str() == wanted)
            .ok_or_else(|| {
                format!(
                    "invalid phase: {wanted} (expected one of setup, initialize, import, \
                     prologue, main, epilogue, export, finalize, cleanup)"
                )
            })
    }
}
