//! Where a filter runs, and the selectors it is driven through.

use crate::arch::Architecture;

/// How a filter is executed.
///
/// Determined by the module's architecture: modules of the host's own
/// architecture are loaded into this process, modules the host accepts
/// but cannot load run in a bridge worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExecutionMode {
    /// Loaded with `libloading` and called on the caller's thread.
    InProcess,

    /// Run by the `filterbridge-worker` built for this architecture.
    Bridged(Architecture),
}

impl ExecutionMode {
    /// Whether execution crosses a process boundary.
    pub fn is_bridged(&self) -> bool {
        matches!(self, Self::Bridged(_))
    }

    /// Label used in spans.
    pub fn label(&self) -> &'static str {
        match self {
            Self::InProcess => "in-process",
            Self::Bridged(_) => "bridged",
        }
    }
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InProcess => write!(f, "in-process"),
            Self::Bridged(arch) => write!(f, "bridged ({arch})"),
        }
    }
}

/// Filter selector codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(i16)]
pub enum Selector {
    /// Show the About box.
    About = 0,
    /// Ask the user for parameters.
    Parameters = 1,
    /// Negotiate memory.
    Prepare = 2,
    /// Begin processing.
    Start = 3,
    /// Process the next region.
    Continue = 4,
    /// Clean up.
    Finish = 5,
}

impl Selector {
    /// The numeric selector.
    pub fn code(self) -> i16 {
        self as i16
    }
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::About => "About",
            Self::Parameters => "Parameters",
            Self::Prepare => "Prepare",
            Self::Start => "Start",
            Self::Continue => "Continue",
            Self::Finish => "Finish",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_labels() {
        assert!(!ExecutionMode::InProcess.is_bridged());
        assert!(ExecutionMode::Bridged(Architecture::X86).is_bridged());
        assert_eq!(ExecutionMode::Bridged(Architecture::X86).to_string(), "bridged (x86)");
        assert_eq!(ExecutionMode::InProcess.label(), "in-process");
    }

    #[test]
    fn test_selector_codes() {
        assert_eq!(Selector::About.code(), 0);
        assert_eq!(Selector::Continue.code(), 4);
        assert_eq!(Selector::Finish.to_string(), "Finish");
    }
}
