//! Processor architectures of plugin modules and the host policy that
//! decides which of them can be executed.

use std::fmt;

/// Target processor architecture of a native module.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, rkyv::Archive, rkyv::Serialize, rkyv::Deserialize,
)]
#[rkyv(derive(Debug))]
#[repr(u8)]
pub enum Architecture {
    /// Unrecognized machine type, or the file could not be read.
    Unknown = 0,
    /// 32-bit x86.
    X86 = 1,
    /// x86-64.
    X64 = 2,
    /// 32-bit ARM (Thumb-2).
    Arm = 3,
    /// AArch64.
    Arm64 = 4,
}

/// `IMAGE_FILE_MACHINE_I386`.
pub const MACHINE_I386: u16 = 0x014C;
/// `IMAGE_FILE_MACHINE_AMD64`.
pub const MACHINE_AMD64: u16 = 0x8664;
/// `IMAGE_FILE_MACHINE_ARMNT`.
pub const MACHINE_ARMNT: u16 = 0x01C4;
/// `IMAGE_FILE_MACHINE_ARM64`.
pub const MACHINE_ARM64: u16 = 0xAA64;

impl Architecture {
    /// Map a PE machine-type field to an architecture.
    pub fn from_machine(machine: u16) -> Self {
        match machine {
            MACHINE_I386 => Self::X86,
            MACHINE_AMD64 => Self::X64,
            MACHINE_ARMNT => Self::Arm,
            MACHINE_ARM64 => Self::Arm64,
            _ => Self::Unknown,
        }
    }

    /// The PE machine-type field for this architecture.
    pub fn machine(self) -> Option<u16> {
        match self {
            Self::X86 => Some(MACHINE_I386),
            Self::X64 => Some(MACHINE_AMD64),
            Self::Arm => Some(MACHINE_ARMNT),
            Self::Arm64 => Some(MACHINE_ARM64),
            Self::Unknown => None,
        }
    }

    /// Architecture of the running process.
    pub const fn host() -> Self {
        if cfg!(target_arch = "x86_64") {
            Self::X64
        } else if cfg!(target_arch = "x86") {
            Self::X86
        } else if cfg!(target_arch = "aarch64") {
            Self::Arm64
        } else if cfg!(target_arch = "arm") {
            Self::Arm
        } else {
            Self::Unknown
        }
    }

    /// Whether a host of this architecture can execute a module built for
    /// `module`, either directly or through a bridge worker.
    ///
    /// x64 hosts accept x64 and x86, Arm64 hosts accept Arm64 and x86, and
    /// x86 or Arm hosts accept only their own architecture.
    pub fn accepts(self, module: Architecture) -> bool {
        match (self, module) {
            (_, Self::Unknown) | (Self::Unknown, _) => false,
            (Self::X64, Self::X64 | Self::X86) => true,
            (Self::Arm64, Self::Arm64 | Self::X86) => true,
            (host, module) => host == module,
        }
    }

    /// Whether this module architecture can be loaded into the current process.
    pub fn runs_in_process(self) -> bool {
        self != Self::Unknown && self == Self::host()
    }

    /// Decode the wire representation.
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::X86,
            2 => Self::X64,
            3 => Self::Arm,
            4 => Self::Arm64,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "unknown",
            Self::X86 => "x86",
            Self::X64 => "x64",
            Self::Arm => "arm",
            Self::Arm64 => "arm64",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_machine_mapping() {
        assert_eq!(Architecture::from_machine(0x014C), Architecture::X86);
        assert_eq!(Architecture::from_machine(0x8664), Architecture::X64);
        assert_eq!(Architecture::from_machine(0x01C4), Architecture::Arm);
        assert_eq!(Architecture::from_machine(0xAA64), Architecture::Arm64);
        assert_eq!(Architecture::from_machine(0x0200), Architecture::Unknown);
    }

    #[test]
    fn test_machine_inverse() {
        for arch in [
            Architecture::X86,
            Architecture::X64,
            Architecture::Arm,
            Architecture::Arm64,
        ] {
            assert_eq!(Architecture::from_machine(arch.machine().unwrap()), arch);
        }
        assert_eq!(Architecture::Unknown.machine(), None);
    }

    #[test]
    fn test_host_policy() {
        use Architecture::*;

        assert!(X64.accepts(X64));
        assert!(X64.accepts(X86));
        assert!(!X64.accepts(Arm64));

        assert!(Arm64.accepts(Arm64));
        assert!(Arm64.accepts(X86));
        assert!(!Arm64.accepts(X64));

        assert!(X86.accepts(X86));
        assert!(!X86.accepts(X64));

        assert!(!X64.accepts(Unknown));
        assert!(!Unknown.accepts(X86));
    }

    #[test]
    fn test_wire_value() {
        for arch in [
            Architecture::Unknown,
            Architecture::X86,
            Architecture::X64,
            Architecture::Arm,
            Architecture::Arm64,
        ] {
            assert_eq!(Architecture::from_u8(arch as u8), arch);
        }
    }
}
