//! Resolution of `(name, version)` suite requests.
//!
//! Every table the host hands out is listed here. A request is matched
//! against the list before any table pointer exists, so a plugin can never
//! receive a table of a different version than it asked for.

use super::action::{ACTION_DESCRIPTOR_SUITE, ACTION_LIST_SUITE, ACTION_REFERENCE_SUITE};
use super::basic::BASIC_SUITE;
use super::buffer::BUFFER_SUITE;
use super::descriptor_registry::DESCRIPTOR_REGISTRY_SUITE;
use super::error::SuiteError;
use super::handle::{HANDLE_SUITE_1, HANDLE_SUITE_2};
use super::ui_hooks::UI_HOOKS_SUITE;
use super::zstring::ZSTRING_SUITE;
use std::ffi::c_void;
use std::fmt;

/// A suite table the host implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SuiteId {
    /// `SPBasicSuite`.
    Basic,
    /// `PSBufferSuite1`.
    Buffer,
    /// `PSHandleSuite1`.
    Handle1,
    /// `PSHandleSuite2`.
    Handle2,
    /// `PSDescriptorRegistryProcs`.
    DescriptorRegistry,
    /// `PSActionDescriptorProcs`.
    ActionDescriptor,
    /// `PSActionListProcs`.
    ActionList,
    /// `PSActionReferenceProcs`.
    ActionReference,
    /// `PSUIHooksSuite1`.
    UiHooks,
    /// `ASZStringSuite`.
    ZString,
}

/// `kSPBasicSuite`.
pub const BASIC_SUITE_NAME: &str = "SP Basic Suite";
/// `kPSBufferSuite`.
pub const BUFFER_SUITE_NAME: &str = "Photoshop Buffer Suite for Plugins";
/// `kPSHandleSuite`.
pub const HANDLE_SUITE_NAME: &str = "Photoshop Handle Suite for Plugins";
/// `kPSDescriptorRegistrySuite`.
pub const DESCRIPTOR_REGISTRY_SUITE_NAME: &str = "61e608b0-40fd-11d1-8da3-00c04fd5f7ee";
/// `kPSActionDescriptorSuite`.
pub const ACTION_DESCRIPTOR_SUITE_NAME: &str = "df135115-c769-11d0-8079-00c04fd7ec47";
/// `kPSActionReferenceSuite`.
pub const ACTION_REFERENCE_SUITE_NAME: &str = "df135116-c769-11d0-8079-00c04fd7ec47";
/// `kPSActionListSuite`.
pub const ACTION_LIST_SUITE_NAME: &str = "df135117-c769-11d0-8079-00c04fd7ec47";
/// `kPSUIHooksSuite`.
pub const UI_HOOKS_SUITE_NAME: &str = "Photoshop UIHooks Suite for Plugins";
/// `kASZStringSuite`.
pub const ZSTRING_SUITE_NAME: &str = "AS ZString Suite";

const SUITES: &[(&str, i32, SuiteId)] = &[
    (BASIC_SUITE_NAME, 4, SuiteId::Basic),
    (BUFFER_SUITE_NAME, 1, SuiteId::Buffer),
    (HANDLE_SUITE_NAME, 1, SuiteId::Handle1),
    (HANDLE_SUITE_NAME, 2, SuiteId::Handle2),
    (DESCRIPTOR_REGISTRY_SUITE_NAME, 1, SuiteId::DescriptorRegistry),
    (ACTION_DESCRIPTOR_SUITE_NAME, 2, SuiteId::ActionDescriptor),
    (ACTION_LIST_SUITE_NAME, 1, SuiteId::ActionList),
    (ACTION_REFERENCE_SUITE_NAME, 2, SuiteId::ActionReference),
    (UI_HOOKS_SUITE_NAME, 1, SuiteId::UiHooks),
    (ZSTRING_SUITE_NAME, 1, SuiteId::ZString),
];

impl SuiteId {
    /// Resolve a request.
    ///
    /// A known name with an unknown version is
    /// [`SuiteError::UnsupportedVersion`]; an unknown name is
    /// [`SuiteError::NotFound`].
    pub fn resolve(name: &str, version: i32) -> Result<Self, SuiteError> {
        let mut known_name = false;
        for (suite_name, suite_version, id) in SUITES {
            if *suite_name == name {
                if *suite_version == version {
                    return Ok(*id);
                }
                known_name = true;
            }
        }
        if known_name {
            Err(SuiteError::UnsupportedVersion {
                name: name.to_string(),
                version,
            })
        } else {
            Err(SuiteError::NotFound(name.to_string()))
        }
    }

    /// Suite name.
    pub fn name(self) -> &'static str {
        self.entry().0
    }

    /// Suite version.
    pub fn version(self) -> i32 {
        self.entry().1
    }

    fn entry(self) -> (&'static str, i32) {
        SUITES
            .iter()
            .find(|(_, _, id)| *id == self)
            .map(|(name, version, _)| (*name, *version))
            .unwrap_or(("", 0))
    }

    /// Suites that must exist before this one.
    pub fn dependencies(self) -> &'static [SuiteId] {
        match self {
            Self::ActionDescriptor => &[Self::ActionList, Self::ActionReference],
            _ => &[],
        }
    }

    /// Address of the function table.
    pub(crate) fn table(self) -> *const c_void {
        match self {
            Self::Basic => std::ptr::from_ref(&BASIC_SUITE).cast(),
            Self::Buffer => std::ptr::from_ref(&BUFFER_SUITE).cast(),
            Self::Handle1 => std::ptr::from_ref(&HANDLE_SUITE_1).cast(),
            Self::Handle2 => std::ptr::from_ref(&HANDLE_SUITE_2).cast(),
            Self::DescriptorRegistry => std::ptr::from_ref(&DESCRIPTOR_REGISTRY_SUITE).cast(),
            Self::ActionDescriptor => std::ptr::from_ref(&ACTION_DESCRIPTOR_SUITE).cast(),
            Self::ActionList => std::ptr::from_ref(&ACTION_LIST_SUITE).cast(),
            Self::ActionReference => std::ptr::from_ref(&ACTION_REFERENCE_SUITE).cast(),
            Self::UiHooks => std::ptr::from_ref(&UI_HOOKS_SUITE).cast(),
            Self::ZString => std::ptr::from_ref(&ZSTRING_SUITE).cast(),
        }
    }
}

impl fmt::Display for SuiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} v{}", self.name(), self.version())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve() {
        assert_eq!(SuiteId::resolve(HANDLE_SUITE_NAME, 2), Ok(SuiteId::Handle2));
        assert_eq!(SuiteId::resolve(HANDLE_SUITE_NAME, 1), Ok(SuiteId::Handle1));
        assert_eq!(
            SuiteId::resolve(HANDLE_SUITE_NAME, 3),
            Err(SuiteError::UnsupportedVersion {
                name: HANDLE_SUITE_NAME.into(),
                version: 3
            })
        );
        assert_eq!(
            SuiteId::resolve("Photoshop Channel Ports Suite", 3),
            Err(SuiteError::NotFound("Photoshop Channel Ports Suite".into()))
        );
    }

    #[test]
    fn test_every_suite_round_trips() {
        for (name, version, id) in SUITES {
            assert_eq!(SuiteId::resolve(name, *version), Ok(*id));
            assert_eq!(id.name(), *name);
            assert!(!id.table().is_null());
        }
        assert_eq!(
            SuiteId::ActionDescriptor.dependencies(),
            &[SuiteId::ActionList, SuiteId::ActionReference]
        );
    }
}
