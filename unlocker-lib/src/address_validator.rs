#[cfg(unix)]
mod procfs;
#[cfg(target_os = "windows")]
mod win32;

use std::mem::{align_of, size_of};

use tracing::info;

use crate::error::{codes, AgentError};

#[cfg(unix)]
pub use self::procfs::HostMemory;
#[cfg(target_os = "windows")]
pub use self::win32::HostMemory;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageAccess {
    ReadWrite,
    ReadOnly,
    NoAccess,
    CopyOnWrite,
    Guard,
    Execute,
    Other,
}

impl PageAccess {
    /// Classifies a `PAGE_*` protection value. Only a bare `PAGE_READWRITE`
    /// counts as read-write; modifiers such as `PAGE_NOCACHE` make it `Other`.
    pub fn from_windows(protect: u32) -> Self {
        const PAGE_NOACCESS: u32 = 0x01;
        const PAGE_READONLY: u32 = 0x02;
        const PAGE_READWRITE: u32 = 0x04;
        const PAGE_WRITECOPY: u32 = 0x08;
        const PAGE_GUARD: u32 = 0x100;

        if protect & PAGE_GUARD != 0 {
            return PageAccess::Guard;
        }
        match protect {
            0 | PAGE_NOACCESS => PageAccess::NoAccess,
            PAGE_READONLY => PageAccess::ReadOnly,
            PAGE_READWRITE => PageAccess::ReadWrite,
            PAGE_WRITECOPY => PageAccess::CopyOnWrite,
            0x10 | 0x20 | 0x40 | 0x80 => PageAccess::Execute,
            _ => PageAccess::Other,
        }
    }

    /// Classifies the permission column of `/proc/<pid>/maps`, e.g. `rw-p`.
    pub fn from_maps_perms(perms: &str) -> Self {
        match perms.as_bytes() {
            [_, _, b'x', _] => PageAccess::Execute,
            [b'r', b'w', b'-', b'p' | b's'] => PageAccess::ReadWrite,
            [b'r', b'-', b'-', _] => PageAccess::ReadOnly,
            [b'-', b'-', b'-', _] => PageAccess::NoAccess,
            _ => PageAccess::Other,
        }
    }
}

/// Protection of the region containing a queried address.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageProtection {
    pub base: usize,
    pub size: usize,
    pub access: PageAccess,
}

pub trait MemoryQuery {
    /// Name shown in error reports.
    const OPERATION: &'static str;

    fn query(&self, address: usize) -> Result<PageProtection, AgentError>;
}

/// The write address, captured once and checked once. The only way to obtain
/// one is [`validate`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ValidatedTarget {
    address: usize,
    protection: PageProtection,
}

impl ValidatedTarget {
    pub fn address(&self) -> usize {
        self.address
    }

    pub fn protection(&self) -> PageProtection {
        self.protection
    }

    /// # Safety
    ///
    /// The host must not have unmapped or reprotected the page since validation.
    pub(crate) unsafe fn write(&self, value: i32) {
        (self.address as *mut i32).write_volatile(value);
    }
}

pub fn validate<Q: MemoryQuery>(query: &Q, address: u64) -> Result<ValidatedTarget, AgentError> {
    let invalid = AgentError::InvalidAddress {
        operation: Q::OPERATION,
        code: codes::INVALID_ADDRESS,
    };
    let Ok(address) = usize::try_from(address) else {
        return Err(invalid);
    };
    if address == 0 || address % align_of::<i32>() != 0 {
        return Err(invalid);
    }
    let protection = query.query(address)?;
    let end = protection.base.saturating_add(protection.size);
    if protection.access != PageAccess::ReadWrite
        || !(protection.base..end).contains(&address)
        || address
            .checked_add(size_of::<i32>())
            .map_or(true, |cell_end| cell_end > end)
    {
        return Err(invalid);
    }
    info!(
        "validated target {:#x} in region {:#x}+{:#x}",
        address, protection.base, protection.size
    );
    Ok(ValidatedTarget {
        address,
        protection,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use std::cell::Cell;

    use crate::error::ErrorKind;

    use super::*;

    /// Reports one fixed region and counts how often it was asked.
    pub struct FakeQuery {
        pub protection: PageProtection,
        pub calls: Cell<u32>,
    }

    impl FakeQuery {
        pub fn new(base: usize, size: usize, access: PageAccess) -> Self {
            Self {
                protection: PageProtection { base, size, access },
                calls: Cell::new(0),
            }
        }
    }

    impl MemoryQuery for FakeQuery {
        const OPERATION: &'static str = "FakeQuery";

        fn query(&self, _address: usize) -> Result<PageProtection, AgentError> {
            self.calls.set(self.calls.get() + 1);
            Ok(self.protection)
        }
    }

    #[test]
    fn windows_protections_are_classified() {
        assert_eq!(PageAccess::from_windows(0x04), PageAccess::ReadWrite);
        assert_eq!(PageAccess::from_windows(0x02), PageAccess::ReadOnly);
        assert_eq!(PageAccess::from_windows(0x01), PageAccess::NoAccess);
        assert_eq!(PageAccess::from_windows(0x08), PageAccess::CopyOnWrite);
        assert_eq!(PageAccess::from_windows(0x104), PageAccess::Guard);
        assert_eq!(PageAccess::from_windows(0x40), PageAccess::Execute);
        assert_eq!(PageAccess::from_windows(0x204), PageAccess::Other);
    }

    #[test]
    fn maps_permissions_are_classified() {
        assert_eq!(PageAccess::from_maps_perms("rw-p"), PageAccess::ReadWrite);
        assert_eq!(PageAccess::from_maps_perms("rw-s"), PageAccess::ReadWrite);
        assert_eq!(PageAccess::from_maps_perms("r--p"), PageAccess::ReadOnly);
        assert_eq!(PageAccess::from_maps_perms("---p"), PageAccess::NoAccess);
        assert_eq!(PageAccess::from_maps_perms("rwxp"), PageAccess::Execute);
        assert_eq!(PageAccess::from_maps_perms("-w-p"), PageAccess::Other);
        assert_eq!(PageAccess::from_maps_perms("rw"), PageAccess::Other);
    }

    #[test]
    fn only_read_write_pages_are_accepted() {
        for access in [
            PageAccess::ReadOnly,
            PageAccess::NoAccess,
            PageAccess::CopyOnWrite,
            PageAccess::Guard,
            PageAccess::Execute,
            PageAccess::Other,
        ] {
            let query = FakeQuery::new(0x1000, 0x1000, access);
            let err = validate(&query, 0x1800).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidAddress, "{:?}", access);
            assert_eq!(err.operation(), "FakeQuery");
            assert_eq!(err.code(), codes::INVALID_ADDRESS);
        }

        let query = FakeQuery::new(0x1000, 0x1000, PageAccess::ReadWrite);
        let target = validate(&query, 0x1800).unwrap();
        assert_eq!(target.address(), 0x1800);
        assert_eq!(target.protection().access, PageAccess::ReadWrite);
    }

    #[test]
    fn null_and_misaligned_addresses_are_rejected_without_querying() {
        let query = FakeQuery::new(0, usize::MAX, PageAccess::ReadWrite);
        assert!(validate(&query, 0).is_err());
        assert!(validate(&query, 0x1002).is_err());
        assert_eq!(query.calls.get(), 0);
    }

    #[test]
    fn cell_must_fit_inside_the_region() {
        let query = FakeQuery::new(0x1000, 0x1000, PageAccess::ReadWrite);
        assert!(validate(&query, 0x1ffc).is_ok());
        assert!(validate(&query, 0x2000).is_err());
        assert!(validate(&query, 0x0ffc).is_err());
    }

    #[test]
    fn cell_at_the_top_of_the_address_space_is_rejected() {
        let query = FakeQuery::new(0, usize::MAX, PageAccess::ReadWrite);
        let err = validate(&query, (usize::MAX - 3) as u64).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidAddress);
        assert_eq!(query.calls.get(), 1);
    }
}
