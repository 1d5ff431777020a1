use std::fs::read_to_string;

use crate::error::{codes, os_code, AgentError};

use super::{MemoryQuery, PageAccess, PageProtection};

/// Memory map of the current process, read from procfs on every query.
#[derive(Clone, Copy, Debug, Default)]
pub struct HostMemory;

impl MemoryQuery for HostMemory {
    const OPERATION: &'static str = "/proc/self/maps";

    fn query(&self, address: usize) -> Result<PageProtection, AgentError> {
        let maps = read_to_string("/proc/self/maps").map_err(|err| {
            AgentError::SystemCallFailed {
                operation: Self::OPERATION,
                code: os_code(&err),
            }
        })?;
        find_region(&maps, address).ok_or(AgentError::InvalidAddress {
            operation: Self::OPERATION,
            code: codes::INVALID_ADDRESS,
        })
    }
}

fn find_region(maps: &str, address: usize) -> Option<PageProtection> {
    maps.lines().find_map(|line| {
        let mut fields = line.split_whitespace();
        let (start, end) = fields.next()?.split_once('-')?;
        let perms = fields.next()?;
        let start = usize::from_str_radix(start, 16).ok()?;
        let end = usize::from_str_radix(end, 16).ok()?;
        (start..end).contains(&address).then(|| PageProtection {
            base: start,
            size: end - start,
            access: PageAccess::from_maps_perms(perms),
        })
    })
}

#[cfg(test)]
mod tests {
    use crate::{address_validator::validate, error::ErrorKind};

    use super::*;

    const MAPS: &str = "\
55d0c0a00000-55d0c0a21000 r--p 00000000 08:01 1234  /usr/bin/host
55d0c0c21000-55d0c0c23000 rw-p 00021000 08:01 1234  /usr/bin/host
7ffd1a000000-7ffd1a021000 rw-p 00000000 00:00 0     [stack]
7ffd1a021000-7ffd1a022000 ---p 00000000 00:00 0
";

    #[test]
    fn finds_the_containing_region() {
        let region = find_region(MAPS, 0x55d0c0c21010).unwrap();
        assert_eq!(region.base, 0x55d0c0c21000);
        assert_eq!(region.size, 0x2000);
        assert_eq!(region.access, PageAccess::ReadWrite);

        let region = find_region(MAPS, 0x7ffd1a021000).unwrap();
        assert_eq!(region.access, PageAccess::NoAccess);

        assert_eq!(find_region(MAPS, 0x55d0c0a21000), None);
        assert_eq!(find_region("garbage line\n", 0x1000), None);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn heap_cell_is_writable() {
        let cell = Box::new(0i32);
        let address = &*cell as *const i32 as u64;
        let target = validate(&HostMemory, address).unwrap();
        assert_eq!(target.address() as u64, address);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn read_only_mapping_is_rejected() {
        let map = memmap2::MmapMut::map_anon(4096)
            .unwrap()
            .make_read_only()
            .unwrap();
        let err = validate(&HostMemory, map.as_ptr() as u64).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidAddress);
        assert_eq!(map[0], 0);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn unmapped_address_is_rejected() {
        let err = validate(&HostMemory, 0x1000).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidAddress);
        assert_eq!(err.operation(), "/proc/self/maps");
    }
}
