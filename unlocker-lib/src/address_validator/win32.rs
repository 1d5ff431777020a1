use std::{ffi::c_void, mem::size_of};

use windows::{
    core::Error,
    Win32::System::Memory::{VirtualQuery, MEMORY_BASIC_INFORMATION},
};

use crate::{error::AgentError, win_api_wrappers::win32_code};

use super::{MemoryQuery, PageAccess, PageProtection};

#[derive(Clone, Copy, Debug, Default)]
pub struct HostMemory;

impl MemoryQuery for HostMemory {
    const OPERATION: &'static str = "VirtualQuery";

    fn query(&self, address: usize) -> Result<PageProtection, AgentError> {
        let mut mbi = MEMORY_BASIC_INFORMATION::default();
        let written = unsafe {
            VirtualQuery(
                Some(address as *const c_void),
                &mut mbi,
                size_of::<MEMORY_BASIC_INFORMATION>(),
            )
        };
        if written == 0 {
            return Err(AgentError::SystemCallFailed {
                operation: Self::OPERATION,
                code: win32_code(&Error::from_win32()),
            });
        }
        Ok(PageProtection {
            base: mbi.BaseAddress as usize,
            size: mbi.RegionSize,
            access: PageAccess::from_windows(mbi.Protect.0),
        })
    }
}
