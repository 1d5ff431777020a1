use std::{fs::OpenOptions, path::Path, ptr::NonNull};

use memmap2::MmapMut;

use crate::{
    channel_record::ChannelRecord,
    error::{codes, os_code, AgentError},
};

pub struct Mapping {
    record: NonNull<ChannelRecord>,
    _map: MmapMut,
}

// The record pointer targets the map, which moves with the struct and lives as long as it.
unsafe impl Send for Mapping {}
unsafe impl Sync for Mapping {}

impl Mapping {
    pub fn open(dir: &Path, name: &str) -> Result<Self, AgentError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(dir.join(name))
            .map_err(|err| AgentError::ChannelUnavailable {
                operation: "open",
                code: os_code(&err),
            })?;
        let mut map = unsafe { MmapMut::map_mut(&file) }.map_err(|err| AgentError::MapFailed {
            operation: "mmap",
            code: os_code(&err),
        })?;
        if map.len() < ChannelRecord::SIZE {
            return Err(AgentError::MapFailed {
                operation: "mmap",
                code: codes::INVALID_PARAMETER,
            });
        }
        let record = NonNull::new(map.as_mut_ptr() as *mut ChannelRecord).ok_or(
            AgentError::MapFailed {
                operation: "mmap",
                code: codes::INVALID_ADDRESS,
            },
        )?;
        Ok(Self { record, _map: map })
    }

    pub fn record(&self) -> NonNull<ChannelRecord> {
        self.record
    }
}
