use std::{ffi::CString, ptr::NonNull};

use tracing::warn;
use windows::{
    core::{Error, PCSTR},
    Win32::{
        Foundation::FALSE,
        System::Memory::{
            MapViewOfFile, OpenFileMappingA, UnmapViewOfFile, FILE_MAP_READ, FILE_MAP_WRITE,
            MEMORYMAPPEDVIEW_ADDRESS,
        },
    },
};

use crate::{
    channel_record::ChannelRecord,
    error::{codes, AgentError},
    win_api_wrappers::{win32_code, SafeHandle},
};

struct MappedView(MEMORYMAPPEDVIEW_ADDRESS);

impl Drop for MappedView {
    fn drop(&mut self) {
        if let Err(err) = unsafe { UnmapViewOfFile(self.0) } {
            warn!("UnmapViewOfFile failed: {}", err);
        }
    }
}

pub struct Mapping {
    record: NonNull<ChannelRecord>,
    // Unmapped before the handle is closed.
    _view: MappedView,
    _handle: SafeHandle,
}

// The view stays mapped at the same address until drop.
unsafe impl Send for Mapping {}
unsafe impl Sync for Mapping {}

impl Mapping {
    pub fn open(name: &str) -> Result<Self, AgentError> {
        let c_name = CString::new(name).map_err(|_| AgentError::ChannelUnavailable {
            operation: "OpenFileMapping",
            code: codes::INVALID_PARAMETER,
        })?;
        let handle = unsafe {
            OpenFileMappingA(
                (FILE_MAP_READ | FILE_MAP_WRITE).0,
                FALSE,
                PCSTR::from_raw(c_name.as_ptr() as *const u8),
            )
        }
        .map_err(|err| AgentError::ChannelUnavailable {
            operation: "OpenFileMapping",
            code: win32_code(&err),
        })?;
        let handle = SafeHandle(handle);

        let view = unsafe { MapViewOfFile(handle.0, FILE_MAP_READ | FILE_MAP_WRITE, 0, 0, 0) };
        let Some(record) = NonNull::new(view.Value as *mut ChannelRecord) else {
            return Err(AgentError::MapFailed {
                operation: "MapViewOfFile",
                code: win32_code(&Error::from_win32()),
            });
        };
        Ok(Self {
            record,
            _view: MappedView(view),
            _handle: handle,
        })
    }

    pub fn record(&self) -> NonNull<ChannelRecord> {
        self.record
    }
}
