use tracing::warn;
use windows::Win32::Foundation::{CloseHandle, HANDLE};

pub struct SafeHandle(pub HANDLE);

impl Drop for SafeHandle {
    fn drop(&mut self) {
        if let Err(err) = unsafe { CloseHandle(self.0) } {
            warn!("CloseHandle failed: {}", err);
        }
    }
}

/// Recovers the Win32 error number from an `HRESULT_FROM_WIN32` value.
pub fn win32_code(err: &windows::core::Error) -> u32 {
    let hresult = err.code().0 as u32;
    if hresult & 0xffff_0000 == 0x8007_0000 {
        hresult & 0xffff
    } else {
        hresult
    }
}
