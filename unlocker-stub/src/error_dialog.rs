use unlocker_lib::ErrorSink;
use windows::{
    core::HSTRING,
    Win32::{
        Foundation::HWND,
        UI::WindowsAndMessaging::{MessageBoxW, MB_ICONERROR},
    },
};

/// Blocks until the user dismisses the dialog.
#[derive(Clone, Copy, Debug, Default)]
pub struct DialogSink;

impl ErrorSink for DialogSink {
    fn report(&self, operation: &str, code: u32) {
        let message = format!("{} failed with error {}", operation, code);
        unsafe {
            MessageBoxW(
                HWND::default(),
                &HSTRING::from(message),
                &HSTRING::from("Error"),
                MB_ICONERROR,
            )
        };
    }
}
