#[cfg(target_os = "windows")]
mod error_dialog;
mod file;
mod tracing_helper;

use std::{
    ffi::c_void,
    mem,
    path::PathBuf,
    sync::{Mutex, PoisonError},
    thread::{self, JoinHandle},
};

use tracing::{error, info, warn};
use unlocker_lib::{AgentConfig, ErrorSink, HostMemory, Lifecycle};

#[cfg(target_os = "windows")]
use windows::Win32::{
    Foundation::{BOOL, FALSE, HINSTANCE, HMODULE, LPARAM, LRESULT, TRUE, WPARAM},
    System::{
        Console::AllocConsole,
        LibraryLoader::DisableThreadLibraryCalls,
        SystemServices::{DLL_PROCESS_ATTACH, DLL_PROCESS_DETACH},
    },
    UI::WindowsAndMessaging::{CallNextHookEx, HHOOK},
};

#[cfg(target_os = "windows")]
type PlatformSink = error_dialog::DialogSink;
#[cfg(not(target_os = "windows"))]
type PlatformSink = unlocker_lib::LogSink;

type Agent = Lifecycle<HostMemory, PlatformSink>;

/// Bootstrap thread of the current attachment. It yields the agent once
/// attach has finished, successfully or not.
static AGENT: Mutex<Option<JoinHandle<Agent>>> = Mutex::new(None);

fn bootstrap(module_path: Option<PathBuf>) -> Agent {
    let files = file::module_files(module_path.as_deref());
    if let Err(err) = tracing_helper::init_tracing(&files.log_dir, &files.log_file_name, false) {
        warn!("tracing already initialized: {}", err);
    }

    let config = files
        .config_path
        .as_deref()
        .map(AgentConfig::load)
        .unwrap_or_default();
    let mut agent = Lifecycle::new(config, HostMemory, PlatformSink::default());
    // failures have been published and reported by the lifecycle itself
    let _ = agent.attach();
    agent
}

fn attach(module_path: Option<PathBuf>) -> bool {
    let mut slot = AGENT.lock().unwrap_or_else(PoisonError::into_inner);
    if slot.is_some() {
        warn!("already attached");
        return false;
    }
    match thread::Builder::new()
        .name("unlocker-bootstrap".to_owned())
        .spawn(move || bootstrap(module_path))
    {
        Ok(handle) => {
            *slot = Some(handle);
            true
        }
        Err(err) => {
            PlatformSink::default()
                .report("CreateThread", err.raw_os_error().unwrap_or_default() as u32);
            false
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
enum DetachKind {
    /// The module is unloaded from a live process.
    Unload,
    /// The process is exiting and its other threads are already gone.
    ProcessExit,
}

impl DetachKind {
    /// `DLL_PROCESS_DETACH` passes a non-null `lpvReserved` on process exit.
    #[cfg_attr(not(target_os = "windows"), allow(dead_code))]
    fn from_reserved(reserved: *mut c_void) -> Self {
        if reserved.is_null() {
            DetachKind::Unload
        } else {
            DetachKind::ProcessExit
        }
    }
}

fn detach(kind: DetachKind) {
    let handle = AGENT.lock().unwrap_or_else(PoisonError::into_inner).take();
    let Some(handle) = handle else {
        return;
    };
    if kind == DetachKind::ProcessExit {
        // a killed thread never finishes, and joining it would panic
        if !handle.is_finished() {
            warn!("bootstrap thread did not finish, leaking it");
            mem::forget(handle);
            return;
        }
        match handle.join() {
            Ok(mut agent) => agent.abandon(),
            Err(_) => error!("bootstrap thread panicked"),
        }
        return;
    }
    match handle.join() {
        Ok(mut agent) => {
            if let Some(report) = agent.detach() {
                info!("{} ticks, {} writes", report.ticks, report.writes);
            }
        }
        Err(_) => error!("bootstrap thread panicked"),
    }
}

#[cfg(target_os = "windows")]
#[no_mangle]
pub extern "system" fn DllMain(inst_dll: HINSTANCE, reason: u32, reserved: *mut c_void) -> BOOL {
    match reason {
        DLL_PROCESS_ATTACH => {
            let module: HMODULE = inst_dll.into();
            let _ = unsafe { DisableThreadLibraryCalls(module) };
            if cfg!(debug_assertions) {
                let _ = unsafe { AllocConsole() };
                std::env::set_var("RUST_BACKTRACE", "1");
            }
            let dll_path = file::to_dll_path(inst_dll).ok();
            if !attach(dll_path) {
                return FALSE;
            }
        }
        DLL_PROCESS_DETACH => detach(DetachKind::from_reserved(reserved)),
        _ => {}
    }
    TRUE
}

/// Hook procedure for loaders that inject through `SetWindowsHookEx`.
#[cfg(target_os = "windows")]
#[allow(non_snake_case)]
#[no_mangle]
pub extern "system" fn WndProc(code: i32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    unsafe { CallNextHookEx(HHOOK::default(), code, wparam, lparam) }
}

#[cfg(not(target_os = "windows"))]
#[no_mangle]
pub extern "C" fn unlocker_attach() -> bool {
    attach(None)
}

#[cfg(not(target_os = "windows"))]
#[no_mangle]
pub extern "C" fn unlocker_detach() {
    detach(DetachKind::Unload)
}
