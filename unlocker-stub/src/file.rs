use std::{
    env,
    path::{Path, PathBuf},
};

#[cfg(target_os = "windows")]
use anyhow::{bail, Result};
#[cfg(target_os = "windows")]
use windows::{
    core::PCWSTR,
    Win32::{
        Foundation::{HINSTANCE, MAX_PATH},
        System::LibraryLoader::GetModuleFileNameW,
    },
};

/// Overrides the config path where the module cannot locate itself.
pub const CONFIG_ENV: &str = "UNLOCKER_STUB_CONFIG";

#[cfg(target_os = "windows")]
pub fn to_dll_path(inst_dll: HINSTANCE) -> Result<PathBuf> {
    let mut buf = [0u16; MAX_PATH as usize];
    if unsafe { GetModuleFileNameW(inst_dll, &mut buf) } == 0 {
        bail!("GetModuleFileNameW failed");
    }
    let dll_path = unsafe { PCWSTR::from_raw(buf.as_ptr()).to_string() }?;
    Ok(PathBuf::from(dll_path))
}

#[derive(Debug, PartialEq, Eq)]
pub struct ModuleFiles {
    pub log_dir: PathBuf,
    pub log_file_name: String,
    pub config_path: Option<PathBuf>,
}

/// Log and config live next to the module as `<stem>.log` and `<stem>.toml`.
/// Without a module path the log goes to the temp dir and the config comes
/// from [`CONFIG_ENV`].
pub fn module_files(module_path: Option<&Path>) -> ModuleFiles {
    let env_config = env::var_os(CONFIG_ENV).map(PathBuf::from);
    let Some(module_path) = module_path else {
        return ModuleFiles {
            log_dir: env::temp_dir(),
            log_file_name: concat!(env!("CARGO_CRATE_NAME"), ".log").to_owned(),
            config_path: env_config,
        };
    };
    let stem = module_path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| env!("CARGO_CRATE_NAME").to_owned());
    let log_dir = module_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(env::temp_dir);
    ModuleFiles {
        config_path: env_config.or_else(|| Some(log_dir.join(format!("{}.toml", stem)))),
        log_file_name: format!("{}.log", stem),
        log_dir,
    }
}
