mod address_validator;
mod channel_record;
mod config;
mod error;
mod lifecycle;
mod patch_loop;
mod shared_channel;
#[cfg(target_os = "windows")]
mod win_api_wrappers;

pub use crate::address_validator::{
    validate, HostMemory, MemoryQuery, PageAccess, PageProtection, ValidatedTarget,
};
pub use crate::channel_record::{ChannelRecord, Mailbox, Status, CHANNEL_NAME};
pub use crate::config::{AgentConfig, ChannelConfig, PatchConfig};
pub use crate::error::{codes, AgentError, ErrorKind, ErrorSink, LogSink};
pub use crate::lifecycle::{Lifecycle, LifecycleState};
pub use crate::patch_loop::{clamp_value, PatchLoop, PatchReport, MAX_VALUE, MIN_VALUE};
pub use crate::shared_channel::SharedChannel;
