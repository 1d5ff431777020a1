#[cfg(unix)]
mod unix;
#[cfg(target_os = "windows")]
mod win32;

use tracing::info;

use crate::{channel_record::Mailbox, config::ChannelConfig, error::AgentError};

#[cfg(unix)]
use self::unix::Mapping;
#[cfg(target_os = "windows")]
use self::win32::Mapping;

/// The controller's named region, mapped read+write. Unmapped on drop.
pub struct SharedChannel {
    name: String,
    mapping: Mapping,
}

impl SharedChannel {
    /// Opens a region the controller already created. Never creates one.
    pub fn open(config: &ChannelConfig) -> Result<Self, AgentError> {
        #[cfg(unix)]
        let mapping = Mapping::open(&config.dir, &config.name)?;
        #[cfg(target_os = "windows")]
        let mapping = Mapping::open(&config.name)?;
        info!("opened channel {}", config.name);
        Ok(Self {
            name: config.name.clone(),
            mapping,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mailbox(&self) -> Mailbox<'_> {
        unsafe { Mailbox::from_raw(self.mapping.record()) }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::{fs, path::Path};

    use crate::{
        channel_record::{ChannelRecord, Status},
        error::ErrorKind,
    };

    use super::*;

    fn config(dir: &Path, name: &str) -> ChannelConfig {
        ChannelConfig {
            name: name.to_owned(),
            dir: dir.to_owned(),
        }
    }

    #[test]
    fn missing_region_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let err = SharedChannel::open(&config(dir.path(), "absent")).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::ChannelUnavailable);
        assert_eq!(err.operation(), "open");
        assert!(!dir.path().join("absent").exists());
    }

    #[test]
    fn empty_region_cannot_be_mapped() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("empty"), b"").unwrap();
        let err = SharedChannel::open(&config(dir.path(), "empty")).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::MapFailed);
    }

    #[test]
    fn status_written_by_agent_reaches_the_controller() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("region");
        let record = ChannelRecord {
            target_address: 0xdead_beef,
            desired_value: 144,
            status: Status::HostAwaiting as i32,
        };
        fs::write(&path, record.to_ne_bytes()).unwrap();

        let channel = SharedChannel::open(&config(dir.path(), "region")).unwrap();
        assert_eq!(channel.name(), "region");
        let mailbox = channel.mailbox();
        assert_eq!(mailbox.target_address(), 0xdead_beef);
        assert_eq!(mailbox.desired_value(), 144);
        assert!(mailbox.advance_status(Status::ClientReady));
        drop(channel);

        let bytes = fs::read(&path).unwrap();
        assert_eq!(bytes[12..16], (Status::ClientReady as i32).to_ne_bytes());
    }
}
