use std::{
    marker::PhantomData,
    mem::{align_of, size_of},
    ptr::{addr_of, addr_of_mut, NonNull},
};

use tracing::{debug, warn};

/// Rendezvous key agreed with the controller. Not a secret.
pub const CHANNEL_NAME: &str = "2DE95FDC-6AB7-4593-BFE6-760DD4AB422B";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(i32)]
pub enum Status {
    Error = -1,
    None = 0,
    HostAwaiting = 1,
    ClientReady = 2,
    ClientExit = 3,
}

impl Status {
    /// Values outside the contract are read as `Error`.
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            0 => Status::None,
            1 => Status::HostAwaiting,
            2 => Status::ClientReady,
            3 => Status::ClientExit,
            _ => Status::Error,
        }
    }

    pub fn can_transition(self, to: Status) -> bool {
        matches!(
            (self, to),
            (_, Status::Error)
                | (Status::None | Status::Error, Status::HostAwaiting)
                | (Status::HostAwaiting, Status::ClientReady)
                | (Status::ClientReady, Status::ClientExit)
        )
    }
}

/// Byte layout shared with the controller. There is no version field, so both
/// sides must agree on it exactly.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(C, align(8))]
pub struct ChannelRecord {
    pub target_address: u64,
    pub desired_value: i32,
    pub status: i32,
}

const _: () = assert!(size_of::<ChannelRecord>() == 16);
const _: () = assert!(align_of::<ChannelRecord>() == 8);

impl ChannelRecord {
    pub const SIZE: usize = size_of::<Self>();

    /// Native-endian image of the record, as a controller writes it into the region.
    pub fn to_ne_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..8].copy_from_slice(&self.target_address.to_ne_bytes());
        bytes[8..12].copy_from_slice(&self.desired_value.to_ne_bytes());
        bytes[12..16].copy_from_slice(&self.status.to_ne_bytes());
        bytes
    }
}

/// Single-slot mailbox over a [`ChannelRecord`] that another process writes too.
///
/// `target_address` and `desired_value` belong to the controller and are only
/// read here. `status` is written by both sides, and this side only moves it
/// through [`Mailbox::advance_status`].
///
/// Nothing is locked and no ordering is imposed. Every access is one volatile
/// word-sized read or write, so the controller may change `desired_value`
/// between two reads; the patch loop clamps whatever it sees.
pub struct Mailbox<'a> {
    record: NonNull<ChannelRecord>,
    _mapping: PhantomData<&'a ChannelRecord>,
}

impl<'a> Mailbox<'a> {
    /// # Safety
    ///
    /// `record` must point to a mapped, aligned record that stays mapped for `'a`.
    pub unsafe fn from_raw(record: NonNull<ChannelRecord>) -> Self {
        Self {
            record,
            _mapping: PhantomData,
        }
    }

    pub fn target_address(&self) -> u64 {
        unsafe { addr_of!((*self.record.as_ptr()).target_address).read_volatile() }
    }

    pub fn desired_value(&self) -> i32 {
        unsafe { addr_of!((*self.record.as_ptr()).desired_value).read_volatile() }
    }

    pub fn status(&self) -> Status {
        Status::from_raw(self.raw_status())
    }

    fn raw_status(&self) -> i32 {
        unsafe { addr_of!((*self.record.as_ptr()).status).read_volatile() }
    }

    /// Publishes `next` if the protocol allows it from the current status.
    pub fn advance_status(&self, next: Status) -> bool {
        let current = self.status();
        if !current.can_transition(next) {
            warn!("refused status transition {:?} -> {:?}", current, next);
            return false;
        }
        unsafe { addr_of_mut!((*self.record.as_ptr()).status).write_volatile(next as i32) };
        debug!("status {:?} -> {:?}", current, next);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Status; 5] = [
        Status::Error,
        Status::None,
        Status::HostAwaiting,
        Status::ClientReady,
        Status::ClientExit,
    ];

    #[test]
    fn only_the_handshake_sequence_and_error_are_reachable() {
        let allowed: Vec<_> = ALL
            .iter()
            .flat_map(|&from| ALL.iter().map(move |&to| (from, to)))
            .filter(|&(from, to)| from.can_transition(to))
            .filter(|&(_, to)| to != Status::Error)
            .collect();
        assert_eq!(
            allowed,
            [
                (Status::Error, Status::HostAwaiting),
                (Status::None, Status::HostAwaiting),
                (Status::HostAwaiting, Status::ClientReady),
                (Status::ClientReady, Status::ClientExit),
            ]
        );
        assert!(ALL.iter().all(|from| from.can_transition(Status::Error)));
    }

    #[test]
    fn raw_values_match_the_controller_contract() {
        for status in ALL {
            assert_eq!(Status::from_raw(status as i32), status);
        }
        assert_eq!(Status::from_raw(42), Status::Error);
        assert_eq!(Status::from_raw(-7), Status::Error);
    }

    #[test]
    fn record_image_places_fields_at_fixed_offsets() {
        let record = ChannelRecord {
            target_address: 0x1122_3344_5566_7788,
            desired_value: -5,
            status: Status::HostAwaiting as i32,
        };
        let bytes = record.to_ne_bytes();
        assert_eq!(bytes[0..8], 0x1122_3344_5566_7788u64.to_ne_bytes());
        assert_eq!(bytes[8..12], (-5i32).to_ne_bytes());
        assert_eq!(bytes[12..16], 1i32.to_ne_bytes());
    }

    #[test]
    fn mailbox_refuses_out_of_order_status() {
        let record = Box::into_raw(Box::new(ChannelRecord {
            target_address: 0x1000,
            desired_value: 60,
            status: Status::HostAwaiting as i32,
        }));
        {
            let mailbox = unsafe { Mailbox::from_raw(NonNull::new(record).unwrap()) };
            assert_eq!(mailbox.target_address(), 0x1000);
            assert_eq!(mailbox.desired_value(), 60);

            assert!(!mailbox.advance_status(Status::ClientExit));
            assert_eq!(mailbox.status(), Status::HostAwaiting);
            assert!(mailbox.advance_status(Status::ClientReady));
            assert!(!mailbox.advance_status(Status::HostAwaiting));
            assert!(mailbox.advance_status(Status::ClientExit));
            assert!(mailbox.advance_status(Status::Error));
            assert_eq!(mailbox.status(), Status::Error);
        }
        let record = unsafe { Box::from_raw(record) };
        assert_eq!(record.status, -1);
    }
}
