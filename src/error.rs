//! Error types shared by every layer of the crate.
use alloc::string::String;

use crate::session::Peripheral;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolViolation),
    #[error("no {0} JTAG core in target device")]
    PeripheralNotFound(Peripheral),
    #[error("SLD hub was already enumerated in this session")]
    AlreadyDiscovered,
    #[error("{0} captured reads are still queued; execute them first")]
    PendingReads(usize),
    #[error("verification failed at 0x{address:08x}: wrote 0x{expected:08x}, read 0x{found:08x}")]
    VerifyMismatch {
        address: u32,
        expected: u32,
        found: u32,
    },
}

/// Failures of the byte stream underneath the encoder.  None of these are recoverable within
/// a session.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("cannot open cable: {0}")]
    Open(String),
    #[error("write failed: {0}")]
    Write(String),
    #[error("read failed: {0}")]
    Read(String),
    #[error("pin access failed: {0}")]
    Pin(String),
    #[error("no progress after {attempts} attempts")]
    Stalled { attempts: u32 },
}

/// The target answered, but not the way a single supported device with an SLD hub does.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolViolation {
    #[error("loopback returned 0x{found:08x}; more than one JTAG device attached to chain is not supported")]
    Loopback { found: u32 },
    #[error("unknown device; idcode = 0x{0:08x}")]
    UnknownIdcode(u32),
    #[error("unsupported SLD hub; manufacturer = 0x{manufacturer:03x}, version = {version}")]
    UnsupportedHub { manufacturer: u16, version: u8 },
    #[error("SLD hub needs a {width}-bit virtual IR; at most 64 bits are supported")]
    VirTooWide { width: u32 },
}
