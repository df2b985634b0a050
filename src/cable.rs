//! Implementations for different JTAG hardware adapters live here.  Hardware adapters should
//! implement the `Cable` trait, which is nothing more than a duplex byte stream carrying
//! USB-Blaster command bytes one way and sampled TDO bytes the other.
#[cfg(feature = "std")]
pub mod usbblaster;
pub mod gpio;

use crate::error::TransportError;

pub trait Cable {
    /// Send as much of `buf` as the adapter accepts right now.  Returns the number of bytes
    /// taken, which may be zero.
    fn write(&mut self, buf: &[u8]) -> Result<usize, TransportError>;
    /// Receive up to `buf.len()` reply bytes.  Returns the number of bytes filled, which may
    /// be zero if the adapter has nothing yet.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;
}

/// Write all of `buf`, retrying short writes.  More than `stall_limit` consecutive writes
/// that take nothing fail with `TransportError::Stalled`.
pub fn write_all<C>(cable: &mut C, mut buf: &[u8], stall_limit: Option<u32>) -> Result<(), TransportError>
    where C: Cable + ?Sized
{
    let mut stalls = 0;
    while !buf.is_empty() {
        let sent = cable.write(buf)?.min(buf.len());
        stalls = check_progress(sent, stalls, stall_limit)?;
        buf = &buf[sent..];
    }
    Ok(())
}

/// Fill all of `buf`, retrying short reads.  Same stall policy as `write_all`.
pub fn read_exact<C>(cable: &mut C, buf: &mut [u8], stall_limit: Option<u32>) -> Result<(), TransportError>
    where C: Cable + ?Sized
{
    let mut stalls = 0;
    let mut got = 0;
    while got < buf.len() {
        let n = cable.read(&mut buf[got..])?.min(buf.len() - got);
        stalls = check_progress(n, stalls, stall_limit)?;
        got += n;
    }
    Ok(())
}

fn check_progress(moved: usize, stalls: u32, stall_limit: Option<u32>) -> Result<u32, TransportError> {
    if moved > 0 {
        return Ok(0);
    }
    let stalls = stalls + 1;
    match stall_limit {
        Some(limit) if stalls > limit => Err(TransportError::Stalled { attempts: stalls }),
        _ => Ok(stalls),
    }
}
