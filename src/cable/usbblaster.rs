//! Implement the `Cable` trait for Altera USB Blaster and clones.  The FT245 in the cable
//! forwards our bytes to the CPLD that implements the command set, so this adapter is a plain
//! byte pipe.
use crate::cable::Cable;
use crate::error::TransportError;

use std::format;
use std::time::Duration;

use libftd2xx::{BitMode, BitsPerWord, Ftdi, FtdiCommon, Parity, StopBits};

pub const ALTERA_VID: u16 = 0x09fb;
pub const USB_BLASTER_PID: u16 = 0x6001;
pub const USB_BLASTER_DESCRIPTION: &str = "USB-Blaster";

const BAUD_RATE: u32 = 115_200;
const TIMEOUT: Duration = Duration::from_millis(100);

fn open_error(err: libftd2xx::FtStatus) -> TransportError {
    TransportError::Open(format!("{:?}", err))
}

pub struct UsbBlaster {
    ft: Ftdi,
}

impl UsbBlaster {
    /// Open the first genuine Altera USB-Blaster.
    pub fn new() -> Result<Self, TransportError> {
        Self::open(ALTERA_VID, USB_BLASTER_PID, USB_BLASTER_DESCRIPTION)
    }

    /// Open a USB-Blaster compatible cable by VID/PID and USB description.
    pub fn open(vid: u16, pid: u16, description: &str) -> Result<Self, TransportError> {
        // Only custom VID/PIDs need registering with D2XX, which Windows does not support
        #[cfg(unix)]
        libftd2xx::set_vid_pid(vid, pid).map_err(open_error)?;
        #[cfg(not(unix))]
        let _ = (vid, pid);

        let mut ft = Ftdi::with_description(description).map_err(open_error)?;
        ft.set_bit_mode(0, BitMode::Reset).map_err(open_error)?;
        ft.set_data_characteristics(BitsPerWord::Bits8, StopBits::Bits1, Parity::No)
            .map_err(open_error)?;
        ft.set_baud_rate(BAUD_RATE).map_err(open_error)?;
        ft.set_timeouts(TIMEOUT, TIMEOUT).map_err(open_error)?;
        ft.purge_all().map_err(open_error)?;

        Ok(Self { ft })
    }
}

impl Cable for UsbBlaster {
    fn write(&mut self, buf: &[u8]) -> Result<usize, TransportError> {
        self.ft.write(buf).map_err(|e| TransportError::Write(format!("{:?}", e)))
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        self.ft.read(buf).map_err(|e| TransportError::Read(format!("{:?}", e)))
    }
}
