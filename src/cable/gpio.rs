//! Implement the `Cable` trait by bit-banging `embedded-hal` pins.  The command bytes are
//! executed exactly as a USB-Blaster would, so a microcontroller with four spare pins can
//! stand in for the cable.
use alloc::collections::VecDeque;
use alloc::format;
use embedded_hal::{delay::DelayNs, digital::{InputPin, OutputPin, PinState}};

use crate::cable::Cable;
use crate::error::TransportError;
use crate::shifter::{BMODE, READ, TCK, TDI, TMS};

fn pin_error<E: embedded_hal::digital::Error>(err: E) -> TransportError {
    TransportError::Pin(format!("{:?}", err.kind()))
}

pub struct Gpio<Clk, Tdi, Tdo, Tms, Delay> where Clk: OutputPin, Tdi: OutputPin, Tdo: InputPin, Tms: OutputPin, Delay: DelayNs {
    half_period: u32,
    delay: Delay,
    clock: Clk,
    tdi: Tdi,
    tdo: Tdo,
    tms: Tms,
    // bytes still owed to the current burst, and whether it samples TDO
    burst_left: u8,
    burst_read: bool,
    replies: VecDeque<u8>,
}

impl<Clk, Tdi, Tdo, Tms, Delay> Gpio<Clk, Tdi, Tdo, Tms, Delay> where Clk: OutputPin, Tdi: OutputPin, Tdo: InputPin, Tms: OutputPin, Delay: DelayNs {
    pub fn new(freq_khz: u32, clock: Clk, tdi: Tdi, tdo: Tdo, tms: Tms, delay: Delay) -> Gpio<Clk, Tdi, Tdo, Tms, Delay> {
        let period_ns = 1_000_000 / freq_khz.max(1);
        let half_period = period_ns / 2;
        Gpio {
            half_period,
            clock,
            tdi,
            tdo,
            tms,
            delay,
            burst_left: 0,
            burst_read: false,
            replies: VecDeque::new(),
        }
    }

    /// Put `tdi` on the line, then run one full TCK cycle, sampling TDO while the clock is
    /// high.
    fn cycle(&mut self, tdi: bool) -> Result<bool, TransportError> {
        self.tdi.set_state(PinState::from(tdi)).map_err(pin_error)?;
        self.clock.set_low().map_err(pin_error)?;
        self.delay.delay_ns(self.half_period);
        self.clock.set_high().map_err(pin_error)?;
        let tdo = self.tdo.is_high().map_err(pin_error)?;
        self.delay.delay_ns(self.half_period);
        Ok(tdo)
    }

    fn burst_byte(&mut self, byte: u8) -> Result<(), TransportError> {
        let mut sampled = 0;
        for b in 0..8 {
            let tdo = self.cycle((byte >> b) & 1 != 0)?;
            sampled |= (tdo as u8) << b;
        }
        if self.burst_read {
            self.replies.push_back(sampled);
        }
        self.burst_left -= 1;
        Ok(())
    }

    /// Set the pins as one bit-bang byte says.  TMS and TDI change before TCK.
    fn bang(&mut self, byte: u8) -> Result<(), TransportError> {
        self.tms.set_state(PinState::from(byte & TMS != 0)).map_err(pin_error)?;
        self.tdi.set_state(PinState::from(byte & TDI != 0)).map_err(pin_error)?;
        self.clock.set_state(PinState::from(byte & TCK != 0)).map_err(pin_error)?;
        let tdo = self.tdo.is_high().map_err(pin_error)?;
        if byte & READ != 0 {
            self.replies.push_back(tdo as u8);
        }
        self.delay.delay_ns(self.half_period);
        Ok(())
    }

    fn command(&mut self, byte: u8) -> Result<(), TransportError> {
        if self.burst_left > 0 {
            return self.burst_byte(byte);
        }
        if byte & BMODE != 0 {
            self.burst_left = byte & 0x3f;
            self.burst_read = byte & READ != 0;
            return Ok(());
        }
        self.bang(byte)
    }
}

impl<Clk, Tdi, Tdo, Tms, Delay> Cable for Gpio<Clk, Tdi, Tdo, Tms, Delay> where Clk: OutputPin, Tdi: OutputPin, Tdo: InputPin, Tms: OutputPin, Delay: DelayNs {
    fn write(&mut self, buf: &[u8]) -> Result<usize, TransportError> {
        for byte in buf {
            self.command(*byte)?;
        }
        Ok(buf.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let n = buf.len().min(self.replies.len());
        for (slot, byte) in buf.iter_mut().zip(self.replies.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}
