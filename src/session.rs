//! A convenience wrapper for the cores living behind the SLD hub.  `Session` enumerates the
//! hub once, remembers which virtual IR code reaches which peripheral, and then lets the
//! client read and write target memory, drive the gpio lines and talk to the uart without
//! caring about VIR routing.
//!
//! All accessors only queue commands; results come back from the next `sm.execute()`.
use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use core::fmt;
use core::ops::DerefMut;

use crate::cable::Cable;
use crate::config::Config;
use crate::error::Error;
use crate::sld::{self, Discovery};
use crate::statemachine::JtagSM;

pub const WORD_BITS: usize = 32;
pub const GPIO_BITS: usize = 6;
/// Held high by every `write` so the target stays out of reset while the LEDs rotate.
pub const GPIO_NRESET: u8 = 0x10;
/// Releases the CPU once an image is loaded.
pub const GPIO_RUN: u8 = 0x20;
pub const UART_BITS: usize = 9;
/// Set in an outgoing uart word when its low byte should be sent to the CPU.
pub const UART_STROBE: u64 = 0x100;

/// The registers our cores expose through the hub.  Address, data and gpio belong to the
/// loader node, the uart has a node of its own.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Peripheral {
    Gpio,
    Address,
    Data,
    Uart,
}

impl Peripheral {
    /// Low VIR bits selecting this register within its node.
    pub fn subaddress(self) -> u64 {
        match self {
            Peripheral::Gpio => 0,
            Peripheral::Address => 2,
            Peripheral::Data => 3,
            Peripheral::Uart => 0,
        }
    }
}

impl fmt::Display for Peripheral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Peripheral::Gpio => "gpio",
            Peripheral::Address => "loader address",
            Peripheral::Data => "loader data",
            Peripheral::Uart => "uart",
        };
        f.write_str(name)
    }
}

/// Virtual IR codes of the peripherals found during discovery.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VirMap {
    width: u32,
    codes: BTreeMap<Peripheral, u64>,
}

impl VirMap {
    /// Code = node index above the hub's `m` address bits, peripheral subaddress below.
    pub fn build(discovery: &Discovery, loader: u8, uart: u8) -> Self {
        let m = discovery.hub.address_width as u32;
        let roles = [
            (loader, Peripheral::Gpio),
            (loader, Peripheral::Address),
            (loader, Peripheral::Data),
            (uart, Peripheral::Uart),
        ];

        let mut codes = BTreeMap::new();
        for (instance, peripheral) in roles {
            if let Some(node) = discovery.node(instance) {
                codes.insert(peripheral, (node as u64) << m | peripheral.subaddress());
            }
        }

        Self {
            width: discovery.vir_width,
            codes,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn code(&self, peripheral: Peripheral) -> Option<u64> {
        self.codes.get(&peripheral).copied()
    }
}

/// One full duplex uart exchange as captured from the 9-bit uart register.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UartReply {
    pub byte: u8,
    pub valid: bool,
}

impl UartReply {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            byte: bytes.first().copied().unwrap_or(0),
            valid: bytes.get(1).is_some_and(|b| b & 1 != 0),
        }
    }
}

pub struct Session<T> {
    pub sm: JtagSM<T>,
    loader: u8,
    uart: u8,
    discovery: Option<Discovery>,
    vir: Option<VirMap>,
    // single-hot progress indicator, rotated by every write
    leds: u8,
}

impl<T, U> Session<T>
    where T: DerefMut<Target=U>,
          U: Cable + ?Sized
{
    /// Create a session using an existing `JtagSM`.  Nothing is sent until `discover`.
    pub fn new(sm: JtagSM<T>, config: &Config) -> Self {
        Self {
            sm,
            loader: config.loader_instance,
            uart: config.uart_instance,
            discovery: None,
            vir: None,
            leds: 1,
        }
    }

    /// Enumerate the SLD hub, looking for the debug nodes with the `wanted` instance ids, and
    /// map the peripherals of the configured loader and uart instances.  Either everything
    /// succeeds or the session stays undiscovered.
    ///
    /// Only nodes that are both wanted and configured get mapped: with the default
    /// configuration `discover(&[99])` maps the loader but leaves the uart unmapped, even if
    /// node 98 is present.
    pub fn discover(&mut self, wanted: &[u8]) -> Result<&Discovery, Error> {
        if self.vir.is_some() {
            return Err(Error::AlreadyDiscovered);
        }

        let discovery = sld::scan(&mut self.sm, wanted)?;
        self.vir = Some(VirMap::build(&discovery, self.loader, self.uart));
        Ok(self.discovery.insert(discovery))
    }

    pub fn discovery(&self) -> Option<&Discovery> {
        self.discovery.as_ref()
    }

    pub fn vir_map(&self) -> Option<&VirMap> {
        self.vir.as_ref()
    }

    fn code(&self, peripheral: Peripheral) -> Result<u64, Error> {
        self.vir.as_ref()
            .and_then(|vir| vir.code(peripheral))
            .ok_or(Error::PeripheralNotFound(peripheral))
    }

    fn route(&mut self, code: u64) {
        let width = self.vir.as_ref().map_or(0, VirMap::width);
        sld::vir(&mut self.sm, code, width);
    }

    /// Queue a read of the word at `address`.  The next `execute` returns it as four bytes.
    pub fn read(&mut self, address: u32) -> Result<(), Error> {
        let addr = self.code(Peripheral::Address)?;
        let data = self.code(Peripheral::Data)?;

        self.route(addr);
        self.sm.shift_dr64(address as u64, WORD_BITS, false);
        self.route(data);
        self.sm.shift_dr64(0, WORD_BITS, true);
        Ok(())
    }

    /// Queue a write of `value` to `address`.  With `capture_old` the next `execute` returns
    /// the word that was there before.  Rotates the progress LEDs.
    pub fn write(&mut self, address: u32, value: u32, capture_old: bool) -> Result<(), Error> {
        let addr = self.code(Peripheral::Address)?;
        let data = self.code(Peripheral::Data)?;
        let gpio = self.code(Peripheral::Gpio)?;

        self.route(addr);
        self.sm.shift_dr64(address as u64, WORD_BITS, false);
        self.route(data);
        self.sm.shift_dr64(value as u64, WORD_BITS, capture_old);
        self.route(gpio);
        self.sm.shift_dr64((GPIO_NRESET | self.leds) as u64, GPIO_BITS, false);

        // rotate LEDs each write to indicate progress
        self.leds <<= 1;
        if self.leds == GPIO_NRESET {
            self.leds = 1;
        }
        Ok(())
    }

    /// Queue a write of the gpio lines, leaving the LED rotation alone.
    pub fn gpio(&mut self, bits: u8) -> Result<(), Error> {
        let gpio = self.code(Peripheral::Gpio)?;
        self.route(gpio);
        self.sm.shift_dr64(bits as u64, GPIO_BITS, false);
        Ok(())
    }

    /// Queue one uart exchange, sending `byte` if there is one.  The next `execute` returns
    /// two bytes for it; see `UartReply::from_bytes`.
    pub fn uart(&mut self, byte: Option<u8>) -> Result<(), Error> {
        let uart = self.code(Peripheral::Uart)?;
        let word = match byte {
            Some(byte) => UART_STROBE | byte as u64,
            None => 0,
        };
        self.route(uart);
        self.sm.shift_dr64(word, UART_BITS, true);
        Ok(())
    }

    fn no_pending_reads(&self) -> Result<(), Error> {
        match self.sm.shifter().pending_reads() {
            0 => Ok(()),
            n => Err(Error::PendingReads(n)),
        }
    }

    /// Exchange one uart byte right away.  Queued writes go out with it; queued captures would
    /// be lost, so they fail with `Error::PendingReads` before anything is queued.
    pub fn uart_exchange(&mut self, byte: Option<u8>) -> Result<UartReply, Error> {
        self.no_pending_reads()?;
        self.uart(byte)?;
        let out = self.sm.execute()?;
        Ok(out.last().map_or(UartReply { byte: 0, valid: false }, |r| UartReply::from_bytes(r)))
    }

    /// Poll the uart `count` times in one round trip.  Returns the bytes received and whether
    /// the last poll still found one, i.e. whether more may be waiting.  Same restriction on
    /// queued captures as `uart_exchange`.
    pub fn poll_uart(&mut self, count: usize) -> Result<(Vec<u8>, bool), Error> {
        self.no_pending_reads()?;
        for _ in 0..count {
            self.uart(None)?;
        }
        let replies: Vec<UartReply> = self.sm.execute()?
            .iter()
            .map(|r| UartReply::from_bytes(r))
            .collect();

        let more = replies.last().is_some_and(|r| r.valid);
        let received = replies.iter()
            .filter(|r| r.valid)
            .map(|r| r.byte)
            .collect();
        Ok((received, more))
    }
}
