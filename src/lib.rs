//! This crate talks to Altera SLD hub nodes through a USB-Blaster style JTAG cable.  It is
//! organized in layers, each usable on its own.
//!
//! At the bottom is the `Cable` trait, a plain duplex byte stream.  The `usbblaster` adapter
//! drives an FTDI based USB-Blaster through D2XX, and the `gpio` adapter executes the same
//! command bytes on `embedded-hal` pins.
//!
//! The `Shifter` turns shift-register operations into USB-Blaster command bytes.  Long shifts
//! use the byte burst mode of the cable, and every shift carries one padding bit so that the
//! final clock can still leave the shift state.  Replies are decoded in the order the reads
//! were queued.
//!
//! `JtagSM` keeps track of the TAP state, moves it along the shortest TMS path, and batches
//! everything into a single write/read round trip per `execute`.
//!
//! `Session` sits on top: it enumerates the nodes behind the SLD hub, computes the virtual IR
//! width, and offers memory, gpio and uart accessors routed through the virtual IR.
//!
//! # Example
//! ```no_run
//! use sld_jtag::cable::usbblaster::UsbBlaster;
//! use sld_jtag::config::Config;
//! use sld_jtag::session::Session;
//! use sld_jtag::statemachine::JtagSM;
//!
//! let config = Config::default();
//! let cable = UsbBlaster::new().expect("cable");
//! let jtag = JtagSM::with_config(Box::new(cable), &config);
//! let mut session = Session::new(jtag, &config);
//! session.discover(&[config.loader_instance]).expect("discover");
//!
//! session.write(0x100, 0x42, true).expect("write");
//! let old = session.sm.execute64().expect("execute");
//! println!("was 0x{:x}", old as u32);
//! ```

#![no_std]

#[cfg(feature = "std")]
extern crate std;

extern crate alloc;

pub mod cable;
pub mod config;
pub mod error;
pub mod loader;
pub mod session;
pub mod shifter;
pub mod sld;
pub mod statemachine;

pub use config::Config;
pub use error::{Error, ProtocolViolation, TransportError};
