//! This provides a higher-level interface than the `Shifter`.  Specifically, it keeps track of
//! the state of the JTAG state machine, and gets to any desired state by the most efficient
//! path.  Register shifts always start and end in Run-Test/Idle.
//!
//! Nothing reaches the cable until `execute` is called; all queued commands then go out in a
//! single write, followed by a single read of the exact reply length.
use alloc::collections::VecDeque;
use alloc::vec;
use alloc::vec::Vec;
use core::ops::DerefMut;

use log::trace;

use crate::cable::{self, Cable};
use crate::config::Config;
use crate::error::{Error, TransportError};
use crate::shifter::Shifter;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Register {
    Data,
    Instruction
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JtagState {
    Reset = 0,
    Idle = 1,
    SelectDR = 2,
    CaptureDR = 3,
    ShiftDR = 4,
    Exit1DR = 5,
    PauseDR = 6,
    Exit2DR = 7,
    UpdateDR = 8,
    SelectIR = 9,
    CaptureIR = 10,
    ShiftIR = 11,
    Exit1IR = 12,
    PauseIR = 13,
    Exit2IR = 14,
    UpdateIR = 15,
}

impl JtagState {
    /// The state reached from `self` on a rising TCK edge with TMS at `tms`.
    pub fn next(self, tms: bool) -> JtagState {
        use JtagState::*;
        match (self, tms) {
            (Reset, false) => Idle,
            (Reset, true) => Reset,
            (Idle, false) => Idle,
            (Idle, true) => SelectDR,
            (SelectDR, false) => CaptureDR,
            (SelectDR, true) => SelectIR,
            (CaptureDR, false) | (ShiftDR, false) | (Exit2DR, false) => ShiftDR,
            (CaptureDR, true) | (ShiftDR, true) => Exit1DR,
            (Exit1DR, false) | (PauseDR, false) => PauseDR,
            (Exit1DR, true) | (Exit2DR, true) => UpdateDR,
            (PauseDR, true) => Exit2DR,
            (UpdateDR, false) | (UpdateIR, false) => Idle,
            (UpdateDR, true) | (UpdateIR, true) => SelectDR,
            (SelectIR, false) => CaptureIR,
            (SelectIR, true) => Reset,
            (CaptureIR, false) | (ShiftIR, false) | (Exit2IR, false) => ShiftIR,
            (CaptureIR, true) | (ShiftIR, true) => Exit1IR,
            (Exit1IR, false) | (PauseIR, false) => PauseIR,
            (Exit1IR, true) | (Exit2IR, true) => UpdateIR,
            (PauseIR, true) => Exit2IR,
        }
    }
}

/// Shortest TMS sequence leading from `from` to `to`.  Every state is reachable from every
/// other, so the search always terminates.
fn get_path(from: JtagState, to: JtagState) -> Vec<bool> {
    let mut seen = [false; 16];
    let mut queue = VecDeque::new();
    seen[from as usize] = true;
    queue.push_back((from, Vec::new()));

    while let Some((state, path)) = queue.pop_front() {
        if state == to {
            return path;
        }
        for tms in [false, true] {
            let next = state.next(tms);
            if !seen[next as usize] {
                seen[next as usize] = true;
                let mut longer = path.clone();
                longer.push(tms);
                queue.push_back((next, longer));
            }
        }
    }
    unreachable!("TAP state graph is strongly connected")
}

pub struct JtagSM<T> {
    pub cable: T,
    state: JtagState,
    shifter: Shifter,
    stall_limit: Option<u32>,
}

impl<T, U> JtagSM<T>
    where T: DerefMut<Target=U>,
          U: Cable + ?Sized
{
    /// Create a JTAG state machine using an existing `Cable` and the default configuration.
    pub fn new(cable: T) -> Self {
        Self::with_config(cable, &Config::default())
    }

    /// Create a JTAG state machine using an existing `Cable`.  The TAP is assumed to be in
    /// Test-Logic-Reset; call `reset` if that is not certain.
    pub fn with_config(cable: T, config: &Config) -> Self {
        Self {
            cable,
            state: JtagState::Reset,
            shifter: Shifter::new(config.burst),
            stall_limit: config.stall_limit,
        }
    }

    pub fn state(&self) -> JtagState {
        self.state
    }

    /// The encoder holding everything queued since the last `execute`.
    pub fn shifter(&self) -> &Shifter {
        &self.shifter
    }

    /// Reset the scan chain by driving TMS high for 5 clocks, then settle in Run-Test/Idle.
    /// Works from any state, whatever this object believes the state to be.
    pub fn reset(&mut self) {
        for _ in 0..5 {
            self.shifter.clock_tms(true, true);
        }
        self.shifter.clock_tms(false, false);
        self.state = JtagState::Idle;
    }

    /// Use TMS to get into `state` by the most efficient path.  The LED goes off on the clock
    /// that enters Run-Test/Idle and is lit otherwise.
    pub fn change_mode(&mut self, state: JtagState) {
        for tms in get_path(self.state, state) {
            self.state = self.state.next(tms);
            self.shifter.clock_tms(tms, self.state != JtagState::Idle);
        }
    }

    /// Shift `bits` bits of `data` through either the instruction or data register and return
    /// to Run-Test/Idle.  With `capture` set, the bits shifted out are returned by the next
    /// `execute`.
    pub fn shift_reg(&mut self, reg: Register, data: &[u8], bits: usize, capture: bool) {
        let (capture_state, exit, update) = match reg {
            Register::Data => (JtagState::CaptureDR, JtagState::Exit1DR, JtagState::UpdateDR),
            Register::Instruction => (JtagState::CaptureIR, JtagState::Exit1IR, JtagState::UpdateIR),
        };
        self.change_mode(capture_state);
        self.shifter.shift(data, bits, capture);
        self.state = exit;
        self.change_mode(update);
        self.change_mode(JtagState::Idle);
    }

    pub fn shift_ir(&mut self, data: &[u8], bits: usize, capture: bool) {
        self.shift_reg(Register::Instruction, data, bits, capture);
    }

    pub fn shift_dr(&mut self, data: &[u8], bits: usize, capture: bool) {
        self.shift_reg(Register::Data, data, bits, capture);
    }

    /// Like `shift_ir`, with the payload taken from `value` little-endian.
    pub fn shift_ir64(&mut self, value: u64, bits: usize, capture: bool) {
        self.shift_ir(&value.to_le_bytes(), bits, capture);
    }

    /// Like `shift_dr`, with the payload taken from `value` little-endian.
    pub fn shift_dr64(&mut self, value: u64, bits: usize, capture: bool) {
        self.shift_dr(&value.to_le_bytes(), bits, capture);
    }

    /// Send everything queued so far and wait for the reply.  Returns the captured bits of
    /// every shift queued with `capture`, in the order they were queued.  The queues are empty
    /// afterwards, also when the cable fails.
    pub fn execute(&mut self) -> Result<Vec<Vec<u8>>, Error> {
        let commands = self.shifter.take_commands();
        let mut reply = vec![0; self.shifter.reply_len()];

        trace!("<= {:02x?}", commands);
        if let Err(err) = self.transfer(&commands, &mut reply) {
            self.shifter.clear();
            return Err(err.into());
        }
        trace!("=> {:02x?}", reply);

        Ok(self.shifter.parse(&reply))
    }

    /// `execute`, with all captured bytes read as one little-endian integer.  Bytes beyond
    /// the eighth are dropped.
    pub fn execute64(&mut self) -> Result<u64, Error> {
        let out = self.execute()?;
        let mut bytes = [0; 8];
        for (slot, byte) in bytes.iter_mut().zip(out.iter().flatten()) {
            *slot = *byte;
        }
        Ok(u64::from_le_bytes(bytes))
    }

    fn transfer(&mut self, commands: &[u8], reply: &mut [u8]) -> Result<(), TransportError> {
        cable::write_all(&mut *self.cable, commands, self.stall_limit)?;
        cable::read_exact(&mut *self.cable, reply, self.stall_limit)
    }
}
