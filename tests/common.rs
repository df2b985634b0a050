#![allow(dead_code)]
//! A simulated FPGA behind a USB-Blaster: the command byte interpreter, one TAP with a 10-bit
//! IR, an SLD hub and the loader/uart cores our sessions talk to.

use std::collections::{HashMap, VecDeque};

use sld_jtag::cable::Cable;
use sld_jtag::config::Config;
use sld_jtag::session::Session;
use sld_jtag::shifter::{BMODE, READ, TCK, TDI, TMS};
use sld_jtag::sld::{IR_WIDTH, USER0, USER1};
use sld_jtag::statemachine::{JtagSM, JtagState};
use sld_jtag::TransportError;

pub const ARRIA_V: u32 = 0x02a0_10dd;
pub const IDCODE: u64 = 0x006;
/// Hardware IR capture pattern.
const IR_CAPTURE: u64 = 0b01;

pub fn hub_word(m: u8, n: u8) -> u32 {
    m as u32 | 0x6e << 8 | (n as u32) << 19 | 1 << 27
}

pub fn node_word(instance: u8, manufacturer: u16, node_type: u8, version: u8) -> u32 {
    instance as u32 | (manufacturer as u32) << 8 | (node_type as u32) << 19 | (version as u32) << 27
}

pub fn debug_node(instance: u8) -> u32 {
    node_word(instance, 0x6e, 8, 0)
}

/// Register transfers as the target saw them, in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Ir(u64),
    Vir(u64),
    Dr { vir: u64, len: u32, value: u64 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Selected {
    Bypass,
    Idcode,
    Vir,
    Descriptor,
    Gpio,
    Address,
    Data,
    Uart,
}

pub struct Target {
    // cable
    tck: bool,
    tms: bool,
    burst_left: u8,
    burst_read: bool,
    replies: VecDeque<u8>,
    pub written: usize,
    /// Force every TDO sample to this level, e.g. for an open chain.
    pub stuck_tdo: Option<bool>,

    // TAP
    pub state: JtagState,
    pub ir: u64,
    ir_reg: u64,
    dr_reg: u64,
    dr_len: u32,
    selected: Selected,

    // SLD hub
    pub idcode: u32,
    m: u8,
    descriptors: Vec<u32>,
    nibble: usize,
    pub vir: u64,
    vir_width: u32,

    // cores
    loader: Option<u8>,
    uart: Option<u8>,
    pub address: u32,
    pub memory: HashMap<u32, u32>,
    pub gpio: u8,
    /// Bytes the CPU has queued for the host.
    pub uart_out: VecDeque<u8>,
    /// Bytes the host delivered to the CPU.
    pub uart_in: Vec<u8>,

    pub events: Vec<Event>,
}

impl Target {
    /// A device with `idcode` and an SLD hub with `m` address bits and the given nodes.
    pub fn new(idcode: u32, m: u8, nodes: &[u32]) -> Self {
        let n = nodes.len() as u8;
        let mut descriptors = vec![hub_word(m, n)];
        descriptors.extend_from_slice(nodes);

        let vir_width = sld_jtag::sld::ceil_log2(n as u32 + 1) + m as u32;
        let find = |instance: u8| {
            nodes.iter()
                .position(|w| *w == debug_node(instance))
                .map(|i| i as u8 + 1)
        };

        Self {
            tck: false,
            tms: false,
            burst_left: 0,
            burst_read: false,
            replies: VecDeque::new(),
            written: 0,
            stuck_tdo: None,
            state: JtagState::Reset,
            ir: IDCODE,
            ir_reg: 0,
            dr_reg: 0,
            dr_len: 1,
            selected: Selected::Bypass,
            idcode,
            m,
            descriptors,
            nibble: 0,
            vir: 0,
            vir_width,
            loader: find(99),
            uart: find(98),
            address: 0,
            memory: HashMap::new(),
            gpio: 0,
            uart_out: VecDeque::new(),
            uart_in: Vec::new(),
            events: Vec::new(),
        }
    }

    /// Arria V with five nodes: the loader (instance 99) at node 3, the uart (98) at node 5.
    pub fn arria() -> Self {
        Self::new(ARRIA_V, 3, &[
            node_word(1, 0x06e, 1, 0),
            node_word(0, 0x110, 4, 2),
            debug_node(99),
            debug_node(7),
            debug_node(98),
        ])
    }

    /// Replace the hub descriptor.
    pub fn with_hub_word(mut self, word: u32) -> Self {
        self.descriptors[0] = word;
        self
    }

    fn mask(len: u32) -> u64 {
        if len >= 64 { u64::MAX } else { (1 << len) - 1 }
    }

    fn tdo(&self) -> bool {
        if let Some(level) = self.stuck_tdo {
            return level;
        }
        match self.state {
            JtagState::ShiftDR => self.dr_reg & 1 != 0,
            JtagState::ShiftIR => self.ir_reg & 1 != 0,
            _ => true,
        }
    }

    fn capture_dr(&mut self) {
        let node = self.vir.checked_shr(self.m as u32).unwrap_or(0);
        let sub = self.vir & Self::mask(self.m as u32);
        self.selected = match self.ir {
            IDCODE => Selected::Idcode,
            USER1 => Selected::Vir,
            USER0 if self.vir == 0 => Selected::Descriptor,
            USER0 if Some(node as u8) == self.loader && sub == 0 => Selected::Gpio,
            USER0 if Some(node as u8) == self.loader && sub == 2 => Selected::Address,
            USER0 if Some(node as u8) == self.loader && sub == 3 => Selected::Data,
            USER0 if Some(node as u8) == self.uart && sub == 0 => Selected::Uart,
            _ => Selected::Bypass,
        };

        let (len, value) = match self.selected {
            Selected::Bypass => (1, 0),
            Selected::Idcode => (32, self.idcode as u64),
            Selected::Vir => (self.vir_width.clamp(1, 64), self.vir),
            Selected::Descriptor => {
                let i = self.nibble;
                self.nibble += 1;
                let word = self.descriptors.get(i / 8).copied().unwrap_or(0);
                (4, (word >> (4 * (i % 8))) as u64 & 0xf)
            }
            Selected::Gpio => (6, self.gpio as u64),
            Selected::Address => (32, self.address as u64),
            Selected::Data => (32, self.memory.get(&self.address).copied().unwrap_or(0) as u64),
            Selected::Uart => match self.uart_out.pop_front() {
                Some(byte) => (9, 0x100 | byte as u64),
                None => (9, 0),
            },
        };
        self.dr_len = len;
        self.dr_reg = value;
    }

    fn update_dr(&mut self) {
        let value = self.dr_reg & Self::mask(self.dr_len);
        match self.selected {
            Selected::Vir => {
                self.vir = value;
                if value == 0 {
                    self.nibble = 0;
                }
                self.events.push(Event::Vir(value));
                return;
            }
            _ if self.ir != USER0 => return,
            Selected::Gpio => self.gpio = value as u8,
            Selected::Address => self.address = value as u32,
            Selected::Data => {
                self.memory.insert(self.address, value as u32);
            }
            Selected::Uart => {
                if value & 0x100 != 0 {
                    self.uart_in.push(value as u8);
                }
            }
            _ => {}
        }
        self.events.push(Event::Dr { vir: self.vir, len: self.dr_len, value });
    }

    /// One rising TCK edge.  Returns TDO as it was before the edge.
    fn edge(&mut self, tms: bool, tdi: bool) -> bool {
        let tdo = self.tdo();
        match self.state {
            JtagState::CaptureDR => self.capture_dr(),
            JtagState::CaptureIR => self.ir_reg = IR_CAPTURE,
            JtagState::ShiftDR => {
                self.dr_reg = (self.dr_reg >> 1) | (tdi as u64) << (self.dr_len - 1);
            }
            JtagState::ShiftIR => {
                self.ir_reg = (self.ir_reg >> 1) | (tdi as u64) << (IR_WIDTH - 1);
            }
            _ => {}
        }

        self.state = self.state.next(tms);
        match self.state {
            JtagState::UpdateDR => self.update_dr(),
            JtagState::UpdateIR => {
                self.ir = self.ir_reg & Self::mask(IR_WIDTH as u32);
                self.events.push(Event::Ir(self.ir));
            }
            JtagState::Reset => self.ir = IDCODE,
            _ => {}
        }
        tdo
    }

    fn command(&mut self, byte: u8) {
        if self.burst_left > 0 {
            let mut sampled = 0;
            for b in 0..8 {
                let tdo = self.edge(self.tms, (byte >> b) & 1 != 0);
                sampled |= (tdo as u8) << b;
            }
            self.tck = true;
            if self.burst_read {
                self.replies.push_back(sampled);
            }
            self.burst_left -= 1;
            return;
        }
        if byte & BMODE != 0 {
            self.burst_left = byte & 0x3f;
            self.burst_read = byte & READ != 0;
            return;
        }

        self.tms = byte & TMS != 0;
        let tck = byte & TCK != 0;
        let tdo = if tck && !self.tck {
            self.edge(self.tms, byte & TDI != 0)
        } else {
            self.tdo()
        };
        self.tck = tck;
        if byte & READ != 0 {
            self.replies.push_back(tdo as u8);
        }
    }
}

impl Cable for Target {
    fn write(&mut self, buf: &[u8]) -> Result<usize, TransportError> {
        for byte in buf {
            self.command(*byte);
        }
        self.written += buf.len();
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

pub fn jtag(target: Target, burst: bool) -> JtagSM<Box<Target>> {
    JtagSM::with_config(Box::new(target), &Config::default().burst(burst))
}

/// A session over `target` that has already found the loader and uart.
pub fn session(target: Target) -> Session<Box<Target>> {
    let config = Config::default();
    let mut session = Session::new(JtagSM::with_config(Box::new(target), &config), &config);
    session.discover(&[config.loader_instance, config.uart_instance]).unwrap();
    session.sm.cable.events.clear();
    session
}
