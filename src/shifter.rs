//! Encoder and decoder for the USB-Blaster command stream.
//!
//! JTAG shifts a bit on each rising TCK edge while in Shift-IR/DR, including the edge with TMS
//! high that leaves the shift state.  The byte burst mode of the cable puts each bit on TDI,
//! pulls TCK low, pushes it high and samples TDO, but it has no way to raise TMS, so the final
//! bit of a shift can never be part of a burst.
//!
//! To keep multiple-of-8 registers burstable, every shift starts one bit early: the first
//! clock is spent in Capture-IR/DR moving to the shift state, and carries a padding bit.  The
//! payload is therefore offset by one bit in the stream and one extra sample comes back, which
//! the decoder throws away.
use alloc::collections::VecDeque;
use alloc::vec::Vec;

/// Byte shift mode; the low six bits count the bytes that follow.
pub const BMODE: u8 = 0x80;
/// Ask the cable to sample TDO and send it back.
pub const READ: u8 = 0x40;
pub const LED: u8 = 0x20;
pub const TDI: u8 = 0x10;
/// Byte shift mode requires nCS set.
pub const NCS: u8 = 0x08;
pub const NCE: u8 = 0x04;
pub const TMS: u8 = 0x02;
pub const TCK: u8 = 0x01;

/// Largest byte count a single burst header can announce.
pub const MAX_BURST: usize = 63;

/// Number of bytes the next burst covers when `remaining` bits (padding included) are left.
/// Always leaves at least one bit for the TMS clock.
fn burst_len(remaining: usize) -> usize {
    MAX_BURST.min((remaining - 1) / 8)
}

/// The bit stream actually clocked for one shift: a zero padding bit, then `bits` payload bits
/// LSB first.  Payload bytes missing from the slice read as zero.
struct PaddedBits<'a> {
    payload: &'a [u8],
    pos: usize,
}

impl<'a> PaddedBits<'a> {
    fn new(payload: &'a [u8]) -> Self {
        Self { payload, pos: 0 }
    }

    fn next_bit(&mut self) -> bool {
        let pos = self.pos;
        self.pos += 1;
        if pos == 0 {
            return false;
        }
        let bit = pos - 1;
        match self.payload.get(bit / 8) {
            Some(byte) => (byte >> (bit % 8)) & 1 != 0,
            None => false,
        }
    }

    fn next_byte(&mut self) -> u8 {
        (0..8).fold(0, |byte, b| byte | (self.next_bit() as u8) << b)
    }
}

/// Collects sampled TDO bits for one read, dropping the padding sample.
struct BitPacker {
    out: Vec<u8>,
    padding: bool,
    count: usize,
}

impl BitPacker {
    fn new(bits: usize) -> Self {
        Self {
            out: Vec::with_capacity(bits.div_ceil(8)),
            padding: true,
            count: 0,
        }
    }

    fn push(&mut self, bit: bool) {
        if self.padding {
            self.padding = false;
            return;
        }
        if self.count % 8 == 0 {
            self.out.push(0);
        }
        if bit {
            let last = self.out.len() - 1;
            self.out[last] |= 1 << (self.count % 8);
        }
        self.count += 1;
    }

    fn push_byte(&mut self, byte: u8) {
        for b in 0..8 {
            self.push((byte >> b) & 1 != 0);
        }
    }
}

pub struct Shifter {
    burst: bool,
    // Data to send to the adapter
    buffer: Vec<u8>,
    // Bit length of every captured shift, oldest first
    reads: VecDeque<usize>,
    // Reply bytes the adapter owes us for `buffer`
    reply: usize,
}

impl Shifter {
    /// `burst` selects byte burst mode for long shifts.  Disabling it clocks every bit
    /// individually, which is slower but decodes to the same result.
    pub fn new(burst: bool) -> Self {
        Self {
            burst,
            buffer: Vec::new(),
            reads: VecDeque::new(),
            reply: 0,
        }
    }

    pub fn burst(&self) -> bool {
        self.burst
    }

    /// Commands queued since the last flush.
    pub fn commands(&self) -> &[u8] {
        &self.buffer
    }

    /// Number of reply bytes the queued commands will produce.
    pub fn reply_len(&self) -> usize {
        self.reply
    }

    /// Number of captured shifts waiting to be decoded.
    pub fn pending_reads(&self) -> usize {
        self.reads.len()
    }

    /// Hand out the queued commands, leaving the read bookkeeping in place for `parse`.
    pub fn take_commands(&mut self) -> Vec<u8> {
        core::mem::take(&mut self.buffer)
    }

    /// Forget everything queued, e.g. after the cable failed mid-flush.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.reads.clear();
        self.reply = 0;
    }

    fn clock(&mut self, flags: u8, led: bool) {
        let led = if led { LED } else { 0 };
        self.buffer.push((flags & !READ) | led);
        self.buffer.push(flags | led | TCK);
        if flags & READ != 0 {
            self.reply += 1;
        }
    }

    /// One TCK cycle with the given TMS level and TDI low, used for TAP state changes.
    pub fn clock_tms(&mut self, tms: bool, led: bool) {
        self.clock(if tms { TMS } else { 0 }, led);
    }

    /// Queue a shift of `bits` bits from `payload`, LSB of the first byte first.  Must be
    /// called with the TAP in Capture-IR or Capture-DR; the TAP is in Exit1 afterwards.  If
    /// `capture` is set the bits shifted out are returned by the next `parse`.
    pub fn shift(&mut self, payload: &[u8], bits: usize, capture: bool) {
        let readf = if capture { READ } else { 0 };
        if capture {
            self.reads.push_back(bits);
        }

        self.buffer.push(LED | NCS);

        let total = bits + 1;
        let mut stream = PaddedBits::new(payload);
        let mut done = 0;

        if self.burst {
            while total - done > 8 {
                let count = burst_len(total - done);
                self.buffer.push(BMODE | readf | count as u8);
                for _ in 0..count {
                    let byte = stream.next_byte();
                    self.buffer.push(byte);
                }
                done += count * 8;
                if capture {
                    self.reply += count;
                }
            }
        }

        // Whatever is left goes out bit by bit, the last one with TMS high (Exit1)
        while done < total {
            let tdi = if stream.next_bit() { TDI } else { 0 };
            done += 1;
            let tms = if done == total { TMS } else { 0 };
            self.clock(tdi | tms | readf, true);
        }
    }

    /// Split `reply` into one byte vector per captured shift, in the order the shifts were
    /// queued.  Each vector holds the shifted-out bits LSB first, zero-extended to a whole
    /// byte.  Clears the read queue.
    pub fn parse(&mut self, reply: &[u8]) -> Vec<Vec<u8>> {
        let mut input = reply.iter().copied();
        let mut result = Vec::with_capacity(self.reads.len());

        while let Some(bits) = self.reads.pop_front() {
            let total = bits + 1;
            let mut packer = BitPacker::new(bits);
            let mut done = 0;

            if self.burst {
                while total - done > 8 {
                    let count = burst_len(total - done);
                    for _ in 0..count {
                        packer.push_byte(input.next().unwrap_or(0));
                    }
                    done += count * 8;
                }
            }

            while done < total {
                packer.push(input.next().unwrap_or(0) & 1 != 0);
                done += 1;
            }
            result.push(packer.out);
        }

        self.reply = 0;
        result
    }
}
