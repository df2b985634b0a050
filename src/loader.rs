//! Loading a program image into target memory through the loader node, verifying it and
//! letting the CPU go.
use alloc::vec::Vec;
use core::ops::DerefMut;

use log::debug;

use crate::cable::Cable;
use crate::error::Error;
use crate::session::{Session, GPIO_RUN};

/// Reads queued per round trip while verifying.
pub const READBACK_CHUNK: usize = 32;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endian {
    Big,
    Little,
}

/// Split a raw image into 32-bit words.  A trailing partial word is ignored.
pub fn parse_image(bytes: &[u8], endian: Endian) -> Vec<u32> {
    bytes.chunks_exact(4)
        .map(|w| {
            let w = [w[0], w[1], w[2], w[3]];
            match endian {
                Endian::Big => u32::from_be_bytes(w),
                Endian::Little => u32::from_le_bytes(w),
            }
        })
        .collect()
}

fn word(bytes: &[u8]) -> u32 {
    bytes.iter()
        .take(4)
        .enumerate()
        .fold(0, |word, (i, b)| word | (*b as u32) << (8 * i))
}

fn word_address(base: u32, index: usize) -> u32 {
    base.wrapping_add((index as u32).wrapping_mul(4))
}

impl<T, U> Session<T>
    where T: DerefMut<Target=U>,
          U: Cable + ?Sized
{
    /// Write `words` to consecutive addresses starting at `base`, all in one round trip.
    pub fn load_image(&mut self, base: u32, words: &[u32]) -> Result<(), Error> {
        for (i, value) in words.iter().enumerate() {
            self.write(word_address(base, i), *value, false)?;
        }
        self.sm.execute()?;
        debug!("loaded {} words at 0x{:08x}", words.len(), base);
        Ok(())
    }

    /// Read `words` back from `base` and compare.  Fails on the first word that differs.
    pub fn verify_image(&mut self, base: u32, words: &[u32]) -> Result<(), Error> {
        for (c, chunk) in words.chunks(READBACK_CHUNK).enumerate() {
            let start = c * READBACK_CHUNK;
            for i in 0..chunk.len() {
                self.read(word_address(base, start + i))?;
            }
            let found = self.sm.execute()?;

            for (i, expected) in chunk.iter().enumerate() {
                let found = found.get(i).map_or(0, |w| word(w));
                if found != *expected {
                    return Err(Error::VerifyMismatch {
                        address: word_address(base, start + i),
                        expected: *expected,
                        found,
                    });
                }
            }
        }
        Ok(())
    }

    /// Take the CPU out of reset.
    pub fn start_cpu(&mut self) -> Result<(), Error> {
        self.gpio(GPIO_RUN)?;
        self.sm.execute()?;
        Ok(())
    }
}
