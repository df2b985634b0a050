mod common;

use common::{jtag, Target, ARRIA_V};
use proptest::prelude::*;
use rstest::rstest;
use sld_jtag::cable::Cable;
use sld_jtag::config::Config;
use sld_jtag::statemachine::{JtagSM, JtagState};
use sld_jtag::{Error, TransportError};

const BYPASS: u64 = 0x3ff;

fn bit(bytes: &[u8], i: usize) -> bool {
    bytes.get(i / 8).is_some_and(|b| (b >> (i % 8)) & 1 != 0)
}

/// What comes out of a one bit bypass register after shifting `bits` bits of `payload`: the
/// captured zero, then the payload delayed by one clock.
fn through_bypass(payload: &[u8], bits: usize) -> Vec<u8> {
    let mut out = vec![0; bits.div_ceil(8)];
    for i in 1..bits {
        if bit(payload, i - 1) {
            out[i / 8] |= 1 << (i % 8);
        }
    }
    out
}

fn shift_bypass(payload: &[u8], bits: usize, burst: bool) -> Vec<u8> {
    let mut sm = jtag(Target::arria(), burst);
    sm.reset();
    sm.shift_ir64(BYPASS, 10, false);
    sm.shift_dr(payload, bits, true);
    let mut out = sm.execute().unwrap();
    assert_eq!(out.len(), 1);
    out.remove(0)
}

#[rstest]
fn shift_through_bypass(
    #[values(0, 1, 7, 8, 9, 63, 64, 65, 511)] bits: usize,
    #[values(true, false)] burst: bool,
) {
    let payload: Vec<u8> = (0..64u8).map(|i| i.wrapping_mul(0x5b) ^ 0xa3).collect();
    assert_eq!(shift_bypass(&payload, bits, burst), through_bypass(&payload, bits));
}

#[rstest]
fn captures_come_back_in_queue_order(#[values(true, false)] burst: bool) {
    let mut sm = jtag(Target::arria(), burst);
    sm.reset();
    sm.shift_dr64(0, 3, true);
    sm.shift_dr64(0, 8, true);
    sm.shift_dr64(0, 15, true);
    let out = sm.execute().unwrap();
    assert_eq!(out, vec![
        vec![(ARRIA_V & 0x7) as u8],
        vec![(ARRIA_V & 0xff) as u8],
        (ARRIA_V as u16 & 0x7fff).to_le_bytes().to_vec(),
    ]);
}

#[test]
fn idcode_fills_the_low_word_of_a_long_capture() {
    let mut sm = jtag(Target::arria(), true);
    sm.reset();
    sm.shift_dr64(0x1234_5678, 64, true);
    assert_eq!(sm.execute64().unwrap(), 0x1234_5678 << 32 | ARRIA_V as u64);
    assert_eq!(sm.cable.state, JtagState::Idle);
}

#[rstest]
#[case(JtagState::ShiftDR)]
#[case(JtagState::PauseIR)]
#[case(JtagState::Exit2DR)]
#[case(JtagState::UpdateIR)]
#[case(JtagState::Idle)]
fn reset_recovers_from_any_tap_state(#[case] lost_in: JtagState) {
    let mut target = Target::arria();
    target.state = lost_in;
    target.ir = BYPASS;

    let mut sm = jtag(target, true);
    sm.shift_ir64(BYPASS, 10, false);
    sm.reset();
    sm.execute().unwrap();
    assert_eq!(sm.state(), JtagState::Idle);
    assert_eq!(sm.cable.state, JtagState::Idle);
    assert_eq!(sm.cable.ir, common::IDCODE);

    sm.shift_dr64(0, 32, true);
    assert_eq!(sm.execute64().unwrap(), ARRIA_V as u64);
}

#[test]
fn reset_twice_is_reset_once() {
    let mut once = jtag(Target::arria(), true);
    once.reset();
    once.shift_dr64(0, 32, true);

    let mut twice = jtag(Target::arria(), true);
    twice.shift_dr64(0xffff, 16, false);
    twice.reset();
    twice.reset();
    twice.shift_dr64(0, 32, true);

    assert_eq!(once.execute64().unwrap(), twice.execute64().unwrap());
    assert_eq!(twice.cable.state, JtagState::Idle);
}

proptest! {
    #[test]
    fn burst_and_bit_bang_see_the_same_register(
        payload in proptest::collection::vec(any::<u8>(), 0..40),
        bits in 0usize..320,
    ) {
        let burst = shift_bypass(&payload, bits, true);
        let banged = shift_bypass(&payload, bits, false);
        prop_assert_eq!(&burst, &banged);
        prop_assert_eq!(burst, through_bypass(&payload, bits));
    }
}

/// Takes every command and never answers.
struct Mute;

impl Cable for Mute {
    fn write(&mut self, buf: &[u8]) -> Result<usize, TransportError> {
        Ok(buf.len())
    }

    fn read(&mut self, _buf: &mut [u8]) -> Result<usize, TransportError> {
        Ok(0)
    }
}

#[test]
fn silent_cable_stalls_and_drops_the_batch() {
    let config = Config::default().stall_limit(Some(3));
    let mut sm = JtagSM::with_config(Box::new(Mute), &config);
    sm.reset();
    sm.shift_dr64(0, 32, true);
    assert_eq!(sm.execute(), Err(Error::Transport(TransportError::Stalled { attempts: 4 })));
    assert!(sm.shifter().commands().is_empty());
    assert_eq!(sm.shifter().pending_reads(), 0);
    assert_eq!(sm.shifter().reply_len(), 0);

    // nothing captured, so nothing to wait for
    sm.shift_dr64(0, 32, false);
    assert_eq!(sm.execute(), Ok(vec![]));
}
