//! Enumeration of the SLD hub that multiplexes Altera's virtual JTAG nodes behind a single TAP.
//!
//! The hub is reached through two user instructions.  USER1 selects the virtual instruction
//! register (VIR), an `n + m` bit register where the upper `n` bits pick a node and the lower
//! `m` bits are handed to that node.  USER0 then shifts the data register of whatever the VIR
//! selected.  With the VIR at zero the hub answers with its own descriptor followed by one
//! descriptor per node, four bits per DR scan.
//!
//! Discovery runs in two phases with fixed capture bookkeeping: first a fixed set of reads
//! (loopback, IDCODE, hub descriptor), then one descriptor per node announced by the hub.
use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use core::ops::DerefMut;

use log::{debug, info, warn};

use crate::cable::Cable;
use crate::error::{Error, ProtocolViolation};
use crate::statemachine::JtagSM;

pub const IR_WIDTH: usize = 10;
/// Selects the virtual instruction register.
pub const USER1: u64 = 0x0e;
/// Selects the data register of the node addressed by the VIR.
pub const USER0: u64 = 0x0c;

/// Shifted through the IDCODE register to make sure it comes straight back out.
pub const SENTINEL: u32 = 0xdead_beef;

pub const SLD_MANUFACTURER: u16 = 0x6e;
pub const HUB_VERSION: u8 = 1;
pub const DEBUG_NODE_TYPE: u8 = 8;
pub const DEBUG_NODE_VERSION: u8 = 0;

const NIBBLES: usize = 8;

/// Widest VIR code a `u64` can carry.
pub const MAX_VIR_WIDTH: u32 = 64;

/// Silicon this crate knows how to talk to.
pub const KNOWN_DEVICES: &[(u32, &str)] = &[
    (0x02a0_10dd, "Arria V"),
    (0x02b1_50dd, "Cyclone V"),
];

pub fn device_name(idcode: u32) -> Option<&'static str> {
    KNOWN_DEVICES.iter()
        .find(|(code, _)| *code == idcode)
        .map(|(_, name)| *name)
}

/// Smallest `n` with `2^n >= x`.
///
/// 1 -> 0, 2 -> 1, 3 -> 2, 4 -> 2, 5 -> 3
pub fn ceil_log2(mut x: u32) -> u32 {
    let mut out = 0;
    while x > 1 {
        out += 1;
        x = (x + 1) / 2;
    }
    out
}

/// Reassemble a descriptor word from eight captured nibbles, least significant first.
fn word_from_nibbles(nibbles: &[Vec<u8>]) -> u32 {
    nibbles.iter()
        .take(NIBBLES)
        .enumerate()
        .fold(0, |word, (i, nibble)| {
            let nibble = nibble.first().copied().unwrap_or(0) & 0xf;
            word | (nibble as u32) << (4 * i)
        })
}

/// Hub and node descriptors share one layout: 8 bits, 11 bits of manufacturer, 8 bits,
/// 5 bits of version.
fn split(word: u32) -> (u8, u16, u8, u8) {
    (
        (word & 0xff) as u8,
        ((word >> 8) & 0x7ff) as u16,
        ((word >> 19) & 0xff) as u8,
        (word >> 27) as u8,
    )
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HubInfo {
    /// `m`: VIR bits handed to the selected node.
    pub address_width: u8,
    pub manufacturer: u16,
    /// `N`: nodes behind the hub, numbered from 1.
    pub node_count: u8,
    pub version: u8,
}

impl HubInfo {
    pub fn from_word(word: u32) -> Self {
        let (address_width, manufacturer, node_count, version) = split(word);
        Self { address_width, manufacturer, node_count, version }
    }

    /// Width of the VIR: enough bits to number every node plus the hub itself, followed by
    /// the node address bits.
    pub fn vir_width(&self) -> u32 {
        ceil_log2(self.node_count as u32 + 1) + self.address_width as u32
    }

    fn check(&self) -> Result<(), ProtocolViolation> {
        if self.manufacturer != SLD_MANUFACTURER || self.version != HUB_VERSION {
            return Err(ProtocolViolation::UnsupportedHub {
                manufacturer: self.manufacturer,
                version: self.version,
            });
        }
        let width = self.vir_width();
        if width > MAX_VIR_WIDTH {
            return Err(ProtocolViolation::VirTooWide { width });
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodeInfo {
    pub instance: u8,
    pub manufacturer: u16,
    pub node_type: u8,
    pub version: u8,
}

impl NodeInfo {
    pub fn from_word(word: u32) -> Self {
        let (instance, manufacturer, node_type, version) = split(word);
        Self { instance, manufacturer, node_type, version }
    }

    /// True for the virtual JTAG debug nodes our cores are built from.
    pub fn is_debug_node(&self) -> bool {
        self.manufacturer == SLD_MANUFACTURER
            && self.node_type == DEBUG_NODE_TYPE
            && self.version == DEBUG_NODE_VERSION
    }
}

/// Everything learned while enumerating the hub.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Discovery {
    pub idcode: u32,
    pub device: &'static str,
    pub hub: HubInfo,
    /// Node descriptors in hub order; node index `i + 1` is `nodes[i]`.
    pub nodes: Vec<NodeInfo>,
    /// Sought instance ids that were found, and the node index they live at.
    pub present: BTreeMap<u8, u8>,
    pub vir_width: u32,
}

impl Discovery {
    /// Node index of debug node `instance`, if it was sought and found.
    pub fn node(&self, instance: u8) -> Option<u8> {
        self.present.get(&instance).copied()
    }
}

/// Route the next USER0 scans to the node register addressed by `code`.
pub fn vir<T, U>(sm: &mut JtagSM<T>, code: u64, width: u32)
    where T: DerefMut<Target=U>,
          U: Cable + ?Sized
{
    sm.shift_ir64(USER1, IR_WIDTH, false);
    sm.shift_dr64(code, width as usize, false);
    sm.shift_ir64(USER0, IR_WIDTH, false);
}

/// Reset the chain, check that a single device loops the sentinel back, and identify it.
pub fn identify<T, U>(sm: &mut JtagSM<T>) -> Result<(u32, &'static str), Error>
    where T: DerefMut<Target=U>,
          U: Cable + ?Sized
{
    sm.reset();
    sm.execute()?;

    sm.shift_dr64(SENTINEL as u64, 64, true);
    let read = sm.execute64()?;

    let echo = (read >> 32) as u32;
    if echo != SENTINEL {
        return Err(ProtocolViolation::Loopback { found: echo }.into());
    }

    let idcode = read as u32;
    let name = device_name(idcode).ok_or(ProtocolViolation::UnknownIdcode(idcode))?;
    info!("{} detected", name);
    Ok((idcode, name))
}

/// Select HUB_INFO and read the hub descriptor.  Leaves USER0 in the IR with the descriptor
/// stream positioned at node 1.
pub fn read_hub<T, U>(sm: &mut JtagSM<T>) -> Result<HubInfo, Error>
    where T: DerefMut<Target=U>,
          U: Cable + ?Sized
{
    // The VIR is not known yet; 64 zero bits clear it whatever its width
    vir(sm, 0, 64);
    for _ in 0..NIBBLES {
        sm.shift_dr64(0, 4, true);
    }
    let hub = HubInfo::from_word(word_from_nibbles(&sm.execute()?));
    debug!("hub: m = {}, N = {}, ver = {}, mfg = 0x{:x}",
           hub.address_width, hub.node_count, hub.version, hub.manufacturer);

    hub.check()?;
    info!("SLD hub located");
    Ok(hub)
}

/// Read the descriptors of all `count` nodes in one round trip.  Must directly follow
/// `read_hub`.
pub fn read_nodes<T, U>(sm: &mut JtagSM<T>, count: u8) -> Result<Vec<NodeInfo>, Error>
    where T: DerefMut<Target=U>,
          U: Cable + ?Sized
{
    if count == 0 {
        return Ok(Vec::new());
    }
    for _ in 0..count as usize * NIBBLES {
        sm.shift_dr64(0, 4, true);
    }
    let nibbles = sm.execute()?;
    let nodes: Vec<NodeInfo> = nibbles.chunks(NIBBLES)
        .map(|chunk| NodeInfo::from_word(word_from_nibbles(chunk)))
        .collect();

    for (i, node) in nodes.iter().enumerate() {
        debug!("node {}: ver = {}, mfg = 0x{:x}, id = {}, inst_id = {}",
               i + 1, node.version, node.manufacturer, node.node_type, node.instance);
    }
    Ok(nodes)
}

/// Enumerate the hub and look for the debug nodes with the `wanted` instance ids.  Missing
/// nodes are not an error here; they are simply absent from `Discovery::present`.
pub fn scan<T, U>(sm: &mut JtagSM<T>, wanted: &[u8]) -> Result<Discovery, Error>
    where T: DerefMut<Target=U>,
          U: Cable + ?Sized
{
    let (idcode, device) = identify(sm)?;
    let hub = read_hub(sm)?;
    let nodes = read_nodes(sm, hub.node_count)?;

    let mut present = BTreeMap::new();
    for (i, node) in nodes.iter().enumerate() {
        if node.is_debug_node() && wanted.contains(&node.instance) {
            present.insert(node.instance, (i + 1) as u8);
        }
    }

    let vir_width = hub.vir_width();
    for id in wanted {
        match present.get(id) {
            Some(node) => info!("SLD node {} at address {} in {}-bit VIR", id, node, vir_width),
            None => warn!("could not find SLD node {}", id),
        }
    }

    Ok(Discovery {
        idcode,
        device,
        hub,
        nodes,
        present,
        vir_width,
    })
}
