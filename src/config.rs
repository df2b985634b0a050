//! Session-wide knobs.  Everything about the cable itself (which device, link speed) is left
//! to the adapter constructors.

/// Instance id the loader core is built with.
pub const DEFAULT_LOADER_INSTANCE: u8 = 99;
/// Instance id the uart core is built with.
pub const DEFAULT_UART_INSTANCE: u8 = 98;
/// Consecutive empty transfers tolerated before `execute` gives up.
pub const DEFAULT_STALL_LIMIT: u32 = 1000;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Use the cable's byte burst mode for long shifts.
    pub burst: bool,
    /// `None` waits forever for a wedged cable.
    pub stall_limit: Option<u32>,
    pub loader_instance: u8,
    pub uart_instance: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            burst: true,
            stall_limit: Some(DEFAULT_STALL_LIMIT),
            loader_instance: DEFAULT_LOADER_INSTANCE,
            uart_instance: DEFAULT_UART_INSTANCE,
        }
    }
}

impl Config {
    pub fn burst(mut self, burst: bool) -> Self {
        self.burst = burst;
        self
    }

    pub fn stall_limit(mut self, limit: Option<u32>) -> Self {
        self.stall_limit = limit;
        self
    }

    pub fn loader_instance(mut self, id: u8) -> Self {
        self.loader_instance = id;
        self
    }

    pub fn uart_instance(mut self, id: u8) -> Self {
        self.uart_instance = id;
        self
    }
}
