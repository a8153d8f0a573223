//! Decoding of the 32-bit device status word.

use modular_bitfield::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Wire layout of the status word, LSB first.
#[bitfield(bytes = 4)]
#[derive(Debug, Clone, Copy, PartialEq)]
struct StatusBits {
    #[skip]
    reserved0: bool,
    upper_limit_exceeded: bool,
    lower_limit_underrun: bool,
    some_peak_mode_active: bool,
    peak_plus_active: bool,
    peak_minus_active: bool,
    mem_running: bool,
    #[skip]
    reserved7: B3,
    overload: bool,
    fracture: bool,
    #[skip]
    reserved12: bool,
    mem_active: bool,
    mem_conti: bool,
    #[skip]
    reserved15: bool,
    limit_option: bool,
    #[skip]
    reserved17: B6,
    measuring: bool,
    #[skip]
    reserved24: B8,
}

/// Named condition flags of the instrument.
///
/// A read-only projection of one status word; build it with
/// [`DeviceStatus::decode`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStatus {
    /// Force >= upper limit
    pub upper_limit_exceeded: bool,
    /// Force <= lower limit
    pub lower_limit_underrun: bool,
    /// Peak, Peak+ or Peak- active
    pub some_peak_mode_active: bool,
    pub peak_plus_active: bool,
    pub peak_minus_active: bool,
    /// Capturing to memory in progress. In continuous mode this drops to
    /// false once the memory is full.
    pub mem_running: bool,
    /// Absolute limit exceeded (|F| > 150% of nominal range)
    pub overload: bool,
    /// Fracture detected (W20/W40 only)
    pub fracture: bool,
    /// Memory function active (single or continuous)
    pub mem_active: bool,
    /// Memory stores at display rate (true) or single values on keypress (false)
    pub mem_conti: bool,
    /// Limit comparison option enabled
    pub limit_option: bool,
    pub measuring: bool,
}

impl DeviceStatus {
    /// Total: every word decodes, reserved bits are ignored.
    pub fn decode(word: u32) -> Self {
        let bits = StatusBits::from_bytes(word.to_le_bytes());
        Self {
            upper_limit_exceeded: bits.upper_limit_exceeded(),
            lower_limit_underrun: bits.lower_limit_underrun(),
            some_peak_mode_active: bits.some_peak_mode_active(),
            peak_plus_active: bits.peak_plus_active(),
            peak_minus_active: bits.peak_minus_active(),
            mem_running: bits.mem_running(),
            overload: bits.overload(),
            fracture: bits.fracture(),
            mem_active: bits.mem_active(),
            mem_conti: bits.mem_conti(),
            limit_option: bits.limit_option(),
            measuring: bits.measuring(),
        }
    }

    /// Re-encode the known flags; reserved bits come back as zero.
    pub fn to_word(&self) -> u32 {
        let bits = StatusBits::new()
            .with_upper_limit_exceeded(self.upper_limit_exceeded)
            .with_lower_limit_underrun(self.lower_limit_underrun)
            .with_some_peak_mode_active(self.some_peak_mode_active)
            .with_peak_plus_active(self.peak_plus_active)
            .with_peak_minus_active(self.peak_minus_active)
            .with_mem_running(self.mem_running)
            .with_overload(self.overload)
            .with_fracture(self.fracture)
            .with_mem_active(self.mem_active)
            .with_mem_conti(self.mem_conti)
            .with_limit_option(self.limit_option)
            .with_measuring(self.measuring);
        u32::from_le_bytes(bits.into_bytes())
    }

    fn flags(&self) -> [(&'static str, bool); 12] {
        [
            ("upper_limit_exceeded", self.upper_limit_exceeded),
            ("lower_limit_underrun", self.lower_limit_underrun),
            ("some_peak_mode_active", self.some_peak_mode_active),
            ("peak_plus_active", self.peak_plus_active),
            ("peak_minus_active", self.peak_minus_active),
            ("mem_running", self.mem_running),
            ("overload", self.overload),
            ("fracture", self.fracture),
            ("mem_active", self.mem_active),
            ("mem_conti", self.mem_conti),
            ("limit_option", self.limit_option),
            ("measuring", self.measuring),
        ]
    }
}

impl From<u32> for DeviceStatus {
    fn from(word: u32) -> Self {
        Self::decode(word)
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in self.flags() {
            writeln!(f, "{:<22} = {}", name, u8::from(value))?;
        }
        Ok(())
    }
}
