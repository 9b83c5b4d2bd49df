//! Board configuration: chip layout, pin wiring and the timing constants of the bring-up flow.
//!
//! The timing values were tuned on the first board revision.  They are not part of the scan
//! protocol and should be revalidated for every hardware revision.
use core::time::Duration;

use serde::{Deserialize, Serialize};

use crate::bank::ChipLayout;
use crate::error::{Error, Result};
use crate::gpio::{Signal, SIGNAL_COUNT};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanTiming {
    /// Scan clock cycles to hold scan reset high
    pub reset_cycles: u32,
    /// Wait after each scan clock edge, 0 to toggle as fast as the backend allows
    pub half_period_ns: u32,
    /// Wait between two samples of program done
    pub poll_interval_us: u32,
    /// Default limit for `run_program`
    pub program_timeout_ms: u64,
}

impl ScanTiming {
    pub fn validate(&self) -> Result<()> {
        if self.reset_cycles == 0 {
            return Err(Error::configuration("reset needs at least one scan clock cycle"));
        }
        if self.poll_interval_us == 0 {
            return Err(Error::configuration("program done poll interval must be non-zero"));
        }
        Ok(())
    }

    pub fn program_timeout(&self) -> Duration {
        Duration::from_millis(self.program_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_micros(self.poll_interval_us as u64)
    }
}

impl Default for ScanTiming {
    fn default() -> Self {
        Self {
            reset_cycles: 5,
            half_period_ns: 0,
            poll_interval_us: 100,
            program_timeout_ms: 60_000,
        }
    }
}

/// The two 16-bit GPIO blocks of the board.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Port {
    IoPad,
    ClockGen,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinLocation {
    pub port: Port,
    pub bit: u8,
}

impl PinLocation {
    pub const fn new(port: Port, bit: u8) -> Self {
        Self { port, bit }
    }
}

/// Where each signal is wired on the adapter.  Signals without a location are not connected.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "PinoutEntries", into = "PinoutEntries")]
pub struct Pinout {
    pins: [Option<PinLocation>; SIGNAL_COUNT],
}

impl Pinout {
    pub const fn unwired() -> Self {
        Self {
            pins: [None; SIGNAL_COUNT],
        }
    }

    pub fn with(mut self, signal: Signal, location: PinLocation) -> Self {
        self.pins[signal.index()] = Some(location);
        self
    }

    pub fn location(&self, signal: Signal) -> Option<PinLocation> {
        self.pins[signal.index()]
    }

    /// Wired signals and their locations.
    pub fn iter(&self) -> impl Iterator<Item = (Signal, PinLocation)> + '_ {
        Signal::ALL
            .iter()
            .filter_map(|s| self.location(*s).map(|loc| (*s, loc)))
    }

    /// Bit mask of the lines the host drives on `port`.
    pub fn direction_mask(&self, port: Port) -> u16 {
        self.iter()
            .filter(|(s, loc)| loc.port == port && s.is_output())
            .fold(0, |mask, (_, loc)| mask | 1 << loc.bit)
    }

    pub fn validate(&self) -> Result<()> {
        let wired: alloc::vec::Vec<_> = self.iter().collect();
        for (i, (signal, loc)) in wired.iter().enumerate() {
            if loc.bit > 15 {
                return Err(Error::configuration(alloc::format!(
                    "{signal:?} is wired to bit {} of a 16-bit port",
                    loc.bit
                )));
            }
            if let Some((other, _)) = wired[i + 1..].iter().find(|(_, l)| l == loc) {
                return Err(Error::configuration(alloc::format!(
                    "{signal:?} and {other:?} share {:?} bit {}",
                    loc.port,
                    loc.bit
                )));
            }
        }
        Ok(())
    }
}

impl Default for Pinout {
    /// Wiring of the bring-up board: the chip pads on one block, the clock generator on the
    /// other.  The external clock doubles as the scan clock.
    fn default() -> Self {
        use Port::*;
        Self::unwired()
            .with(Signal::ChipReset, PinLocation::new(IoPad, 0))
            .with(Signal::ProgramDone, PinLocation::new(IoPad, 1))
            .with(Signal::HcdScanIn, PinLocation::new(IoPad, 2))
            .with(Signal::HcdScanOut, PinLocation::new(IoPad, 3))
            .with(Signal::TestMode, PinLocation::new(IoPad, 5))
            .with(Signal::ScanInValid, PinLocation::new(IoPad, 6))
            .with(Signal::ScanInPayload, PinLocation::new(IoPad, 7))
            .with(Signal::ScanLoad, PinLocation::new(IoPad, 8))
            .with(Signal::ScanRead, PinLocation::new(IoPad, 9))
            .with(Signal::ScanReset, PinLocation::new(IoPad, 10))
            .with(Signal::ChainSelectEnable, PinLocation::new(IoPad, 12))
            .with(Signal::ScanOutValid, PinLocation::new(IoPad, 13))
            .with(Signal::ScanOutPayload, PinLocation::new(IoPad, 14))
            .with(Signal::ScanClock, PinLocation::new(ClockGen, 0))
            .with(Signal::ClockSelect, PinLocation::new(ClockGen, 1))
            .with(Signal::ClkGenScanIn, PinLocation::new(ClockGen, 2))
            .with(Signal::ClkGenScanClock, PinLocation::new(ClockGen, 3))
            .with(Signal::ClkGenEnableCommon, PinLocation::new(ClockGen, 4))
            .with(Signal::ClkGenGlobalEnableB, PinLocation::new(ClockGen, 5))
            .with(Signal::ClkGenScanOut, PinLocation::new(ClockGen, 8))
    }
}

/// Serialized form of a [`Pinout`]: a list of `{ signal, port, bit }` entries.
#[derive(Serialize, Deserialize)]
struct PinoutEntries {
    pin: alloc::vec::Vec<PinoutEntry>,
}

#[derive(Serialize, Deserialize)]
struct PinoutEntry {
    signal: Signal,
    port: Port,
    bit: u8,
}

impl From<PinoutEntries> for Pinout {
    fn from(entries: PinoutEntries) -> Self {
        entries.pin.into_iter().fold(Pinout::unwired(), |p, e| {
            p.with(e.signal, PinLocation::new(e.port, e.bit))
        })
    }
}

impl From<Pinout> for PinoutEntries {
    fn from(pinout: Pinout) -> Self {
        Self {
            pin: pinout
                .iter()
                .map(|(signal, loc)| PinoutEntry {
                    signal,
                    port: loc.port,
                    bit: loc.bit,
                })
                .collect(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    pub layout: ChipLayout,
    pub timing: ScanTiming,
    pub pinout: Pinout,
}

impl BoardConfig {
    pub fn validate(&self) -> Result<()> {
        self.layout.validate()?;
        self.timing.validate()?;
        self.pinout.validate()
    }

    #[cfg(feature = "std")]
    pub fn from_toml_str(text: &str) -> Result<Self> {
        use alloc::string::ToString;

        let config: BoardConfig =
            toml::from_str(text).map_err(|e| Error::configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    #[cfg(feature = "std")]
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    #[cfg(feature = "std")]
    pub fn to_toml_string(&self) -> Result<alloc::string::String> {
        use alloc::string::ToString;

        toml::to_string(self).map_err(|e| Error::configuration(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        BoardConfig::default().validate().unwrap();
        assert_eq!(ScanTiming::default().program_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn direction_mask_covers_driven_lines_only() {
        let pinout = Pinout::default();
        let iopad = pinout.direction_mask(Port::IoPad);
        assert_ne!(iopad & 1 << 0, 0);
        assert_eq!(iopad & 1 << 1, 0);
        assert_eq!(iopad & 1 << 13, 0);
        assert_eq!(iopad & 1 << 14, 0);
        let clkgen = pinout.direction_mask(Port::ClockGen);
        assert_eq!(clkgen, 0b11_1111);
    }

    #[test]
    fn shared_pins_are_rejected() {
        let pinout = Pinout::default().with(Signal::TestMode, PinLocation::new(Port::IoPad, 0));
        assert!(matches!(pinout.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let timing = ScanTiming {
            poll_interval_us: 0,
            ..Default::default()
        };
        assert!(timing.validate().is_err());
    }

    #[cfg(feature = "std")]
    #[test]
    fn toml_round_trip() {
        let config = BoardConfig::default();
        let text = config.to_toml_string().unwrap();
        assert_eq!(BoardConfig::from_toml_str(&text).unwrap(), config);
    }

    #[cfg(feature = "std")]
    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let config = BoardConfig::from_toml_str("[timing]\nreset_cycles = 8\n").unwrap();
        assert_eq!(config.timing.reset_cycles, 8);
        assert_eq!(config.timing.poll_interval_us, 100);
        assert_eq!(config.layout, ChipLayout::default());
    }
}
