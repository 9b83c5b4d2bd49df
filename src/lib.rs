//! This crate drives the scan chain of a test chip from a handful of GPIO lines, to load its
//! memory banks, run it, and read the banks back.  It is organised in layers.
//!
//! At the bottom is the `GpioBank` trait, which sets or samples one board line identified by a
//! `Signal`.  Implementations exist for embedded-hal pins, for an FT2232H adapter (with the `std`
//! feature), and for a simulated chip that is used by the tests and for dry runs.
//!
//! The next level is the `ScanPort`, which owns the lines and knows the bit level protocol:
//! pulsing the scan clock, shifting fields in and out (tail first), and selecting one of the
//! nine targets on the shared bus.  The fields themselves are fixed width values from the
//! `payload` module.
//!
//! On top of that sits `ScanChain`, the transaction engine.  It writes and reads whole memory
//! banks, clears the chain, and implements the bring-up session: `load_session` with the chip
//! held in reset, `run_program` until program done, and `unload_session` to read the results.
//! The clock generator is programmed through `configure_clock_generator`.
//!
//! # Example
//! ```
//! use scan_chain::bank::{BankKind, ChipLayout};
//! use scan_chain::config::ScanTiming;
//! use scan_chain::engine::{ReadLength, ScanChain};
//! use scan_chain::gpio::sim::{NoDelay, SimulatedChip};
//!
//! let layout = ChipLayout::default();
//! let chip = SimulatedChip::new(&layout);
//! let mut chain = ScanChain::new(chip, NoDelay, layout, ScanTiming::default()).unwrap();
//! chain.write_bank(BankKind::Main, &[0x13, 0x6f]).unwrap();
//! let words = chain.read_bank(BankKind::Main, ReadLength::Words(2)).unwrap();
//! assert_eq!(words, [0x13, 0x6f]);
//! ```

#![no_std]

#[cfg(any(test, feature = "std"))]
extern crate std;

extern crate alloc;

pub mod bank;
pub mod clkgen;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod gpio;
pub mod hexdump;
pub mod payload;
pub mod shift;

pub use error::{Error, GpioError, Result};
