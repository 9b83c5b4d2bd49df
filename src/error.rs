use alloc::string::String;

use thiserror::Error;

use crate::bank::BankKind;
use crate::gpio::Signal;

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Failure reported by a `GpioBank` backend while driving or sampling a line.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GpioError {
    #[error("signal {0:?} is not wired on this board")]
    Unwired(Signal),
    #[error("signal {0:?} cannot be driven, it is a chip output")]
    NotAnOutput(Signal),
    #[error("digital pin error: {0:?}")]
    Pin(embedded_hal::digital::ErrorKind),
    #[error("adapter error: {0}")]
    Adapter(String),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Configuration(String),
    #[error("{bank:?} bank holds {capacity} rows, {requested} words do not fit")]
    Capacity {
        bank: BankKind,
        requested: usize,
        capacity: u32,
    },
    #[error("scan out valid was low on cycle {cycle} of {cycles}, the chain is desynchronized")]
    ProtocolFault { cycle: u32, cycles: u32 },
    #[error("a protocol fault occurred, reset the bus before the next transaction")]
    Desynchronized,
    #[error("GPIO failure on {signal:?}")]
    Gpio {
        signal: Signal,
        #[source]
        source: GpioError,
    },
    #[error("malformed hex dump token {token:?} on line {line}")]
    HexDump { line: usize, token: String },
    #[cfg(feature = "std")]
    #[error("I/O error")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Faults that leave the shift registers in an unknown state.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ProtocolFault { .. } | Self::Desynchronized)
    }
}
