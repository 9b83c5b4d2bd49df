//! Static description of the chip: which scan chain targets exist and how large each memory bank
//! is.
use core::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::payload::{ADDR_BITS, DATA_BITS};

/// One of the nine endpoints on the shared scan bus.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct ChainId(u8);

impl ChainId {
    pub const COUNT: u8 = 9;

    pub const MAIN_READ: ChainId = ChainId(0);
    pub const MAIN_WRITE: ChainId = ChainId(1);
    pub const INPUT_READ: ChainId = ChainId(2);
    pub const INPUT_WRITE: ChainId = ChainId(3);
    pub const OUTPUT_READ: ChainId = ChainId(4);
    pub const OUTPUT_WRITE: ChainId = ChainId(5);
    pub const CLOCK_GEN: ChainId = ChainId(6);

    pub fn new(id: u8) -> Result<Self> {
        if id < Self::COUNT {
            Ok(Self(id))
        } else {
            Err(Error::configuration(alloc::format!(
                "chain id {id} is outside 0..{}",
                Self::COUNT
            )))
        }
    }

    pub const fn get(self) -> u8 {
        self.0
    }

    /// Every id on the bus, in ascending order.
    pub fn all() -> impl Iterator<Item = ChainId> {
        (0..Self::COUNT).map(ChainId)
    }
}

impl TryFrom<u8> for ChainId {
    type Error = Error;

    fn try_from(id: u8) -> Result<Self> {
        Self::new(id)
    }
}

impl From<ChainId> for u8 {
    fn from(id: ChainId) -> u8 {
        id.0
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chain {}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BankKind {
    Main,
    Input,
    Output,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryBank {
    pub kind: BankKind,
    /// Number of rows
    pub capacity: u32,
    /// Column mux factor of the macro.  Not used when sequencing transactions.
    pub colmux: u32,
    pub read_target: ChainId,
    pub write_target: ChainId,
}

impl MemoryBank {
    pub fn new(kind: BankKind, capacity: u32, colmux: u32, read_target: ChainId) -> Result<Self> {
        let write_target = ChainId::new(read_target.get() + 1)?;
        let bank = Self {
            kind,
            capacity,
            colmux,
            read_target,
            write_target,
        };
        bank.validate()?;
        Ok(bank)
    }

    pub fn validate(&self) -> Result<()> {
        if self.write_target.get() != self.read_target.get() + 1 {
            return Err(Error::configuration(alloc::format!(
                "{:?} bank: write target {} must follow read target {}",
                self.kind,
                self.write_target,
                self.read_target
            )));
        }
        if self.capacity == 0 || self.capacity > 1 << ADDR_BITS {
            return Err(Error::configuration(alloc::format!(
                "{:?} bank: {} rows cannot be addressed with {ADDR_BITS} address bits",
                self.kind,
                self.capacity
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChipLayout {
    pub word_width_bits: u32,
    pub main: MemoryBank,
    pub input: MemoryBank,
    pub output: MemoryBank,
}

impl ChipLayout {
    pub fn validate(&self) -> Result<()> {
        if self.word_width_bits == 0 || self.word_width_bits % 8 != 0 {
            return Err(Error::configuration(alloc::format!(
                "word width must be a multiple of 8, got {}",
                self.word_width_bits
            )));
        }
        if self.word_width_bits > DATA_BITS {
            return Err(Error::configuration(alloc::format!(
                "word width {} exceeds the {DATA_BITS} bit data field",
                self.word_width_bits
            )));
        }
        for bank in self.banks() {
            bank.validate()?;
        }
        Ok(())
    }

    pub fn bank(&self, kind: BankKind) -> &MemoryBank {
        match kind {
            BankKind::Main => &self.main,
            BankKind::Input => &self.input,
            BankKind::Output => &self.output,
        }
    }

    pub fn banks(&self) -> [&MemoryBank; 3] {
        [&self.main, &self.input, &self.output]
    }

    /// Bytes per memory word
    pub fn bytes_per_word(&self) -> usize {
        (self.word_width_bits / 8) as usize
    }
}

impl Default for ChipLayout {
    fn default() -> Self {
        Self {
            word_width_bits: 32,
            main: MemoryBank {
                kind: BankKind::Main,
                capacity: 4096,
                colmux: 8,
                read_target: ChainId::MAIN_READ,
                write_target: ChainId::MAIN_WRITE,
            },
            input: MemoryBank {
                kind: BankKind::Input,
                capacity: 2048,
                colmux: 8,
                read_target: ChainId::INPUT_READ,
                write_target: ChainId::INPUT_WRITE,
            },
            output: MemoryBank {
                kind: BankKind::Output,
                capacity: 2048,
                colmux: 8,
                read_target: ChainId::OUTPUT_READ,
                write_target: ChainId::OUTPUT_WRITE,
            },
        }
    }
}
