//! Hex dump files as produced by the compiler flow: whitespace separated two digit byte tokens,
//! with `@address` marker lines that are skipped.  Bytes are packed into memory words little
//! endian, so the word `0x03020100` appears as `00 01 02 03`.
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::Write;

use crate::error::{Error, Result};

/// Tokens per line when writing a dump
pub const TOKENS_PER_LINE: usize = 16;

/// Parse dump text into bytes, in file order.
pub fn parse(text: &str) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    for (i, line) in text.lines().enumerate() {
        if line.starts_with('@') {
            continue;
        }
        for token in line.split_whitespace() {
            let byte = if token.len() == 2 && token.bytes().all(|b| b.is_ascii_hexdigit()) {
                u8::from_str_radix(token, 16).ok()
            } else {
                None
            };
            match byte {
                Some(b) => bytes.push(b),
                None => {
                    return Err(Error::HexDump {
                        line: i + 1,
                        token: token.into(),
                    })
                }
            }
        }
    }
    Ok(bytes)
}

/// Pack bytes into words, least significant byte first.  A short final word is zero extended.
pub fn bytes_to_words(bytes: &[u8], bytes_per_word: usize) -> Vec<u32> {
    bytes
        .chunks(bytes_per_word)
        .map(|chunk| {
            chunk
                .iter()
                .enumerate()
                .fold(0u32, |word, (i, b)| word | (*b as u32) << (8 * i))
        })
        .collect()
}

/// Unpack words into bytes, least significant byte first.
pub fn words_to_bytes(words: &[u32], bytes_per_word: usize) -> Vec<u8> {
    words
        .iter()
        .flat_map(|w| (0..bytes_per_word).map(move |i| (*w >> (8 * i)) as u8))
        .collect()
}

/// Format bytes as dump text: every token followed by a space, a line break after every
/// [`TOKENS_PER_LINE`] tokens.
pub fn format(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3 + bytes.len() / TOKENS_PER_LINE);
    for (i, b) in bytes.iter().enumerate() {
        // writing to a String cannot fail
        let _ = write!(out, "{b:02x} ");
        if (i + 1) % TOKENS_PER_LINE == 0 {
            out.push('\n');
        }
    }
    out
}

#[cfg(feature = "std")]
pub fn read_words(path: impl AsRef<std::path::Path>, bytes_per_word: usize) -> Result<Vec<u32>> {
    let text = std::fs::read_to_string(path)?;
    Ok(bytes_to_words(&parse(&text)?, bytes_per_word))
}

#[cfg(feature = "std")]
pub fn write_words(
    path: impl AsRef<std::path::Path>,
    words: &[u32],
    bytes_per_word: usize,
) -> Result<()> {
    std::fs::write(path, format(&words_to_bytes(words, bytes_per_word)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_byte_order() {
        assert_eq!(format(&words_to_bytes(&[0x0302_0100], 4)), "00 01 02 03 ");
        let bytes = parse("00 01 02 03").unwrap();
        assert_eq!(bytes_to_words(&bytes, 4), [0x0302_0100]);
    }

    #[test]
    fn address_markers_are_skipped() {
        let text = "@00000000\n13 00 00 00 6f 00 c0 00\n@00000100\nff ee\n";
        let words = bytes_to_words(&parse(text).unwrap(), 4);
        assert_eq!(words, [0x13, 0x00c0_006f, 0xeeff]);
    }

    #[test]
    fn lines_wrap_at_sixteen_tokens() {
        let bytes: Vec<u8> = (0..20).collect();
        let text = format(&bytes);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].split_whitespace().count(), 16);
        assert_eq!(lines[1], "10 11 12 13 ");
        assert_eq!(parse(&text).unwrap(), bytes);
    }

    #[test]
    fn malformed_tokens_are_reported() {
        let err = parse("00 01\n0g").unwrap_err();
        assert!(matches!(err, Error::HexDump { line: 2, ref token } if token == "0g"));
        assert!(parse("123").is_err());
        // from_str_radix alone would take a sign
        let err = parse("+f 00").unwrap_err();
        assert!(matches!(err, Error::HexDump { line: 1, ref token } if token == "+f"));
    }

    #[cfg(feature = "std")]
    #[test]
    fn dump_files() {
        let path = std::env::temp_dir().join(std::format!("scan-chain-{}.hex", std::process::id()));
        write_words(&path, &[0xdead_beef, 0x13], 4).unwrap();
        assert_eq!(read_words(&path, 4).unwrap(), [0xdead_beef, 0x13]);
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(read_words(&path, 4), Err(Error::Io(_))));
    }

    #[test]
    fn uppercase_digits_parse() {
        assert_eq!(parse("AB cD").unwrap(), [0xab, 0xcd]);
    }
}
