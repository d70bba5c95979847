// Copyright 2023 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::fs;
use std::io::{BufRead, BufReader};
use std::path::Path;

use bitvec::prelude::*;
use num::bigint::BigUint;

use crate::error::Error;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SegmentKind {
    Register,
    Memory,
}

/// One contiguous run of the serialized design state: `count` elements of
/// `width` bits each, scanned out in declaration order.
#[derive(Clone, Debug)]
pub struct ChainSegment {
    pub name: String,
    pub width: usize,
    pub count: usize,
    pub kind: SegmentKind,
}

impl ChainSegment {
    pub fn bits(&self) -> usize {
        self.width * self.count
    }
}

/// The value of one scanned element, as recovered from a snapshot image.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct SegmentValue {
    pub name: String,
    pub index: usize,
    pub value: BigUint,
}

/// Ordered layout of the design's scan chain.
///
/// Loaded once from the chain description file; defines both the total
/// serialized-state size and how a captured bit image splits back into
/// named register and memory-array values.
#[derive(Clone, Debug, Default)]
pub struct ScanChain {
    segments: Vec<ChainSegment>,
}

impl ScanChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the chain description: one segment per line,
    /// `kind name width count` with kind `reg` or `mem`.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let file = fs::File::open(path)?;
        Self::parse(BufReader::new(file), &path.display().to_string())
    }

    pub fn parse<R: BufRead>(reader: R, origin: &str) -> Result<Self, Error> {
        let mut chain = Self::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let tokens = line.split_whitespace().collect::<Vec<_>>();
            let malformed = || Error::MalformedEntry {
                origin: origin.to_string(),
                line: index + 1,
            };
            if tokens.len() != 4 {
                return Err(malformed());
            }
            let kind = match tokens[0] {
                "reg" => SegmentKind::Register,
                "mem" => SegmentKind::Memory,
                _ => return Err(malformed()),
            };
            let name = tokens[1].to_string();
            let width = tokens[2].parse::<usize>().map_err(|_| malformed())?;
            let count = tokens[3].parse::<usize>().map_err(|_| malformed())?;
            if width == 0 || count == 0 {
                return Err(Error::InvalidWidth {
                    origin: origin.to_string(),
                    name,
                });
            }
            chain.segments.push(ChainSegment {
                name,
                width,
                count,
                kind,
            });
        }
        log::trace!(
            "Loaded scan chain from {}: {} segments, {} bits",
            origin,
            chain.segments.len(),
            chain.total_bits()
        );
        Ok(chain)
    }

    pub fn segments(&self) -> &[ChainSegment] {
        &self.segments
    }

    /// Total serialized-state size in bits.
    pub fn total_bits(&self) -> usize {
        self.segments.iter().map(|segment| segment.bits()).sum()
    }

    /// Splits a captured snapshot image back into per-element values.
    ///
    /// The image must hold exactly `total_bits()` bits, most significant
    /// first within each element, elements in chain order.
    pub fn decode(&self, image: &BitSlice<usize, Msb0>) -> Result<Vec<SegmentValue>, Error> {
        if image.len() != self.total_bits() {
            return Err(Error::SnapshotLength {
                expected: self.total_bits(),
                actual: image.len(),
            });
        }
        let mut values = Vec::new();
        let mut offset = 0;
        for segment in &self.segments {
            for index in 0..segment.count {
                let mut value = BigUint::from(0u8);
                for bit in image[offset..offset + segment.width].iter().by_vals() {
                    value = (value << 1u8) | BigUint::from(bit as u8);
                }
                values.push(SegmentValue {
                    name: segment.name.clone(),
                    index,
                    value,
                });
                offset += segment.width;
            }
        }
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn parse(text: &str) -> Result<ScanChain, Error> {
        ScanChain::parse(Cursor::new(text), "test")
    }

    #[test]
    fn test_parse_chain() {
        let chain = parse(
            "reg pc 32 1\n\
             reg regfile 64 32  # architectural registers\n\
             mem dmem 8 16\n",
        )
        .unwrap();
        assert_eq!(chain.segments().len(), 3);
        assert_eq!(chain.total_bits(), 32 + 64 * 32 + 8 * 16);
        assert_eq!(chain.segments()[0].kind, SegmentKind::Register);
        assert_eq!(chain.segments()[2].kind, SegmentKind::Memory);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            parse("reg pc 32\n").unwrap_err(),
            Error::MalformedEntry { .. }
        ));
        assert!(matches!(
            parse("sram dmem 8 16\n").unwrap_err(),
            Error::MalformedEntry { .. }
        ));
        assert!(matches!(
            parse("reg pc 0 1\n").unwrap_err(),
            Error::InvalidWidth { .. }
        ));
        assert!(matches!(
            parse("mem dmem 8 0\n").unwrap_err(),
            Error::InvalidWidth { .. }
        ));
    }

    #[test]
    fn test_decode() {
        let chain = parse("reg a 4 1\nreg b 2 2\n").unwrap();
        // a = 0b1010, b[0] = 0b01, b[1] = 0b11
        let image = bitvec![usize, Msb0; 1, 0, 1, 0, 0, 1, 1, 1];
        let values = chain.decode(&image).unwrap();
        assert_eq!(values.len(), 3);
        assert_eq!(values[0].name, "a");
        assert_eq!(values[0].value, BigUint::from(0b1010u8));
        assert_eq!(values[1].index, 0);
        assert_eq!(values[1].value, BigUint::from(0b01u8));
        assert_eq!(values[2].index, 1);
        assert_eq!(values[2].value, BigUint::from(0b11u8));
    }

    #[test]
    fn test_decode_length_mismatch() {
        let chain = parse("reg a 4 1\n").unwrap();
        let image = bitvec![usize, Msb0; 1, 0, 1];
        assert!(matches!(
            chain.decode(&image).unwrap_err(),
            Error::SnapshotLength {
                expected: 4,
                actual: 3
            }
        ));
    }
}
