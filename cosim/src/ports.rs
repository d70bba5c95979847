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

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::Error;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Direction {
    Input,
    Output,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Input => write!(f, "input"),
            Self::Output => write!(f, "output"),
        }
    }
}

/// One named channel endpoint of the simulated design.
#[derive(Clone, Debug)]
pub struct PortEntry {
    /// The channel address the transport routes this port's traffic on.
    pub channel: usize,
    /// Declared bit width; values on the channel are bounded by it.
    pub width: usize,
    pub direction: Direction,
}

/// Immutable name -> (channel, width, direction) directory.
///
/// Built once at startup from the port description files and never
/// mutated afterwards; every poke/peek/trace operation resolves its
/// symbolic name here first.
#[derive(Clone, Debug, Default)]
pub struct PortDirectory {
    entries: HashMap<String, PortEntry>,
}

impl PortDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads one direction's ports from a description file: one port per
    /// line, `name channel width`, `#` starts a comment.
    pub fn load(path: &Path, direction: Direction) -> Result<Self, Error> {
        let file = fs::File::open(path)?;
        Self::parse(BufReader::new(file), direction, &path.display().to_string())
    }

    pub fn parse<R: BufRead>(reader: R, direction: Direction, origin: &str) -> Result<Self, Error> {
        let mut directory = Self::new();
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
            if tokens.len() != 3 {
                return Err(malformed());
            }
            let name = tokens[0];
            let channel = tokens[1].parse::<usize>().map_err(|_| malformed())?;
            let width = tokens[2].parse::<usize>().map_err(|_| malformed())?;
            if width == 0 {
                return Err(Error::InvalidWidth {
                    origin: origin.to_string(),
                    name: name.to_string(),
                });
            }
            directory.insert(
                name,
                PortEntry {
                    channel,
                    width,
                    direction,
                },
            )?;
        }
        log::trace!(
            "Loaded {} {} ports from {}",
            directory.len(),
            direction,
            origin
        );
        Ok(directory)
    }

    pub fn insert(&mut self, name: &str, entry: PortEntry) -> Result<(), Error> {
        if self.entries.contains_key(name) {
            return Err(Error::DuplicatePort(name.to_string()));
        }
        self.entries.insert(name.to_string(), entry);
        Ok(())
    }

    /// Merges the input and output directories into the single directory
    /// the driver resolves against. Names must be unique across both.
    pub fn merge(mut self, other: PortDirectory) -> Result<Self, Error> {
        for (name, entry) in other.entries {
            if self.entries.contains_key(&name) {
                return Err(Error::DuplicatePort(name));
            }
            self.entries.insert(name, entry);
        }
        Ok(self)
    }

    pub fn lookup(&self, name: &str) -> Result<&PortEntry, Error> {
        self.entries
            .get(name)
            .ok_or_else(|| Error::UnresolvedPort(name.to_string()))
    }

    /// Resolves a name and checks it points the expected way.
    pub fn lookup_dir(&self, name: &str, direction: Direction) -> Result<&PortEntry, Error> {
        let entry = self.lookup(name)?;
        if entry.direction != direction {
            return Err(Error::DirectionMismatch {
                name: name.to_string(),
                expected: direction,
            });
        }
        Ok(entry)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PortEntry)> {
        self.entries.iter()
    }
}
