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

use std::fmt;
use std::io;

use crate::ports::Direction;

#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    Config(String),
    /// A directory or scan-chain line that does not parse.
    MalformedEntry { origin: String, line: usize },
    /// A port or chain segment declared with a zero width or count.
    InvalidWidth { origin: String, name: String },
    DuplicatePort(String),
    UnresolvedPort(String),
    DirectionMismatch { name: String, expected: Direction },
    /// The snapshot bit image does not match the scan-chain layout.
    SnapshotLength { expected: usize, actual: usize },
    Transport(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "ERROR: {}", err),
            Self::Config(msg) => write!(f, "ERROR: Invalid configuration: {}", msg),
            Self::MalformedEntry { origin, line } => {
                write!(f, "ERROR: Malformed entry at {}:{}", origin, line)
            }
            Self::InvalidWidth { origin, name } => {
                write!(f, "ERROR: Non-positive width for {} in {}", name, origin)
            }
            Self::DuplicatePort(name) => write!(f, "ERROR: Duplicate port {}", name),
            Self::UnresolvedPort(name) => write!(f, "ERROR: Unresolved port {}", name),
            Self::DirectionMismatch { name, expected } => {
                write!(f, "ERROR: Port {} is not an {} port", name, expected)
            }
            Self::SnapshotLength { expected, actual } => {
                write!(
                    f,
                    "ERROR: Snapshot holds {} bits, scan chain expects {}",
                    actual, expected
                )
            }
            Self::Transport(msg) => write!(f, "ERROR: Channel transport: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}
