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

mod bridge;
mod chain;
mod driver;
mod error;
mod ports;
mod sample;
mod trace;
mod transport;
pub mod value;

// Public types
// type to use for simulated cycles
pub type Cycle = u64;

pub use crate::bridge::{BridgeDriver, PlusArgsBridge};
pub use crate::chain::{ChainSegment, ScanChain, SegmentKind, SegmentValue};
pub use crate::driver::{Driver, DriverConfig, DriverState};
pub use crate::error::Error;
pub use crate::ports::{Direction, PortDirectory, PortEntry};
pub use crate::sample::{Sample, SampleRing};
pub use crate::trace::{TraceEntry, TraceRecorder};
pub use crate::transport::{ChannelTransport, LoopbackTransport};
