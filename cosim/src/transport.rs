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

use std::collections::{HashMap, VecDeque};

use num::bigint::BigUint;

use crate::error::Error;

/// The two primitives the driver needs from a backend: move one
/// width-bounded value to or from a numbered channel.
///
/// Concrete backends (software-simulator pipe, FPGA DMA queue) may block
/// in either call when their underlying queue is full or empty; that
/// backpressure is opaque to the driver, which never polls.
pub trait ChannelTransport {
    fn send(&mut self, channel: usize, value: &BigUint) -> Result<(), Error>;
    fn recv(&mut self, channel: usize) -> Result<BigUint, Error>;

    /// Whether the backend has a memory path faster than the
    /// channel-based request ports (e.g. FPGA bulk DMA).
    fn supports_direct_mem(&self) -> bool {
        false
    }

    fn write_mem_direct(&mut self, _addr: u64, _data: &BigUint) -> Result<(), Error> {
        Err(Error::Transport("no direct memory access".to_string()))
    }

    fn read_mem_direct(&mut self, _addr: u64) -> Result<BigUint, Error> {
        Err(Error::Transport("no direct memory access".to_string()))
    }
}

/// In-memory backend for tests and offline replay.
///
/// `recv` drains explicitly queued responses first and otherwise echoes
/// the last value sent on the channel (a design whose output channel `c`
/// mirrors input channel `c`), defaulting to zero on untouched channels.
#[derive(Debug, Default)]
pub struct LoopbackTransport {
    queued: HashMap<usize, VecDeque<BigUint>>,
    last: HashMap<usize, BigUint>,
    sent: HashMap<usize, Vec<BigUint>>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a value to be returned by a later `recv` on `channel`.
    pub fn push_response(&mut self, channel: usize, value: BigUint) {
        self.queued.entry(channel).or_default().push_back(value);
    }

    /// Everything sent on `channel`, in order.
    pub fn sent(&self, channel: usize) -> &[BigUint] {
        self.sent.get(&channel).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl ChannelTransport for LoopbackTransport {
    fn send(&mut self, channel: usize, value: &BigUint) -> Result<(), Error> {
        log::trace!("send channel {} <- {:#x}", channel, value);
        self.last.insert(channel, value.clone());
        self.sent.entry(channel).or_default().push(value.clone());
        Ok(())
    }

    fn recv(&mut self, channel: usize) -> Result<BigUint, Error> {
        let value = self
            .queued
            .get_mut(&channel)
            .and_then(|queue| queue.pop_front())
            .or_else(|| self.last.get(&channel).cloned())
            .unwrap_or_else(|| BigUint::from(0u8));
        log::trace!("recv channel {} -> {:#x}", channel, value);
        Ok(value)
    }
}
