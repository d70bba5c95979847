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
use std::mem;
use std::path::Path;

use bitvec::prelude::*;
use num::bigint::BigUint;
use rand::Rng;
use rand_core::{RngCore, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;
use serde::Deserialize;

use crate::bridge::BridgeDriver;
use crate::chain::{ScanChain, SegmentValue};
use crate::error::Error;
use crate::ports::{Direction, PortDirectory};
use crate::sample::{self, DumpRecord, SampleRecord, SampleRing};
use crate::trace::TraceRecorder;
use crate::transport::ChannelTransport;
use crate::value;
use crate::Cycle;

/// Driver configuration; deserializable from YAML, `Default` for
/// in-process construction.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Maximum entries retained per trace queue.
    pub trace_depth: usize,
    /// Sample cadence in cycles.
    pub sample_interval: Cycle,
    /// Sample ring capacity.
    pub sample_capacity: usize,
    /// Upper bound on simulated cycles before the run is considered done.
    pub max_cycles: Cycle,
    /// Stop stepping on the first expectation mismatch instead of
    /// continuing to gather trace context.
    pub halt_on_mismatch: bool,
    /// Reset pulse length in cycles.
    pub reset_pulse: Cycle,
    pub reset_port: String,
    /// Channel the per-step cycle count is written to.
    pub step_channel: usize,
    /// Channel the serialized design state is read from.
    pub snapshot_channel: usize,
    /// Word size of snapshot reads, in bits.
    pub snapshot_word_bits: usize,
    // Reserved ports the default channel-based memory access maps onto.
    pub mem_addr_port: String,
    pub mem_wen_port: String,
    pub mem_wdata_port: String,
    pub mem_rdata_port: String,
    /// Seed of the driver-owned stimulus generator.
    pub seed: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            trace_depth: 32,
            sample_interval: 32,
            sample_capacity: 30,
            max_cycles: 1_000_000,
            halt_on_mismatch: false,
            reset_pulse: 5,
            reset_port: "reset".to_string(),
            step_channel: 0,
            snapshot_channel: 1,
            snapshot_word_bits: 32,
            mem_addr_port: "mem_req_addr".to_string(),
            mem_wen_port: "mem_req_wen".to_string(),
            mem_wdata_port: "mem_req_data".to_string(),
            mem_rdata_port: "mem_resp_data".to_string(),
            seed: 0x87654321FEDCBA09u64,
        }
    }
}

impl DriverConfig {
    pub fn from_yaml_file(path: &Path) -> Result<Self, Error> {
        let file = fs::File::open(path)?;
        serde_yaml::from_reader(file).map_err(|err| Error::Config(err.to_string()))
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DriverState {
    Uninitialized,
    Running,
    /// A mismatch was recorded. Stepping may continue to gather trace
    /// context, but the final exit status stays failing.
    Failed,
    Finished,
}

/// The central orchestrator of a co-simulation run.
///
/// Owns the simulated-cycle count, the port and scan-chain directories,
/// the channel-value caches, the trace recorder, the sample ring, the
/// attached bridge peripherals and the pass/fail status. All mutable
/// state lives in this single instance; execution is single-threaded and
/// suspends only inside the transport's send/recv.
pub struct Driver<T: ChannelTransport> {
    transport: T,
    config: DriverConfig,
    ports: PortDirectory,
    chain: Option<ScanChain>,
    state: DriverState,
    cycle: Cycle,
    fail_cycle: Option<Cycle>,
    poke_cache: HashMap<usize, BigUint>,
    peek_cache: HashMap<usize, BigUint>,
    traces: TraceRecorder,
    samples: SampleRing,
    rng: Box<dyn RngCore>,
    bridges: Vec<Box<dyn BridgeDriver<T>>>,
}

impl<T: ChannelTransport> fmt::Debug for Driver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Driver")
            .field("state", &self.state)
            .field("cycle", &self.cycle)
            .field("fail_cycle", &self.fail_cycle)
            .finish_non_exhaustive()
    }
}

impl<T: ChannelTransport> Driver<T> {
    pub fn new(
        transport: T,
        ports: PortDirectory,
        chain: Option<ScanChain>,
        config: DriverConfig,
    ) -> Self {
        assert!(config.sample_interval > 0, "Sample interval must be positive.");
        assert!(
            config.snapshot_word_bits > 0,
            "Snapshot word size must be positive."
        );
        let traces = TraceRecorder::new(config.trace_depth);
        let samples = SampleRing::new(config.sample_capacity);
        let rng = Box::new(Xoshiro256StarStar::seed_from_u64(config.seed));
        Self {
            transport,
            config,
            ports,
            chain,
            state: DriverState::Uninitialized,
            cycle: 0,
            fail_cycle: None,
            poke_cache: HashMap::new(),
            peek_cache: HashMap::new(),
            traces,
            samples,
            rng,
            bridges: Vec::new(),
        }
    }

    /// Builds the driver from the port and scan-chain description files.
    pub fn from_files(
        transport: T,
        input_map: &Path,
        output_map: &Path,
        chain: Option<&Path>,
        config: DriverConfig,
    ) -> Result<Self, Error> {
        let inputs = PortDirectory::load(input_map, Direction::Input)?;
        let outputs = PortDirectory::load(output_map, Direction::Output)?;
        let ports = inputs.merge(outputs)?;
        let chain = match chain {
            Some(path) => Some(ScanChain::load(path)?),
            None => None,
        };
        Ok(Self::new(transport, ports, chain, config))
    }

    /// Replaces the stimulus generator, e.g. to replay a recorded run.
    pub fn with_rng(mut self, rng: Box<dyn RngCore>) -> Self {
        self.rng = rng;
        self
    }

    pub fn attach(&mut self, bridge: Box<dyn BridgeDriver<T>>) {
        self.bridges.push(bridge);
    }

    /// Resets the design and the driver state: bridge `init`s, a reset
    /// pulse on the reset port, then cycle counter, caches, traces and
    /// samples start fresh, with sample 0 capturing the post-reset state.
    pub fn init(&mut self) -> Result<(), Error> {
        self.poke_cache.clear();
        self.peek_cache.clear();
        self.traces.clear();
        self.samples.clear();
        self.cycle = 0;
        self.fail_cycle = None;
        self.state = DriverState::Running;

        let mut bridges = mem::take(&mut self.bridges);
        let result = bridges.iter_mut().try_for_each(|bridge| bridge.init(self));
        self.bridges = bridges;
        result?;

        let reset_port = self.config.reset_port.clone();
        self.poke(&reset_port, 1u8)?;
        self.step(self.config.reset_pulse)?;
        self.poke(&reset_port, 0u8)?;

        // Cycle 0 is the first post-reset cycle; the reset pulse itself is
        // not part of the replayable history.
        self.cycle = 0;
        self.traces.clear();
        self.samples.clear();
        self.capture_sample()?;
        log::info!("Design reset complete");
        Ok(())
    }

    /// Drives `value` onto a named input port: truncates to the port
    /// width, caches it, sends it to the channel and traces it.
    pub fn poke<V: Into<BigUint>>(&mut self, name: &str, value: V) -> Result<(), Error> {
        let value = value.into();
        let entry = self.ports.lookup_dir(name, Direction::Input)?.clone();
        let value = if value::fits(&value, entry.width) {
            value
        } else {
            // Hardware drops the high bits of an over-wide write; mirror
            // that, but leave a diagnostic.
            log::warn!(
                "poke {}: value {:#x} exceeds width {}, truncating",
                name,
                value,
                entry.width
            );
            value::truncate(&value, entry.width)
        };
        log::trace!("poke {} <- {:#x} @ {}", name, value, self.cycle);
        self.transport.send(entry.channel, &value)?;
        self.poke_cache.insert(entry.channel, value.clone());
        self.traces.record(entry.channel, self.cycle, value);
        Ok(())
    }

    /// Observes a named output port: receives from the channel, caches
    /// and traces the value, returns it.
    pub fn peek(&mut self, name: &str) -> Result<BigUint, Error> {
        let entry = self.ports.lookup_dir(name, Direction::Output)?.clone();
        let raw = self.transport.recv(entry.channel)?;
        let value = if value::fits(&raw, entry.width) {
            raw
        } else {
            log::warn!(
                "peek {}: received {:#x} wider than {}, truncating",
                name,
                raw,
                entry.width
            );
            value::truncate(&raw, entry.width)
        };
        log::trace!("peek {} -> {:#x} @ {}", name, value, self.cycle);
        self.peek_cache.insert(entry.channel, value.clone());
        self.traces.record(entry.channel, self.cycle, value.clone());
        Ok(value)
    }

    /// Peeks and compares. A mismatch is a soft failure: the first
    /// failing cycle is retained and the run may continue.
    pub fn expect<V: Into<BigUint>>(&mut self, name: &str, expected: V) -> Result<bool, Error> {
        let entry = self.ports.lookup_dir(name, Direction::Output)?.clone();
        let expected = value::truncate(&expected.into(), entry.width);
        let actual = self.peek(name)?;
        let ok = actual == expected;
        if !ok {
            let first = self.record_failure();
            log::error!(
                "expect {}: got {:#x}, expected {:#x} at cycle {} (first failure at {})",
                name,
                actual,
                expected,
                self.cycle,
                first
            );
        }
        Ok(ok)
    }

    /// Records a named boolean check. A false `ok` is a soft failure
    /// like a port mismatch: the first failing cycle is retained and the
    /// run may continue.
    pub fn expect_that(&mut self, ok: bool, what: &str) -> bool {
        if !ok {
            let first = self.record_failure();
            log::error!(
                "check '{}' failed at cycle {} (first failure at {})",
                what,
                self.cycle,
                first
            );
        }
        ok
    }

    fn record_failure(&mut self) -> Cycle {
        self.state = DriverState::Failed;
        *self.fail_cycle.get_or_insert(self.cycle)
    }

    /// Advances the design by `n` cycles.
    ///
    /// Every attached bridge is ticked exactly once per call regardless
    /// of `n`; a sample is captured when the cycle counter crosses a
    /// multiple of the sample interval.
    pub fn step(&mut self, n: Cycle) -> Result<(), Error> {
        let mut bridges = mem::take(&mut self.bridges);
        let result = bridges.iter_mut().try_for_each(|bridge| bridge.tick(self));
        self.bridges = bridges;
        result?;

        // A zero-cycle call still ticks the peripherals; only the clock
        // advance is skipped.
        if n == 0 {
            return Ok(());
        }
        self.transport
            .send(self.config.step_channel, &BigUint::from(n))?;
        let before = self.cycle;
        self.cycle += n;
        log::trace!("step {} -> cycle {}", n, self.cycle);
        if before / self.config.sample_interval != self.cycle / self.config.sample_interval {
            self.capture_sample()?;
        }
        Ok(())
    }

    /// Captures a full-state sample paired with the trace history since
    /// the previous one, and stores it in the ring.
    fn capture_sample(&mut self) -> Result<(), Error> {
        let state = match self.chain.take() {
            Some(chain) => {
                let state = self.read_snapshot(&chain);
                self.chain = Some(chain);
                state?
            }
            None => Vec::new(),
        };
        let traces = self.traces.take_all();
        let id = self.samples.push(self.cycle, state, traces);
        log::trace!("Captured sample {} at cycle {}", id, self.cycle);
        Ok(())
    }

    /// Scans the serialized design state out of the snapshot channel,
    /// most significant word first, and decodes it through the chain.
    fn read_snapshot(&mut self, chain: &ScanChain) -> Result<Vec<SegmentValue>, Error> {
        let total = chain.total_bits();
        let word_bits = self.config.snapshot_word_bits;
        let words = (total + word_bits - 1) / word_bits;
        let mut image: BitVec<usize, Msb0> = BitVec::with_capacity(words * word_bits);
        for _ in 0..words {
            let word = self.transport.recv(self.config.snapshot_channel)?;
            for bit in (0..word_bits).rev() {
                image.push(word.bit(bit as u64));
            }
        }
        // A partial leading word carries its padding in the high bits.
        let start = image.len() - total;
        chain.decode(&image[start..])
    }

    /// Writes one memory word, through the backend's bulk path when it
    /// has one and the reserved request ports otherwise.
    pub fn write_mem(&mut self, addr: u64, data: &BigUint) -> Result<(), Error> {
        if self.transport.supports_direct_mem() {
            return self.transport.write_mem_direct(addr, data);
        }
        let addr_entry = self
            .ports
            .lookup_dir(&self.config.mem_addr_port, Direction::Input)?
            .clone();
        let wen_entry = self
            .ports
            .lookup_dir(&self.config.mem_wen_port, Direction::Input)?
            .clone();
        let data_entry = self
            .ports
            .lookup_dir(&self.config.mem_wdata_port, Direction::Input)?
            .clone();
        let data = value::truncate(data, data_entry.width);
        self.transport.send(addr_entry.channel, &BigUint::from(addr))?;
        self.transport.send(data_entry.channel, &data)?;
        self.transport.send(wen_entry.channel, &BigUint::from(1u8))?;
        log::trace!("write_mem [{:#x}] <- {:#x}", addr, data);
        Ok(())
    }

    /// Reads one memory word, through the backend's bulk path when it
    /// has one and the reserved request/response ports otherwise.
    pub fn read_mem(&mut self, addr: u64) -> Result<BigUint, Error> {
        if self.transport.supports_direct_mem() {
            return self.transport.read_mem_direct(addr);
        }
        let addr_entry = self
            .ports
            .lookup_dir(&self.config.mem_addr_port, Direction::Input)?
            .clone();
        let wen_entry = self
            .ports
            .lookup_dir(&self.config.mem_wen_port, Direction::Input)?
            .clone();
        let resp_entry = self
            .ports
            .lookup_dir(&self.config.mem_rdata_port, Direction::Output)?
            .clone();
        self.transport.send(addr_entry.channel, &BigUint::from(addr))?;
        self.transport.send(wen_entry.channel, &BigUint::from(0u8))?;
        let data = value::truncate(&self.transport.recv(resp_entry.channel)?, resp_entry.width);
        log::trace!("read_mem [{:#x}] -> {:#x}", addr, data);
        Ok(data)
    }

    /// Populates simulated memory from a hex text image, one word per
    /// line, ascending addresses from 0.
    pub fn load_mem(&mut self, path: &Path) -> Result<(), Error> {
        let file = fs::File::open(path)?;
        let origin = path.display().to_string();
        let mut addr = 0u64;
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let word =
                BigUint::parse_bytes(line.as_bytes(), 16).ok_or_else(|| Error::MalformedEntry {
                    origin: origin.clone(),
                    line: index + 1,
                })?;
            self.write_mem(addr, &word)?;
            addr += 1;
        }
        log::info!("Loaded {} memory words from {}", addr, origin);
        Ok(())
    }

    /// Whether the run should stop: a bridge requested termination, the
    /// cycle bound was reached, or a mismatch occurred while configured
    /// to halt on mismatch.
    pub fn done(&self) -> bool {
        self.bridges.iter().any(|bridge| bridge.terminate())
            || self.cycle >= self.config.max_cycles
            || (self.config.halt_on_mismatch && self.fail_cycle.is_some())
    }

    /// Serializes the failure-covering sample plus all trace history
    /// recorded since it to `path`.
    ///
    /// Without a recorded failure this writes an informational record
    /// instead of erroring, so call sites can dump unconditionally.
    pub fn dump_samples(&self, path: &Path) -> Result<(), Error> {
        let pending = self.traces.snapshot();
        let (selected, replay) = match self.fail_cycle {
            Some(fail_cycle) => match self.samples.select(fail_cycle) {
                Some(selected) => {
                    let mut maps = self
                        .samples
                        .samples_after(selected.id)
                        .into_iter()
                        .map(|sample| &sample.traces)
                        .collect::<Vec<_>>();
                    maps.push(&pending);
                    (
                        Some(SampleRecord::from_sample(selected)),
                        sample::channel_records(&maps),
                    )
                }
                None => (None, sample::channel_records(&[&pending])),
            },
            None => (None, Vec::new()),
        };
        let record = DumpRecord {
            status: if self.fail_cycle.is_some() {
                "fail".to_string()
            } else {
                "pass".to_string()
            },
            cycles: self.cycle,
            fail_cycle: self.fail_cycle,
            seed: self.config.seed,
            sample: selected,
            replay,
        };
        sample::write_dump(path, &record)
    }

    /// Ends the run: bridge `finish`es, then the exit code. A recorded
    /// failure makes the exit code nonzero regardless of later outcomes.
    pub fn finish(&mut self) -> i32 {
        let mut bridges = mem::take(&mut self.bridges);
        for bridge in bridges.iter_mut() {
            bridge.finish(self);
        }
        self.bridges = bridges;
        self.state = DriverState::Finished;

        for bridge in self.bridges.iter().filter(|bridge| bridge.terminate()) {
            let message = bridge.exit_message();
            if !message.is_empty() {
                log::info!("{}", message);
            }
        }
        if self.fail_cycle.is_some() {
            return 1;
        }
        self.bridges
            .iter()
            .find(|bridge| bridge.terminate())
            .map(|bridge| bridge.exit_code())
            .unwrap_or(0)
    }

    /// Last value driven on a named input port, from the channel cache
    /// that seeds replay.
    pub fn last_poked(&self, name: &str) -> Result<Option<&BigUint>, Error> {
        let entry = self.ports.lookup_dir(name, Direction::Input)?;
        Ok(self.poke_cache.get(&entry.channel))
    }

    /// Last value observed on a named output port.
    pub fn last_peeked(&self, name: &str) -> Result<Option<&BigUint>, Error> {
        let entry = self.ports.lookup_dir(name, Direction::Output)?;
        Ok(self.peek_cache.get(&entry.channel))
    }

    /// Deterministic stimulus: uniform draw in `[0, limit)` from the
    /// driver-owned seeded generator.
    pub fn rand_next(&mut self, limit: u64) -> u64 {
        self.rng.gen_range(0..limit)
    }

    pub fn cycles(&self) -> Cycle {
        self.cycle
    }

    pub fn ok(&self) -> bool {
        self.fail_cycle.is_none()
    }

    pub fn fail_cycle(&self) -> Option<Cycle> {
        self.fail_cycle
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn ports(&self) -> &PortDirectory {
        &self.ports
    }

    pub fn samples(&self) -> &SampleRing {
        &self.samples
    }

    pub fn traces(&self) -> &TraceRecorder {
        &self.traces
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}
