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
use std::fs;
use std::path::Path;

use itertools::Itertools;
use serde::Serialize;

use crate::chain::SegmentValue;
use crate::error::Error;
use crate::trace::TraceEntry;
use crate::value;
use crate::Cycle;

/// One full design-state snapshot plus the trace history captured since
/// the previous sample.
#[derive(Clone, Debug)]
pub struct Sample {
    pub id: u64,
    pub cycle: Cycle,
    pub state: Vec<SegmentValue>,
    pub traces: HashMap<usize, Vec<TraceEntry>>,
}

/// Fixed-capacity ring of samples with FIFO eviction.
///
/// Slots are owned; overwriting a slot drops the evicted sample
/// explicitly. Sample ids increase monotonically, so `id % capacity`
/// addresses the slot and the live ids are always the most recent ones.
#[derive(Debug)]
pub struct SampleRing {
    slots: Vec<Option<Sample>>,
    next_id: u64,
}

impl SampleRing {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Sample ring capacity must be positive.");
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            next_id: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stores a new sample, evicting the oldest when the ring is full.
    /// Returns the assigned sample id.
    pub fn push(
        &mut self,
        cycle: Cycle,
        state: Vec<SegmentValue>,
        traces: HashMap<usize, Vec<TraceEntry>>,
    ) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        let slot = (id % self.slots.len() as u64) as usize;
        if let Some(evicted) = self.slots[slot].replace(Sample {
            id,
            cycle,
            state,
            traces,
        }) {
            log::trace!(
                "Evicting sample {} (cycle {}) for sample {}",
                evicted.id,
                evicted.cycle,
                id
            );
        }
        id
    }

    pub fn clear(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot = None;
        }
        self.next_id = 0;
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.slots
            .iter()
            .filter_map(Option::as_ref)
            .sorted_by_key(|sample| sample.id)
    }

    pub fn get(&self, id: u64) -> Option<&Sample> {
        let slot = (id % self.slots.len() as u64) as usize;
        self.slots[slot].as_ref().filter(|sample| sample.id == id)
    }

    /// The most recent sample whose cycle does not exceed `fail_cycle`,
    /// i.e. the save point a replay of that failure starts from.
    pub fn select(&self, fail_cycle: Cycle) -> Option<&Sample> {
        self.iter()
            .filter(|sample| sample.cycle <= fail_cycle)
            .max_by_key(|sample| sample.cycle)
    }

    /// Samples captured after `id`, oldest first.
    pub fn samples_after(&self, id: u64) -> Vec<&Sample> {
        self.iter().filter(|sample| sample.id > id).collect()
    }
}

// Dump-file records. Values are rendered as hex strings so the file is
// self-describing without a reader-side big-integer convention.

#[derive(Serialize, Debug)]
pub struct DumpRecord {
    pub status: String,
    pub cycles: Cycle,
    pub fail_cycle: Option<Cycle>,
    pub seed: u64,
    pub sample: Option<SampleRecord>,
    pub replay: Vec<ChannelRecord>,
}

#[derive(Serialize, Debug)]
pub struct SampleRecord {
    pub id: u64,
    pub cycle: Cycle,
    pub state: Vec<StateRecord>,
}

#[derive(Serialize, Debug)]
pub struct StateRecord {
    pub name: String,
    pub index: usize,
    pub value: String,
}

#[derive(Serialize, Debug)]
pub struct ChannelRecord {
    pub channel: usize,
    pub values: Vec<ValueRecord>,
}

#[derive(Serialize, Debug)]
pub struct ValueRecord {
    pub cycle: Cycle,
    pub value: String,
}

impl SampleRecord {
    pub fn from_sample(sample: &Sample) -> Self {
        Self {
            id: sample.id,
            cycle: sample.cycle,
            state: sample
                .state
                .iter()
                .map(|segment| StateRecord {
                    name: segment.name.clone(),
                    index: segment.index,
                    value: value::to_hex(&segment.value),
                })
                .collect(),
        }
    }
}

/// Flattens per-channel trace maps (oldest map first) into dump records,
/// channels in ascending order, values chronological within a channel.
pub fn channel_records(traces: &[&HashMap<usize, Vec<TraceEntry>>]) -> Vec<ChannelRecord> {
    let mut merged: HashMap<usize, Vec<ValueRecord>> = HashMap::new();
    for map in traces {
        for (channel, entries) in map.iter() {
            merged
                .entry(*channel)
                .or_default()
                .extend(entries.iter().map(|entry| ValueRecord {
                    cycle: entry.cycle,
                    value: value::to_hex(&entry.value),
                }));
        }
    }
    merged
        .into_iter()
        .sorted_by_key(|(channel, _)| *channel)
        .map(|(channel, values)| ChannelRecord { channel, values })
        .collect()
}

pub fn write_dump(path: &Path, record: &DumpRecord) -> Result<(), Error> {
    let file = fs::File::create(path)?;
    serde_yaml::to_writer(file, record)
        .map_err(|err| Error::Config(format!("writing dump: {}", err)))?;
    log::info!("Wrote sample dump to {}", path.display());
    Ok(())
}
