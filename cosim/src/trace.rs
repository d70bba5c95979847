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

use crate::Cycle;

/// One traced value: what crossed a channel and when.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TraceEntry {
    pub cycle: Cycle,
    pub value: BigUint,
}

/// Per-channel bounded FIFO history of poked and peeked values.
///
/// Only history since the most recent sample matters for replay, so each
/// queue drops from the oldest end once it reaches the configured depth,
/// and taking a sample drains every queue.
#[derive(Debug)]
pub struct TraceRecorder {
    depth: usize,
    queues: HashMap<usize, VecDeque<TraceEntry>>,
}

impl TraceRecorder {
    pub fn new(depth: usize) -> Self {
        assert!(depth > 0, "Trace depth must be positive.");
        Self {
            depth,
            queues: HashMap::new(),
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn record(&mut self, channel: usize, cycle: Cycle, value: BigUint) {
        let queue = self.queues.entry(channel).or_default();
        if queue.len() == self.depth {
            let dropped = queue.pop_front();
            log::trace!(
                "Trace queue {} full, dropping entry from cycle {}",
                channel,
                dropped.map(|entry| entry.cycle).unwrap_or(0)
            );
        }
        queue.push_back(TraceEntry { cycle, value });
    }

    pub fn queue(&self, channel: usize) -> Option<&VecDeque<TraceEntry>> {
        self.queues.get(&channel)
    }

    /// Non-destructive copy of all queues, used for unconditional dumps.
    pub fn snapshot(&self) -> HashMap<usize, Vec<TraceEntry>> {
        self.queues
            .iter()
            .map(|(channel, queue)| (*channel, queue.iter().cloned().collect()))
            .collect()
    }

    /// Atomically returns the contents of all queues and empties them;
    /// afterwards every queue holds exactly the history since this call.
    pub fn take_all(&mut self) -> HashMap<usize, Vec<TraceEntry>> {
        self.queues
            .drain()
            .map(|(channel, queue)| (channel, queue.into_iter().collect()))
            .collect()
    }

    pub fn clear(&mut self) {
        self.queues.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.queues.values().all(VecDeque::is_empty)
    }
}
