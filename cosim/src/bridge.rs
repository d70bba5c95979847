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

use num::bigint::BigUint;

use crate::driver::Driver;
use crate::error::Error;
use crate::transport::ChannelTransport;

/// Lifecycle contract for a peripheral attached to the simulation.
///
/// The driver holds attached bridges polymorphically and invokes them
/// uniformly: `init` once before the first cycle, `tick` exactly once per
/// `step` call (host-step granularity, independent of the cycle count),
/// `finish` when the run ends. A bridge may end the run by returning true
/// from `terminate`; its exit code and message are then reported.
pub trait BridgeDriver<T: ChannelTransport> {
    fn init(&mut self, sim: &mut Driver<T>) -> Result<(), Error>;
    fn tick(&mut self, sim: &mut Driver<T>) -> Result<(), Error>;
    fn finish(&mut self, sim: &mut Driver<T>);
    fn terminate(&self) -> bool;
    fn exit_code(&self) -> i32;
    fn exit_message(&self) -> String;
}

const DEFAULT_TEST_VALUE: u32 = 0x40;

/// Runtime-argument injection peripheral.
///
/// Parses `+plusargs_test_value=N` from the free-form runtime arguments
/// and writes the value (or the default) to its `out` MMIO port before
/// the first cycle, then raises `initDone`.
pub struct PlusArgsBridge {
    out_port: String,
    init_done_port: String,
    test_value: BigUint,
}

impl PlusArgsBridge {
    pub fn new(args: &[String], out_port: &str, init_done_port: &str) -> Self {
        let prefix = "+plusargs_test_value=";
        let test_value = args
            .iter()
            .find_map(|arg| arg.strip_prefix(prefix))
            .and_then(|digits| digits.parse::<u64>().ok())
            .map(BigUint::from)
            .unwrap_or_else(|| BigUint::from(DEFAULT_TEST_VALUE));
        Self {
            out_port: out_port.to_string(),
            init_done_port: init_done_port.to_string(),
            test_value,
        }
    }

    pub fn test_value(&self) -> &BigUint {
        &self.test_value
    }
}

impl<T: ChannelTransport> BridgeDriver<T> for PlusArgsBridge {
    fn init(&mut self, sim: &mut Driver<T>) -> Result<(), Error> {
        log::info!(
            "plusargs bridge: injecting {} on {}",
            self.test_value,
            self.out_port
        );
        let value = self.test_value.clone();
        sim.poke(&self.out_port, value)?;
        sim.poke(&self.init_done_port, 1u8)?;
        Ok(())
    }

    fn tick(&mut self, _sim: &mut Driver<T>) -> Result<(), Error> {
        Ok(())
    }

    fn finish(&mut self, _sim: &mut Driver<T>) {}

    // Injection-only peripheral: it never asks to end the run.
    fn terminate(&self) -> bool {
        false
    }

    fn exit_code(&self) -> i32 {
        0
    }

    fn exit_message(&self) -> String {
        String::new()
    }
}
