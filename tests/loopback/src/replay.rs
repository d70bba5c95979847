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

//! Failure dump scenario: a mismatch injected at cycle 23 with a
//! sample cadence of 10 must dump the sample captured at cycle 20 plus
//! the trace history recorded since it.

use anyhow::{ensure, Context};
use cosim::{Direction, Driver, DriverConfig, LoopbackTransport, PortDirectory, ScanChain};

const INPUTS: &str = "\
    reset 2 1\n\
    io_in 3 8\n";

const OUTPUTS: &str = "io_out 3 8\n";

const CHAIN: &str = "\
    reg count 8 1\n\
    mem scratch 4 4\n";

pub fn run_replay() -> anyhow::Result<()> {
    let inputs = PortDirectory::parse(INPUTS.as_bytes(), Direction::Input, "replay inputs")?;
    let outputs = PortDirectory::parse(OUTPUTS.as_bytes(), Direction::Output, "replay outputs")?;
    let chain = ScanChain::parse(CHAIN.as_bytes(), "replay chain")?;
    let config = DriverConfig {
        sample_interval: 10,
        snapshot_word_bits: 8,
        ..Default::default()
    };
    let mut driver = Driver::new(
        LoopbackTransport::new(),
        inputs.merge(outputs)?,
        Some(chain),
        config,
    );
    driver.init()?;

    for i in 0u32..25 {
        driver.poke("io_in", i)?;
        driver.step(1)?;
        if driver.cycles() == 23 {
            ensure!(!driver.expect("io_out", 0xffu32)?, "mismatch not injected");
        }
    }
    ensure!(driver.fail_cycle() == Some(23), "wrong failing cycle");

    let path = std::env::temp_dir().join(format!("loopback_replay_{}.yaml", std::process::id()));
    driver.dump_samples(&path)?;

    let text = std::fs::read_to_string(&path)?;
    let dump: serde_yaml::Value = serde_yaml::from_str(&text)?;
    ensure!(dump["status"] == "fail", "dump not marked failing");
    ensure!(
        dump["fail_cycle"].as_u64() == Some(23),
        "dump fail cycle wrong"
    );
    let sample_cycle = dump["sample"]["cycle"]
        .as_u64()
        .context("dump has no covering sample")?;
    ensure!(
        sample_cycle == 20,
        "selected sample at cycle {}, expected 20",
        sample_cycle
    );

    // The replay section holds the io_in traffic recorded after the
    // covering sample, in chronological order.
    let io_in_channel = driver.ports().lookup("io_in")?.channel;
    let replayed = dump["replay"]
        .as_sequence()
        .context("dump has no replay section")?
        .iter()
        .find(|record| record["channel"].as_u64() == Some(io_in_channel as u64))
        .context("io_in channel missing from replay")?;
    let cycles = replayed["values"]
        .as_sequence()
        .context("replay record has no values")?
        .iter()
        .map(|value| value["cycle"].as_u64().unwrap_or(0))
        .collect::<Vec<_>>();
    ensure!(
        cycles.windows(2).all(|pair| pair[0] <= pair[1]),
        "replay values out of order"
    );
    ensure!(
        cycles.iter().all(|cycle| *cycle >= 20),
        "replay contains history already covered by the sample"
    );
    ensure!(driver.finish() == 1, "failing run must exit nonzero");

    std::fs::remove_file(&path).ok();
    log::info!("replay dump verified");
    Ok(())
}
