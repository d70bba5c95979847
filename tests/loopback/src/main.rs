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

use anyhow::ensure;

mod parity;
mod replay;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let exit_code = parity::run_parity(0xdeadbeef)?;
    ensure!(exit_code == 0, "parity run exited with {}", exit_code);

    replay::run_replay()?;

    log::info!("loopback scenarios passed");
    Ok(())
}
