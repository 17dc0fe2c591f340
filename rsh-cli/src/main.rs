// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
/// rsh is a small interactive remote shell framework: `rsh serve` runs
/// the command-registry-driven shell over a stream socket, `rsh connect`
/// attaches to it.
use clap::Parser;

fn main() -> anyhow::Result<()> {
    let args = rsh_cli::Args::parse();
    rsh_cli::run(args)
}
