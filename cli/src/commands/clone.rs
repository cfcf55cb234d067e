// Copyright 2024 The Hangar Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::net::TcpStream;
use std::path::PathBuf;

use clap::Args;
use hangar_lib::repo::Repository;
use hangar_lib::sync::transport_io::FramedTransport;

use crate::command_error::CommandResult;
use crate::context::CommandContext;

/// Clones a branch from a remote `hangar serve` instance into a new local
/// repository.
#[derive(Args, Clone, Debug)]
pub struct CloneArgs {
    /// Address of the remote, as `host:port`.
    address: String,
    /// Directory to clone into.
    path: PathBuf,
    /// Branch to clone.
    #[arg(long, default_value = "master")]
    branch: String,
}

pub fn cmd_clone(ctx: &CommandContext, args: &CloneArgs) -> CommandResult {
    let repo = Repository::init(&args.path)?;
    let stream = TcpStream::connect(&args.address)?;
    let transport = FramedTransport::new(stream);
    let head = repo.sync_client(transport).clone_branch(&args.branch)?;
    ctx.ui.writeln(&format!("Cloned branch '{}' at commit {head} into {}", args.branch, args.path.display()))?;
    Ok(())
}
