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
use hangar_lib::sync::transport_io::FramedTransport;

use crate::command_error::CommandResult;
use crate::context::CommandContext;

/// Fetches a branch's new commits from a remote, advancing (or creating)
/// the local branch head.
#[derive(Args, Clone, Debug)]
pub struct FetchArgs {
    /// Name of a registered remote.
    #[arg(long, default_value = "origin")]
    remote: String,
    #[arg(long, default_value = "master")]
    branch: String,
    #[arg(long, short = 'R')]
    repository: Option<PathBuf>,
}

pub fn cmd_fetch(ctx: &CommandContext, args: &FetchArgs) -> CommandResult {
    let repo = ctx.open_repo(args.repository.as_deref())?;
    let address = repo.remotes().get(&args.remote)?;
    let stream = TcpStream::connect(&address)?;
    let transport = FramedTransport::new(stream);
    let head = repo.sync_client(transport).fetch_branch(&args.branch)?;
    ctx.ui.writeln(&format!("{} is now at commit {head}", args.branch))?;
    Ok(())
}
