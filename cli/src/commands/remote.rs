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

use std::path::PathBuf;

use clap::Args;
use clap::Subcommand;

use crate::command_error::CommandResult;
use crate::context::CommandContext;

#[derive(Subcommand, Clone, Debug)]
pub enum RemoteCommand {
    /// Registers a remote under a name.
    Add(RemoteAddArgs),
    /// Lists every registered remote.
    List(RemoteListArgs),
}

#[derive(Args, Clone, Debug)]
pub struct RemoteAddArgs {
    name: String,
    /// Address of the remote, as `host:port`.
    address: String,
    #[arg(long, short = 'R')]
    repository: Option<PathBuf>,
}

#[derive(Args, Clone, Debug)]
pub struct RemoteListArgs {
    #[arg(long, short = 'R')]
    repository: Option<PathBuf>,
}

pub fn cmd_remote(ctx: &CommandContext, cmd: &RemoteCommand) -> CommandResult {
    match cmd {
        RemoteCommand::Add(args) => cmd_remote_add(ctx, args),
        RemoteCommand::List(args) => cmd_remote_list(ctx, args),
    }
}

fn cmd_remote_add(ctx: &CommandContext, args: &RemoteAddArgs) -> CommandResult {
    let repo = ctx.open_repo(args.repository.as_deref())?;
    repo.remotes().add(&args.name, &args.address)?;
    ctx.ui.writeln(&format!("Added remote '{}' -> {}", args.name, args.address))?;
    Ok(())
}

fn cmd_remote_list(ctx: &CommandContext, args: &RemoteListArgs) -> CommandResult {
    let repo = ctx.open_repo(args.repository.as_deref())?;
    for (name, address) in repo.remotes().list()? {
        ctx.ui.writeln(&format!("{} {address}", ctx.ui.green(&name)))?;
    }
    Ok(())
}
