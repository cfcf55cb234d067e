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
use hangar_lib::digest::CommitDigest;

use crate::command_error::CommandResult;
use crate::context::CommandContext;

#[derive(Subcommand, Clone, Debug)]
pub enum BranchCommand {
    /// Creates a new branch pointing at an existing commit.
    Create(BranchCreateArgs),
    /// Lists every branch and the commit its head points at.
    List(BranchListArgs),
}

#[derive(Args, Clone, Debug)]
pub struct BranchCreateArgs {
    name: String,
    /// Commit the new branch should start at.
    commit: CommitDigest,
    #[arg(long, short = 'R')]
    repository: Option<PathBuf>,
}

#[derive(Args, Clone, Debug)]
pub struct BranchListArgs {
    #[arg(long, short = 'R')]
    repository: Option<PathBuf>,
}

pub fn cmd_branch(ctx: &CommandContext, cmd: &BranchCommand) -> CommandResult {
    match cmd {
        BranchCommand::Create(args) => cmd_branch_create(ctx, args),
        BranchCommand::List(args) => cmd_branch_list(ctx, args),
    }
}

fn cmd_branch_create(ctx: &CommandContext, args: &BranchCreateArgs) -> CommandResult {
    let repo = ctx.open_repo(args.repository.as_deref())?;
    repo.branches().create_branch(&args.name, args.commit)?;
    ctx.ui.writeln(&format!("Created branch '{}' at commit {}", args.name, args.commit))?;
    Ok(())
}

fn cmd_branch_list(ctx: &CommandContext, args: &BranchListArgs) -> CommandResult {
    let repo = ctx.open_repo(args.repository.as_deref())?;
    let branches = repo.branches();
    let mut names = branches.get_branch_names()?;
    names.sort();
    for name in names {
        let head = branches.get_branch_head(&name)?;
        ctx.ui.writeln(&format!("{} {head}", ctx.ui.green(&name)))?;
    }
    Ok(())
}
