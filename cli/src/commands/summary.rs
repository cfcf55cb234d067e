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

use crate::command_error::CommandResult;
use crate::context::CommandContext;

/// Prints an overview of a repository: its branches, remotes, and the
/// writer lock's current state.
#[derive(Args, Clone, Debug)]
pub struct SummaryArgs {
    #[arg(long, short = 'R')]
    repository: Option<PathBuf>,
}

pub fn cmd_summary(ctx: &CommandContext, args: &SummaryArgs) -> CommandResult {
    let repo = ctx.open_repo(args.repository.as_deref())?;
    let branches = repo.branches();
    let mut names = branches.get_branch_names()?;
    names.sort();

    ctx.ui.writeln(&ctx.ui.bold("Branches:"))?;
    for name in &names {
        let head = branches.get_branch_head(name)?;
        ctx.ui.writeln(&format!("  {} {head}", ctx.ui.green(name)))?;
    }
    if names.is_empty() {
        ctx.ui.writeln("  (none)")?;
    }

    let remotes = repo.remotes().list()?;
    ctx.ui.writeln(&ctx.ui.bold("Remotes:"))?;
    for (name, address) in &remotes {
        ctx.ui.writeln(&format!("  {} -> {address}", ctx.ui.green(name)))?;
    }
    if remotes.is_empty() {
        ctx.ui.writeln("  (none)")?;
    }

    let locked = branches.writer_lock_is_held()?;
    ctx.ui.writeln(&format!("{} {}", ctx.ui.bold("Writer lock:"), if locked { "held" } else { "free" }))?;
    Ok(())
}
