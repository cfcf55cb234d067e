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

/// Prints the commit history reachable from a branch's head, newest first.
#[derive(Args, Clone, Debug)]
pub struct LogArgs {
    #[arg(default_value = "master")]
    branch: String,
    #[arg(long, short = 'R')]
    repository: Option<PathBuf>,
}

pub fn cmd_log(ctx: &CommandContext, args: &LogArgs) -> CommandResult {
    let repo = ctx.open_repo(args.repository.as_deref())?;
    let view = repo.history().list_history_for_branch(&args.branch)?;

    for commit in &view.order {
        let spec = &view.specs[commit];
        let parents = &view.ancestors[commit];
        let marker = if *commit == view.head { ctx.ui.bold("@") } else { " ".to_string() };
        ctx.ui.writeln(&format!("{marker} {}", ctx.ui.yellow(&commit.hex())))?;
        ctx.ui.writeln(&format!("  author: {} <{}>", spec.user, spec.email))?;
        ctx.ui.writeln(&format!("  time:   {}", spec.time))?;
        if !parents.is_empty() {
            let parent_hex: Vec<String> = parents.iter().map(|p| p.hex()).collect();
            ctx.ui.writeln(&format!("  parents: {}", parent_hex.join(", ")))?;
        }
        ctx.ui.writeln(&format!("\n      {}\n", spec.message))?;
    }
    Ok(())
}
