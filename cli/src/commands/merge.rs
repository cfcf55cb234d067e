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

/// Merges `dev` into `master`, fast-forwarding, no-opping, or performing a
/// three-way merge as the branch histories require.
#[derive(Args, Clone, Debug)]
pub struct MergeArgs {
    master: String,
    dev: String,
    #[arg(long, short = 'm', default_value = "merge")]
    message: String,
    #[arg(long, short = 'R')]
    repository: Option<PathBuf>,
}

pub fn cmd_merge(ctx: &CommandContext, args: &MergeArgs) -> CommandResult {
    let repo = ctx.open_repo(args.repository.as_deref())?;
    let spec = ctx.commit_spec(args.message.clone());
    let result = repo
        .history()
        .select_merge_algorithm(&args.master, &args.dev, &spec.message, &spec.user, &spec.email, spec.time)?;
    ctx.ui.writeln(&format!("{} now at commit {result}", args.master))?;
    Ok(())
}
