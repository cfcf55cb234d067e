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
use hangar_lib::digest::CommitDigest;

use crate::command_error::CommandResult;
use crate::context::CommandContext;

/// Unpacks a commit's ref list and reports its record counts. Hangar has no
/// working copy of its own to materialize onto disk; this is how a caller
/// inspects what one commit actually contains.
#[derive(Args, Clone, Debug)]
pub struct CheckoutArgs {
    /// Commit digest to unpack, as a 40-character hex string.
    commit: CommitDigest,
    #[arg(long, short = 'R')]
    repository: Option<PathBuf>,
}

pub fn cmd_checkout(ctx: &CommandContext, args: &CheckoutArgs) -> CommandResult {
    let repo = ctx.open_repo(args.repository.as_deref())?;
    let store = repo.checkout(&args.commit)?;
    let query = repo.query_at(&store);

    let datasets = query.datasets()?;
    let mut sample_count = 0usize;
    for dataset in &datasets {
        sample_count += query.samples_in(dataset)?.len();
    }
    let metadata_count = query.metadata_hashes()?.len();
    let schema_count = query.schema_hashes()?.len();

    ctx.ui.writeln(&format!("{}", ctx.ui.bold(&format!("commit {}", args.commit))))?;
    ctx.ui.writeln(&format!("datasets:  {}", datasets.join(", ")))?;
    ctx.ui.writeln(&format!("samples:   {sample_count}"))?;
    ctx.ui.writeln(&format!("metadata:  {metadata_count}"))?;
    ctx.ui.writeln(&format!("schemas:   {schema_count}"))?;
    Ok(())
}
