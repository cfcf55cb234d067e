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
use hangar_lib::repo::Repository;

use crate::command_error::CommandResult;
use crate::context::CommandContext;

/// Initializes a new repository.
#[derive(Args, Clone, Debug)]
pub struct InitArgs {
    /// Directory to initialize. Defaults to the current directory.
    path: Option<PathBuf>,
}

pub fn cmd_init(ctx: &CommandContext, args: &InitArgs) -> CommandResult {
    let path = args.path.clone().unwrap_or(std::env::current_dir()?);
    Repository::init(&path)?;
    ctx.ui.writeln(&format!("Initialized a Hangar repository in {}", path.display()))?;
    Ok(())
}
