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

//! Everything a command function needs that isn't specific to that one
//! command: output, config, and how to open the repository the user pointed
//! at (or the current directory, by default).

use std::path::Path;
use std::path::PathBuf;

use hangar_lib::codec::CommitSpec;
use hangar_lib::repo::Repository;

use crate::command_error::CommandError;
use crate::config::HangarConfig;
use crate::ui::Ui;

pub struct CommandContext {
    pub ui: Ui,
    pub config: HangarConfig,
}

impl CommandContext {
    pub fn open_repo(&self, path: Option<&Path>) -> Result<Repository, CommandError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => std::env::current_dir()?,
        };
        Repository::open(&path).map_err(CommandError::from)
    }

    /// Builds a [`CommitSpec`] for a new commit/merge, filling in `user`/
    /// `email` from config and `time` from the wall clock.
    pub fn commit_spec(&self, message: String) -> CommitSpec {
        CommitSpec {
            time: now_unix(),
            message,
            user: self.config.user.name.clone(),
            email: self.config.user.email.clone(),
        }
    }
}

fn now_unix() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0)
}

/// Resolves a `--repository` argument relative to the current directory,
/// for commands that accept an explicit path.
pub fn resolve_repository_arg(arg: Option<PathBuf>) -> Option<PathBuf> {
    arg
}
