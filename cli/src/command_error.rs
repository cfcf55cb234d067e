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

//! The error type every command function returns, and its mapping onto a
//! process exit code.

use hangar_lib::error::HangarError;

/// Conventional Unix exit codes this binary can produce. `Cli` is the
/// catch-all for usage errors clap itself detects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Cli,
    User,
    Internal,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        match self {
            ExitCode::Cli => 2,
            ExitCode::User => 1,
            ExitCode::Internal => 255,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("{0}")]
    Cli(#[from] clap::Error),

    #[error(transparent)]
    Hangar(#[from] HangarError),

    #[error("{message}")]
    User { message: String },

    #[error("{message}")]
    Config { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CommandError {
    pub fn user(message: impl Into<String>) -> Self {
        CommandError::User { message: message.into() }
    }

    pub fn config(message: impl Into<String>) -> Self {
        CommandError::Config { message: message.into() }
    }

    pub fn exit_code(&self) -> ExitCode {
        match self {
            CommandError::Cli(_) => ExitCode::Cli,
            CommandError::Hangar(_) | CommandError::User { .. } | CommandError::Config { .. } => ExitCode::User,
            CommandError::Io(_) => ExitCode::Internal,
        }
    }

    /// A multi-line hint shown under the error, when one applies, trimmed to
    /// the one case this binary actually needs advice for.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            CommandError::Hangar(HangarError::WriterLockHeld) => {
                Some("another process is writing to this repository; wait for it to finish, or run\n`hangar branch unlock --force` if you're sure no writer is still running")
            }
            CommandError::Hangar(HangarError::IncompatibleRepo { .. }) => {
                Some("this repository was created by a different hangar version; reinitializing\nis destructive, upgrading the binary to match is usually the right fix")
            }
            _ => None,
        }
    }
}

pub type CommandResult = std::result::Result<(), CommandError>;
