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

use std::path::Path;
use std::path::PathBuf;
use std::process::Output;

use tempfile::TempDir;

/// A throwaway `$HANGAR_CONFIG`/cwd pair for one test, so tests never read
/// or write the invoking user's real config file.
pub struct TestEnvironment {
    _temp_dir: TempDir,
    env_root: PathBuf,
    config_path: PathBuf,
}

impl Default for TestEnvironment {
    fn default() -> Self {
        let temp_dir = tempfile::tempdir().unwrap();
        let env_root = temp_dir.path().canonicalize().unwrap();
        let config_path = env_root.join("config.toml");
        Self { _temp_dir: temp_dir, env_root, config_path }
    }
}

impl TestEnvironment {
    pub fn env_root(&self) -> &Path {
        &self.env_root
    }

    /// Runs `hangar args..` with `current_dir` relative to the environment
    /// root, returning the raw process output.
    #[must_use = "either snapshot the output or assert on it"]
    pub fn run_hangar_in<I, S>(&self, current_dir: impl AsRef<Path>, args: I) -> CommandOutput
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let mut cmd = assert_cmd::Command::cargo_bin("hangar").unwrap();
        cmd.current_dir(self.env_root.join(current_dir));
        cmd.env("HANGAR_CONFIG", &self.config_path);
        cmd.args(args);
        CommandOutput::new(cmd.output().unwrap(), &self.env_root)
    }

    pub fn run_hangar<I, S>(&self, args: I) -> CommandOutput
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        self.run_hangar_in(".", args)
    }
}

/// A captured process outcome, with the test environment's own temp
/// directory normalized out of stdout/stderr so assertions don't depend on
/// where the OS happened to put it.
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub status: std::process::ExitStatus,
}

impl CommandOutput {
    fn new(output: Output, env_root: &Path) -> Self {
        let normalize = |bytes: &[u8]| -> String {
            let text = String::from_utf8_lossy(bytes).into_owned();
            text.replace(&env_root.display().to_string(), "$TEST_ENV")
        };
        Self {
            stdout: normalize(&output.stdout),
            stderr: normalize(&output.stderr),
            status: output.status,
        }
    }

    #[track_caller]
    pub fn success(self) -> Self {
        assert!(self.status.success(), "command failed: {}", self.stderr);
        self
    }

    #[track_caller]
    pub fn failure(self) -> Self {
        assert!(!self.status.success(), "command unexpectedly succeeded: {}", self.stdout);
        self
    }
}
