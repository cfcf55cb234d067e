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
use std::process::Command;

const GIT_HEAD_PATH: &str = "../.git/HEAD";

fn main() {
    let version = std::env::var("CARGO_PKG_VERSION").unwrap();

    if Path::new(GIT_HEAD_PATH).exists() {
        println!("cargo:rerun-if-changed={GIT_HEAD_PATH}");
    }
    match get_git_hash() {
        Some(git_hash) => println!("cargo:rustc-env=HANGAR_VERSION={version}-{git_hash}"),
        None => println!("cargo:rustc-env=HANGAR_VERSION={version}"),
    }
}

fn get_git_hash() -> Option<String> {
    Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|output| {
            str::from_utf8(&output.stdout)
                .unwrap()
                .trim_end()
                .to_owned()
        })
}
