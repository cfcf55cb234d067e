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

mod common;

use common::TestEnvironment;

const COMMIT_A: &str = "0000000000000000000000000000000000000a";
const COMMIT_B: &str = "0000000000000000000000000000000000000b";

#[test]
fn branch_create_then_list() {
    let env = TestEnvironment::default();
    env.run_hangar(["init", "repo"]).success();

    env.run_hangar_in("repo", ["branch", "create", "master", COMMIT_A]).success();
    let output = env.run_hangar_in("repo", ["branch", "list"]).success();
    assert!(output.stdout.contains("master"));
    assert!(output.stdout.contains(COMMIT_A));
}

#[test]
fn branch_create_twice_fails() {
    let env = TestEnvironment::default();
    env.run_hangar(["init", "repo"]).success();

    env.run_hangar_in("repo", ["branch", "create", "master", COMMIT_A]).success();
    let output = env.run_hangar_in("repo", ["branch", "create", "master", COMMIT_B]).failure();
    assert!(output.stderr.contains("already exists"));
}

#[test]
fn remote_add_then_list() {
    let env = TestEnvironment::default();
    env.run_hangar(["init", "repo"]).success();

    env.run_hangar_in("repo", ["remote", "add", "origin", "127.0.0.1:9050"]).success();
    let output = env.run_hangar_in("repo", ["remote", "list"]).success();
    assert!(output.stdout.contains("origin"));
    assert!(output.stdout.contains("127.0.0.1:9050"));
}

#[test]
fn log_on_empty_branch_name_fails_with_not_found() {
    let env = TestEnvironment::default();
    env.run_hangar(["init", "repo"]).success();

    let output = env.run_hangar_in("repo", ["log", "nonexistent"]).failure();
    assert!(output.stderr.contains("not found"));
}
