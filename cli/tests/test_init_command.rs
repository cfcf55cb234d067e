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

#[test]
fn init_creates_repository_layout() {
    let env = TestEnvironment::default();
    let output = env.run_hangar(["init", "repo"]).success();
    assert!(output.stdout.contains("Initialized a Hangar repository"));
    assert!(env.env_root().join("repo").join("README.txt").exists());
    assert!(env.env_root().join("repo").join("branch.lmdb").exists());
}

#[test]
fn init_is_idempotent() {
    let env = TestEnvironment::default();
    env.run_hangar(["init", "repo"]).success();
    env.run_hangar(["init", "repo"]).success();
}

#[test]
fn summary_on_fresh_repository_reports_no_branches() {
    let env = TestEnvironment::default();
    env.run_hangar(["init", "repo"]).success();
    let output = env.run_hangar_in("repo", ["summary"]).success();
    assert!(output.stdout.contains("Branches:"));
    assert!(output.stdout.contains("(none)"));
    assert!(output.stdout.contains("Writer lock:"));
}

#[test]
fn summary_snapshot_on_fresh_repository() {
    let env = TestEnvironment::default();
    env.run_hangar(["init", "repo"]).success();
    let output = env.run_hangar_in("repo", ["summary"]).success();
    insta::assert_snapshot!(output.stdout, @r"
    Branches:
      (none)
    Remotes:
      (none)
    Writer lock: free
    ");
}

#[test]
fn checkout_rejects_a_malformed_digest() {
    let env = TestEnvironment::default();
    env.run_hangar(["init", "repo"]).success();
    let output = env.run_hangar_in("repo", ["checkout", "not-a-digest"]).failure();
    assert!(!output.stderr.is_empty());
}
