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

use std::net::TcpListener;
use std::net::TcpStream;
use std::process::Command;
use std::time::Duration;
use std::time::Instant;

use common::TestEnvironment;
use hangar_lib::backend::Tensor;
use hangar_lib::codec::CommitParents;
use hangar_lib::codec::CommitSpec;
use hangar_lib::digest::CommitDigest;
use hangar_lib::repo::Repository;
use hangar_lib::schema::DatasetSchema;

/// Picks a free TCP port by briefly binding to port 0 and reading back
/// what the OS assigned, then releasing it for the real server to use.
fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port()
}

fn wait_until_listening(address: &str) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if TcpStream::connect(address).is_ok() {
            return;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    panic!("server never started listening on {address}");
}

fn seed_one_commit(repo_dir: &std::path::Path) -> CommitDigest {
    let repo = Repository::init(repo_dir).unwrap();
    let staging = repo.staging().unwrap();
    staging.declare_schema("ds1", &DatasetSchema::new(5, false, vec![4], true, "00")).unwrap();
    let tensor = Tensor { dtype: 5, shape: vec![4], bytes: vec![1, 2, 3, 4] };
    staging.put_sample("ds1", Some("s0"), &tensor).unwrap();
    let spec = CommitSpec { time: 1, message: "m0".into(), user: "alice".into(), email: "a@x".into() };
    repo.commit_engine()
        .commit(&staging, repo.backends(), "master", CommitParents::Root, spec)
        .unwrap()
        .unwrap()
}

#[test]
fn clone_over_a_real_tcp_connection() {
    let env = TestEnvironment::default();
    let server_dir = env.env_root().join("server");
    let head = seed_one_commit(&server_dir);

    let port = free_port();
    let address = format!("127.0.0.1:{port}");
    let mut server = Command::new(assert_cmd::cargo::cargo_bin!("hangar"))
        .args(["serve", "--repository"])
        .arg(&server_dir)
        .args(["--address", &address])
        .spawn()
        .unwrap();
    wait_until_listening(&address);

    let client_dir = env.env_root().join("client");
    let output = env.run_hangar(["clone", &address, client_dir.to_str().unwrap()]).success();
    assert!(output.stdout.contains(&head.hex()));

    let client = Repository::open(&client_dir).unwrap();
    assert_eq!(client.branches().get_branch_head("master").unwrap(), head);

    let _ = server.kill();
    let _ = server.wait();
}
