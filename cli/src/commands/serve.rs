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

//! The `serve` command: a TCP listener that dispatches each inbound
//! connection onto a fixed-size rayon pool. Writes from different
//! connections still serialize on the branch store's writer lock; the pool
//! only bounds how many connections are handled concurrently.

use std::net::TcpListener;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use hangar_lib::repo::Repository;
use hangar_lib::sync::transport_io::serve_connection;

use crate::command_error::CommandResult;
use crate::context::CommandContext;

#[derive(Args, Clone, Debug)]
pub struct ServeArgs {
    /// Address to listen on, as `host:port`.
    #[arg(long, default_value = "127.0.0.1:9050")]
    address: String,
    /// Number of connections served concurrently.
    #[arg(long, default_value_t = 8)]
    threads: usize,
    #[arg(long, short = 'R')]
    repository: Option<PathBuf>,
}

pub fn cmd_serve(ctx: &CommandContext, args: &ServeArgs) -> CommandResult {
    let repo = Arc::new(ctx.open_repo(args.repository.as_deref())?);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(args.threads)
        .build()
        .map_err(|e| crate::command_error::CommandError::user(format!("failed to start thread pool: {e}")))?;

    let listener = TcpListener::bind(&args.address)?;
    ctx.ui.writeln(&format!("Listening on {} with {} worker threads", args.address, args.threads))?;

    for stream in listener.incoming() {
        let stream = match stream {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "failed to accept connection");
                continue;
            }
        };
        let repo = Arc::clone(&repo);
        pool.spawn(move || {
            let server = repo.sync_server();
            if let Err(e) = serve_connection(stream, &server) {
                tracing::warn!(error = %e, "connection ended with an error");
            }
        });
    }
    Ok(())
}
