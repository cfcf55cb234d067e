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

pub mod branch;
pub mod checkout;
pub mod clone;
pub mod fetch;
pub mod init;
pub mod log;
pub mod merge;
pub mod push;
pub mod remote;
pub mod serve;
pub mod summary;

use clap::Subcommand;

use crate::command_error::CommandResult;
use crate::context::CommandContext;

#[derive(Subcommand, Clone, Debug)]
pub enum Command {
    Init(init::InitArgs),
    Clone(clone::CloneArgs),
    Checkout(checkout::CheckoutArgs),
    #[command(subcommand)]
    Branch(branch::BranchCommand),
    Merge(merge::MergeArgs),
    Log(log::LogArgs),
    Summary(summary::SummaryArgs),
    #[command(subcommand)]
    Remote(remote::RemoteCommand),
    Fetch(fetch::FetchArgs),
    Push(push::PushArgs),
    Serve(serve::ServeArgs),
}

pub fn run(ctx: &CommandContext, command: &Command) -> CommandResult {
    match command {
        Command::Init(args) => init::cmd_init(ctx, args),
        Command::Clone(args) => clone::cmd_clone(ctx, args),
        Command::Checkout(args) => checkout::cmd_checkout(ctx, args),
        Command::Branch(cmd) => branch::cmd_branch(ctx, cmd),
        Command::Merge(args) => merge::cmd_merge(ctx, args),
        Command::Log(args) => log::cmd_log(ctx, args),
        Command::Summary(args) => summary::cmd_summary(ctx, args),
        Command::Remote(cmd) => remote::cmd_remote(ctx, cmd),
        Command::Fetch(args) => fetch::cmd_fetch(ctx, args),
        Command::Push(args) => push::cmd_push(ctx, args),
        Command::Serve(args) => serve::cmd_serve(ctx, args),
    }
}
