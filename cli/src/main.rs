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

mod command_error;
mod commands;
mod config;
mod context;
mod ui;

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::Layer as _;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

use command_error::CommandError;
use config::HangarConfig;
use context::CommandContext;
use ui::ColorChoice;
use ui::Ui;

const ENV_VAR_LOG: &str = "HANGAR_LOG";

/// Hangar: a version-controlled, content-addressed repository for tensor
/// datasets.
#[derive(Parser, Debug)]
#[command(name = "hangar", version)]
struct Cli {
    /// Controls whether output is colored.
    #[arg(long, global = true, default_value = "auto")]
    color: ColorChoice,

    #[command(subcommand)]
    command: commands::Command,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(LevelFilter::ERROR.into())
        .with_env_var(ENV_VAR_LOG)
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_filter(filter))
        .init();
}

fn run() -> Result<(), CommandError> {
    let cli = Cli::parse();
    let ui = Ui::new(cli.color);
    let config = HangarConfig::load_default()?;
    let ctx = CommandContext { ui, config };
    commands::run(&ctx, &cli.command)
}

fn main() -> ExitCode {
    init_tracing();
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let ui = Ui::new(ColorChoice::Auto);
            let _ = ui.write_error(&err.to_string());
            if let Some(hint) = err.hint() {
                let _ = ui.write_hint(hint);
            }
            ExitCode::from(err.exit_code().as_i32() as u8)
        }
    }
}
