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

//! Output plumbing shared by every command: where stdout/stderr go, and
//! whether to color them. No pager; output is short enough (log, summary,
//! branch/remote listings) that one isn't worth the extra dependency.

use std::io::IsTerminal as _;
use std::io::Write as _;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorChoice {
    Always,
    Never,
    Auto,
}

impl std::str::FromStr for ColorChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "always" => Ok(ColorChoice::Always),
            "never" => Ok(ColorChoice::Never),
            "auto" => Ok(ColorChoice::Auto),
            other => Err(format!("invalid color choice: {other}")),
        }
    }
}

pub struct Ui {
    color: bool,
}

impl Ui {
    pub fn new(choice: ColorChoice) -> Self {
        let color = match choice {
            ColorChoice::Always => true,
            ColorChoice::Never => false,
            ColorChoice::Auto => std::io::stdout().is_terminal(),
        };
        Self { color }
    }

    pub fn color(&self) -> bool {
        self.color
    }

    fn paint(&self, code: &str, text: &str) -> String {
        if self.color {
            format!("\x1b[{code}m{text}\x1b[0m")
        } else {
            text.to_string()
        }
    }

    pub fn stdout(&self) -> std::io::Stdout {
        std::io::stdout()
    }

    pub fn stderr(&self) -> std::io::Stderr {
        std::io::stderr()
    }

    pub fn write(&self, text: &str) -> std::io::Result<()> {
        write!(self.stdout(), "{text}")
    }

    pub fn writeln(&self, text: &str) -> std::io::Result<()> {
        writeln!(self.stdout(), "{text}")
    }

    /// A dim, non-essential aside (e.g. "already up to date").
    pub fn write_hint(&self, text: &str) -> std::io::Result<()> {
        writeln!(self.stderr(), "{}", self.paint("2", text))
    }

    pub fn write_warning(&self, text: &str) -> std::io::Result<()> {
        writeln!(self.stderr(), "{}: {text}", self.paint("33;1", "Warning"))
    }

    pub fn write_error(&self, text: &str) -> std::io::Result<()> {
        writeln!(self.stderr(), "{}: {text}", self.paint("31;1", "Error"))
    }

    pub fn bold(&self, text: &str) -> String {
        self.paint("1", text)
    }

    pub fn green(&self, text: &str) -> String {
        self.paint("32", text)
    }

    pub fn yellow(&self, text: &str) -> String {
        self.paint("33", text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_disables_color_codes() {
        let ui = Ui::new(ColorChoice::Never);
        assert_eq!(ui.bold("x"), "x");
    }

    #[test]
    fn always_wraps_with_escape_codes() {
        let ui = Ui::new(ColorChoice::Always);
        assert_eq!(ui.bold("x"), "\x1b[1mx\x1b[0m");
    }

    #[test]
    fn color_choice_parses() {
        assert_eq!("always".parse::<ColorChoice>().unwrap(), ColorChoice::Always);
        assert_eq!("never".parse::<ColorChoice>().unwrap(), ColorChoice::Never);
        assert!("loud".parse::<ColorChoice>().is_err());
    }
}
