//! dialoguer-backed prompter

use super::{NoticeLevel, Preview, Prompter, Validator};
use crate::style;
use crate::{BugBridgeError, Result};
use dialoguer::{theme::ColorfulTheme, Confirm, Input, Password, Select};
use std::io::{self, BufRead, Write};

/// Interactive prompter on stdin/stdout
pub struct TerminalPrompter {
    /// Theme for dialoguer
    theme: ColorfulTheme,
}

impl TerminalPrompter {
    pub fn new() -> Self {
        Self {
            theme: ColorfulTheme::default(),
        }
    }
}

impl Default for TerminalPrompter {
    fn default() -> Self {
        Self::new()
    }
}

impl Prompter for TerminalPrompter {
    fn select(&mut self, prompt: &str, items: &[String], default: usize) -> Result<usize> {
        self.select_optional(prompt, items, default)?
            .ok_or(BugBridgeError::UserCancelled)
    }

    fn select_optional(
        &mut self,
        prompt: &str,
        items: &[String],
        default: usize,
    ) -> Result<Option<usize>> {
        if items.is_empty() {
            return Ok(None);
        }
        let selection = Select::with_theme(&self.theme)
            .with_prompt(prompt)
            .items(items)
            .default(default.min(items.len() - 1))
            .interact_opt()?;
        Ok(selection)
    }

    fn confirm(&mut self, prompt: &str, default: bool) -> Result<bool> {
        let answer = Confirm::with_theme(&self.theme)
            .with_prompt(prompt)
            .default(default)
            .interact()?;
        Ok(answer)
    }

    fn input(
        &mut self,
        prompt: &str,
        default: Option<&str>,
        validate: Validator<'_>,
    ) -> Result<String> {
        let mut input = Input::<String>::with_theme(&self.theme)
            .with_prompt(prompt)
            .allow_empty(true)
            .validate_with(|value: &String| validate(value));
        if let Some(default) = default {
            input = input.default(default.to_string());
        }
        let value = input.interact_text()?;
        Ok(value.trim().to_string())
    }

    fn password(&mut self, prompt: &str) -> Result<String> {
        let value = Password::with_theme(&self.theme)
            .with_prompt(prompt)
            .interact()?;
        Ok(value)
    }

    fn multiline(&mut self, prompt: &str) -> Result<String> {
        println!("{}", style::header(prompt));
        println!("{}", style::dim("(finish with two empty lines)"));
        io::stdout().flush()?;

        let stdin = io::stdin();
        read_until_blank_pair(stdin.lock())
    }

    fn preview(&mut self, preview: &Preview) {
        println!();
        println!("{}", style::header(&preview.heading));
        for (name, value) in &preview.fields {
            println!("  {} {}", style::dim(&format!("{}:", name)), value);
        }
        if let Some(ref body) = preview.body {
            println!();
            println!("{}", body);
        }
        println!();
    }

    fn notice(&mut self, level: NoticeLevel, message: &str) {
        match level {
            NoticeLevel::Info => println!("{}", message),
            NoticeLevel::Success => println!("{} {}", style::success("✓"), message),
            NoticeLevel::Warning => {
                println!("{} {}", style::warning("⚠"), style::warning(message))
            }
            NoticeLevel::Error => eprintln!("{} {}", style::error("✗"), style::error(message)),
        }
    }
}

/// Read lines until two consecutive empty lines (or EOF)
fn read_until_blank_pair(reader: impl BufRead) -> Result<String> {
    let mut lines: Vec<String> = Vec::new();
    let mut empty_run = 0;

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            empty_run += 1;
            if empty_run >= 2 {
                break;
            }
        } else {
            empty_run = 0;
        }
        lines.push(line);
    }

    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }
    Ok(lines.join("\n"))
}
