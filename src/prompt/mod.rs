//! User interaction
//!
//! Every question the sync asks goes through [`Prompter`], so flows can be
//! driven by a terminal ([`TerminalPrompter`]) or by a script in tests
//! ([`ScriptedPrompter`]).

mod scripted;
mod terminal;

pub use scripted::{Answer, ScriptedPrompter};
pub use terminal::TerminalPrompter;

use crate::Result;

/// Validator for free-text input; `Err` carries the message shown to the user
pub type Validator<'a> = &'a dyn Fn(&str) -> std::result::Result<(), String>;

/// Severity of a one-line message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// Block of labelled fields shown before a confirmation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Preview {
    pub heading: String,
    pub fields: Vec<(String, String)>,
    pub body: Option<String>,
}

impl Preview {
    pub fn new(heading: impl Into<String>) -> Self {
        Self {
            heading: heading.into(),
            ..Default::default()
        }
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Blocking user interaction
pub trait Prompter {
    /// Pick one item; aborting the picker is `UserCancelled`
    fn select(&mut self, prompt: &str, items: &[String], default: usize) -> Result<usize>;

    /// Pick one item; aborting the picker yields `None`
    fn select_optional(&mut self, prompt: &str, items: &[String], default: usize)
        -> Result<Option<usize>>;

    fn confirm(&mut self, prompt: &str, default: bool) -> Result<bool>;

    fn input(&mut self, prompt: &str, default: Option<&str>, validate: Validator<'_>)
        -> Result<String>;

    /// Hidden input for credentials
    fn password(&mut self, prompt: &str) -> Result<String>;

    /// Multi-line text, ended by two consecutive empty lines
    fn multiline(&mut self, prompt: &str) -> Result<String>;

    fn preview(&mut self, preview: &Preview);

    fn notice(&mut self, level: NoticeLevel, message: &str);

    fn info(&mut self, message: &str) {
        self.notice(NoticeLevel::Info, message);
    }

    fn success(&mut self, message: &str) {
        self.notice(NoticeLevel::Success, message);
    }

    fn warn(&mut self, message: &str) {
        self.notice(NoticeLevel::Warning, message);
    }

    fn error(&mut self, message: &str) {
        self.notice(NoticeLevel::Error, message);
    }
}

/// Accepts anything
pub fn any_input(_: &str) -> std::result::Result<(), String> {
    Ok(())
}

/// Rejects blank input
pub fn non_empty(value: &str) -> std::result::Result<(), String> {
    if value.trim().is_empty() {
        Err("Value cannot be empty".to_string())
    } else {
        Ok(())
    }
}
