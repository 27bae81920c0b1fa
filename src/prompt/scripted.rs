//! Prompter that replays pre-recorded answers

use super::{NoticeLevel, Preview, Prompter, Validator};
use crate::{BugBridgeError, Result};
use std::collections::VecDeque;

/// One scripted reply
#[derive(Debug, Clone, PartialEq)]
pub enum Answer {
    /// Choose the item at this index
    Select(usize),
    /// Abort a picker (Esc)
    Escape,
    Confirm(bool),
    Text(String),
}

/// Replays answers in order and records everything shown
///
/// Running out of answers, or meeting an answer of the wrong kind, is an
/// error so a test fails loudly instead of hanging.
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    answers: VecDeque<Answer>,
    /// Every prompt asked, in order
    pub asked: Vec<String>,
    pub previews: Vec<Preview>,
    pub notices: Vec<(NoticeLevel, String)>,
}

impl ScriptedPrompter {
    pub fn new(answers: impl IntoIterator<Item = Answer>) -> Self {
        Self {
            answers: answers.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn remaining(&self) -> usize {
        self.answers.len()
    }

    pub fn warnings(&self) -> Vec<&str> {
        self.notices
            .iter()
            .filter(|(level, _)| *level == NoticeLevel::Warning)
            .map(|(_, m)| m.as_str())
            .collect()
    }

    fn next(&mut self, prompt: &str) -> Result<Answer> {
        self.asked.push(prompt.to_string());
        self.answers
            .pop_front()
            .ok_or_else(|| BugBridgeError::Other(format!("no scripted answer for '{}'", prompt)))
    }

    fn unexpected(prompt: &str, answer: Answer) -> BugBridgeError {
        BugBridgeError::Other(format!(
            "scripted answer {:?} does not fit prompt '{}'",
            answer, prompt
        ))
    }
}

impl Prompter for ScriptedPrompter {
    fn select(&mut self, prompt: &str, items: &[String], default: usize) -> Result<usize> {
        self.select_optional(prompt, items, default)?
            .ok_or(BugBridgeError::UserCancelled)
    }

    fn select_optional(
        &mut self,
        prompt: &str,
        items: &[String],
        _default: usize,
    ) -> Result<Option<usize>> {
        match self.next(prompt)? {
            Answer::Select(i) if i < items.len() => Ok(Some(i)),
            Answer::Escape => Ok(None),
            other => Err(Self::unexpected(prompt, other)),
        }
    }

    fn confirm(&mut self, prompt: &str, _default: bool) -> Result<bool> {
        match self.next(prompt)? {
            Answer::Confirm(yes) => Ok(yes),
            Answer::Escape => Err(BugBridgeError::UserCancelled),
            other => Err(Self::unexpected(prompt, other)),
        }
    }

    fn input(
        &mut self,
        prompt: &str,
        default: Option<&str>,
        validate: Validator<'_>,
    ) -> Result<String> {
        match self.next(prompt)? {
            Answer::Text(text) => {
                let text = if text.is_empty() {
                    default.unwrap_or_default().to_string()
                } else {
                    text
                };
                validate(&text).map_err(BugBridgeError::Other)?;
                Ok(text.trim().to_string())
            }
            Answer::Escape => Err(BugBridgeError::UserCancelled),
            other => Err(Self::unexpected(prompt, other)),
        }
    }

    fn password(&mut self, prompt: &str) -> Result<String> {
        match self.next(prompt)? {
            Answer::Text(text) => Ok(text),
            other => Err(Self::unexpected(prompt, other)),
        }
    }

    fn multiline(&mut self, prompt: &str) -> Result<String> {
        match self.next(prompt)? {
            Answer::Text(text) => Ok(text),
            other => Err(Self::unexpected(prompt, other)),
        }
    }

    fn preview(&mut self, preview: &Preview) {
        self.previews.push(preview.clone());
    }

    fn notice(&mut self, level: NoticeLevel, message: &str) {
        self.notices.push((level, message.to_string()));
    }
}
