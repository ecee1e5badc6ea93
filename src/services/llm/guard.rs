use std::ops::{Deref, DerefMut};

use super::Assistant;

/// Scoped override of an assistant's system prompt and token budget.
///
/// The override is applied on construction and the original values are put
/// back on drop, whichever way the scope is left.
pub struct PromptOverride<'a> {
    assistant: &'a mut (dyn Assistant + 'static),
    original_prompt: String,
    original_max_tokens: u32,
}

impl<'a> PromptOverride<'a> {
    /// Append `suffix` to the current system prompt and set `max_tokens`.
    pub fn apply(assistant: &'a mut (dyn Assistant + 'static), suffix: &str, max_tokens: u32) -> Self {
        let original_prompt = assistant.system_prompt().to_string();
        let original_max_tokens = assistant.max_tokens();
        assistant.set_system_prompt(format!("{}\n\n{}", original_prompt, suffix));
        assistant.set_max_tokens(max_tokens);
        Self {
            assistant,
            original_prompt,
            original_max_tokens,
        }
    }

    pub fn original_prompt(&self) -> &str {
        &self.original_prompt
    }
}

impl Deref for PromptOverride<'_> {
    type Target = dyn Assistant + 'static;

    fn deref(&self) -> &Self::Target {
        &*self.assistant
    }
}

impl DerefMut for PromptOverride<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.assistant
    }
}

impl Drop for PromptOverride<'_> {
    fn drop(&mut self) {
        self.assistant
            .set_system_prompt(std::mem::take(&mut self.original_prompt));
        self.assistant.set_max_tokens(self.original_max_tokens);
    }
}
