use concierge_core::{Message, Role};

/// Builds the conversation sent to providers for one reply.
/// Handles the system prompt and history truncation.
pub struct ContextWindow {
    messages: Vec<Message>,
    system_prompt: Option<String>,
    max_messages: usize,
}

impl ContextWindow {
    /// An empty window keeping at most `max_messages` history messages.
    pub fn new(max_messages: usize) -> Self {
        Self {
            messages: Vec::new(),
            system_prompt: None,
            max_messages,
        }
    }

    /// Set the instructions placed before the history.
    pub fn set_system_prompt(&mut self, prompt: impl Into<String>) {
        self.system_prompt = Some(prompt.into());
    }

    /// Append history messages, then truncate.
    pub fn extend(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.messages.extend(messages);
        self.truncate();
    }

    /// The history with the system prompt, if any, in front.
    pub fn conversation(&self) -> Vec<Message> {
        let mut out = Vec::with_capacity(self.messages.len() + 1);
        if let Some(prompt) = &self.system_prompt {
            out.push(Message::system(prompt.clone()));
        }
        out.extend(self.messages.iter().cloned());
        out
    }

    /// Keep the newest `max_messages`. A tool result whose request was cut
    /// off is dropped too, providers reject orphaned results.
    fn truncate(&mut self) {
        if self.messages.len() > self.max_messages {
            let excess = self.messages.len() - self.max_messages;
            self.messages.drain(..excess);
        }
        let orphans = self
            .messages
            .iter()
            .take_while(|m| m.role == Role::Tool)
            .count();
        if orphans > 0 {
            self.messages.drain(..orphans);
        }
    }
}
