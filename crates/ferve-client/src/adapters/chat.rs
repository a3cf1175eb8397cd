use crate::config::AdapterTimings;
use crate::connection::ConnectionHandle;
use crate::dispatcher::{clock_now, AI_SOURCE, AI_MESSAGE_PREFIX};
use crate::store::{ObserverSet, Slice, SliceReader, StateStore};
use ferve_core::wire::OutboundEnvelope;
use std::time::Duration;

pub const GREETING: &str = "Hello! I'm James, your personal AI assistant. I can help you with:\n\n\
• Local development setup\n• Code explanations\n• System automation\n• General questions\n\n\
How can I help you today?";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    pub timestamp: String,
}

pub struct ChatAdapter {
    connection: ConnectionHandle,
    history: Slice<Vec<ChatMessage>>,
    processing: Slice<bool>,
    reply_timeout: Option<Duration>,
    observers: ObserverSet,
}

impl ChatAdapter {
    pub fn attach(connection: ConnectionHandle, store: &StateStore, timings: &AdapterTimings) -> Self {
        let history = Slice::new(vec![ChatMessage {
            role: ChatRole::Assistant,
            content: GREETING.to_string(),
            timestamp: clock_now(),
        }]);
        let processing = Slice::new(false);
        let observers = ObserverSet::new();

        let log = store.event_log();
        let mut mark = log.with(|log| log.pushed());
        let replies = history.clone();
        let busy = processing.clone();
        observers.push(log.observe(move |log| {
            let fresh: Vec<ChatMessage> = log
                .since(mark)
                .into_iter()
                .filter(|entry| entry.source == AI_SOURCE && entry.message.starts_with("AI:"))
                .map(|entry| ChatMessage {
                    role: ChatRole::Assistant,
                    content: entry
                        .message
                        .strip_prefix(AI_MESSAGE_PREFIX)
                        .unwrap_or(&entry.message)
                        .to_string(),
                    timestamp: entry.timestamp.clone(),
                })
                .collect();
            mark = log.pushed();
            if !fresh.is_empty() {
                replies.modify(|history| history.extend(fresh));
                busy.replace(false);
            }
        }));

        Self {
            connection,
            history,
            processing,
            reply_timeout: timings.chat_reply_timeout,
            observers,
        }
    }

    pub fn history(&self) -> SliceReader<Vec<ChatMessage>> {
        self.history.reader()
    }

    pub fn processing(&self) -> SliceReader<bool> {
        self.processing.reader()
    }

    pub fn send_message(&self, text: &str) -> bool {
        let message = text.trim();
        if message.is_empty() || self.processing.get() || !self.connection.is_connected() {
            return false;
        }
        self.history.modify(|history| {
            history.push(ChatMessage {
                role: ChatRole::User,
                content: message.to_string(),
                timestamp: clock_now(),
            })
        });
        self.connection.send(OutboundEnvelope::AiChat {
            message: message.to_string(),
        });
        self.processing.replace(true);

        if let Some(timeout) = self.reply_timeout {
            let processing = self.processing.clone();
            self.observers.push(tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                processing.replace(false);
            }));
        }
        true
    }
}
