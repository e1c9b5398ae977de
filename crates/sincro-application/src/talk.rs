//! Routed-message consumer: feeds the scheduler, caption line and chat log.

use std::sync::{Arc, Mutex};

use sincro_core::chat::{ChatLog, ChatMessage};
use sincro_core::clock::{Clock, SystemClock};
use sincro_core::talk::{ActiveMoraUnit, MoraEvent, MoraScheduler, TalkEventHandler, TelopLine};

/// Owns the state the render and chat loops poll.
pub struct TalkManager<C: Clock = SystemClock> {
    scheduler: Arc<MoraScheduler<C>>,
    telop: Mutex<TelopLine>,
    chat: Arc<ChatLog>,
}

impl<C: Clock> TalkManager<C> {
    pub fn new(scheduler: Arc<MoraScheduler<C>>, chat: Arc<ChatLog>, telop_max_chars: usize) -> Self {
        Self {
            scheduler,
            telop: Mutex::new(TelopLine::new(telop_max_chars)),
            chat,
        }
    }

    pub fn scheduler(&self) -> &Arc<MoraScheduler<C>> {
        &self.scheduler
    }

    pub fn chat(&self) -> &Arc<ChatLog> {
        &self.chat
    }

    pub fn current_unit(&self) -> Option<Arc<ActiveMoraUnit>> {
        self.scheduler.current_unit()
    }

    /// Current caption text.
    pub fn telop_text(&self) -> String {
        self.telop
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .text()
            .to_string()
    }
}

impl<C: Clock> TalkEventHandler for TalkManager<C> {
    fn on_mora(&self, event: MoraEvent) {
        let new_text = event.new_text;
        let fragment = event.text.clone();
        self.scheduler.add_event(event);

        if new_text {
            self.telop
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .push_fragment(fragment.as_deref());
        }
    }

    fn on_chat(&self, message: ChatMessage) {
        self.chat.write_message(message);
    }
}
