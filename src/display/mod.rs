pub mod markup;
pub mod tui;

use crate::state::{now_unix, SlotStatus};
use tokio::sync::mpsc;

pub trait StatusDisplay: Send + Sync {
    fn set_text(&self, index: usize, text: &str, status: SlotStatus);

    fn mark_polling(&self, _index: usize) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayUpdate {
    pub index: usize,
    /// `None` keeps the panel's current text.
    pub text: Option<String>,
    pub status: SlotStatus,
    pub at_unix: i64,
}

#[derive(Debug, Clone)]
pub struct ChannelDisplay {
    tx: mpsc::UnboundedSender<DisplayUpdate>,
}

impl ChannelDisplay {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DisplayUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl StatusDisplay for ChannelDisplay {
    fn set_text(&self, index: usize, text: &str, status: SlotStatus) {
        // The receiver is gone only once the terminal has been torn down.
        let _ = self.tx.send(DisplayUpdate {
            index,
            text: Some(text.to_string()),
            status,
            at_unix: now_unix(),
        });
    }

    fn mark_polling(&self, index: usize) {
        let _ = self.tx.send(DisplayUpdate {
            index,
            text: None,
            status: SlotStatus::Polling,
            at_unix: now_unix(),
        });
    }
}

#[derive(Debug, Clone)]
pub struct HeadlessDisplay {
    addresses: Vec<String>,
}

impl HeadlessDisplay {
    pub fn new(addresses: Vec<String>) -> Self {
        Self { addresses }
    }
}

impl StatusDisplay for HeadlessDisplay {
    fn set_text(&self, index: usize, text: &str, status: SlotStatus) {
        let address = self.addresses.get(index).map_or("?", String::as_str);
        let body = markup::strip(text);
        println!(
            "==== [{index}] {address} ({}) ====\n{}",
            status.label(),
            body.trim_end()
        );
    }
}
