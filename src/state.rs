use crate::config::NodeConfig;
use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotStatus {
    Pending,
    Polling,
    Ok,
    Failed,
}

impl SlotStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Polling => "polling",
            Self::Ok => "ok",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeSlot {
    pub address: String,
    pub status: SlotStatus,
    pub text: String,
    pub updated_at_unix: Option<i64>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct State {
    pub started_at_unix: i64,
    pub cycles_completed: u64,
    pub last_cycle_finished_unix: Option<i64>,
    pub slots: Vec<NodeSlot>,
}

impl State {
    pub fn new(now_unix: i64, nodes: &[NodeConfig]) -> Self {
        Self {
            started_at_unix: now_unix,
            slots: nodes
                .iter()
                .map(|node| NodeSlot {
                    address: node.address.clone(),
                    status: SlotStatus::Pending,
                    text: String::new(),
                    updated_at_unix: None,
                    last_error: None,
                })
                .collect(),
            ..Self::default()
        }
    }

    pub fn begin_cycle(&mut self) {
        for slot in &mut self.slots {
            slot.status = SlotStatus::Polling;
        }
    }

    pub fn set_report(&mut self, index: usize, text: String, now_unix: i64) {
        if let Some(slot) = self.slots.get_mut(index) {
            slot.status = SlotStatus::Ok;
            slot.text = text;
            slot.updated_at_unix = Some(now_unix);
            slot.last_error = None;
        }
    }

    pub fn set_error(&mut self, index: usize, text: String, error: String, now_unix: i64) {
        if let Some(slot) = self.slots.get_mut(index) {
            slot.status = SlotStatus::Failed;
            slot.text = text;
            slot.updated_at_unix = Some(now_unix);
            slot.last_error = Some(error);
        }
    }

    pub fn finish_cycle(&mut self, now_unix: i64) {
        self.cycles_completed += 1;
        self.last_cycle_finished_unix = Some(now_unix);
    }
}

pub fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nodes() -> Vec<NodeConfig> {
        ["10.0.0.1", "10.0.0.2"]
            .into_iter()
            .map(|address| NodeConfig {
                address: address.to_string(),
                port: 22,
                username: "monitor".to_string(),
                password: None,
                identity_file: Some("/k".to_string()),
            })
            .collect()
    }

    #[test]
    fn slots_follow_cycle_lifecycle() {
        let mut state = State::new(100, &nodes());
        assert!(state
            .slots
            .iter()
            .all(|s| s.status == SlotStatus::Pending));

        state.begin_cycle();
        state.set_report(0, "ok text".to_string(), 101);
        state.set_error(1, "err text".to_string(), "boom".to_string(), 102);
        state.finish_cycle(103);

        assert_eq!(state.slots[0].status, SlotStatus::Ok);
        assert_eq!(state.slots[0].updated_at_unix, Some(101));
        assert_eq!(state.slots[1].status, SlotStatus::Failed);
        assert_eq!(state.slots[1].last_error.as_deref(), Some("boom"));
        assert_eq!(state.cycles_completed, 1);

        state.begin_cycle();
        assert_eq!(state.slots[1].status, SlotStatus::Polling);
        assert_eq!(state.slots[1].text, "err text");

        state.set_report(1, "recovered".to_string(), 200);
        assert_eq!(state.slots[1].last_error, None);
    }

    #[test]
    fn out_of_range_index_is_ignored() {
        let mut state = State::new(0, &nodes());
        state.set_report(5, "x".to_string(), 1);
        assert_eq!(state.slots.len(), 2);
    }
}
