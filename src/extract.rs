use serde_json::{Map, Value};
use std::collections::HashMap;

pub type LogEntry = Map<String, Value>;

const MSG_FIELD: &str = "msg";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LatestLogByKey {
    entries: HashMap<String, LogEntry>,
}

impl LatestLogByKey {
    pub fn get(&self, key: &str) -> Option<&LogEntry> {
        self.entries.get(key)
    }
}

#[derive(Debug, Clone)]
pub struct LogExtractor {
    watched: Vec<String>,
    noise_fields: Vec<String>,
}

impl LogExtractor {
    pub fn new(watched: Vec<String>, noise_fields: Vec<String>) -> Self {
        Self {
            watched,
            noise_fields,
        }
    }

    pub fn watched(&self) -> &[String] {
        &self.watched
    }

    pub fn latest_by_key(&self, raw: &str) -> LatestLogByKey {
        let mut latest = LatestLogByKey::default();
        for line in raw.lines() {
            // Partial lines at the edges of the window are expected.
            let Ok(entry) = serde_json::from_str::<LogEntry>(line) else {
                continue;
            };
            let Some(msg) = entry.get(MSG_FIELD).and_then(Value::as_str) else {
                continue;
            };
            if let Some(key) = self.watched.iter().find(|k| k.as_str() == msg) {
                latest.entries.insert(key.clone(), entry);
            }
        }
        latest
    }

    pub fn render(&self, latest: &LatestLogByKey) -> String {
        let mut out = String::new();
        for key in &self.watched {
            let Some(entry) = latest.get(key) else {
                continue;
            };
            out.push_str("{ msg: ");
            out.push_str(key);
            // Map is key-ordered, so fields come out sorted.
            for (field, value) in entry {
                if field == MSG_FIELD || self.noise_fields.iter().any(|n| n == field) {
                    continue;
                }
                out.push_str("; ");
                out.push_str(field);
                out.push_str(": ");
                out.push_str(&render_value(value));
            }
            out.push_str(" }\n");
        }
        out
    }

    pub fn extract(&self, raw: &str) -> String {
        self.render(&self.latest_by_key(raw))
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.to_string()
            } else if let Some(u) = n.as_u64() {
                u.to_string()
            } else {
                format!("{:.0}", n.as_f64().unwrap_or_default())
            }
        }
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}
