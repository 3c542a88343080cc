use crate::collectors::stats::{parse_cpu_usage, parse_memory_usage, CpuUsage, MemoryUsage, StatParseError};
use crate::collectors::RawStatSample;
use crate::extract::LogExtractor;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeStatusReport {
    pub address: String,
    pub cpu: CpuUsage,
    pub memory: MemoryUsage,
    pub storage: String,
    pub logs: String,
}

impl NodeStatusReport {
    pub fn build(
        address: &str,
        sample: &RawStatSample,
        extractor: &LogExtractor,
    ) -> Result<Self, StatParseError> {
        Ok(Self {
            address: address.to_string(),
            cpu: parse_cpu_usage(&sample.cpu)?,
            memory: parse_memory_usage(&sample.memory)?,
            storage: sample.disk.clone(),
            logs: extractor.extract(&sample.logs),
        })
    }

    pub fn render(&self) -> String {
        format!(
            "[blue::b]Node: {}\n\
             [green::b]CPU Usage: [white]{}\n\
             [green::b]Memory Usage: [white]{}\n\
             [green::b]Storage Usage:\n [white]{}\
             [yellow::b]Logs: [white]{}",
            self.address, self.cpu, self.memory, self.storage, self.logs
        )
    }
}

pub fn render_error(address: &str, err: &dyn fmt::Display) -> String {
    format!("Error fetching status for node {address}: {err}")
}
