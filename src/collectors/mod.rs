pub mod executor;
pub mod log_reader;
pub mod stats;

use crate::config::NodeConfig;
use executor::{ExecError, Transport};
use log_reader::LogReader;
use stats::{CPU_COMMAND, DISK_COMMAND, MEMORY_COMMAND};

#[derive(Debug, Clone, Default)]
pub struct RawStatSample {
    pub cpu: String,
    pub memory: String,
    pub disk: String,
    pub logs: String,
}

pub async fn collect_sample(
    transport: &dyn Transport,
    node: &NodeConfig,
    reader: &LogReader,
    watched: &[String],
) -> Result<RawStatSample, ExecError> {
    let cpu = transport.execute(node, CPU_COMMAND).await?;
    let memory = transport.execute(node, MEMORY_COMMAND).await?;
    let disk = transport.execute(node, DISK_COMMAND).await?;
    let logs = reader.read_logs(transport, node, watched).await?;

    Ok(RawStatSample {
        cpu,
        memory,
        disk,
        logs,
    })
}
