use crate::collectors::collect_sample;
use crate::collectors::executor::{ExecError, Transport};
use crate::collectors::log_reader::LogReader;
use crate::collectors::stats::StatParseError;
use crate::config::NodeConfig;
use crate::display::StatusDisplay;
use crate::extract::LogExtractor;
use crate::format::{render_error, NodeStatusReport};
use crate::metrics::Metrics;
use crate::state::{now_unix, SlotStatus, State};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{watch, RwLock};
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    Exec(#[from] ExecError),
    #[error(transparent)]
    Parse(#[from] StatParseError),
    #[error("no response within {0:?}")]
    Timeout(Duration),
    #[error("poll task panicked")]
    Panicked,
}

impl NodeError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Exec(err) => err.kind(),
            Self::Parse(_) => "parse",
            Self::Timeout(_) => "timeout",
            Self::Panicked => "panic",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub succeeded: usize,
    pub failed: usize,
}

pub struct Poller {
    nodes: Arc<[NodeConfig]>,
    transport: Arc<dyn Transport>,
    reader: Arc<LogReader>,
    extractor: Arc<LogExtractor>,
    node_timeout: Option<Duration>,
    display: Arc<dyn StatusDisplay>,
    state: Arc<RwLock<State>>,
    metrics: Arc<Metrics>,
}

impl Poller {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        nodes: Vec<NodeConfig>,
        transport: Arc<dyn Transport>,
        reader: LogReader,
        extractor: LogExtractor,
        node_timeout: Option<Duration>,
        display: Arc<dyn StatusDisplay>,
        state: Arc<RwLock<State>>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            nodes: nodes.into(),
            transport,
            reader: Arc::new(reader),
            extractor: Arc::new(extractor),
            node_timeout,
            display,
            state,
            metrics,
        }
    }

    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }
            let summary = self.run_cycle().await;
            debug!(
                succeeded = summary.succeeded,
                failed = summary.failed,
                "poll cycle finished"
            );

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(interval) => {}
            }
        }
        info!("poller stopped");
    }

    pub async fn run_cycle(&self) -> CycleSummary {
        let started = Instant::now();
        self.state.write().await.begin_cycle();

        let mut handles = Vec::with_capacity(self.nodes.len());
        for index in 0..self.nodes.len() {
            self.display.mark_polling(index);
            handles.push((index, tokio::spawn(self.task(index).run())));
        }

        let mut summary = CycleSummary::default();
        for (index, handle) in handles {
            match handle.await {
                Ok(true) => summary.succeeded += 1,
                Ok(false) => summary.failed += 1,
                Err(join_err) => {
                    // The task died before publishing; its slot still gets
                    // this cycle's single write.
                    summary.failed += 1;
                    error!(node = %self.nodes[index].endpoint(), error = %join_err, "poll task aborted");
                    self.task(index)
                        .publish(Err(NodeError::Panicked), Duration::ZERO)
                        .await;
                }
            }
        }

        let elapsed = started.elapsed();
        let now = now_unix();
        self.state.write().await.finish_cycle(now);
        self.metrics.record_cycle(elapsed);
        self.metrics.update_uptime(now);
        if summary.failed > 0 {
            warn!(
                failed = summary.failed,
                total = self.nodes.len(),
                elapsed = %humantime::format_duration(truncate_to_millis(elapsed)),
                "poll cycle finished with failures"
            );
        }
        summary
    }

    fn task(&self, index: usize) -> NodeTask {
        NodeTask {
            index,
            nodes: self.nodes.clone(),
            transport: self.transport.clone(),
            reader: self.reader.clone(),
            extractor: self.extractor.clone(),
            node_timeout: self.node_timeout,
            display: self.display.clone(),
            state: self.state.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

struct NodeTask {
    index: usize,
    nodes: Arc<[NodeConfig]>,
    transport: Arc<dyn Transport>,
    reader: Arc<LogReader>,
    extractor: Arc<LogExtractor>,
    node_timeout: Option<Duration>,
    display: Arc<dyn StatusDisplay>,
    state: Arc<RwLock<State>>,
    metrics: Arc<Metrics>,
}

impl NodeTask {
    fn node(&self) -> &NodeConfig {
        &self.nodes[self.index]
    }

    async fn run(self) -> bool {
        let started = Instant::now();
        let result = match self.node_timeout {
            Some(limit) => tokio::time::timeout(limit, self.poll())
                .await
                .unwrap_or(Err(NodeError::Timeout(limit))),
            None => self.poll().await,
        };
        self.publish(result, started.elapsed()).await
    }

    async fn poll(&self) -> Result<String, NodeError> {
        let node = self.node();
        let sample = collect_sample(
            self.transport.as_ref(),
            node,
            &self.reader,
            self.extractor.watched(),
        )
        .await?;
        let report = NodeStatusReport::build(&node.address, &sample, &self.extractor)?;
        Ok(report.render())
    }

    async fn publish(&self, result: Result<String, NodeError>, elapsed: Duration) -> bool {
        let node = self.node();
        let endpoint = node.endpoint();
        let now = now_unix();
        match result {
            Ok(text) => {
                debug!(node = %endpoint, elapsed_ms = elapsed.as_millis() as u64, "node polled");
                self.state
                    .write()
                    .await
                    .set_report(self.index, text.clone(), now);
                self.display.set_text(self.index, &text, SlotStatus::Ok);
                self.metrics.record_node_success(&endpoint, elapsed, now);
                true
            }
            Err(err) => {
                warn!(node = %endpoint, kind = err.kind(), error = %err, "node poll failed");
                let text = render_error(&node.address, &err);
                self.state
                    .write()
                    .await
                    .set_error(self.index, text.clone(), err.to_string(), now);
                self.display.set_text(self.index, &text, SlotStatus::Failed);
                self.metrics.record_node_failure(&endpoint, err.kind(), elapsed);
                false
            }
        }
    }
}

fn truncate_to_millis(d: Duration) -> Duration {
    Duration::from_millis(d.as_millis() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::stats::{CPU_COMMAND, DISK_COMMAND, MEMORY_COMMAND};
    use crate::config::{default_noise_fields, default_watched_messages};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    const TOP: &str = "%Cpu(s):  3.0 us,  1.0 sy,  0.0 ni, 96.0 id\n";
    const FREE: &str = "              total        used        free\nMem:            7821        2310        4410\n";
    const DF: &str = "Filesystem  Size  Used Avail Use% Mounted on\n/dev/vda1    40G   12G   28G  30% /\n";
    const LOGS: &str = concat!(
        r#"{"msg":"peers in store","level":"info","ts":"x","caller":"y","count":12}"#,
        "\n",
        r#"{"msg":"peers in store","count":15}"#,
        "\n",
    );

    #[derive(Clone, Copy)]
    enum Behavior {
        Healthy,
        Refuse,
        BadMemory,
        Hang,
        Panic,
    }

    struct ScriptedTransport {
        behavior: HashMap<String, Behavior>,
        calls: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedTransport {
        fn new(behavior: &[(&str, Behavior)]) -> Self {
            Self {
                behavior: behavior
                    .iter()
                    .map(|(addr, b)| (addr.to_string(), *b))
                    .collect(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls_for(&self, address: &str) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(a, _)| a == address)
                .count()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn execute(&self, node: &NodeConfig, command: &str) -> Result<String, ExecError> {
            self.calls
                .lock()
                .unwrap()
                .push((node.address.clone(), command.to_string()));
            let behavior = self
                .behavior
                .get(&node.address)
                .copied()
                .unwrap_or(Behavior::Healthy);
            match behavior {
                Behavior::Refuse => Err(ExecError::Transport {
                    endpoint: node.endpoint(),
                    reason: "connection refused".to_string(),
                }),
                Behavior::Hang => std::future::pending().await,
                Behavior::Panic => panic!("transport blew up"),
                Behavior::Healthy | Behavior::BadMemory => Ok(match command {
                    CPU_COMMAND => TOP.to_string(),
                    MEMORY_COMMAND if matches!(behavior, Behavior::BadMemory) => {
                        "free: command not found\n".to_string()
                    }
                    MEMORY_COMMAND => FREE.to_string(),
                    DISK_COMMAND => DF.to_string(),
                    _ => LOGS.to_string(),
                }),
            }
        }
    }

    #[derive(Default)]
    struct RecordingDisplay {
        writes: Mutex<Vec<(usize, String, SlotStatus)>>,
    }

    impl RecordingDisplay {
        fn writes_for(&self, index: usize) -> Vec<(String, SlotStatus)> {
            self.writes
                .lock()
                .unwrap()
                .iter()
                .filter(|(i, _, _)| *i == index)
                .map(|(_, text, status)| (text.clone(), *status))
                .collect()
        }
    }

    impl StatusDisplay for RecordingDisplay {
        fn set_text(&self, index: usize, text: &str, status: SlotStatus) {
            self.writes
                .lock()
                .unwrap()
                .push((index, text.to_string(), status));
        }
    }

    fn node(address: &str) -> NodeConfig {
        NodeConfig {
            address: address.to_string(),
            port: 22,
            username: "monitor".to_string(),
            password: None,
            identity_file: Some("/keys/monitor".to_string()),
        }
    }

    fn poller(
        addresses: &[&str],
        transport: Arc<ScriptedTransport>,
        display: Arc<RecordingDisplay>,
        node_timeout: Option<Duration>,
    ) -> (Poller, Arc<RwLock<State>>) {
        let nodes: Vec<NodeConfig> = addresses.iter().map(|a| node(a)).collect();
        let state = Arc::new(RwLock::new(State::new(0, &nodes)));
        let poller = Poller::new(
            nodes,
            transport,
            LogReader::default(),
            LogExtractor::new(default_watched_messages(), default_noise_fields()),
            node_timeout,
            display,
            state.clone(),
            Metrics::new(0).unwrap(),
        );
        (poller, state)
    }

    #[tokio::test]
    async fn failing_node_is_isolated_and_retried_next_cycle() {
        let transport = Arc::new(ScriptedTransport::new(&[("10.0.0.2", Behavior::Refuse)]));
        let display = Arc::new(RecordingDisplay::default());
        let (poller, state) = poller(
            &["10.0.0.1", "10.0.0.2", "10.0.0.3"],
            transport.clone(),
            display.clone(),
            Some(Duration::from_secs(5)),
        );

        let summary = poller.run_cycle().await;
        assert_eq!(summary, CycleSummary { succeeded: 2, failed: 1 });

        for (index, address) in [(0, "10.0.0.1"), (2, "10.0.0.3")] {
            let writes = display.writes_for(index);
            assert_eq!(writes.len(), 1, "one write per node per cycle");
            assert_eq!(writes[0].1, SlotStatus::Ok);
            assert!(writes[0].0.starts_with(&format!("[blue::b]Node: {address}\n")));
            assert!(writes[0]
                .0
                .ends_with("[yellow::b]Logs: [white]{ msg: peers in store; count: 15 }\n"));
        }

        let failed = display.writes_for(1);
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].1, SlotStatus::Failed);
        assert_eq!(
            failed[0].0,
            "Error fetching status for node 10.0.0.2: failed to connect to 10.0.0.2:22: connection refused"
        );

        {
            let state = state.read().await;
            assert_eq!(state.slots[1].status, SlotStatus::Failed);
            assert_eq!(state.slots[0].status, SlotStatus::Ok);
            assert_eq!(state.cycles_completed, 1);
        }

        poller.run_cycle().await;
        assert_eq!(transport.calls_for("10.0.0.1"), 8);
        assert_eq!(transport.calls_for("10.0.0.2"), 2);
        assert_eq!(transport.calls_for("10.0.0.3"), 8);
        assert_eq!(display.writes_for(1).len(), 2);
        assert_eq!(state.read().await.cycles_completed, 2);
    }

    #[tokio::test]
    async fn each_node_runs_the_four_commands_in_order() {
        let transport = Arc::new(ScriptedTransport::new(&[]));
        let display = Arc::new(RecordingDisplay::default());
        let (poller, _) = poller(&["10.0.0.1"], transport.clone(), display, None);

        poller.run_cycle().await;
        let calls: Vec<String> = transport
            .calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, c)| c.clone())
            .collect();
        assert_eq!(calls.len(), 4);
        assert_eq!(calls[0], CPU_COMMAND);
        assert_eq!(calls[1], MEMORY_COMMAND);
        assert_eq!(calls[2], DISK_COMMAND);
        assert_eq!(
            calls[3],
            LogReader::default().command(&default_watched_messages())
        );
    }

    #[tokio::test]
    async fn malformed_stats_become_an_error_report() {
        let transport = Arc::new(ScriptedTransport::new(&[("10.0.0.1", Behavior::BadMemory)]));
        let display = Arc::new(RecordingDisplay::default());
        let (poller, _) = poller(&["10.0.0.1"], transport, display.clone(), None);

        poller.run_cycle().await;
        let writes = display.writes_for(0);
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].1, SlotStatus::Failed);
        assert!(writes[0].0.contains("unexpected memory summary"));
    }

    #[tokio::test]
    async fn hung_node_times_out_without_blocking_others() {
        let transport = Arc::new(ScriptedTransport::new(&[("10.0.0.2", Behavior::Hang)]));
        let display = Arc::new(RecordingDisplay::default());
        let (poller, _) = poller(
            &["10.0.0.1", "10.0.0.2"],
            transport,
            display.clone(),
            Some(Duration::from_millis(100)),
        );

        let summary = poller.run_cycle().await;
        assert_eq!(summary, CycleSummary { succeeded: 1, failed: 1 });
        assert_eq!(display.writes_for(0)[0].1, SlotStatus::Ok);
        let hung = display.writes_for(1);
        assert_eq!(hung.len(), 1);
        assert!(hung[0].0.contains("no response within 100ms"));
    }

    #[tokio::test]
    async fn panicking_task_still_gets_one_error_write() {
        let transport = Arc::new(ScriptedTransport::new(&[("10.0.0.1", Behavior::Panic)]));
        let display = Arc::new(RecordingDisplay::default());
        let (poller, state) = poller(&["10.0.0.1", "10.0.0.2"], transport, display.clone(), None);

        let summary = poller.run_cycle().await;
        assert_eq!(summary, CycleSummary { succeeded: 1, failed: 1 });
        let writes = display.writes_for(0);
        assert_eq!(writes.len(), 1);
        assert_eq!(
            writes[0].0,
            "Error fetching status for node 10.0.0.1: poll task panicked"
        );
        assert_eq!(state.read().await.slots[0].status, SlotStatus::Failed);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown_after_first_cycle() {
        let transport = Arc::new(ScriptedTransport::new(&[]));
        let display = Arc::new(RecordingDisplay::default());
        let (poller, state) = poller(&["10.0.0.1"], transport, display, None);
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            poller.run(Duration::from_secs(3600), rx).await;
        });
        while state.read().await.cycles_completed == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("poller must stop during its sleep")
            .unwrap();
        assert_eq!(state.read().await.cycles_completed, 1);
    }
}
