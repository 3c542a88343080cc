use crate::collectors::executor::{ExecError, Transport};
use crate::config::NodeConfig;
use serde::{Deserialize, Serialize};

const TMUX_FILTERED_TAIL: u32 = 200;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LogReader {
    Service {
        name: String,
        #[serde(default = "default_service_lines")]
        lines: u32,
    },
    Tmux {
        pane: String,
        #[serde(default = "default_tmux_lines")]
        lines: u32,
    },
    Docker {
        container: String,
        #[serde(default = "default_docker_lines")]
        lines: u32,
    },
}

impl Default for LogReader {
    fn default() -> Self {
        Self::Service {
            name: "ceremonyclient".to_string(),
            lines: default_service_lines(),
        }
    }
}

impl LogReader {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Service { .. } => "service",
            Self::Tmux { .. } => "tmux",
            Self::Docker { .. } => "docker",
        }
    }

    pub fn target(&self) -> &str {
        match self {
            Self::Service { name, .. } => name,
            Self::Tmux { pane, .. } => pane,
            Self::Docker { container, .. } => container,
        }
    }

    pub fn lines(&self) -> u32 {
        match self {
            Self::Service { lines, .. } | Self::Tmux { lines, .. } | Self::Docker { lines, .. } => {
                *lines
            }
        }
    }

    pub fn command(&self, watched: &[String]) -> String {
        let filter = msg_filter(watched);
        match self {
            Self::Service { name, lines } => guarded_read(
                &format!(
                    "journalctl -u {} -n {lines} --no-hostname -o cat",
                    shell_escape(&format!("{name}.service"))
                ),
                &filter,
            ),
            Self::Tmux { pane, lines } => format!(
                "{} | tail -n {TMUX_FILTERED_TAIL}",
                guarded_read(
                    &format!("tmux capture-pane -t {} -p -S -{lines}", shell_escape(pane)),
                    &filter,
                )
            ),
            Self::Docker { container, lines } => guarded_read(
                &format!("docker logs --tail {lines} {} 2>&1", shell_escape(container)),
                &filter,
            ),
        }
    }

    pub async fn read_logs(
        &self,
        transport: &dyn Transport,
        node: &NodeConfig,
        watched: &[String],
    ) -> Result<String, ExecError> {
        transport.execute(node, &self.command(watched)).await
    }
}

// A failed read exits with its own status; whatever it printed goes to stderr.
fn guarded_read(read: &str, filter: &str) -> String {
    format!(
        r#"out=$({read}) || {{ rc=$?; printf '%s\n' "$out" >&2; exit $rc; }}; printf '%s\n' "$out" | {filter}"#
    )
}

/// `grep -E` over the watched keys. grep's "nothing matched" status (1) is
/// folded into success; status 2 and above still fail the pipeline.
fn msg_filter(watched: &[String]) -> String {
    let alternatives = watched
        .iter()
        .map(|key| ere_escape(key))
        .collect::<Vec<_>>()
        .join("|");
    let pattern = format!("\"msg\":\"({alternatives})\"");
    format!(
        "{{ grep -E {} || [ $? -eq 1 ]; }}",
        single_quote(&pattern)
    )
}

fn ere_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(
            c,
            '.' | '[' | ']' | '{' | '}' | '(' | ')' | '\\' | '*' | '+' | '?' | '^' | '$' | '|'
        ) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn single_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

pub fn shell_escape(s: &str) -> String {
    if s.is_empty() {
        return "''".to_string();
    }
    if s.chars().all(|c| {
        c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | '%' | ':' | '@')
    }) {
        return s.to_string();
    }
    single_quote(s)
}

const fn default_service_lines() -> u32 {
    50
}

const fn default_tmux_lines() -> u32 {
    100
}

const fn default_docker_lines() -> u32 {
    200
}
