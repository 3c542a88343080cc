use std::fmt;
use thiserror::Error;

pub const CPU_COMMAND: &str = "top -b -n 1 | grep 'Cpu(s)'";
pub const MEMORY_COMMAND: &str = "free -m";
pub const DISK_COMMAND: &str = "df -h /";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StatParseError {
    #[error("unexpected cpu summary '{0}': need at least 4 fields")]
    Cpu(String),
    #[error("unexpected memory summary '{0}': need a second line with at least 3 fields")]
    Memory(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpuUsage {
    pub user_percent: String,
    pub system_percent: String,
}

impl fmt::Display for CpuUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "User Space: {}%; System Space: {}%",
            self.user_percent, self.system_percent
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryUsage {
    pub total_mb: String,
    pub used_mb: String,
}

impl fmt::Display for MemoryUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Total Memory: {} MB; Used Memory: {} MB",
            self.total_mb, self.used_mb
        )
    }
}

/// Parses the `Cpu(s)` line of `top -b -n 1`:
/// `%Cpu(s):  2.3 us,  0.7 sy,  0.0 ni, 96.8 id, ...`
pub fn parse_cpu_usage(raw: &str) -> Result<CpuUsage, StatParseError> {
    let line = raw.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 4 {
        return Err(StatParseError::Cpu(line.trim().to_string()));
    }
    Ok(CpuUsage {
        user_percent: fields[1].to_string(),
        system_percent: fields[3].to_string(),
    })
}

pub fn parse_memory_usage(raw: &str) -> Result<MemoryUsage, StatParseError> {
    let fields: Vec<&str> = raw
        .lines()
        .nth(1)
        .map(|line| line.split_whitespace().collect())
        .unwrap_or_default();
    if fields.len() < 3 {
        return Err(StatParseError::Memory(raw.trim().to_string()));
    }
    Ok(MemoryUsage {
        total_mb: fields[1].to_string(),
        used_mb: fields[2].to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOP_LINE: &str =
        "%Cpu(s):  2.3 us,  0.7 sy,  0.0 ni, 96.8 id,  0.0 wa,  0.0 hi,  0.2 si,  0.0 st\n";

    const FREE_OUTPUT: &str = "\
               total        used        free      shared  buff/cache   available
Mem:           15890        4123        1022         211       10745       11237
Swap:           2047          12        2035
";

    #[test]
    fn cpu_takes_second_and_fourth_fields() {
        let usage = parse_cpu_usage(TOP_LINE).unwrap();
        assert_eq!(usage.user_percent, "2.3");
        assert_eq!(usage.system_percent, "0.7");
        assert_eq!(usage.to_string(), "User Space: 2.3%; System Space: 0.7%");
    }

    #[test]
    fn cpu_skips_leading_blank_lines() {
        let usage = parse_cpu_usage(&format!("\n  \n{TOP_LINE}")).unwrap();
        assert_eq!(usage.user_percent, "2.3");
        assert_eq!(usage.system_percent, "0.7");
    }

    #[test]
    fn cpu_rejects_short_lines() {
        assert_eq!(
            parse_cpu_usage("%Cpu(s): 2.3 us,"),
            Err(StatParseError::Cpu("%Cpu(s): 2.3 us,".to_string()))
        );
        assert!(parse_cpu_usage("").is_err());
    }

    #[test]
    fn memory_takes_total_and_used_from_mem_row() {
        let usage = parse_memory_usage(FREE_OUTPUT).unwrap();
        assert_eq!(usage.total_mb, "15890");
        assert_eq!(usage.used_mb, "4123");
        assert_eq!(
            usage.to_string(),
            "Total Memory: 15890 MB; Used Memory: 4123 MB"
        );
    }

    #[test]
    fn memory_rejects_truncated_output() {
        assert!(matches!(
            parse_memory_usage("              total        used\n"),
            Err(StatParseError::Memory(_))
        ));
        assert!(parse_memory_usage("header\nMem: 10\n").is_err());
    }
}
