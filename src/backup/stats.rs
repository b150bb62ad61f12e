//! Transfer statistics reported by `rsync --stats`.

use itertools::Itertools;
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::sync::OnceLock;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stat {
    Files,
    TransferredFiles,
    TotalSize,
    TransferredSize,
}

impl Stat {
    pub const ALL: [Stat; 4] = [
        Stat::Files,
        Stat::TransferredFiles,
        Stat::TotalSize,
        Stat::TransferredSize,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Stat::Files => "files",
            Stat::TransferredFiles => "transferred files",
            Stat::TotalSize => "total bytes",
            Stat::TransferredSize => "transferred bytes",
        }
    }

    fn pattern(&self) -> &'static Regex {
        static PATTERNS: OnceLock<[Regex; 4]> = OnceLock::new();
        let patterns = PATTERNS.get_or_init(|| {
            [
                r"^\s*Number of files:\s+([\d,.']+)",
                r"^\s*Number of (?:regular )?files transferred:\s+([\d,.']+)",
                r"^\s*Total file size:\s+([\d,.']+) bytes",
                r"^\s*Total transferred file size:\s+([\d,.']+) bytes",
            ]
            .map(|p| Regex::new(p).expect("stats pattern is valid"))
        });
        &patterns[*self as usize]
    }

    /// Value of this stat in `line`, thousands separators removed.
    pub fn parse_line(&self, line: &str) -> Option<u64> {
        let captures = self.pattern().captures(line)?;
        captures[1]
            .chars()
            .filter(char::is_ascii_digit)
            .collect::<String>()
            .parse()
            .ok()
    }
}

/// Running totals across every sync invocation of a job.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunStatistics {
    totals: BTreeMap<Stat, u64>,
}

impl RunStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, stat: Stat) -> Option<u64> {
        self.totals.get(&stat).copied()
    }

    pub fn add(&mut self, stat: Stat, value: u64) {
        let total = self.totals.entry(stat).or_default();
        *total = total.saturating_add(value);
    }

    /// Adds every stat found in `report` to the running totals.
    pub fn accumulate_report(&mut self, report: &str) {
        for line in report.lines() {
            if let Some((stat, value)) = Stat::ALL
                .iter()
                .find_map(|stat| stat.parse_line(line).map(|v| (*stat, v)))
            {
                tracing::trace!("Parsed {}: {value}", stat.label());
                self.add(stat, value);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.totals.is_empty()
    }
}

impl Display for RunStatistics {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.totals.is_empty() {
            return write!(f, "no statistics");
        }
        write!(
            f,
            "{}",
            self.totals
                .iter()
                .map(|(stat, value)| format!("{}: {value}", stat.label()))
                .join(", ")
        )
    }
}
