use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

/// Literal prefix of the firmware's configuration banner (`CFG,key=value,...`).
pub const CFG_PREFIX: &str = "CFG,";

/// Exact CSV header the firmware prints before its data rows.
pub const CSV_HEADER: &str = "iter,mode,high_wait_ticks,low_hold_ticks,medium_spin_count";

fn data_row_regex() -> &'static Regex {
    static DATA_RE: OnceLock<Regex> = OnceLock::new();
    DATA_RE.get_or_init(|| {
        Regex::new(r"^([0-9]+),([0-9]+),([0-9]+),([0-9]+),([0-9]+)$")
            .expect("data row pattern compiles")
    })
}

/// One parsed data row, in the column order of [`CSV_HEADER`].
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct DataRow {
    pub iter: u64,
    pub mode: u64,
    pub high_wait: u64,
    pub low_hold: u64,
    pub spin: u64,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ClassifiedLine<'a> {
    Config(BTreeMap<String, String>),
    Header,
    Data(DataRow),
    Other(&'a str),
}

impl ClassifiedLine<'_> {
    pub fn is_start_marker(&self) -> bool {
        matches!(self, ClassifiedLine::Config(_) | ClassifiedLine::Header)
    }
}

/// Classifies a single newline-normalized line.
///
/// Total and stateless: anything that is not a config banner, the exact header, or a
/// well-formed five-integer row comes back as [`ClassifiedLine::Other`] carrying the
/// input unchanged.
pub fn classify(line: &str) -> ClassifiedLine<'_> {
    let trimmed = line.trim();

    if let Some(payload) = trimmed.strip_prefix(CFG_PREFIX) {
        return ClassifiedLine::Config(parse_config_payload(payload));
    }

    if trimmed == CSV_HEADER {
        return ClassifiedLine::Header;
    }

    match parse_data_row(trimmed) {
        Some(row) => ClassifiedLine::Data(row),
        None => ClassifiedLine::Other(line),
    }
}

fn parse_config_payload(payload: &str) -> BTreeMap<String, String> {
    let mut cfg = BTreeMap::new();
    for piece in payload.split(',') {
        let Some((key, value)) = piece.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        cfg.insert(key.to_string(), value.trim().to_string());
    }
    cfg
}

fn parse_data_row(trimmed: &str) -> Option<DataRow> {
    let caps = data_row_regex().captures(trimmed)?;
    let field = |idx: usize| -> Option<u64> { caps.get(idx)?.as_str().parse().ok() };
    Some(DataRow {
        iter: field(1)?,
        mode: field(2)?,
        high_wait: field(3)?,
        low_hold: field(4)?,
        spin: field(5)?,
    })
}
