use std::path::{Path, PathBuf};

use crate::config::StopConfig;
use crate::error::NamingError;

const MAX_SUFFIX: u32 = 1000;

/// Caller-supplied inputs for auto-generated capture file names.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct NamingInputs {
    /// Shared by captures that belong together (e.g. the mode 1 and mode 2 runs).
    pub run_id: String,
    pub port: String,
    pub baud: u32,
    pub tag: Option<String>,
}

/// Keeps `[A-Za-z0-9._-]` and drops everything else.
pub fn sanitize_token(raw: &str) -> String {
    raw.chars()
        .filter(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-'))
        .collect()
}

/// Builds e.g. `mode2_20240101_120000_pCOM5_b115200_hdr1_iter500_rows100_hold80.txt`.
pub fn auto_file_name(
    variant: u64,
    inputs: &NamingInputs,
    gating: bool,
    stop: &StopConfig,
) -> String {
    let mut tokens = vec![
        format!("mode{variant}"),
        sanitize_token(&inputs.run_id),
        format!("p{}", sanitize_token(&inputs.port)),
        format!("b{}", inputs.baud),
        format!("hdr{}", u8::from(gating)),
        format!("iter{}", stop.max_iter().unwrap_or(0)),
    ];
    if let Some(rows) = stop.max_rows() {
        tokens.push(format!("rows{rows}"));
    }
    if let Some(tag) = inputs.tag.as_deref() {
        tokens.push(sanitize_token(tag));
    }
    format!("{}.txt", tokens.join("_"))
}

/// Returns `path` if it is free, else the first free `<stem>_N<ext>` for N in 2..1000.
pub fn choose_non_overwriting_path(path: &Path) -> Result<PathBuf, NamingError> {
    if !path.exists() {
        return Ok(path.to_path_buf());
    }

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let parent = path.parent().unwrap_or_else(|| Path::new(""));

    for n in 2..MAX_SUFFIX {
        let candidate = parent.join(format!("{stem}_{n}{ext}"));
        if !candidate.exists() {
            return Ok(candidate);
        }
    }

    Err(NamingError::Exhausted {
        name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
    })
}
