//! Separator-delimited text blocks keyed by payload id.
//!
//! Both the findings file and the callback result file are append-only
//! during a run and reordered once at the end. The reorder keeps the header
//! on top, moves stray non-block text up under it, and sorts blocks by the
//! `Payload ID: N` they carry. Rendering is canonical, so a second pass is a
//! no-op.

use std::path::Path;
use std::sync::LazyLock;
use regex::Regex;
use crate::errors::ProbeError;

static PAYLOAD_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Payload ID:\s*(\d+)").expect("static regex"));

static HIT_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"ID=(\d+)").expect("static regex"));

/// How blocks are delimited in a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStyle {
    /// Separator line before and after each block (findings file).
    Framed { ch: char, width: usize },
    /// Separator line after each block only (callback result file).
    Terminated { ch: char, width: usize },
}

impl BlockStyle {
    pub const FINDINGS: BlockStyle = BlockStyle::Framed { ch: '=', width: 70 };
    pub const CALLBACK_RESULTS: BlockStyle = BlockStyle::Terminated { ch: '-', width: 80 };

    pub fn separator(&self) -> String {
        match *self {
            BlockStyle::Framed { ch, width } | BlockStyle::Terminated { ch, width } => {
                std::iter::repeat(ch).take(width).collect()
            }
        }
    }

    /// Render one block with its delimiters and trailing blank line.
    pub fn render_block(&self, lines: &[String]) -> String {
        let sep = self.separator();
        let mut out = String::new();
        if matches!(self, BlockStyle::Framed { .. }) {
            out.push_str(&sep);
            out.push('\n');
        }
        for line in lines {
            out.push_str(line);
            out.push('\n');
        }
        out.push_str(&sep);
        out.push_str("\n\n");
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Block {
    id: u64,
    lines: Vec<String>,
}

#[derive(Debug, Default)]
struct Parsed {
    header: Vec<String>,
    blocks: Vec<Block>,
}

fn block_id(line: &str) -> Option<u64> {
    PAYLOAD_ID_RE
        .captures(line)
        .and_then(|caps| caps[1].parse::<u64>().ok())
}

fn trim_blank_edges(lines: &[String]) -> &[String] {
    let start = lines.iter().position(|l| !l.trim().is_empty()).unwrap_or(lines.len());
    let end = lines.iter().rposition(|l| !l.trim().is_empty()).map_or(start, |i| i + 1);
    &lines[start..end]
}

fn parse(content: &str, style: BlockStyle) -> Parsed {
    let sep = style.separator();
    let lines: Vec<&str> = content.lines().collect();
    let is_sep = |i: usize| lines.get(i).is_some_and(|l| *l == sep);
    let is_id = |i: usize| lines.get(i).is_some_and(|l| block_id(l).is_some());
    let opens_block = |i: usize| is_sep(i) && is_id(i + 1);
    // Inside a block a separator only closes it when block content cannot
    // follow: end of file, a blank line, or the start of the next block.
    // Payload lines that happen to equal the separator stay in the block.
    let closes_block = |i: usize| {
        is_sep(i)
            && (i + 1 >= lines.len()
                || lines[i + 1].trim().is_empty()
                || opens_block(i + 1)
                || is_id(i + 1))
    };

    let mut parsed = Parsed::default();
    let mut current: Option<Vec<String>> = None;
    let mut seen_block = false;

    for (i, line) in lines.iter().enumerate() {
        if let Some(body) = current.as_mut() {
            if closes_block(i) {
                finish_block(&mut parsed, current.take());
            } else {
                body.push(line.to_string());
            }
            continue;
        }
        if is_id(i) {
            if !seen_block {
                // Header keeps its own layout, only trailing blanks go.
                trim_trailing_blanks(&mut parsed.header);
                seen_block = true;
            }
            current = Some(vec![line.to_string()]);
        } else if is_sep(i) {
            // opening or stray separator
        } else if !seen_block || !line.trim().is_empty() {
            parsed.header.push(line.to_string());
        }
    }
    finish_block(&mut parsed, current.take());
    trim_trailing_blanks(&mut parsed.header);
    parsed
}

fn finish_block(parsed: &mut Parsed, body: Option<Vec<String>>) {
    let Some(body) = body else { return };
    let body = trim_blank_edges(&body);
    if let Some(id) = body.first().and_then(|l| block_id(l)) {
        parsed.blocks.push(Block { id, lines: body.to_vec() });
    }
}

fn trim_trailing_blanks(lines: &mut Vec<String>) {
    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }
}

/// Canonical form of a block file: header first, blocks sorted ascending by
/// payload id (ties keep their original order). Idempotent.
pub fn canonicalize(content: &str, style: BlockStyle) -> String {
    let mut parsed = parse(content, style);
    parsed.blocks.sort_by_key(|b| b.id);

    let mut out = String::new();
    if !parsed.header.is_empty() {
        for line in &parsed.header {
            out.push_str(line);
            out.push('\n');
        }
        out.push('\n');
    }
    for block in &parsed.blocks {
        out.push_str(&style.render_block(&block.lines));
    }
    out
}

/// Payload ids of every block, in file order.
pub fn block_ids(content: &str, style: BlockStyle) -> Vec<u64> {
    parse(content, style).blocks.iter().map(|b| b.id).collect()
}

/// Sort hit log lines by their `ID=N`. Lines without an id stay on top in
/// their original order; blank lines are dropped.
pub fn sort_hit_log(content: &str) -> String {
    let mut plain = Vec::new();
    let mut entries = Vec::new();
    for line in content.lines().filter(|l| !l.trim().is_empty()) {
        match HIT_ID_RE.captures(line).and_then(|c| c[1].parse::<u64>().ok()) {
            Some(id) => entries.push((id, line)),
            None => plain.push(line),
        }
    }
    entries.sort_by_key(|(id, _)| *id);

    let mut out = String::new();
    for line in plain.into_iter().chain(entries.into_iter().map(|(_, l)| l)) {
        out.push_str(line);
        out.push('\n');
    }
    out
}

async fn rewrite_with(path: &Path, transform: impl FnOnce(&str) -> String) -> Result<bool, ProbeError> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => {
            return Err(ProbeError::Persistence(format!("Cannot read {}: {}", path.display(), e)));
        }
    };
    let rewritten = transform(&content);
    if rewritten != content {
        atomic_write(path, &rewritten)
            .await
            .map_err(|e| ProbeError::Persistence(format!("Cannot rewrite {}: {}", path.display(), e)))?;
    }
    Ok(true)
}

/// Write to a sibling temp file, then rename over the target.
async fn atomic_write(path: &Path, content: &str) -> std::io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    tokio::fs::write(&tmp, content).await?;
    tokio::fs::rename(&tmp, path).await
}

/// Canonicalize a block file in place. A missing file is not an error;
/// returns whether the file existed.
pub async fn canonicalize_file(path: &Path, style: BlockStyle) -> Result<bool, ProbeError> {
    rewrite_with(path, |c| canonicalize(c, style)).await
}

pub async fn sort_hit_log_file(path: &Path) -> Result<bool, ProbeError> {
    rewrite_with(path, sort_hit_log).await
}
