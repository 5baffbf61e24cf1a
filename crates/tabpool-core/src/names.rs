//! Archive entry name repair and filesystem-safe output names
//!
//! Zip bundles from the registry frequently carry entry names written under
//! legacy CJK encodings; decoded as UTF-8 they surface as replacement
//! characters. Repair re-decodes the raw name bytes under a ranked list of
//! candidate encodings and keeps a result only when it measurably reduces
//! the damage.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

/// Marker inserted wherever bytes failed to decode.
const MARKER: char = '\u{FFFD}';

/// Default cap on sanitized name length, in characters.
pub const MAX_NAME_LEN: usize = 120;

/// Fallback when sanitizing leaves nothing.
const EMPTY_FALLBACK: &str = "file";

static FORBIDDEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1F]"#).expect("forbidden-chars regex"));
static DISALLOWED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[^0-9A-Za-z._\- \u{4e00}-\u{9fff}]+").expect("allow-list regex")
});
static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace regex"));
static UNDERSCORES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_+").expect("underscore regex"));
// Sanitizing turns "(4)" into "_4_", so the counter may be wrapped in
// leftover separators on either side.
static TRAILING_COUNTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\s_\-]*(\(\d+\)|\d+)[\s_\-]*$").expect("trailing-counter regex")
});

fn marker_count(s: &str) -> usize {
    s.chars().filter(|c| *c == MARKER).count()
}

/// Recover a garbled archive entry name from its raw bytes.
///
/// The lossy UTF-8 decode is the baseline; a candidate re-decode is adopted
/// only when it strictly reduces the replacement-character count, so the
/// result is never worse than the input.
pub fn repair_entry_name(raw: &[u8]) -> String {
    let original = String::from_utf8_lossy(raw).into_owned();
    let defects = marker_count(&original);
    if defects == 0 {
        return original;
    }
    // Ranked candidates; first minimum wins.
    let candidates = [encoding_rs::UTF_8, encoding_rs::GBK, encoding_rs::BIG5];
    let mut best: Option<(usize, String)> = None;
    for encoding in candidates {
        let (decoded, _, _) = encoding.decode(raw);
        let count = marker_count(&decoded);
        if best.as_ref().is_none_or(|(fewest, _)| count < *fewest) {
            best = Some((count, decoded.into_owned()));
        }
    }
    match best {
        Some((count, repaired)) if count < defects => repaired,
        _ => original,
    }
}

/// Make `name` safe for common filesystems.
///
/// NFKC-normalizes, replaces forbidden and non-allow-listed characters with
/// underscores, collapses whitespace and underscore runs, and truncates to
/// `max_len` characters while keeping the extension. Idempotent.
pub fn sanitize(name: &str, max_len: usize) -> String {
    let name: String = name.nfkc().collect();
    let name = FORBIDDEN.replace_all(&name, "_");
    let name = DISALLOWED.replace_all(&name, "_");
    let name = WHITESPACE.replace_all(&name, " ");
    let name = name.trim();
    let name = UNDERSCORES.replace_all(name, "_").into_owned();

    let name = if name.chars().count() > max_len {
        let (stem, ext) = split_extension(&name);
        let keep = max_len.saturating_sub(ext.chars().count());
        let mut truncated: String = stem.chars().take(keep).collect();
        truncated.push_str(ext);
        truncated
    } else {
        name
    };

    if name.is_empty() {
        EMPTY_FALLBACK.to_string()
    } else {
        name
    }
}

/// Normalized grouping key for "same logical table, different file".
///
/// `train_1.csv`, `train_2.csv`, and `train (3).csv` all map to `train`.
pub fn name_signature(filename: &str) -> String {
    let base = Path::new(filename)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let base = sanitize(&base, MAX_NAME_LEN);
    let (stem, _) = split_extension(&base);
    let stem = stem.to_lowercase();
    let stem = TRAILING_COUNTER.replace(&stem, "");
    stem.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Build the permanent output name: sanitized stem, short hash, extension.
///
/// The hash suffix keeps names unique even when distinct files share a
/// sanitized stem.
pub fn build_output_name(orig_basename: &str, md5_hex: &str) -> String {
    let (stem, ext) = split_extension(orig_basename);
    let ext = if ext.is_empty() { ".csv" } else { ext };
    let short = &md5_hex[..md5_hex.len().min(10)];
    format!("{}_{short}{ext}", sanitize(stem, MAX_NAME_LEN))
}

/// Insert `suffix` between stem and extension: `a.csv` + `_1` gives `a_1.csv`.
pub fn append_suffix(name: &str, suffix: &str) -> String {
    let (stem, ext) = split_extension(name);
    format!("{stem}{suffix}{ext}")
}

/// Split a filename into stem and extension (extension keeps its dot).
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => name.split_at(idx),
        _ => (name, ""),
    }
}
