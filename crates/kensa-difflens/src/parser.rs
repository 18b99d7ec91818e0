use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::warn;

/// Marker git uses for the missing side of an added or deleted file.
pub const DEV_NULL: &str = "/dev/null";

/// Destination of a file in the new revision.
///
/// # Examples
///
/// ```
/// use kensa_difflens::parser::FilePath;
/// use std::path::Path;
///
/// let path = FilePath::Path("src/lib.rs".into());
/// assert_eq!(path.as_path(), Some(Path::new("src/lib.rs")));
/// assert_eq!(FilePath::Deleted.as_path(), None);
/// assert_eq!(FilePath::Deleted.to_string(), "/dev/null");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FilePath {
    /// The file exists in the new revision at this path.
    Path(PathBuf),
    /// The file was removed.
    Deleted,
}

impl FilePath {
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            FilePath::Path(p) => Some(p),
            FilePath::Deleted => None,
        }
    }
}

impl fmt::Display for FilePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilePath::Path(p) => write!(f, "{}", p.display()),
            FilePath::Deleted => write!(f, "{DEV_NULL}"),
        }
    }
}

/// Kind of a line inside a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LineKind {
    Added,
    Removed,
    Context,
}

/// A single line of a chunk with its resolved line number.
///
/// Added and context lines carry their number in the new file, removed lines
/// their number in the old file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffLine {
    /// Resolved line number.
    pub line_number: u32,
    /// Raw line including its leading `+`, `-` or space marker.
    pub content: String,
    /// Whether the line was added, removed, or is context.
    pub kind: LineKind,
}

/// One hunk of a file diff.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffChunk {
    /// The `@@ ... @@` header line as it appeared in the diff.
    pub header: String,
    /// Starting line in the old version.
    pub old_start: u32,
    /// Number of lines in the old version.
    pub old_lines: u32,
    /// Starting line in the new version.
    pub new_start: u32,
    /// Number of lines in the new version.
    pub new_lines: u32,
    /// Lines in source order.
    pub changes: Vec<DiffLine>,
}

/// A complete diff for a single file, containing zero or more chunks.
///
/// # Examples
///
/// ```
/// use kensa_difflens::parser::parse_unified_diff;
///
/// let diff = "diff --git a/hello.rs b/hello.rs\n\
///             --- a/hello.rs\n\
///             +++ b/hello.rs\n\
///             @@ -1,2 +1,3 @@\n \
///             fn main() {\n\
///             +    println!(\"hello\");\n \
///             }\n";
/// let files = parse_unified_diff(diff);
/// assert_eq!(files.len(), 1);
/// assert_eq!(files[0].chunks[0].changes[1].line_number, 2);
/// ```
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffFile {
    /// Path in the old version, if any.
    pub old_path: Option<PathBuf>,
    /// Destination path; `None` when the diff never named one.
    pub path: Option<FilePath>,
    /// Parsed chunks for this file.
    pub chunks: Vec<DiffChunk>,
    /// Whether this is a newly created file.
    pub is_new_file: bool,
    /// Whether this file was renamed.
    pub is_rename: bool,
    /// Whether git reported the file as binary.
    pub is_binary: bool,
}

impl DiffFile {
    fn empty() -> Self {
        Self {
            old_path: None,
            path: None,
            chunks: Vec::new(),
            is_new_file: false,
            is_rename: false,
            is_binary: false,
        }
    }

    /// Destination path when the file still exists in the new revision.
    pub fn review_path(&self) -> Option<&Path> {
        self.path.as_ref().and_then(FilePath::as_path)
    }

    /// Whether the file was removed in the new revision.
    pub fn is_deleted(&self) -> bool {
        matches!(self.path, Some(FilePath::Deleted))
    }

    /// Iterate over every line of every chunk in order.
    pub fn lines(&self) -> impl Iterator<Item = &DiffLine> {
        self.chunks.iter().flat_map(|c| c.changes.iter())
    }

    /// Count of added and removed lines.
    pub fn changed_lines(&self) -> usize {
        self.lines().filter(|l| l.kind != LineKind::Context).count()
    }
}

impl fmt::Display for DiffFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = self
            .path
            .as_ref()
            .map(|p| p.to_string())
            .unwrap_or_else(|| "<unknown>".into());
        write!(f, "{path} ({} chunks)", self.chunks.len())
    }
}

struct OpenChunk {
    chunk: DiffChunk,
    next_old: u32,
    next_new: u32,
    old_left: u32,
    new_left: u32,
}

impl OpenChunk {
    /// Consume `line` if it belongs to this chunk. Returns `false` once the
    /// line no longer fits the counts announced by the header.
    fn accept(&mut self, line: &str) -> bool {
        let (marker, kind) = match line.chars().next() {
            Some('+') => ('+', LineKind::Added),
            Some('-') => ('-', LineKind::Removed),
            Some(' ') | None => (' ', LineKind::Context),
            Some(_) => return false,
        };

        let line_number = match kind {
            LineKind::Added if self.new_left > 0 => {
                self.new_left -= 1;
                self.next_new += 1;
                self.next_new - 1
            }
            LineKind::Removed if self.old_left > 0 => {
                self.old_left -= 1;
                self.next_old += 1;
                self.next_old - 1
            }
            LineKind::Context if self.old_left > 0 && self.new_left > 0 => {
                self.old_left -= 1;
                self.new_left -= 1;
                self.next_old += 1;
                self.next_new += 1;
                self.next_new - 1
            }
            _ => return false,
        };

        let content = if line.is_empty() {
            marker.to_string()
        } else {
            line.to_string()
        };
        self.chunk.changes.push(DiffLine {
            line_number,
            content,
            kind,
        });
        true
    }

    fn is_complete(&self) -> bool {
        self.old_left == 0 && self.new_left == 0
    }
}

/// Parse a unified diff (as produced by `git diff` or the GitHub diff media
/// type) into structured [`DiffFile`] entries.
///
/// Parsing never fails. A malformed chunk header abandons only that chunk;
/// files and chunks parsed before it are kept, and stray text between files
/// is ignored.
///
/// # Examples
///
/// ```
/// use kensa_difflens::parser::parse_unified_diff;
///
/// assert!(parse_unified_diff("").is_empty());
/// ```
pub fn parse_unified_diff(input: &str) -> Vec<DiffFile> {
    let mut files: Vec<DiffFile> = Vec::new();
    let mut current: Option<DiffFile> = None;
    let mut open: Option<OpenChunk> = None;

    for line in input.lines() {
        if let Some(chunk) = open.as_mut() {
            if line == "\\ No newline at end of file" {
                continue;
            }
            if !chunk.is_complete() && chunk.accept(line) {
                continue;
            }
            close_chunk(&mut current, &mut open);
        }

        if let Some(header) = line.strip_prefix("diff --git ") {
            flush_file(&mut files, &mut current);
            let mut file = DiffFile::empty();
            if let Some((old, new)) = split_git_header(header) {
                file.old_path = Some(parse_path(old));
                file.path = Some(FilePath::Path(parse_path(new)));
            }
            current = Some(file);
            continue;
        }

        // Header-less patches start directly with the `---` line.
        if line.starts_with("--- ")
            && current
                .as_ref()
                .map_or(true, |f| !f.chunks.is_empty() || f.is_binary)
        {
            flush_file(&mut files, &mut current);
            current = Some(DiffFile::empty());
        }

        let Some(file) = current.as_mut() else {
            continue;
        };

        if line.starts_with("Binary files ") && line.ends_with(" differ") {
            file.is_binary = true;
            continue;
        }

        if line.starts_with("new file mode") {
            file.is_new_file = true;
            continue;
        }

        if line.starts_with("deleted file mode") {
            file.path = Some(FilePath::Deleted);
            continue;
        }

        if line.starts_with("rename from ") || line.starts_with("rename to ") {
            file.is_rename = true;
            continue;
        }

        if let Some(path) = line.strip_prefix("--- ") {
            file.old_path = match path_or_null(path) {
                FilePath::Path(p) => Some(p),
                FilePath::Deleted => None,
            };
            continue;
        }

        if let Some(path) = line.strip_prefix("+++ ") {
            file.path = Some(path_or_null(path));
            continue;
        }

        if line.starts_with("@@") {
            match parse_hunk_header(line) {
                Some((old_start, old_lines, new_start, new_lines)) => {
                    open = Some(OpenChunk {
                        chunk: DiffChunk {
                            header: line.to_string(),
                            old_start,
                            old_lines,
                            new_start,
                            new_lines,
                            changes: Vec::new(),
                        },
                        next_old: old_start,
                        next_new: new_start,
                        old_left: old_lines,
                        new_left: new_lines,
                    });
                }
                None => {
                    warn!(header = line, file = %file, "skipping malformed chunk header");
                }
            }
        }
    }

    close_chunk(&mut current, &mut open);
    flush_file(&mut files, &mut current);

    files
}

fn close_chunk(current: &mut Option<DiffFile>, open: &mut Option<OpenChunk>) {
    if let Some(c) = open.take() {
        if let Some(file) = current.as_mut() {
            file.chunks.push(c.chunk);
        }
    }
}

fn flush_file(files: &mut Vec<DiffFile>, current: &mut Option<DiffFile>) {
    if let Some(file) = current.take() {
        files.push(file);
    }
}

/// Split `a/<old> b/<new>` from a `diff --git` header.
fn split_git_header(header: &str) -> Option<(&str, &str)> {
    if let Some(rest) = header.strip_prefix('"') {
        // "a/old name" "b/new name"
        let end = rest.find("\" ")?;
        return Some((&header[..end + 2], header[end + 3..].trim()));
    }
    let idx = header.rfind(" b/")?;
    Some((&header[..idx], &header[idx + 1..]))
}

fn path_or_null(raw: &str) -> FilePath {
    // git may append a tab and timestamp to the path
    let raw = raw.split('\t').next().unwrap_or(raw).trim_end();
    if raw == DEV_NULL {
        FilePath::Deleted
    } else {
        FilePath::Path(parse_path(raw))
    }
}

fn parse_path(raw: &str) -> PathBuf {
    let normalized = raw.trim_matches('"');

    let stripped = normalized
        .strip_prefix("a/")
        .or_else(|| normalized.strip_prefix("b/"))
        .unwrap_or(normalized);

    PathBuf::from(stripped)
}

fn parse_hunk_header(line: &str) -> Option<(u32, u32, u32, u32)> {
    let inner = line.strip_prefix("@@ ").and_then(|s| {
        let end = s.find(" @@")?;
        Some(&s[..end])
    })?;

    let (old, new) = inner.split_once(' ')?;
    let (old_start, old_lines) = parse_range(old.strip_prefix('-')?)?;
    let (new_start, new_lines) = parse_range(new.strip_prefix('+')?)?;

    Some((old_start, old_lines, new_start, new_lines))
}

/// `start + count` must fit in a `u32`, otherwise the line counters of the
/// chunk would overflow.
fn parse_range(range: &str) -> Option<(u32, u32)> {
    let (start, count): (u32, u32) = match range.split_once(',') {
        Some((start, count)) => (start.parse().ok()?, count.parse().ok()?),
        None => (range.parse().ok()?, 1),
    };
    start.checked_add(count)?;
    Some((start, count))
}
