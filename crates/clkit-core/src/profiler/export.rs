//! Text export of profiled events, one line per event:
//! `queue_id SEP start SEP end SEP name`.

use std::{
    io::Write,
    sync::{Mutex, PoisonError},
};

use once_cell::sync::Lazy;

use crate::error::{ClError, Result};

/// Export formatting.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportOptions {
    pub separator: String,
    pub newline: String,
    /// Written before and after the queue id.
    pub queue_delim: String,
    /// Written before and after the event name.
    pub evname_delim: String,
    /// Report times relative to the earliest start.
    pub zero_start: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            separator: "\t".into(),
            newline: "\n".into(),
            queue_delim: String::new(),
            evname_delim: String::new(),
            zero_start: true,
        }
    }
}

/* ───────────── process-wide defaults ───────────────────── */

static EXPORT_OPTIONS: Lazy<Mutex<ExportOptions>> = Lazy::new(|| Mutex::new(ExportOptions::default()));

/// Current default export options.
pub fn export_options() -> ExportOptions {
    EXPORT_OPTIONS.lock().unwrap_or_else(PoisonError::into_inner).clone()
}

/// Replaces the default export options used by `Profile::export`.
pub fn set_export_options(opts: ExportOptions) {
    *EXPORT_OPTIONS.lock().unwrap_or_else(PoisonError::into_inner) = opts;
}

/// One exported line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportRow {
    pub queue_id: usize,
    pub start: u64,
    pub end: u64,
    pub name: String,
}

pub fn write_rows<W: Write>(rows: &[ExportRow], opts: &ExportOptions, out: &mut W) -> Result<()> {
    let ExportOptions { separator: sep, newline: nl, queue_delim: qd, evname_delim: ed, .. } = opts;
    for r in rows {
        write!(out, "{qd}{}{qd}{sep}{}{sep}{}{sep}{ed}{}{ed}{nl}", r.queue_id, r.start, r.end, r.name)?;
    }
    Ok(())
}

fn strip_delim<'a>(field: &'a str, delim: &str) -> Option<&'a str> {
    if delim.is_empty() {
        return Some(field);
    }
    field.strip_prefix(delim)?.strip_suffix(delim)
}

/// Parses text written with the same `opts` back into rows.
pub fn parse_export(text: &str, opts: &ExportOptions) -> Result<Vec<ExportRow>> {
    if opts.separator.is_empty() || opts.newline.is_empty() {
        return Err(ClError::InvalidArgument("separator and newline must be non-empty to parse an export".into()));
    }
    let bad = |line: usize, what: &str| ClError::InvalidArgument(format!("export line {line}: {what}"));
    let mut rows = Vec::new();
    for (i, line) in text.split(opts.newline.as_str()).enumerate() {
        if line.is_empty() {
            continue;
        }
        let n = i + 1;
        let mut fields = line.splitn(4, opts.separator.as_str());
        let (Some(q), Some(s), Some(e), Some(name)) = (fields.next(), fields.next(), fields.next(), fields.next()) else {
            return Err(bad(n, "expected four fields"));
        };
        let q = strip_delim(q, &opts.queue_delim).ok_or_else(|| bad(n, "queue id delimiter mismatch"))?;
        let name = strip_delim(name, &opts.evname_delim).ok_or_else(|| bad(n, "event name delimiter mismatch"))?;
        rows.push(ExportRow {
            queue_id: q.parse().map_err(|_| bad(n, "queue id is not a number"))?,
            start: s.parse().map_err(|_| bad(n, "start is not a number"))?,
            end: e.parse().map_err(|_| bad(n, "end is not a number"))?,
            name: name.to_owned(),
        });
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows() -> Vec<ExportRow> {
        vec![
            ExportRow { queue_id: 0, start: 0, end: 100, name: "load".into() },
            ExportRow { queue_id: 1, start: 50, end: 200, name: "run kernel".into() },
        ]
    }

    #[test]
    fn writes_default_format() {
        let mut out = Vec::new();
        write_rows(&rows(), &ExportOptions::default(), &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "0\t0\t100\tload\n1\t50\t200\trun kernel\n");
    }

    #[test]
    fn reexport_of_parsed_text_is_identical() {
        let opts = ExportOptions {
            separator: ";".into(),
            newline: "\r\n".into(),
            queue_delim: "'".into(),
            evname_delim: "\"".into(),
            zero_start: false,
        };
        let mut first = Vec::new();
        write_rows(&rows(), &opts, &mut first).unwrap();
        let text = String::from_utf8(first).unwrap();
        assert_eq!(text, "'0';0;100;\"load\"\r\n'1';50;200;\"run kernel\"\r\n");

        let parsed = parse_export(&text, &opts).unwrap();
        assert_eq!(parsed, rows());
        let mut second = Vec::new();
        write_rows(&parsed, &opts, &mut second).unwrap();
        assert_eq!(String::from_utf8(second).unwrap(), text);
    }

    #[test]
    fn rejects_malformed_lines() {
        let opts = ExportOptions::default();
        assert!(matches!(parse_export("0\t1\t2\n", &opts), Err(ClError::InvalidArgument(_))));
        assert!(matches!(parse_export("x\t1\t2\tname\n", &opts), Err(ClError::InvalidArgument(_))));
        let quoted = ExportOptions { evname_delim: "\"".into(), ..ExportOptions::default() };
        assert!(parse_export("0\t1\t2\tname\n", &quoted).is_err());
    }
}
