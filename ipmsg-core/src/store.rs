//! Message log: append-only, human-readable file of received messages,
//! plus a parser reading them back.
//!
//! An empty file gains a column header first. Each message is one metadata
//! row (`time | from | len`), the body verbatim, then a blank separator
//! line. When the sender has a known alias the FROM cell reads
//! `name(address)`.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use chrono::{Local, NaiveDateTime, TimeZone};

use crate::protocol::Message;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const RULE: &str = "---------------------------------------------------------------";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("message timestamp {0} is out of range")]
    BadTimestamp(i64),
    #[error("invalid time in stored record: {0:?}")]
    BadStoredTime(String),
    #[error("invalid length in stored record: {0:?}")]
    BadStoredLen(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Append one message under `display_from` (either the bare address or
/// `name(address)`), writing the column header first on an empty file.
pub fn append_message(path: &Path, msg: &Message, display_from: &str) -> Result<(), StoreError> {
    let mut file = OpenOptions::new().append(true).create(true).open(path)?;
    if file.metadata()?.len() == 0 {
        writeln!(file, "{:<20} | {:<30} | {:>6}", "TIME", "FROM", "LEN")?;
        writeln!(file, "{}", RULE)?;
    }
    let when = Local
        .timestamp_opt(msg.date, 0)
        .single()
        .ok_or(StoreError::BadTimestamp(msg.date))?;
    writeln!(
        file,
        "{:<20} | {:<30} | {:>6}",
        when.format(TIME_FORMAT),
        display_from,
        msg.len
    )?;
    writeln!(file, "{}", msg.body)?;
    writeln!(file)?;
    Ok(())
}

/// Read every stored message back. Rows that do not split into the three
/// metadata cells are skipped; an unparseable time or length is an error.
pub fn parse_file(path: &Path) -> Result<Vec<Message>, StoreError> {
    let text = std::fs::read_to_string(path)?;
    let mut lines = text.lines();
    // Column header and rule line.
    lines.next();
    lines.next();

    let mut out = Vec::new();
    while let Some(meta) = lines.next() {
        let meta = meta.trim();
        if meta.is_empty() {
            continue;
        }
        let cells: Vec<&str> = meta.split('|').collect();
        if cells.len() != 3 {
            continue;
        }

        let time_cell = cells[0].trim();
        let when = NaiveDateTime::parse_from_str(time_cell, TIME_FORMAT)
            .map_err(|_| StoreError::BadStoredTime(time_cell.to_string()))?;
        let date = Local
            .from_local_datetime(&when)
            .single()
            .ok_or_else(|| StoreError::BadStoredTime(time_cell.to_string()))?
            .timestamp();

        let from_cell = cells[1].trim();
        let (alias, from) = match from_cell.find('(') {
            Some(i) if from_cell.ends_with(')') => (
                from_cell[..i].to_string(),
                from_cell[i + 1..from_cell.len() - 1].to_string(),
            ),
            _ => (String::new(), from_cell.to_string()),
        };

        let len_cell = cells[2].trim();
        let len = len_cell
            .parse::<u64>()
            .map_err(|_| StoreError::BadStoredLen(len_cell.to_string()))?;

        let mut body_lines = Vec::new();
        for line in lines.by_ref() {
            if line.trim().is_empty() {
                break;
            }
            body_lines.push(line);
        }

        out.push(Message {
            from,
            alias,
            len,
            date,
            body: body_lines.join("\n"),
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(body: &str) -> Message {
        Message {
            from: "192.168.1.20".to_string(),
            alias: String::new(),
            len: body.len() as u64,
            date: 1_700_000_000,
            body: body.to_string(),
        }
    }

    #[test]
    fn header_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ipmsg.txt");
        append_message(&path, &sample("one"), "192.168.1.20").unwrap();
        append_message(&path, &sample("two"), "192.168.1.20").unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches("TIME").count(), 1);
        assert!(text.starts_with("TIME"));
    }

    #[test]
    fn roundtrip_single_line_body() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ipmsg.txt");
        let msg = sample("hello world");
        append_message(&path, &msg, &msg.from).unwrap();
        let stored = parse_file(&path).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].from, msg.from);
        assert_eq!(stored[0].alias, "");
        assert_eq!(stored[0].len, msg.len);
        assert_eq!(stored[0].date, msg.date);
        assert_eq!(stored[0].body, msg.body);
    }

    #[test]
    fn roundtrip_multiline_body_and_alias() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ipmsg.txt");
        let msg = Message {
            alias: "alex".to_string(),
            body: "hello\nworld".to_string(),
            ..sample("hello\nworld")
        };
        append_message(&path, &msg, "alex(192.168.1.20)").unwrap();
        let stored = parse_file(&path).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].alias, "alex");
        assert_eq!(stored[0].from, "192.168.1.20");
        assert_eq!(stored[0].body, "hello\nworld");
    }

    #[test]
    fn malformed_metadata_row_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ipmsg.txt");
        let msg = sample("kept");
        append_message(&path, &msg, &msg.from).unwrap();
        let mut text = std::fs::read_to_string(&path).unwrap();
        text.push_str("not a metadata row\n\n");
        std::fs::write(&path, text).unwrap();
        let stored = parse_file(&path).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].body, "kept");
    }
}
