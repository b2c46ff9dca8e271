//! Efficient tail reading for JSONL log tables

use serde::de::DeserializeOwned;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

const CHUNK_SIZE: u64 = 64 * 1024;

/// Read the last `n` records from a JSONL file without loading all of it
///
/// The file is read backwards in 64KB chunks, so the cost is proportional to
/// the bytes covering the last `n` lines. Lines that do not parse as `L` are
/// skipped and do not count towards `n`. Records come back in file order.
pub fn read_last_n_lines<L: DeserializeOwned>(file_path: &Path, n: usize) -> io::Result<Vec<L>> {
    let mut file = File::open(file_path)?;
    let mut offset = file.metadata()?.len();

    // Newest first while scanning
    let mut entries: Vec<L> = Vec::new();
    // Bytes of a line whose start lies in an earlier chunk
    let mut carry: Vec<u8> = Vec::new();

    while offset > 0 && entries.len() < n {
        let read_size = CHUNK_SIZE.min(offset);
        offset -= read_size;

        file.seek(SeekFrom::Start(offset))?;
        let mut chunk = vec![0u8; read_size as usize];
        file.read_exact(&mut chunk)?;
        chunk.extend_from_slice(&carry);

        // Everything before the first newline may continue in the previous chunk
        let first_newline = match chunk.iter().position(|&b| b == b'\n') {
            Some(pos) if offset > 0 => pos,
            _ => {
                if offset == 0 {
                    collect_lines_rev(&chunk, n, &mut entries);
                } else {
                    carry = chunk;
                }
                continue;
            }
        };

        collect_lines_rev(&chunk[first_newline + 1..], n, &mut entries);
        chunk.truncate(first_newline);
        carry = chunk;
    }

    entries.truncate(n);
    entries.reverse();
    Ok(entries)
}

/// Parse complete lines from the end of `buf`, newest first
fn collect_lines_rev<L: DeserializeOwned>(buf: &[u8], n: usize, entries: &mut Vec<L>) {
    for line in buf.rsplit(|&b| b == b'\n') {
        if entries.len() >= n {
            break;
        }
        if line.is_empty() {
            continue;
        }
        if let Ok(entry) = serde_json::from_slice::<L>(line) {
            entries.push(entry);
        }
    }
}
