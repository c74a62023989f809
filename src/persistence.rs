//! Snapshot file: one `<id> <quantity> <price>` line per record.

use crate::errors::PersistenceError;
use crate::record_lock::RecordLock;
use crate::store::Store;

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Loads the snapshot at `path` and indexes every line.
///
/// Blank lines are skipped. A missing file, a malformed line or a repeated
/// id is an error; nothing is partially loaded.
pub fn load_store<L, P>(path: P) -> Result<Store<L>, PersistenceError>
where
    L: RecordLock,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    log::info!("Loading stock snapshot from: {:?}", path);
    let file = File::open(path).map_err(|source| PersistenceError::Missing {
        path: path.to_path_buf(),
        source,
    })?;

    let mut store = Store::new();
    for (n, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let (id, quantity, price) = parse_line(&line).ok_or_else(|| PersistenceError::Malformed {
            line: n + 1,
            content: line.clone(),
        })?;
        store.insert(id, quantity, price)?;
    }

    log::info!(
        "Loaded {} stock records (tree height {})",
        store.len(),
        store.height()
    );
    Ok(store)
}

/// Overwrites `path` with every record in load order.
pub fn flush_store<L, P>(path: P, store: &Store<L>) -> Result<(), PersistenceError>
where
    L: RecordLock,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    log::info!("Writing {} stock records to: {:?}", store.len(), path);
    let mut writer = BufWriter::new(File::create(path)?);
    for record in store.enumerate() {
        let (id, quantity, price) = record.snapshot();
        writeln!(writer, "{} {} {}", id, quantity, price)?;
    }
    writer.flush()?;
    Ok(())
}

fn parse_line(line: &str) -> Option<(i64, i64, i64)> {
    let mut fields = line.split_whitespace().map(str::parse::<i64>);
    let id = fields.next()?.ok()?;
    let quantity = fields.next()?.ok()?;
    let price = fields.next()?.ok()?;
    if fields.next().is_some() || quantity < 0 {
        return None;
    }
    Some((id, quantity, price))
}
