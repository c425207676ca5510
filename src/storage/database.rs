// Opening sled databases. Dropping the last handle releases the file lock on a
// background thread, so a close followed by an immediate reopen can find the
// lock still held. Those opens are retried with a bounded backoff.

use crate::error::{ChainError, Result};
use log::debug;
use sled::Db;
use std::io::ErrorKind;
use std::path::Path;
use std::thread;
use std::time::Duration;

const OPEN_ATTEMPTS: u32 = 12;
const INITIAL_BACKOFF_MS: u64 = 5;
const MAX_BACKOFF_MS: u64 = 400;

pub fn open_database(path: &Path) -> Result<Db> {
    let mut backoff = INITIAL_BACKOFF_MS;
    let mut attempt = 1;
    loop {
        match sled::open(path) {
            Ok(db) => return Ok(db),
            Err(e) if is_lock_contention(&e) && attempt < OPEN_ATTEMPTS => {
                debug!(
                    "Database at {} is still locked, retrying in {backoff}ms ({attempt}/{OPEN_ATTEMPTS})",
                    path.display()
                );
                thread::sleep(Duration::from_millis(backoff));
                backoff = (backoff * 2).min(MAX_BACKOFF_MS);
                attempt += 1;
            }
            Err(e) => {
                return Err(ChainError::Database(format!(
                    "Failed to open database at {}: {e}",
                    path.display()
                )))
            }
        }
    }
}

fn is_lock_contention(err: &sled::Error) -> bool {
    match err {
        sled::Error::Io(e) => {
            e.kind() == ErrorKind::WouldBlock || e.to_string().contains("could not acquire lock")
        }
        _ => false,
    }
}
