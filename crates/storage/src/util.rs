// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Atomic filesystem write helpers.

use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::Path;

/// Write `value` as JSON to `path` via a temp file + atomic rename.
///
/// A crash mid-write never leaves a partially-written record: the target
/// either holds the old content or the new content.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> std::io::Result<()> {
    let tmp = path.with_extension("tmp");
    let data = serde_json::to_vec_pretty(value)?;
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(&data)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)
}

/// Read and parse a JSON file, distinguishing "absent" from "unreadable".
pub(crate) fn read_json<T: serde::de::DeserializeOwned>(
    path: &Path,
) -> std::io::Result<Option<serde_json::Result<T>>> {
    match fs::read_to_string(path) {
        Ok(data) => Ok(Some(serde_json::from_str(&data))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}
