// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Regeneration of the mapping files from the GitLab database.

use {
    crate::{
        keymap::{KeyMapStore, SyncReport},
        Error,
    },
    log::{debug, info},
    std::process::Command,
};

const KEYS_QUERY: &str = "select id, title from keys where title like 'gss:%'";

/// A `(key-<id>, title)` pair read from the keys table.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct KeyRow {
    pub key_id: String,
    pub title: String,
}

/// Parse unaligned, tuples-only `psql` output of `id|title` rows.
///
/// Titles are user supplied and may contain `|`, so only the first one
/// separates the fields. The id must be numeric.
pub fn parse_rows(output: &str) -> Result<Vec<KeyRow>, Error> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| match line.split_once('|') {
            Some((id, title)) if !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()) => {
                Ok(KeyRow {
                    key_id: format!("key-{}", id),
                    title: title.to_string(),
                })
            }
            _ => Err(Error::Data(line.to_string())),
        })
        .collect()
}

/// Query registered `gss:` keys with the configured `psql` wrapper.
pub fn query_keys(command: &[String]) -> Result<Vec<KeyRow>, Error> {
    let (program, leading) = command
        .split_first()
        .ok_or_else(|| Error::upstream("database query", "no command configured"))?;

    debug!("querying keys with {}", program);

    let output = Command::new(program)
        .args(leading)
        .args(["--quiet", "--no-align", "--tuples-only", "--command", KEYS_QUERY])
        .output()
        .map_err(|e| Error::upstream(program.as_str(), e))?;

    if !output.status.success() {
        return Err(Error::upstream(
            program.as_str(),
            format!(
                "{}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        ));
    }

    let stdout = String::from_utf8(output.stdout)
        .map_err(|e| Error::upstream(program.as_str(), e))?;

    parse_rows(&stdout)
}

/// Rewrite `.k5keys` and `.k5login` from the database.
pub fn sync(command: &[String], store: &KeyMapStore) -> Result<SyncReport, Error> {
    let rows = query_keys(command)?;
    let report = store.write_all(rows.iter().map(|r| (&r.key_id, &r.title)))?;

    info!(
        "wrote {} principals ({} rejected, {} duplicate)",
        report.accepted.len(),
        report.rejected,
        report.duplicates
    );

    Ok(report)
}
