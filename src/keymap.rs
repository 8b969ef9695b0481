// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! On-disk principal to key identifier mapping.
//!
//! Two files live in the service account's home directory:
//!
//! * `.k5keys` holds `principal key-<n>` pairs and is read at login time.
//! * `.k5login` lists the same principals, one per line, and is what sshd
//!   consults to authorize GSSAPI logins to the account.
//!
//! Both are regenerated wholesale by [KeyMapStore::write_all].

use {
    crate::{principal::Principal, Error},
    log::{debug, warn},
    std::{
        collections::HashSet,
        fs::{File, Permissions},
        io::{BufRead, BufReader, Write},
        os::unix::fs::PermissionsExt,
        path::{Path, PathBuf},
    },
    tempfile::NamedTempFile,
};

pub const K5LOGIN: &str = ".k5login";
pub const K5KEYS: &str = ".k5keys";

/// Tag prefixed to the title of every key registered for a principal.
pub const PRINCIPAL_TAG: &str = "gss:";

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct KeyMapping {
    pub principal: String,
    pub key_id: String,
}

/// Outcome of regenerating the mapping files.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SyncReport {
    /// Principals written, in input order.
    pub accepted: Vec<Principal>,
    /// Rows dropped for a missing tag or an invalid principal.
    pub rejected: usize,
    /// Rows dropped because their principal was already written.
    pub duplicates: usize,
}

pub struct KeyMapStore {
    k5login: PathBuf,
    k5keys: PathBuf,
}

impl KeyMapStore {
    pub fn new(home: &Path) -> Self {
        Self {
            k5login: home.join(K5LOGIN),
            k5keys: home.join(K5KEYS),
        }
    }

    pub fn k5login_path(&self) -> &Path {
        &self.k5login
    }

    pub fn k5keys_path(&self) -> &Path {
        &self.k5keys
    }

    /// Parse the mapping file.
    ///
    /// Lines that are not exactly two whitespace separated fields are
    /// skipped with a warning.
    pub fn load(&self) -> Result<Vec<KeyMapping>, Error> {
        let fh = File::open(&self.k5keys).map_err(|e| Error::storage(&self.k5keys, e))?;

        let mut mappings = vec![];

        for (index, line) in BufReader::new(fh).lines().enumerate() {
            let line = line.map_err(|e| Error::storage(&self.k5keys, e))?;

            if line.trim().is_empty() {
                continue;
            }

            let fields = line.split_whitespace().collect::<Vec<_>>();
            match fields.as_slice() {
                [principal, key_id] => mappings.push(KeyMapping {
                    principal: principal.to_string(),
                    key_id: key_id.to_string(),
                }),
                _ => {
                    warn!(
                        "{}:{}: skipping malformed mapping line",
                        self.k5keys.display(),
                        index + 1
                    );
                }
            }
        }

        Ok(mappings)
    }

    /// Resolve the key identifier of `principal`.
    ///
    /// Matching is byte exact and the first matching line wins.
    pub fn lookup(&self, principal: &str) -> Result<Option<String>, Error> {
        Ok(self
            .load()?
            .into_iter()
            .find(|m| m.principal == principal)
            .map(|m| m.key_id))
    }

    /// Replace both files with the valid subset of `rows`.
    ///
    /// Each row is `(key_id, label)` where `label` is the registered key
    /// title, `gss:<principal>`. Rows without the tag or with an invalid
    /// principal are dropped, as are repeats of an already written
    /// principal.
    pub fn write_all<I, K, L>(&self, rows: I) -> Result<SyncReport, Error>
    where
        I: IntoIterator<Item = (K, L)>,
        K: AsRef<str>,
        L: AsRef<str>,
    {
        let mut report = SyncReport::default();
        let mut seen = HashSet::new();
        let mut keys = String::new();
        let mut login = String::new();

        for (key_id, label) in rows {
            let (key_id, label) = (key_id.as_ref(), label.as_ref());

            let principal = match label
                .strip_prefix(PRINCIPAL_TAG)
                .and_then(|p| Principal::parse(p).ok())
            {
                Some(principal) => principal,
                None => {
                    debug!("dropping key {} with label {:?}", key_id, label);
                    report.rejected += 1;
                    continue;
                }
            };

            if !seen.insert(principal.clone()) {
                warn!(
                    "principal {} registered more than once; ignoring key {}",
                    principal, key_id
                );
                report.duplicates += 1;
                continue;
            }

            keys.push_str(&format!("{} {}\n", principal, key_id));
            login.push_str(&format!("{}\n", principal));
            report.accepted.push(principal);
        }

        // Mapping first: anything sshd lets in must already be resolvable.
        replace_file(&self.k5keys, keys.as_bytes())?;
        replace_file(&self.k5login, login.as_bytes())?;

        Ok(report)
    }
}

/// Atomically replace `path` with `data` via a sibling temporary file.
fn replace_file(path: &Path, data: &[u8]) -> Result<(), Error> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| Error::storage(path, e))?;
    tmp.write_all(data).map_err(|e| Error::storage(path, e))?;
    // Read by sshd and by the login shell running as the service account.
    tmp.as_file()
        .set_permissions(Permissions::from_mode(0o644))
        .map_err(|e| Error::storage(path, e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| Error::storage(path, e))?;
    tmp.persist(path)
        .map_err(|e| Error::storage(path, e.error))?;

    Ok(())
}
