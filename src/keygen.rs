// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Generation of placeholder SSH keys.
//!
//! GitLab needs a registered public key to identify a user. The key
//! generated here is never used to authenticate: its private half is
//! discarded, and the public half is registered with the title
//! `gss:<principal>` so `syncdb` can map the principal to the key.

use {
    crate::{keymap::PRINCIPAL_TAG, principal::Principal, Error},
    log::debug,
    ssh_key::PublicKey,
    std::{path::Path, process::Command},
    tempfile::TempDir,
};

/// In-memory filesystem preferred for the throwaway private key.
const SHM_DIR: &str = "/dev/shm";

fn private_tempdir() -> Result<TempDir, Error> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("gssgitlab-");

    if Path::new(SHM_DIR).is_dir() {
        if let Ok(dir) = builder.tempdir_in(SHM_DIR) {
            return Ok(dir);
        }
    }

    Ok(builder.tempdir()?)
}

/// Generate a new key for `principal` and return its OpenSSH public key line.
///
/// `command` is the `ssh-keygen` program followed by any leading arguments.
pub fn generate(command: &[String], principal: &str) -> Result<String, Error> {
    let principal = Principal::parse(principal)?;
    let comment = format!("{}{}", PRINCIPAL_TAG, principal);

    let (program, leading) = command
        .split_first()
        .ok_or_else(|| Error::upstream("key generation", "no command configured"))?;

    let dir = private_tempdir()?;
    let key_path = dir.path().join("key");

    debug!("generating key for {} in {}", principal, dir.path().display());

    let output = Command::new(program)
        .args(leading)
        .args(["-q", "-t", "ed25519", "-N", "", "-C"])
        .arg(&comment)
        .arg("-f")
        .arg(&key_path)
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

    let public = std::fs::read_to_string(key_path.with_extension("pub"))?;
    let public = public.trim().to_string();

    let key = PublicKey::from_openssh(&public)?;
    if key.comment() != comment {
        return Err(Error::upstream(
            program.as_str(),
            format!("unexpected key comment {:?}", key.comment()),
        ));
    }

    dir.close()?;

    Ok(public)
}
