// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! GSSAPI login shell for a GitLab service account.
//!
//! GitLab only knows how to map an SSH public key to a user. This crate
//! lets users authenticate over SSH with Kerberos instead: each principal
//! is mapped to a throwaway key registered in GitLab, and at login time
//! the authenticated principal is resolved to that key's identifier
//! before handing off to `gitlab-shell`.

pub mod auth;
pub mod config;
pub mod dispatch;
pub mod keygen;
pub mod keymap;
pub mod principal;
pub mod syncdb;

use {std::path::PathBuf, thiserror::Error};

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SSH key error: {0}")]
    SshKey(#[from] ssh_key::Error),

    #[error("configuration error: {0}")]
    Config(#[from] confy::ConfyError),

    #[error("principal not valid: {0:?}")]
    InvalidPrincipal(String),

    #[error("storage error on {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed upstream row: {0:?}")]
    Data(String),

    #[error("{tool} failed: {reason}")]
    Upstream { tool: String, reason: String },
}

impl Error {
    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn upstream(tool: impl Into<String>, reason: impl ToString) -> Self {
        Self::Upstream {
            tool: tool.into(),
            reason: reason.to_string(),
        }
    }
}

/// Process exit codes.
///
/// Every terminal state of the program has its own code so callers
/// (sshd, scripts) can tell them apart.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExitCode {
    Success,
    Failure,
    Usage,
    /// SSH session without a determinable authentication method.
    NoAuthMethod,
    /// `gitlab-shell` could not be executed.
    GitlabShellExecFailed,
    /// GSSAPI principal has no key mapping.
    NotMapped,
    /// The plain shell could not be executed.
    ShellExecFailed,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
            Self::Usage => 2,
            Self::NoAuthMethod => 10,
            Self::GitlabShellExecFailed => 11,
            Self::NotMapped => 12,
            Self::ShellExecFailed => 13,
        }
    }
}
