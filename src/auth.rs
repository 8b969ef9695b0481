// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Resolution of the authenticated identity of an SSH session.
//!
//! With `ExposeAuthInfo yes`, sshd writes the methods used to
//! authenticate the session to a file named by `SSH_USER_AUTH`. For
//! GSSAPI logins the line is `gssapi-with-mic <principal>`.

use {
    crate::{keymap::KeyMapStore, principal},
    log::{debug, error, warn},
    std::path::PathBuf,
};

pub const SSH_CONNECTION_ENV: &str = "SSH_CONNECTION";
pub const SSH_USER_AUTH_ENV: &str = "SSH_USER_AUTH";

pub const GSSAPI_METHOD: &str = "gssapi-with-mic";

/// The parts of the process environment the session decision depends on.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SessionEnv {
    /// Whether `SSH_CONNECTION` is set (to anything).
    pub ssh_connection: bool,
    /// Location of the authentication info file.
    pub user_auth: Option<PathBuf>,
}

impl SessionEnv {
    pub fn from_process() -> Self {
        Self {
            ssh_connection: std::env::var_os(SSH_CONNECTION_ENV).is_some(),
            user_auth: std::env::var_os(SSH_USER_AUTH_ENV).map(PathBuf::from),
        }
    }

    /// A process not started by sshd.
    pub fn local() -> Self {
        Self::default()
    }

    pub fn ssh(user_auth: Option<PathBuf>) -> Self {
        Self {
            ssh_connection: true,
            user_auth,
        }
    }
}

/// What could be established about how a session authenticated.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AuthResolution {
    /// No usable authentication info.
    MethodUnknown,
    /// Method is known but no key identifier was resolved for it.
    Unresolved { method: String },
    /// GSSAPI principal mapped to a key identifier.
    Resolved { method: String, key_id: String },
}

/// Split authentication info into method and credential.
///
/// Both must be present; the credential is everything after the first
/// run of whitespace.
fn parse_auth_info(content: &str) -> Option<(&str, &str)> {
    let content = content.trim();
    let (method, credential) = content.split_once(char::is_whitespace)?;
    let credential = credential.trim_start();

    if method.is_empty() || credential.is_empty() {
        None
    } else {
        Some((method, credential))
    }
}

/// Determine the authentication method and, for GSSAPI, the mapped key.
///
/// Never fails: anything that cannot be read or understood resolves to
/// [AuthResolution::MethodUnknown] or [AuthResolution::Unresolved].
pub fn resolve(env: &SessionEnv, store: &KeyMapStore) -> AuthResolution {
    let path = match &env.user_auth {
        Some(path) => path,
        None => {
            warn!("{} not set; is ExposeAuthInfo enabled?", SSH_USER_AUTH_ENV);
            return AuthResolution::MethodUnknown;
        }
    };

    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!("unable to read auth info {}: {}", path.display(), e);
            return AuthResolution::MethodUnknown;
        }
    };

    let (method, credential) = match parse_auth_info(&content) {
        Some(v) => v,
        None => {
            warn!("unable to parse auth info {}", path.display());
            return AuthResolution::MethodUnknown;
        }
    };

    let unresolved = AuthResolution::Unresolved {
        method: method.to_string(),
    };

    if method != GSSAPI_METHOD {
        debug!("session authenticated with {}", method);
        return unresolved;
    }

    if !principal::is_valid(credential) {
        warn!("GSSAPI credential is not a valid principal");
        return unresolved;
    }

    match store.lookup(credential) {
        Ok(Some(key_id)) => {
            debug!("principal {} resolved to {}", credential, key_id);
            AuthResolution::Resolved {
                method: method.to_string(),
                key_id,
            }
        }
        Ok(None) => {
            warn!("principal {} is not mapped to any key", credential);
            unresolved
        }
        Err(e) => {
            error!("unable to resolve principal {}: {}", credential, e);
            unresolved
        }
    }
}

#[cfg(test)]
mod tests {
    use {super::*, tempfile::TempDir};

    struct Fixture {
        dir: TempDir,
        store: KeyMapStore,
    }

    impl Fixture {
        fn new(k5keys: Option<&str>) -> Self {
            let dir = TempDir::new().unwrap();
            let store = KeyMapStore::new(dir.path());
            if let Some(content) = k5keys {
                std::fs::write(store.k5keys_path(), content).unwrap();
            }

            Self { dir, store }
        }

        fn resolve_content(&self, content: &str) -> AuthResolution {
            let path = self.dir.path().join("authdata");
            std::fs::write(&path, content).unwrap();

            resolve(&SessionEnv::ssh(Some(path)), &self.store)
        }
    }

    fn unresolved(method: &str) -> AuthResolution {
        AuthResolution::Unresolved {
            method: method.to_string(),
        }
    }

    #[test]
    fn gssapi_resolves_mapped_principal() {
        let f = Fixture::new(Some("test@REALM key-3\n"));

        assert_eq!(
            f.resolve_content("gssapi-with-mic test@REALM\n"),
            AuthResolution::Resolved {
                method: GSSAPI_METHOD.to_string(),
                key_id: "key-3".to_string()
            }
        );
    }

    #[test]
    fn gssapi_unmapped_principal() {
        let f = Fixture::new(Some("test@REALM key-3\n"));

        assert_eq!(
            f.resolve_content("gssapi-with-mic unknown@REALM\n"),
            unresolved(GSSAPI_METHOD)
        );
    }

    #[test]
    fn gssapi_invalid_principal_is_not_looked_up() {
        // The mapping contains the raw string; it must still not match.
        let f = Fixture::new(Some("Bad@REALM key-1\n"));

        assert_eq!(
            f.resolve_content("gssapi-with-mic Bad@REALM"),
            unresolved(GSSAPI_METHOD)
        );
        assert_eq!(
            f.resolve_content("gssapi-with-mic a@REALM b@REALM"),
            unresolved(GSSAPI_METHOD)
        );
    }

    #[test]
    fn gssapi_missing_mapping_file() {
        let f = Fixture::new(None);

        assert_eq!(
            f.resolve_content("gssapi-with-mic test@REALM"),
            unresolved(GSSAPI_METHOD)
        );
    }

    #[test]
    fn other_methods_are_not_validated() {
        let f = Fixture::new(Some("test@REALM key-3\n"));

        assert_eq!(
            f.resolve_content("publickey ssh-ed25519 AAAAC3Nza comment with spaces\n"),
            unresolved("publickey")
        );
        assert_eq!(
            f.resolve_content("password test@REALM"),
            unresolved("password")
        );
    }

    #[test]
    fn unusable_auth_info_is_method_unknown() {
        let f = Fixture::new(Some("test@REALM key-3\n"));

        for content in ["", "\n", "   ", "password\n", "gssapi-with-mic"] {
            assert_eq!(
                f.resolve_content(content),
                AuthResolution::MethodUnknown,
                "{:?}",
                content
            );
        }
    }

    #[test]
    fn missing_auth_info_is_method_unknown() {
        let f = Fixture::new(Some("test@REALM key-3\n"));

        assert_eq!(
            resolve(&SessionEnv::ssh(None), &f.store),
            AuthResolution::MethodUnknown
        );
        assert_eq!(
            resolve(
                &SessionEnv::ssh(Some(f.dir.path().join("does-not-exist"))),
                &f.store
            ),
            AuthResolution::MethodUnknown
        );
        assert_eq!(
            resolve(&SessionEnv::ssh(Some(f.dir.path().to_path_buf())), &f.store),
            AuthResolution::MethodUnknown
        );
    }

    #[test]
    fn parse_auth_info_splits_once() {
        assert_eq!(
            parse_auth_info("  gssapi-with-mic   a@REALM \n"),
            Some(("gssapi-with-mic", "a@REALM"))
        );
        assert_eq!(
            parse_auth_info("publickey ssh-rsa AAAA x"),
            Some(("publickey", "ssh-rsa AAAA x"))
        );
        assert_eq!(parse_auth_info("method"), None);
    }
}
