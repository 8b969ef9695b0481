// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Program configuration.

use {
    crate::{keymap::KeyMapStore, Error},
    log::debug,
    serde::{Deserialize, Serialize},
    std::path::{Path, PathBuf},
};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/gssgitlab/config.toml";

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct Config {
    /// Home of the service account; holds `.k5login` and `.k5keys`.
    pub gitlab_home: PathBuf,

    /// Absolute path of `gitlab-shell`.
    pub gitlab_shell: PathBuf,

    /// Shell used for local invocations and non-GSSAPI sessions.
    pub fallback_shell: PathBuf,

    /// Key generation program followed by any leading arguments.
    pub keygen_command: Vec<String>,

    /// Database query program followed by any leading arguments.
    pub psql_command: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gitlab_home: PathBuf::from("/var/opt/gitlab"),
            gitlab_shell: PathBuf::from(
                "/opt/gitlab/embedded/service/gitlab-shell/bin/gitlab-shell",
            ),
            fallback_shell: PathBuf::from("/bin/sh"),
            keygen_command: vec!["ssh-keygen".to_string()],
            psql_command: vec!["gitlab-psql".to_string()],
        }
    }
}

impl Config {
    /// Load the configuration file at `path`, or defaults if it is absent.
    ///
    /// A missing file is never created.
    pub fn load(path: &Path) -> Result<Self, Error> {
        if path.exists() {
            debug!("loading configuration from {}", path.display());
            Ok(confy::load_path(path)?)
        } else {
            debug!("{} not found; using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn key_store(&self) -> KeyMapStore {
        KeyMapStore::new(&self.gitlab_home)
    }
}

#[cfg(test)]
mod tests {
    use {super::*, tempfile::TempDir};

    #[test]
    fn missing_file_gives_defaults_without_creating_it() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        assert_eq!(Config::load(&path).unwrap(), Config::default());
        assert!(!path.exists());
    }

    #[test]
    fn partial_file_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "gitlab_home = \"/srv/git\"\npsql_command = [\"sudo\", \"gitlab-psql\"]\n",
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.gitlab_home, PathBuf::from("/srv/git"));
        assert_eq!(config.psql_command, vec!["sudo", "gitlab-psql"]);
        assert_eq!(config.fallback_shell, Config::default().fallback_shell);
        assert_eq!(
            config.key_store().k5keys_path(),
            Path::new("/srv/git/.k5keys")
        );
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "gitlab_home = [").unwrap();

        assert!(matches!(Config::load(&path), Err(Error::Config(_))));
    }
}
