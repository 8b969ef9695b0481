// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Kerberos principal validation.
//!
//! The same grammar guards both the principals written into the key
//! mapping and the credentials reported by sshd, so a string that can be
//! looked up is always one that could have been stored.

use {
    crate::Error,
    once_cell::sync::Lazy,
    regex::Regex,
    std::{
        fmt::{Display, Formatter},
        str::FromStr,
    },
};

static PRINCIPAL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z][a-z0-9/_.\-]*@[A-Z.\-]+$").expect("principal pattern is a valid regex")
});

/// Whether `candidate` is a well-formed `name@REALM` principal.
pub fn is_valid(candidate: &str) -> bool {
    PRINCIPAL_RE.is_match(candidate)
}

/// A principal that has passed [is_valid].
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Principal(String);

impl Principal {
    pub fn parse(candidate: &str) -> Result<Self, Error> {
        if is_valid(candidate) {
            Ok(Self(candidate.to_string()))
        } else {
            Err(Error::InvalidPrincipal(candidate.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Principal {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Display for Principal {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
