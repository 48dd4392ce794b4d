// src/version/nevra.rs

//! Package build identifiers (`name-[epoch:]version-release.arch`)

use super::evr::Evr;
use crate::error::{Error, Result};
use std::borrow::Cow;
use std::fmt;

/// A parsed Name-Epoch-Version-Release-Arch identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nevra {
    name: String,
    evr: Evr,
    arch: String,
}

impl Nevra {
    pub fn new(
        name: impl Into<String>,
        epoch: impl Into<String>,
        version: impl Into<String>,
        release: impl Into<String>,
        arch: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            evr: Evr::new(epoch, version, release),
            arch: arch.into(),
        }
    }

    /// Parse a package identifier.
    ///
    /// Accepts `name-version-release.arch`, `name-epoch:version-release.arch`
    /// and `epoch:name-version-release.arch`, with an optional `.rpm`
    /// suffix. Percent-encoded characters (`%7E` for `~`, `%5E` for `^`)
    /// are decoded first. A missing epoch defaults to `0`.
    pub fn parse(input: &str) -> Result<Self> {
        let malformed = || Error::MalformedNevra(input.to_string());

        let decoded = percent_decode(input.trim());
        let nevra = decoded.strip_suffix(".rpm").unwrap_or(&decoded);

        let (rest, arch) = nevra.rsplit_once('.').ok_or_else(malformed)?;
        let (rest, release) = rest.rsplit_once('-').ok_or_else(malformed)?;
        let (name, version) = rest.rsplit_once('-').ok_or_else(malformed)?;

        let (epoch, name, version) = match (name.split_once(':'), version.split_once(':')) {
            (None, None) => ("0", name, version),
            (None, Some((epoch, version))) => (epoch, name, version),
            (Some((epoch, name)), None) => (epoch, name, version),
            (Some(_), Some(_)) => return Err(malformed()),
        };

        let epoch = if epoch.is_empty() { "0" } else { epoch };
        if !epoch.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed());
        }
        if [name, version, release, arch].iter().any(|part| part.is_empty()) {
            return Err(malformed());
        }
        if [name, release, arch].iter().any(|part| part.contains(':')) {
            return Err(malformed());
        }

        Ok(Self::new(name, epoch, version, release, arch))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn evr(&self) -> &Evr {
        &self.evr
    }

    pub fn epoch(&self) -> &str {
        self.evr.epoch()
    }

    pub fn version(&self) -> &str {
        self.evr.version()
    }

    pub fn release(&self) -> &str {
        self.evr.release()
    }

    pub fn arch(&self) -> &str {
        &self.arch
    }

    /// `name-epoch:version-release.arch`, always including the epoch
    pub fn as_normalized_form(&self) -> String {
        format!("{}-{}.{}", self.name, self.evr.as_normalized_form(), self.arch)
    }
}

impl fmt::Display for Nevra {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}.{}", self.name, self.evr, self.arch)
    }
}

/// Decode `%XX` escapes. Invalid escapes are left untouched.
pub fn percent_decode(input: &str) -> Cow<'_, str> {
    if !input.contains('%') {
        return Cow::Borrowed(input);
    }

    let bytes = input.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hi = (bytes[i + 1] as char).to_digit(16);
            let lo = (bytes[i + 2] as char).to_digit(16);
            if let (Some(hi), Some(lo)) = (hi, lo) {
                decoded.push((hi * 16 + lo) as u8);
                i += 3;
                continue;
            }
        }
        decoded.push(bytes[i]);
        i += 1;
    }

    match String::from_utf8(decoded) {
        Ok(s) => Cow::Owned(s),
        Err(_) => Cow::Borrowed(input),
    }
}
