// src/version/evr.rs

//! Epoch-Version-Release ordering
//!
//! Implements RPM's `rpmvercmp` semantics. Each string is read as a sequence
//! of tokens (digit runs, letter runs, `~` and `^`); anything else is a
//! separator. Tokens compare as:
//!
//! `~` < end of string < `^` < letter run < digit run
//!
//! Digit runs compare numerically, letter runs byte-wise.

use std::cmp::Ordering;
use std::fmt;

/// The orderable part of a package build: epoch, version and release
///
/// Equality follows the ordering, so `1.01` and `1.1` are equal versions
/// even though the strings differ.
#[derive(Debug, Clone)]
pub struct Evr {
    epoch: String,
    version: String,
    release: String,
}

impl Evr {
    /// Create a new EVR. An empty epoch is stored as `"0"`.
    pub fn new(
        epoch: impl Into<String>,
        version: impl Into<String>,
        release: impl Into<String>,
    ) -> Self {
        let epoch = epoch.into();
        Self {
            epoch: if epoch.is_empty() { "0".to_string() } else { epoch },
            version: version.into(),
            release: release.into(),
        }
    }

    /// Parse `[epoch:]version[-release]`
    pub fn parse(evr: &str) -> Self {
        let (epoch, vr) = evr.split_once(':').unwrap_or(("", evr));
        let (version, release) = vr.split_once('-').unwrap_or((vr, ""));
        Self::new(epoch, version, release)
    }

    pub fn epoch(&self) -> &str {
        &self.epoch
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn release(&self) -> &str {
        &self.release
    }

    /// `epoch:version-release`, always including the epoch
    pub fn as_normalized_form(&self) -> String {
        format!("{}:{}-{}", self.epoch, self.version, self.release)
    }
}

impl fmt::Display for Evr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.epoch != "0" {
            write!(f, "{}:", self.epoch)?;
        }
        write!(f, "{}-{}", self.version, self.release)
    }
}

impl PartialEq for Evr {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Evr {}

impl PartialOrd for Evr {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Evr {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_epoch(&self.epoch, &other.epoch)
            .then_with(|| rpmvercmp(&self.version, &other.version))
            .then_with(|| rpmvercmp(&self.release, &other.release))
    }
}

/// Compare two `[epoch:]version[-release]` strings
pub fn compare_evr(evr1: &str, evr2: &str) -> Ordering {
    Evr::parse(evr1).cmp(&Evr::parse(evr2))
}

fn compare_epoch(epoch1: &str, epoch2: &str) -> Ordering {
    let numeric = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    if numeric(epoch1) && numeric(epoch2) {
        compare_digits(epoch1.as_bytes(), epoch2.as_bytes())
    } else {
        rpmvercmp(epoch1, epoch2)
    }
}

/// Compare two digit runs as integers of arbitrary length
fn compare_digits(digits1: &[u8], digits2: &[u8]) -> Ordering {
    let strip = |d: &[u8]| -> usize { d.iter().take_while(|&&b| b == b'0').count() };
    let digits1 = &digits1[strip(digits1)..];
    let digits2 = &digits2[strip(digits2)..];

    digits1
        .len()
        .cmp(&digits2.len())
        .then_with(|| digits1.cmp(digits2))
}

fn is_separator(b: u8) -> bool {
    !b.is_ascii_alphanumeric() && b != b'~' && b != b'^'
}

/// Split off the leading digit (or letter) run
fn split_run(s: &[u8], numeric: bool) -> (&[u8], &[u8]) {
    let end = s
        .iter()
        .position(|&b| {
            if numeric {
                !b.is_ascii_digit()
            } else {
                !b.is_ascii_alphabetic()
            }
        })
        .unwrap_or(s.len());
    s.split_at(end)
}

/// Compare a single version or release string
pub fn rpmvercmp(version1: &str, version2: &str) -> Ordering {
    if version1 == version2 {
        return Ordering::Equal;
    }

    let mut one = version1.as_bytes();
    let mut two = version2.as_bytes();

    loop {
        while let [b, rest @ ..] = one {
            if !is_separator(*b) {
                break;
            }
            one = rest;
        }
        while let [b, rest @ ..] = two {
            if !is_separator(*b) {
                break;
            }
            two = rest;
        }

        // Tilde sorts before everything, the end of the string included
        match (one.first(), two.first()) {
            (Some(b'~'), Some(b'~')) => {
                one = &one[1..];
                two = &two[1..];
                continue;
            }
            (Some(b'~'), _) => return Ordering::Less,
            (_, Some(b'~')) => return Ordering::Greater,
            _ => {}
        }

        // Caret sorts after the end of the string but before any run
        match (one.first(), two.first()) {
            (Some(b'^'), Some(b'^')) => {
                one = &one[1..];
                two = &two[1..];
                continue;
            }
            (Some(b'^'), None) => return Ordering::Greater,
            (None, Some(b'^')) => return Ordering::Less,
            (Some(b'^'), Some(_)) => return Ordering::Less,
            (Some(_), Some(b'^')) => return Ordering::Greater,
            _ => {}
        }

        if one.is_empty() || two.is_empty() {
            break;
        }

        let numeric = one[0].is_ascii_digit();
        let (run1, rest1) = split_run(one, numeric);
        let (run2, rest2) = split_run(two, numeric);

        // Runs of different kinds: digits are newer than letters
        if run2.is_empty() {
            return if numeric {
                Ordering::Greater
            } else {
                Ordering::Less
            };
        }

        let ordering = if numeric {
            compare_digits(run1, run2)
        } else {
            run1.cmp(run2)
        };
        if ordering != Ordering::Equal {
            return ordering;
        }

        one = rest1;
        two = rest2;
    }

    match (one.is_empty(), two.is_empty()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        _ => Ordering::Greater,
    }
}
