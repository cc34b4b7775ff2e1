//! Ordered catalog of cloud releases.

use std::fmt;
use std::str::FromStr;

use crate::error::CupError;

/// Known releases in upgrade order, with their year tags.
const RELEASES: &[(&str, &str)] = &[
    ("ussuri", "2020.1"),
    ("victoria", "2020.2"),
    ("wallaby", "2021.1"),
    ("xena", "2021.2"),
    ("yoga", "2022.1"),
    ("zed", "2022.2"),
    ("antelope", "2023.1"),
    ("bobcat", "2023.2"),
    ("caracal", "2024.1"),
];

/// Release shipped by each Ubuntu series' own archive (`distro` origin).
const SERIES_DEFAULTS: &[(&str, &str)] =
    &[("focal", "ussuri"), ("jammy", "yoga"), ("noble", "caracal")];

/// A release from the catalog. Ordering follows the upgrade order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Release(usize);

impl Release {
    pub fn codename(&self) -> &'static str {
        RELEASES[self.0].0
    }

    /// Year tag such as `2024.1`.
    pub fn date(&self) -> &'static str {
        RELEASES[self.0].1
    }

    /// The release that follows this one, if the catalog knows it.
    pub fn next_release(&self) -> Option<Release> {
        (self.0 + 1 < RELEASES.len()).then(|| Release(self.0 + 1))
    }

    /// Release shipped by default on an Ubuntu series.
    pub fn series_default(series: &str) -> Option<Release> {
        SERIES_DEFAULTS
            .iter()
            .find(|(s, _)| *s == series)
            .and_then(|(_, codename)| codename.parse().ok())
    }

    /// Release selected by an origin setting such as `cloud:focal-victoria`,
    /// `cloud:focal-victoria/proposed` or `distro`.
    pub fn from_origin(origin: &str, series: &str) -> Option<Release> {
        if origin.is_empty() || origin == "distro" {
            return Self::series_default(series);
        }
        let pocket = origin.strip_prefix("cloud:")?;
        let pocket = pocket.split('/').next().unwrap_or(pocket);
        let (_, codename) = pocket.split_once('-')?;
        codename.parse().ok()
    }

    /// Release named by a charm channel track, e.g. `ussuri/stable`.
    pub fn from_channel(channel: &str) -> Option<Release> {
        channel.split('/').next().and_then(|track| track.parse().ok())
    }
}

impl FromStr for Release {
    type Err = CupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RELEASES
            .iter()
            .position(|(codename, _)| *codename == s)
            .map(Release)
            .ok_or_else(|| CupError::InvalidRelease(s.to_string()))
    }
}

impl fmt::Display for Release {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.codename())
    }
}
