//! Dotted firmware versions as reported by devices.
//!
//! Parsing never fails: anything unreadable degrades to a defined default so a
//! malformed report can only ever mean "older than everything".

/// Parsed form of a dotted numeric version, compared lexicographically.
pub type VersionTuple = Vec<u64>;

const FALLBACK: [u64; 3] = [0, 0, 0];

/// `"1.2.3"` -> `[1, 2, 3]`; any unparseable component -> `[0, 0, 0]`.
pub fn version_tuple(version: &str) -> VersionTuple {
    version
        .split('.')
        .map(|part| part.trim().parse::<u64>())
        .collect::<Result<Vec<_>, _>>()
        .unwrap_or_else(|_| FALLBACK.to_vec())
}

/// A device report of the form `MAJOR.MINOR.PATCH` or `MAJOR.MINOR.PATCH-buildN`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportedVersion {
    pub version: String,
    pub build: i64,
}

impl ReportedVersion {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        let (version, suffix) = match raw.split_once('-') {
            Some((version, suffix)) => (version, Some(suffix)),
            None => (raw, None),
        };
        let build = suffix
            .and_then(|s| s.strip_prefix("build"))
            .and_then(|n| n.parse::<i64>().ok())
            .unwrap_or(0);
        ReportedVersion {
            version: version.to_string(),
            build,
        }
    }

    pub fn tuple(&self) -> VersionTuple {
        version_tuple(&self.version)
    }
}

/// True when `(latest, latest_build)` is newer than what the device reported.
/// Builds only matter when the dotted versions are equal.
pub fn is_newer(latest: &str, latest_build: i64, reported: &ReportedVersion) -> bool {
    let latest = version_tuple(latest);
    let current = reported.tuple();
    latest > current || (latest == current && latest_build > reported.build)
}
