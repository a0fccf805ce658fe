//! OS series names and the versions they stand for.

use crate::error::{PersistError, PersistResult};

const SERIES_VERSIONS: &[(&str, &str)] = &[
    ("precise", "12.04"),
    ("quantal", "12.10"),
    ("raring", "13.04"),
    ("saucy", "13.10"),
    ("trusty", "14.04"),
    ("utopic", "14.10"),
    ("vivid", "15.04"),
    ("wily", "15.10"),
    ("xenial", "16.04"),
    ("bionic", "18.04"),
    ("focal", "20.04"),
    ("jammy", "22.04"),
    ("noble", "24.04"),
    ("win2012", "win2012"),
    ("win2012r2", "win2012r2"),
    ("centos7", "centos7"),
];

/// Version of a known series.
pub fn series_version(series: &str) -> PersistResult<&'static str> {
    SERIES_VERSIONS
        .iter()
        .find(|(name, _)| *name == series)
        .map(|(_, version)| *version)
        .ok_or_else(|| PersistError::NotValid(format!("series {series:?} (unknown)")))
}
