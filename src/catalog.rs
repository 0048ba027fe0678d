//! Test discovery.
//!
//! A test is any file in the test directory whose name matches
//! `test<major>.<minor>`. The numeric pair is the test's identity; the
//! catalog keeps cases keyed (and therefore ordered) by it.

use crate::errors::{CatalogError, ConfigError};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static FILE_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^test(\d+)\.(\d+)$").expect("file name regex is valid"));

static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"test(\d+)\.(\d+)").expect("token regex is valid"));

/// Identity of a test: the `(major, minor)` pair from its file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TestId {
    pub major: u32,
    pub minor: u32,
}

impl TestId {
    pub fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Parse a directory entry name. Only exact `test<M>.<N>` names match.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let caps = FILE_NAME_RE.captures(name)?;
        Some(Self::new(caps[1].parse().ok()?, caps[2].parse().ok()?))
    }

    /// Find the first `test<M>.<N>` token anywhere in `text`.
    pub fn find_in(text: &str) -> Option<Self> {
        let caps = TOKEN_RE.captures(text)?;
        Some(Self::new(caps[1].parse().ok()?, caps[2].parse().ok()?))
    }

    /// File name of the test program.
    pub fn file_name(&self) -> String {
        format!("test{}", self)
    }

    /// File name of the per-test log.
    pub fn log_name(&self) -> String {
        format!("test{}.log", self)
    }
}

impl std::fmt::Display for TestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl std::str::FromStr for TestId {
    type Err = ConfigError;

    /// Accepts `M.N` or `testM.N`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let bare = trimmed.strip_prefix("test").unwrap_or(trimmed);
        let (major, minor) = bare
            .split_once('.')
            .ok_or_else(|| ConfigError::InvalidTestId(s.to_string()))?;
        match (major.parse(), minor.parse()) {
            (Ok(major), Ok(minor)) => Ok(Self::new(major, minor)),
            _ => Err(ConfigError::InvalidTestId(s.to_string())),
        }
    }
}

impl Serialize for TestId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TestId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// One side of a [`TestPattern`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Any,
    Exact(u32),
}

impl Component {
    fn matches(self, value: u32) -> bool {
        match self {
            Component::Any => true,
            Component::Exact(n) => n == value,
        }
    }

    fn parse(s: &str) -> Option<Self> {
        if s == "*" {
            Some(Component::Any)
        } else {
            s.parse().ok().map(Component::Exact)
        }
    }
}

/// Include/exclude filter entry: `M.N` where either side may be `*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestPattern {
    pub major: Component,
    pub minor: Component,
}

impl TestPattern {
    pub fn matches(&self, id: TestId) -> bool {
        self.major.matches(id.major) && self.minor.matches(id.minor)
    }
}

impl std::str::FromStr for TestPattern {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let bare = trimmed.strip_prefix("test").unwrap_or(trimmed);
        let invalid = || ConfigError::InvalidPattern(s.to_string());
        let (major, minor) = bare.split_once('.').ok_or_else(invalid)?;
        Ok(Self {
            major: Component::parse(major).ok_or_else(invalid)?,
            minor: Component::parse(minor).ok_or_else(invalid)?,
        })
    }
}

impl std::fmt::Display for TestPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let side = |c: Component| match c {
            Component::Any => "*".to_string(),
            Component::Exact(n) => n.to_string(),
        };
        write!(f, "{}.{}", side(self.major), side(self.minor))
    }
}

/// A discovered test program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCase {
    pub id: TestId,
    pub path: PathBuf,
}

/// The filtered set of tests found in a directory, ascending by id.
#[derive(Debug, Clone, Default)]
pub struct TestCatalog {
    cases: BTreeMap<TestId, TestCase>,
}

impl TestCatalog {
    pub fn get(&self, id: TestId) -> Option<&TestCase> {
        self.cases.get(&id)
    }

    pub fn contains(&self, id: TestId) -> bool {
        self.cases.contains_key(&id)
    }

    /// Ids in `(major, minor)` ascending order.
    pub fn ids(&self) -> Vec<TestId> {
        self.cases.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }
}

/// Whether `id` survives the include/exclude filters.
pub fn is_selected(id: TestId, include: &[TestPattern], exclude: &[TestPattern]) -> bool {
    if exclude.iter().any(|p| p.matches(id)) {
        return false;
    }
    include.is_empty() || include.iter().any(|p| p.matches(id))
}

/// Scan `dir` for `test<M>.<N>` files and apply the filters.
///
/// Non-matching entries are ignored. An empty result is an error: there is
/// nothing to run.
pub fn discover(
    dir: &Path,
    include: &[TestPattern],
    exclude: &[TestPattern],
) -> Result<TestCatalog, CatalogError> {
    let entries = std::fs::read_dir(dir).map_err(|source| CatalogError::ReadDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut cases = BTreeMap::new();
    for entry in entries.filter_map(|e| e.ok()) {
        // Follows symlinks, so a linked test program is still a test.
        if !entry.path().is_file() {
            continue;
        }
        let name = entry.file_name();
        let Some(id) = name.to_str().and_then(TestId::from_file_name) else {
            continue;
        };
        if !is_selected(id, include, exclude) {
            continue;
        }
        cases.insert(
            id,
            TestCase {
                id,
                path: entry.path(),
            },
        );
    }

    if cases.is_empty() {
        return Err(CatalogError::NoTests {
            path: dir.to_path_buf(),
        });
    }

    tracing::debug!(count = cases.len(), dir = %dir.display(), "discovered tests");
    Ok(TestCatalog { cases })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), "#!/bin/sh\nexit 0\n").unwrap();
    }

    fn patterns(list: &[&str]) -> Vec<TestPattern> {
        list.iter().map(|s| s.parse().unwrap()).collect()
    }

    #[test]
    fn test_id_parses_file_names() {
        assert_eq!(TestId::from_file_name("test1.2"), Some(TestId::new(1, 2)));
        assert_eq!(TestId::from_file_name("test21.10"), Some(TestId::new(21, 10)));
        assert_eq!(TestId::from_file_name("test1.2.log"), None);
        assert_eq!(TestId::from_file_name("mytest1.2"), None);
        assert_eq!(TestId::from_file_name("test1"), None);
    }

    #[test]
    fn test_id_display_and_parse() {
        let id: TestId = "test3.14".parse().unwrap();
        assert_eq!(id, TestId::new(3, 14));
        assert_eq!(id.to_string(), "3.14");
        assert_eq!(id.file_name(), "test3.14");
        assert_eq!(id.log_name(), "test3.14.log");
        assert_eq!("3.14".parse::<TestId>().unwrap(), id);
        assert!("3".parse::<TestId>().is_err());
        assert!("a.b".parse::<TestId>().is_err());
    }

    #[test]
    fn test_id_orders_numerically() {
        let mut ids = vec![TestId::new(10, 1), TestId::new(2, 3), TestId::new(2, 1)];
        ids.sort();
        assert_eq!(ids, vec![TestId::new(2, 1), TestId::new(2, 3), TestId::new(10, 1)]);
    }

    #[test]
    fn test_id_serializes_as_string() {
        let json = serde_json::to_string(&TestId::new(4, 2)).unwrap();
        assert_eq!(json, "\"4.2\"");
        let back: TestId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, TestId::new(4, 2));
    }

    #[test]
    fn test_pattern_wildcards() {
        let p: TestPattern = "1.*".parse().unwrap();
        assert!(p.matches(TestId::new(1, 7)));
        assert!(!p.matches(TestId::new(2, 7)));

        let p: TestPattern = "*.3".parse().unwrap();
        assert!(p.matches(TestId::new(9, 3)));
        assert!(!p.matches(TestId::new(9, 4)));

        let p: TestPattern = "test5.1".parse().unwrap();
        assert!(p.matches(TestId::new(5, 1)));
        assert_eq!(p.to_string(), "5.1");

        assert!("1".parse::<TestPattern>().is_err());
        assert!("x.1".parse::<TestPattern>().is_err());
    }

    #[test]
    fn test_discover_ignores_non_matching_entries() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "test1.1");
        touch(dir.path(), "test2.3");
        touch(dir.path(), "test2.3.log");
        touch(dir.path(), "README");
        fs::create_dir(dir.path().join("test9.9")).unwrap();

        let catalog = discover(dir.path(), &[], &[]).unwrap();
        assert_eq!(catalog.ids(), vec![TestId::new(1, 1), TestId::new(2, 3)]);
        assert_eq!(
            catalog.get(TestId::new(2, 3)).unwrap().path,
            dir.path().join("test2.3")
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_discover_follows_symlinked_tests() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "test1.1");
        fs::create_dir(dir.path().join("bin")).unwrap();
        touch(&dir.path().join("bin"), "prog");
        std::os::unix::fs::symlink(dir.path().join("bin/prog"), dir.path().join("test3.1")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("bin"), dir.path().join("test4.1")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("missing"), dir.path().join("test5.1")).unwrap();

        let catalog = discover(dir.path(), &[], &[]).unwrap();
        assert_eq!(catalog.ids(), vec![TestId::new(1, 1), TestId::new(3, 1)]);
        assert_eq!(
            catalog.get(TestId::new(3, 1)).unwrap().path,
            dir.path().join("test3.1")
        );
    }

    #[test]
    fn test_discover_applies_filters() {
        let dir = tempdir().unwrap();
        for name in ["test1.1", "test1.2", "test2.1", "test3.1"] {
            touch(dir.path(), name);
        }

        let catalog = discover(dir.path(), &patterns(&["1.*", "3.1"]), &patterns(&["1.2"])).unwrap();
        assert_eq!(catalog.ids(), vec![TestId::new(1, 1), TestId::new(3, 1)]);

        let catalog = discover(dir.path(), &[], &patterns(&["*.1"])).unwrap();
        assert_eq!(catalog.ids(), vec![TestId::new(1, 2)]);
    }

    #[test]
    fn test_discover_empty_is_error() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "test1.1");
        let result = discover(dir.path(), &[], &patterns(&["*.*"]));
        assert!(matches!(result, Err(CatalogError::NoTests { .. })));
    }

    #[test]
    fn test_discover_missing_dir_is_error() {
        let dir = tempdir().unwrap();
        let result = discover(&dir.path().join("nope"), &[], &[]);
        assert!(matches!(result, Err(CatalogError::ReadDir { .. })));
    }
}
