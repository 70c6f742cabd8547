//! The generic content record.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{trace, warn};
use uuid::Uuid;

use crate::content::codec;
use crate::content::error::{ContentError, ContentResult};

/// reserved key carrying the identity; never stored as a plain property
pub const UUID_KEY: &str = "uuid";

/// reserved key carrying the abstract path (`/name/name/...`)
pub const PATH_KEY: &str = "path";

/// key of the revision property in head-only query results
pub const HEAD_KEY: &str = "HEAD";

/// key of the directory name in node listings
pub const NAME_KEY: &str = "name";

/// A UUID-identified, field/value record.
///
/// Properties are kept sorted by key. The physical location is derived from
/// the repository base, the path segments and the UUID. Two instances are
/// equal when their UUIDs and property sets are equal; the repository base
/// and the segments are not part of the identity.
#[derive(Debug, Clone, Default)]
pub struct GenericContent {
    repository_base: PathBuf,
    uuid: Option<Uuid>,
    segments: Vec<String>,
    properties: BTreeMap<String, String>,
}

impl GenericContent {
    /// create content below `base` from parallel lists of path names and values
    ///
    /// every `names[i] = values[i]` pair becomes a property, the values are
    /// the directory segments and the names form the abstract path
    pub fn new<N, V>(base: impl Into<PathBuf>, names: &[N], values: &[V]) -> Self
    where
        N: AsRef<str>,
        V: AsRef<str>,
    {
        let mut content = Self {
            repository_base: base.into(),
            uuid: None,
            segments: values.iter().map(|v| v.as_ref().to_string()).collect(),
            properties: BTreeMap::new(),
        };

        if !names.is_empty() {
            let abstract_path: String = names.iter().map(|n| format!("/{}", n.as_ref())).collect();
            content.properties.insert(PATH_KEY.to_string(), abstract_path);
        }

        for (name, value) in names.iter().zip(values) {
            content.set_property(name.as_ref(), value.as_ref());
        }

        content
    }

    /// same as [`GenericContent::new`] with a fixed identity
    pub fn with_uuid<N, V>(base: impl Into<PathBuf>, names: &[N], values: &[V], uuid: Uuid) -> Self
    where
        N: AsRef<str>,
        V: AsRef<str>,
    {
        let mut content = Self::new(base, names, values);
        content.uuid = Some(uuid);
        content
    }

    /// content without location or identity
    pub fn detached() -> Self {
        Self::default()
    }

    pub fn uuid(&self) -> Option<Uuid> {
        self.uuid
    }

    pub fn set_uuid(&mut self, uuid: Uuid) -> &mut Self {
        self.uuid = Some(uuid);
        self
    }

    /// return the identity, assigning a random one first if there is none
    pub fn ensure_uuid(&mut self) -> Uuid {
        *self.uuid.get_or_insert_with(Uuid::new_v4)
    }

    pub fn repository_base(&self) -> &Path {
        &self.repository_base
    }

    pub fn set_repository_base(&mut self, base: impl Into<PathBuf>) -> &mut Self {
        self.repository_base = base.into();
        self
    }

    /// the directory segments below the repository base
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub(crate) fn set_segments(&mut self, segments: Vec<String>) {
        self.segments = segments;
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// set a property in memory; nothing reaches disk before [`GenericContent::store`]
    ///
    /// `uuid` is routed to the identity: a parseable value replaces it,
    /// anything else is ignored with a warning
    pub fn set_property(&mut self, key: impl Into<String>, value: impl ToString) -> &mut Self {
        let key = key.into();
        let value = value.to_string();

        if key == UUID_KEY {
            match Uuid::parse_str(&value) {
                Ok(uuid) => self.uuid = Some(uuid),
                Err(e) => warn!(value = %value, error = %e, "ignoring unparseable uuid property"),
            }
            return self;
        }

        self.properties.insert(key, value);
        self
    }

    pub fn remove_property(&mut self, key: &str) -> Option<String> {
        self.properties.remove(key)
    }

    /// the abstract path, if one was given
    pub fn path(&self) -> Option<&str> {
        self.property(PATH_KEY)
    }

    pub fn set_path(&mut self, path: impl Into<String>) -> &mut Self {
        self.properties.insert(PATH_KEY.to_string(), path.into());
        self
    }

    /// check every segment for use as a directory name
    pub fn validate(&self) -> ContentResult<()> {
        self.segments.iter().try_for_each(|s| validate_segment(s))
    }

    /// location relative to the repository base
    pub fn relative_location(&self) -> ContentResult<PathBuf> {
        let uuid = self.uuid.ok_or(ContentError::MissingUuid)?;
        let mut path: PathBuf = self.segments.iter().collect();
        path.push(uuid.to_string());
        Ok(path)
    }

    /// location inside a git tree (always `/`-separated)
    pub fn tree_path(&self) -> ContentResult<String> {
        let uuid = self.uuid.ok_or(ContentError::MissingUuid)?;
        let mut parts: Vec<&str> = self.segments.iter().map(String::as_str).collect();
        let uuid = uuid.to_string();
        parts.push(&uuid);
        Ok(parts.join("/"))
    }

    /// absolute location in the working tree
    pub fn file_location(&self) -> ContentResult<PathBuf> {
        Ok(self.repository_base.join(self.relative_location()?))
    }

    /// write the current state to the working tree, replacing any previous copy
    pub fn store(&self) -> ContentResult<PathBuf> {
        self.validate()?;
        let location = self.file_location()?;

        if let Some(parent) = location.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&location, codec::encode(self)?)?;

        trace!(path = %location.display(), "stored content");
        Ok(location)
    }

    /// read content back from `base/relative`
    pub fn load(base: impl Into<PathBuf>, relative: impl AsRef<Path>) -> ContentResult<Self> {
        let base = base.into();
        let relative = relative.as_ref();
        let bytes = fs::read(base.join(relative))?;
        let expected = relative
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| Uuid::parse_str(name).ok());

        codec::decode(&bytes, base, expected.as_ref(), relative)
    }
}

impl PartialEq for GenericContent {
    fn eq(&self, other: &Self) -> bool {
        self.uuid == other.uuid && self.properties == other.properties
    }
}

impl Eq for GenericContent {}

/// validate a single directory segment
pub fn validate_segment(segment: &str) -> ContentResult<()> {
    let invalid = |reason| {
        Err(ContentError::InvalidSegment {
            segment: segment.to_string(),
            reason,
        })
    };

    if segment.is_empty() {
        return invalid("segment cannot be empty");
    }
    if segment == "." || segment == ".." {
        return invalid("relative segments are not allowed");
    }
    if segment.eq_ignore_ascii_case(".git") {
        return invalid("reserved by the repository");
    }
    if segment.contains(['/', '\\', '\0']) {
        return invalid("segment cannot contain separators");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_new_builds_path_and_properties() {
        let content = GenericContent::new("/repo", &["x", "y"], &["a", "b"]);

        assert_eq!(content.property("x"), Some("a"));
        assert_eq!(content.property("y"), Some("b"));
        assert_eq!(content.path(), Some("/x/y"));
        assert_eq!(content.segments(), ["a", "b"]);
        assert!(content.uuid().is_none());
    }

    #[test]
    fn test_uuid_property_sets_identity() {
        let uuid = Uuid::new_v4();
        let mut content = GenericContent::detached();
        content.set_property(UUID_KEY, uuid);

        assert_eq!(content.uuid(), Some(uuid));
        assert!(content.property(UUID_KEY).is_none());

        content.set_property(UUID_KEY, "not-a-uuid");
        assert_eq!(content.uuid(), Some(uuid));
    }

    #[test]
    fn test_equality_ignores_location() {
        let uuid = Uuid::new_v4();
        let a = GenericContent::with_uuid("/one", &["k"], &["v"], uuid);
        let mut b = GenericContent::with_uuid("/two", &["k"], &["v"], uuid);
        assert_eq!(a, b);

        b.set_property("extra", 1);
        assert_ne!(a, b);
    }

    #[test]
    fn test_location_requires_uuid() {
        let content = GenericContent::new("/repo", &["k"], &["v"]);
        assert!(matches!(content.file_location(), Err(ContentError::MissingUuid)));
        assert!(matches!(content.store(), Err(ContentError::MissingUuid)));
    }

    #[test]
    fn test_store_and_load() {
        let dir = TempDir::new().unwrap();
        let uuid = Uuid::new_v4();
        let mut content = GenericContent::with_uuid(dir.path(), &["customer", "project"], &["acme", "p1"], uuid);
        content.set_property("status", "open").set_property("count", 3);

        let written = content.store().unwrap();
        assert_eq!(written, dir.path().join("acme").join("p1").join(uuid.to_string()));

        let relative = content.relative_location().unwrap();
        let loaded = GenericContent::load(dir.path(), &relative).unwrap();
        assert_eq!(loaded, content);
        assert_eq!(loaded.segments(), content.segments());
        assert_eq!(loaded.property("count"), Some("3"));

        // storing again overwrites
        content.set_property("status", "closed");
        content.store().unwrap();
        let loaded = GenericContent::load(dir.path(), &relative).unwrap();
        assert_eq!(loaded.property("status"), Some("closed"));
    }

    #[test]
    fn test_tree_path() {
        let uuid = Uuid::new_v4();
        let content = GenericContent::with_uuid("/repo", &["a", "b"], &["x", "y"], uuid);
        assert_eq!(content.tree_path().unwrap(), format!("x/y/{}", uuid));

        let flat = GenericContent::with_uuid("/repo", &[] as &[&str], &[] as &[&str], uuid);
        assert_eq!(flat.tree_path().unwrap(), uuid.to_string());
    }

    #[test]
    fn test_segment_validation() {
        assert!(validate_segment("customer").is_ok());
        assert!(validate_segment("XM00.232E").is_ok());
        assert!(validate_segment("").is_err());
        assert!(validate_segment("..").is_err());
        assert!(validate_segment(".git").is_err());
        assert!(validate_segment("a/b").is_err());

        let bad = GenericContent::with_uuid("/repo", &["k"], &["../escape"], Uuid::new_v4());
        assert!(matches!(bad.store(), Err(ContentError::InvalidSegment { .. })));
    }
}
