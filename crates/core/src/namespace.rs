//! Namespace configuration: the declarative authorization schema.
//!
//! Loaded once at process startup and treated as immutable thereafter (see
//! the "Global state" design note). For each object type, the namespace
//! declares a mapping from relation name to its kind — direct, union, or
//! tupleToUserset — plus a set of flat "permission aliases" that are pure
//! ORs of other relations.
//!
//! Separating permission aliases from union relations lets the traversal
//! engine short-circuit on the common case (a flat OR of named relations)
//! without entering the general recursive union/TTU machinery.

use std::collections::HashMap;

/// How a relation on an object type is computed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationKind {
    /// A leaf relation: satisfied only by direct tuples (including usersets
    /// and wildcard subjects) naming this relation.
    Direct,
    /// The OR of zero or more other relations on the *same* object.
    Union(Vec<String>),
    /// An indirect relation via another object: "this relation here equals
    /// `computed` on whatever `tupleset` points to".
    TupleToUserset {
        /// The relation whose targets give related objects/subjects.
        tupleset: String,
        /// The relation to recompute on each related object/subject.
        computed: String,
    },
}

/// A computed permission: a flat, ordered OR of relation names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionAlias {
    /// The permission's name, e.g. `"write"`.
    pub name: String,
    /// The relations whose OR yields this permission.
    pub usersets: Vec<String>,
}

/// The relation/permission schema for one object type.
#[derive(Debug, Clone, Default)]
pub struct ObjectTypeConfig {
    relations: HashMap<String, RelationKind>,
    permissions: HashMap<String, PermissionAlias>,
}

impl ObjectTypeConfig {
    /// Start building a config for an object type.
    pub fn builder() -> ObjectTypeConfigBuilder {
        ObjectTypeConfigBuilder::default()
    }
}

/// Builder for [`ObjectTypeConfig`].
#[derive(Default)]
pub struct ObjectTypeConfigBuilder {
    relations: HashMap<String, RelationKind>,
    permissions: HashMap<String, PermissionAlias>,
}

impl ObjectTypeConfigBuilder {
    /// Declare a direct (leaf) relation.
    pub fn direct(mut self, name: impl Into<String>) -> Self {
        self.relations.insert(name.into(), RelationKind::Direct);
        self
    }

    /// Declare a union relation: the OR of other relations on this object.
    pub fn union(mut self, name: impl Into<String>, members: &[&str]) -> Self {
        self.relations.insert(
            name.into(),
            RelationKind::Union(members.iter().map(|s| s.to_string()).collect()),
        );
        self
    }

    /// Declare a tupleToUserset relation.
    pub fn ttu(mut self, name: impl Into<String>, tupleset: &str, computed: &str) -> Self {
        self.relations.insert(
            name.into(),
            RelationKind::TupleToUserset {
                tupleset: tupleset.to_string(),
                computed: computed.to_string(),
            },
        );
        self
    }

    /// Declare a permission alias: the OR of named relations.
    pub fn permission(mut self, name: impl Into<String>, usersets: &[&str]) -> Self {
        let name = name.into();
        self.permissions.insert(
            name.clone(),
            PermissionAlias {
                name,
                usersets: usersets.iter().map(|s| s.to_string()).collect(),
            },
        );
        self
    }

    /// Finish building.
    pub fn build(self) -> ObjectTypeConfig {
        ObjectTypeConfig {
            relations: self.relations,
            permissions: self.permissions,
        }
    }
}

/// The process-wide namespace configuration: one [`ObjectTypeConfig`] per
/// object type. Constructed once at startup and shared read-only
/// thereafter (typically behind an `Arc`).
#[derive(Debug, Clone, Default)]
pub struct NamespaceConfig {
    object_types: HashMap<String, ObjectTypeConfig>,
}

impl NamespaceConfig {
    /// An empty namespace configuration.
    pub fn new() -> Self {
        NamespaceConfig::default()
    }

    /// Register an object type's configuration.
    pub fn register(&mut self, object_type: impl Into<String>, config: ObjectTypeConfig) {
        self.object_types.insert(object_type.into(), config);
    }

    /// Fetch the configuration for an object type, if declared.
    pub fn namespace(&self, object_type: &str) -> Option<&ObjectTypeConfig> {
        self.object_types.get(object_type)
    }

    /// Whether `object_type` declares a permission alias with this name.
    pub fn has_permission(&self, object_type: &str, name: &str) -> bool {
        self.namespace(object_type)
            .map(|ns| ns.permissions.contains_key(name))
            .unwrap_or(false)
    }

    /// The relations a permission alias ORs over.
    pub fn permission_usersets(&self, object_type: &str, name: &str) -> Option<&[String]> {
        self.namespace(object_type)?
            .permissions
            .get(name)
            .map(|p| p.usersets.as_slice())
    }

    /// The kind of a relation (or permission-backed union) on an object type.
    pub fn relation_kind(&self, object_type: &str, relation: &str) -> Option<&RelationKind> {
        self.namespace(object_type)?.relations.get(relation)
    }

    /// The members of a union relation, if `relation` is one.
    pub fn union_members(&self, object_type: &str, relation: &str) -> Option<&[String]> {
        match self.relation_kind(object_type, relation)? {
            RelationKind::Union(members) => Some(members.as_slice()),
            _ => None,
        }
    }

    /// The `(tupleset, computed)` pair for a tupleToUserset relation.
    pub fn ttu(&self, object_type: &str, relation: &str) -> Option<(&str, &str)> {
        match self.relation_kind(object_type, relation)? {
            RelationKind::TupleToUserset { tupleset, computed } => {
                Some((tupleset.as_str(), computed.as_str()))
            }
            _ => None,
        }
    }

    /// Build the default Nexus namespace: `file`, `group`, `tenant`.
    ///
    /// This encodes the standard shape used throughout the specification's
    /// worked examples — `viewer`/`editor`/`owner` direct relations on
    /// `file`, a `parent` tupleToUserset for directory inheritance, a
    /// `member-of`/`member` pair for groups, and `read`/`write` permission
    /// aliases.
    pub fn default_nexus() -> Self {
        let mut ns = NamespaceConfig::new();

        ns.register(
            "file",
            ObjectTypeConfig::builder()
                .direct("direct_viewer")
                .direct("direct_editor")
                .direct("direct_owner")
                .direct("shared-viewer")
                .direct("shared-editor")
                .direct("shared-owner")
                .direct("parent")
                .union("viewer", &["direct_viewer", "direct_editor", "direct_owner", "shared-viewer"])
                .union("editor", &["direct_editor", "direct_owner", "shared-editor"])
                .union("owner", &["direct_owner", "shared-owner"])
                .ttu("parent_viewer", "parent", "viewer")
                .ttu("parent_editor", "parent", "editor")
                .permission("read", &["viewer", "parent_viewer"])
                .permission("write", &["editor", "owner", "parent_editor"])
                .build(),
        );

        ns.register(
            "group",
            ObjectTypeConfig::builder()
                .direct("member")
                .direct("member-of")
                .build(),
        );

        ns.register(
            "tenant",
            ObjectTypeConfig::builder().direct("admin").build(),
        );

        ns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_namespace_has_file_permissions() {
        let ns = NamespaceConfig::default_nexus();
        assert!(ns.has_permission("file", "read"));
        assert!(ns.has_permission("file", "write"));
        assert_eq!(
            ns.permission_usersets("file", "read"),
            Some(&["viewer".to_string(), "parent_viewer".to_string()][..])
        );
    }

    #[test]
    fn union_members_resolve() {
        let ns = NamespaceConfig::default_nexus();
        let members = ns.union_members("file", "viewer").unwrap();
        assert!(members.contains(&"direct_viewer".to_string()));
        assert!(members.contains(&"shared-viewer".to_string()));
    }

    #[test]
    fn ttu_resolves_tupleset_and_computed() {
        let ns = NamespaceConfig::default_nexus();
        let (tupleset, computed) = ns.ttu("file", "parent_viewer").unwrap();
        assert_eq!(tupleset, "parent");
        assert_eq!(computed, "viewer");
    }

    #[test]
    fn unknown_object_type_is_none() {
        let ns = NamespaceConfig::default_nexus();
        assert!(ns.namespace("widget").is_none());
        assert!(!ns.has_permission("widget", "read"));
    }
}
