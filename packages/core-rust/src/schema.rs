use serde::de::DeserializeOwned;
use serde::Serialize;

/// Canonical property name of the organization identifier on an entity.
pub const ORGANIZATION_PROPERTY: &str = "organization_id";

/// Canonical property name of the workspace identifier on an entity.
pub const WORKSPACE_PROPERTY: &str = "workspace_id";

/// Storage column names accepted for the organization identifier when no
/// field declares the canonical property.
pub const ORGANIZATION_COLUMN_CONVENTIONS: &[&str] = &["organization_id", "organizationId", "org_id"];

/// Storage column names accepted for the workspace identifier when no
/// field declares the canonical property.
pub const WORKSPACE_COLUMN_CONVENTIONS: &[&str] = &["workspace_id", "workspaceId"];

/// Single field of an entity: in-memory property name and storage column name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    /// Rust field name.
    pub property: &'static str,
    /// Serialized (storage-facing) name.
    pub column: &'static str,
}

impl FieldDef {
    /// Field whose storage column has the same name as the property.
    #[must_use]
    pub const fn plain(name: &'static str) -> Self {
        Self {
            property: name,
            column: name,
        }
    }

    /// Field stored under a different column name.
    #[must_use]
    pub const fn renamed(property: &'static str, column: &'static str) -> Self {
        Self { property, column }
    }
}

/// Static scope declaration for one entity type.
///
/// Attached at entity definition through [`Entity::schema`]; never derived
/// from context or instance data.
#[derive(Debug, Clone)]
pub struct EntitySchema {
    /// Collection name of the entity type.
    pub name: &'static str,
    /// Whether the type additionally partitions by workspace.
    pub workspace_scoped: bool,
    /// Storage column holding the primary key.
    pub primary_key: &'static str,
    /// Storage column holding the soft-delete marker, if the type supports it.
    pub soft_delete_column: Option<&'static str>,
    /// Declared fields.
    pub fields: Vec<FieldDef>,
}

impl EntitySchema {
    /// Starts a schema with primary key column `id` and no fields.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            workspace_scoped: false,
            primary_key: "id",
            soft_delete_column: None,
            fields: Vec::new(),
        }
    }

    #[must_use]
    pub fn workspace_scoped(mut self) -> Self {
        self.workspace_scoped = true;
        self
    }

    #[must_use]
    pub fn primary_key(mut self, column: &'static str) -> Self {
        self.primary_key = column;
        self
    }

    #[must_use]
    pub fn soft_delete(mut self, column: &'static str) -> Self {
        self.soft_delete_column = Some(column);
        self
    }

    #[must_use]
    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Finds the storage column for `canonical`, falling back to the first
    /// field whose column or property matches one of `conventions`.
    #[must_use]
    pub fn resolve_column(&self, canonical: &str, conventions: &[&str]) -> Option<&'static str> {
        self.fields
            .iter()
            .find(|f| f.property == canonical)
            .or_else(|| {
                self.fields.iter().find(|f| {
                    conventions.contains(&f.column) || conventions.contains(&f.property)
                })
            })
            .map(|f| f.column)
    }
}

/// A persisted, tenant-partitioned type.
///
/// Records travel to and from storage as JSON documents, so the serde
/// names of the fields are the storage column names.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Static scope declaration of this type.
    fn schema() -> EntitySchema;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project() -> EntitySchema {
        EntitySchema::new("projects")
            .workspace_scoped()
            .field(FieldDef::plain("id"))
            .field(FieldDef::renamed("organization_id", "org_ref"))
            .field(FieldDef::plain("workspace_id"))
    }

    #[test]
    fn canonical_property_wins_over_column_name() {
        let schema = project();
        assert_eq!(
            schema.resolve_column(ORGANIZATION_PROPERTY, ORGANIZATION_COLUMN_CONVENTIONS),
            Some("org_ref")
        );
        assert_eq!(
            schema.resolve_column(WORKSPACE_PROPERTY, WORKSPACE_COLUMN_CONVENTIONS),
            Some("workspace_id")
        );
    }

    #[test]
    fn falls_back_to_naming_convention() {
        let schema = EntitySchema::new("legacy")
            .field(FieldDef::renamed("tenant", "organizationId"));
        assert_eq!(
            schema.resolve_column(ORGANIZATION_PROPERTY, ORGANIZATION_COLUMN_CONVENTIONS),
            Some("organizationId")
        );
    }

    #[test]
    fn unresolved_column_is_none() {
        let schema = EntitySchema::new("orphans").field(FieldDef::plain("id"));
        assert!(schema
            .resolve_column(WORKSPACE_PROPERTY, WORKSPACE_COLUMN_CONVENTIONS)
            .is_none());
    }

    #[test]
    fn defaults_are_workspace_agnostic() {
        let schema = EntitySchema::new("things");
        assert!(!schema.workspace_scoped);
        assert_eq!(schema.primary_key, "id");
        assert!(schema.soft_delete_column.is_none());
    }
}
