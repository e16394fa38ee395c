//! Tenant filter derived from the live scope for a single operation.

use serde_json::Value;
use tenantscope_core::{Conditions, Criteria, Document, FieldFilter, Predicate, TenantContext, WhereClause};

use crate::registry::EntityScope;

/// Column/value constraints pinning one operation to the caller's tenant.
///
/// Built from the live [`TenantContext`] for each operation and dropped
/// when it returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopedFilter {
    organization: (&'static str, String),
    workspace: Option<(&'static str, String)>,
}

impl ScopedFilter {
    /// The workspace constraint applies only to workspace-scoped types with
    /// a resolved workspace column, and only when the scope has a workspace.
    #[must_use]
    pub fn build(scope: &EntityScope, ctx: &TenantContext) -> Self {
        let workspace = match (scope.workspace_column(), &ctx.workspace_id) {
            (Some(column), Some(workspace_id)) if scope.is_workspace_scoped() => {
                Some((column, workspace_id.clone()))
            }
            _ => None,
        };
        Self {
            organization: (scope.organization_column(), ctx.organization_id.clone()),
            workspace,
        }
    }

    #[must_use]
    pub fn organization_id(&self) -> &str {
        &self.organization.1
    }

    #[must_use]
    pub fn organization_column(&self) -> &'static str {
        self.organization.0
    }

    #[must_use]
    pub fn workspace_id(&self) -> Option<&str> {
        self.workspace.as_ref().map(|(_, id)| id.as_str())
    }

    fn pairs(&self) -> impl Iterator<Item = &(&'static str, String)> {
        std::iter::once(&self.organization).chain(self.workspace.as_ref())
    }

    /// Equality constraints for every tenant column.
    #[must_use]
    pub fn conditions(&self) -> Conditions {
        self.pairs()
            .map(|(column, value)| ((*column).to_string(), FieldFilter::from(value.as_str())))
            .collect()
    }

    /// One equality predicate per tenant column.
    #[must_use]
    pub fn predicates(&self) -> Vec<Predicate> {
        self.pairs()
            .map(|(column, value)| Predicate::eq(*column, value.as_str()))
            .collect()
    }

    /// Merges the tenant constraints into a caller's where clause. A missing
    /// clause becomes the tenant constraints alone.
    #[must_use]
    pub fn apply(&self, clause: Option<WhereClause>) -> WhereClause {
        clause
            .unwrap_or_else(|| WhereClause::All(Conditions::new()))
            .and_conditions(&self.conditions())
    }

    /// Normalizes identifier or predicate criteria into scoped constraints.
    #[must_use]
    pub fn scope_criteria(&self, criteria: Criteria, primary_key: &str) -> Criteria {
        let mut conditions = criteria.into_conditions(primary_key);
        conditions.extend(self.conditions());
        Criteria::Where(conditions)
    }

    /// First tenant column `patch` would set to a value other than this
    /// filter's. Writing the current value back is allowed.
    #[must_use]
    pub fn reassigned_column(&self, patch: &Document) -> Option<&'static str> {
        self.pairs()
            .find(|(column, value)| {
                patch
                    .get(*column)
                    .is_some_and(|patched| *patched != Value::String(value.clone()))
            })
            .map(|(column, _)| *column)
    }

    /// Whether a stored record belongs to this filter's tenant.
    #[must_use]
    pub fn admits(&self, doc: &Document) -> bool {
        self.pairs()
            .all(|(column, value)| doc.get(*column) == Some(&Value::String(value.clone())))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tenantscope_core::{EntitySchema, FieldDef};

    use super::*;

    fn scope(workspace_scoped: bool) -> EntityScope {
        let mut schema = EntitySchema::new("docs")
            .field(FieldDef::plain("id"))
            .field(FieldDef::renamed("organization_id", "org"))
            .field(FieldDef::renamed("workspace_id", "ws"));
        schema.workspace_scoped = workspace_scoped;
        EntityScope::resolve(schema).unwrap()
    }

    #[test]
    fn workspace_applies_only_when_declared_and_present() {
        let ctx = TenantContext::new("org-1").with_workspace("ws-1");

        let scoped = ScopedFilter::build(&scope(true), &ctx);
        assert_eq!(scoped.workspace_id(), Some("ws-1"));
        assert_eq!(scoped.conditions().len(), 2);
        assert_eq!(scoped.conditions()["ws"], FieldFilter::from("ws-1"));

        let agnostic = ScopedFilter::build(&scope(false), &ctx);
        assert!(agnostic.workspace_id().is_none());
        assert_eq!(agnostic.conditions().len(), 1);

        let no_workspace = ScopedFilter::build(&scope(true), &TenantContext::new("org-1"));
        assert!(no_workspace.workspace_id().is_none());
    }

    #[test]
    fn apply_without_clause_yields_tenant_constraints() {
        let scoped = ScopedFilter::build(&scope(false), &TenantContext::new("org-1"));
        assert_eq!(
            scoped.apply(None),
            WhereClause::All(Conditions::from([("org".to_string(), FieldFilter::from("org-1"))]))
        );
    }

    #[test]
    fn scope_criteria_wraps_identifiers() {
        let scoped = ScopedFilter::build(&scope(false), &TenantContext::new("org-1"));
        let Criteria::Where(conditions) = scoped.scope_criteria(Criteria::from("doc-1"), "id") else {
            panic!("expected predicate criteria");
        };
        assert_eq!(conditions["id"], FieldFilter::from("doc-1"));
        assert_eq!(conditions["org"], FieldFilter::from("org-1"));
    }

    #[test]
    fn admits_checks_every_tenant_column() {
        let scoped = ScopedFilter::build(
            &scope(true),
            &TenantContext::new("org-1").with_workspace("ws-1"),
        );
        let own = json!({"org": "org-1", "ws": "ws-1"});
        let sibling = json!({"org": "org-1", "ws": "ws-2"});
        assert!(scoped.admits(own.as_object().unwrap()));
        assert!(!scoped.admits(sibling.as_object().unwrap()));
    }

    #[test]
    fn reassigned_column_flags_foreign_tenant_values() {
        let scoped = ScopedFilter::build(
            &scope(true),
            &TenantContext::new("org-1").with_workspace("ws-1"),
        );
        let same = json!({"org": "org-1", "title": "x"});
        let moved_org = json!({"org": "org-2"});
        let moved_ws = json!({"ws": "ws-2"});
        let cleared = json!({"org": null});
        assert_eq!(scoped.reassigned_column(same.as_object().unwrap()), None);
        assert_eq!(scoped.reassigned_column(moved_org.as_object().unwrap()), Some("org"));
        assert_eq!(scoped.reassigned_column(moved_ws.as_object().unwrap()), Some("ws"));
        assert_eq!(scoped.reassigned_column(cleared.as_object().unwrap()), Some("org"));
    }

    #[test]
    fn predicates_pin_organization() {
        let scoped = ScopedFilter::build(&scope(false), &TenantContext::new("org-1"));
        let all = Predicate::And(scoped.predicates());
        assert!(all.pins("org", &json!("org-1")));
    }
}
