//! Role and permission model.
//!
//! A permission is a `(resource, action)` pattern with optional conditions;
//! both components support a trailing-`*` wildcard. Roles are named
//! permission sets that may inherit from other roles; inheritance is
//! expanded transitively with union semantics, and cycles are rejected at
//! registration time.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::error::ControlError;

/// Trailing-`*` pattern match. A bare `*` matches everything.
#[must_use]
pub fn pattern_matches(pattern: &str, value: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => value.starts_with(prefix),
        None => pattern == value,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub resource: String,
    pub action: String,
    /// Every entry must be satisfied by the request context for the
    /// permission to apply.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub conditions: HashMap<String, String>,
}

impl Permission {
    pub fn new(resource: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            action: action.into(),
            conditions: HashMap::new(),
        }
    }

    /// The grant a disabled auth gate hands out: everything, everywhere.
    #[must_use]
    pub fn wildcard() -> Self {
        Self::new("*", "*")
    }

    pub fn with_condition(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.conditions.insert(key.into(), value.into());
        self
    }

    /// Whether this permission covers the requested pair under the given
    /// request context.
    #[must_use]
    pub fn allows(
        &self,
        resource: &str,
        action: &str,
        context: &HashMap<String, String>,
    ) -> bool {
        pattern_matches(&self.resource, resource)
            && pattern_matches(&self.action, action)
            && self
                .conditions
                .iter()
                .all(|(k, v)| context.get(k).is_some_and(|got| got == v))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub name: String,
    #[serde(default)]
    pub permissions: Vec<Permission>,
    /// Names of roles whose permissions this role unions in.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inherits: Vec<String>,
}

impl Role {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            permissions: Vec::new(),
            inherits: Vec::new(),
        }
    }

    pub fn permit(mut self, permission: Permission) -> Self {
        self.permissions.push(permission);
        self
    }

    pub fn inherit(mut self, parent: impl Into<String>) -> Self {
        self.inherits.push(parent.into());
        self
    }
}

/// Registered roles, checked acyclic on every registration.
#[derive(Debug, Default)]
pub struct RoleRegistry {
    roles: HashMap<String, Role>,
}

impl RoleRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a role. Fails when the role's inheritance chain
    /// would close a cycle; the registry is left unchanged on failure.
    pub fn register(&mut self, role: Role) -> Result<(), ControlError> {
        let name = role.name.clone();
        let previous = self.roles.insert(name.clone(), role);

        if let Some(cycle_member) = self.find_cycle_from(&name) {
            // Roll back before reporting.
            match previous {
                Some(prev) => {
                    self.roles.insert(name.clone(), prev);
                }
                None => {
                    self.roles.remove(&name);
                }
            }
            return Err(ControlError::validation(
                "role",
                Some(name),
                format!("inheritance cycle through `{cycle_member}`"),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Role> {
        self.roles.get(name)
    }

    fn find_cycle_from(&self, start: &str) -> Option<String> {
        let mut visiting = HashSet::new();
        let mut done = HashSet::new();
        self.dfs(start, &mut visiting, &mut done)
    }

    fn dfs(
        &self,
        name: &str,
        visiting: &mut HashSet<String>,
        done: &mut HashSet<String>,
    ) -> Option<String> {
        if done.contains(name) {
            return None;
        }
        if !visiting.insert(name.to_string()) {
            return Some(name.to_string());
        }
        if let Some(role) = self.roles.get(name) {
            for parent in &role.inherits {
                if let Some(cycle) = self.dfs(parent, visiting, done) {
                    return Some(cycle);
                }
            }
        }
        visiting.remove(name);
        done.insert(name.to_string());
        None
    }

    /// Union of direct and transitively inherited permissions for a set of
    /// role names. Unknown role names contribute nothing.
    #[must_use]
    pub fn effective_permissions(&self, role_names: &[String]) -> Vec<Permission> {
        let mut seen = HashSet::new();
        let mut queue: Vec<&str> = role_names.iter().map(String::as_str).collect();
        let mut out = Vec::new();

        while let Some(name) = queue.pop() {
            if !seen.insert(name.to_string()) {
                continue;
            }
            if let Some(role) = self.roles.get(name) {
                out.extend(role.permissions.iter().cloned());
                queue.extend(role.inherits.iter().map(String::as_str));
            }
        }
        out
    }

    /// First-match permission check across the effective set.
    #[must_use]
    pub fn check(
        &self,
        role_names: &[String],
        resource: &str,
        action: &str,
        context: &HashMap<String, String>,
    ) -> bool {
        self.effective_permissions(role_names)
            .iter()
            .any(|p| p.allows(resource, action, context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_wildcards_match_prefixes() {
        assert!(pattern_matches("get*", "get_element_text"));
        assert!(pattern_matches("*", "anything"));
        assert!(pattern_matches("navigate", "navigate"));
        assert!(!pattern_matches("get*", "take_screenshot"));
        assert!(!pattern_matches("navigate", "navigate_back"));
    }

    #[test]
    fn conditions_must_all_hold() {
        let permission = Permission::new("extraction", "get*")
            .with_condition("secure_transport", "true");

        let mut context = HashMap::new();
        assert!(!permission.allows("extraction", "get_text", &context));

        context.insert("secure_transport".to_string(), "true".to_string());
        assert!(permission.allows("extraction", "get_text", &context));
    }

    #[test]
    fn inheritance_unions_transitively() {
        let mut registry = RoleRegistry::new();
        registry
            .register(Role::new("reader").permit(Permission::new("extraction", "get*")))
            .unwrap();
        registry
            .register(
                Role::new("tester")
                    .permit(Permission::new("extraction", "take*"))
                    .inherit("reader"),
            )
            .unwrap();

        let roles = vec!["tester".to_string()];
        let context = HashMap::new();
        assert!(registry.check(&roles, "extraction", "get_element_text", &context));
        assert!(registry.check(&roles, "extraction", "take_screenshot", &context));
        assert!(!registry.check(&roles, "extraction", "delete_anything", &context));
    }

    #[test]
    fn cycles_are_rejected_and_rolled_back() {
        let mut registry = RoleRegistry::new();
        registry
            .register(Role::new("a").inherit("b"))
            .unwrap();
        registry
            .register(Role::new("b").inherit("c"))
            .unwrap();

        let err = registry.register(Role::new("c").inherit("a")).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::Validation);
        // Registration was rolled back; "c" contributes nothing.
        assert!(registry.get("c").is_none());
    }
}
