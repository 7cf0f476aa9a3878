use {
    crate::{ContextMap, ContextValue},
    std::collections::BTreeMap,
};

/// Boolean permissions of a role, keyed by permission name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionSet(BTreeMap<String, bool>);

impl PermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` when the role has no such permission at all.
    pub fn get(&self, name: &str) -> Option<bool> {
        self.0.get(name).copied()
    }

    pub fn allows(&self, name: &str) -> bool {
        self.get(name).unwrap_or(false)
    }

    pub fn insert(&mut self, name: impl Into<String>, granted: bool) {
        self.0.insert(name.into(), granted);
    }

    #[must_use]
    pub fn with(mut self, name: impl Into<String>, granted: bool) -> Self {
        self.insert(name, granted);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Keeps the boolean entries of a role row. Other columns (id, description)
    /// are not permissions.
    pub fn from_row(row: &ContextMap) -> Self {
        Self(
            row.iter()
                .filter_map(|(k, v)| v.as_bool().map(|b| (k.clone(), b)))
                .collect(),
        )
    }
}

impl<S: Into<String>> FromIterator<(S, bool)> for PermissionSet {
    fn from_iter<T: IntoIterator<Item = (S, bool)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// The authenticated user of a request, rebuilt from storage on every request.
#[derive(Debug, Clone, PartialEq)]
pub struct Principal {
    pub id: i64,
    pub role_id: i64,
    /// Profile columns: names, email, school and so on.
    pub attributes: ContextMap,
    pub permissions: PermissionSet,
}

impl Principal {
    pub fn new(id: i64, role_id: i64) -> Self {
        Self {
            id,
            role_id,
            attributes: ContextMap::new(),
            permissions: PermissionSet::new(),
        }
    }

    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<ContextValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_permissions(mut self, permissions: PermissionSet) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&ContextValue> {
        self.attributes.get(key)
    }

    /// The `user` value exposed to templates: attributes plus `id`, `rol_id`
    /// and a `permisos` map.
    pub fn to_context(&self) -> ContextValue {
        let mut map = self.attributes.clone();
        map.insert("id".into(), self.id.into());
        map.insert("rol_id".into(), self.role_id.into());
        map.insert(
            "permisos".into(),
            ContextValue::Map(
                self.permissions
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.into()))
                    .collect(),
            ),
        );
        ContextValue::Map(map)
    }
}
