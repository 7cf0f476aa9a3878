use {
    super::{PermissionSet, Principal},
    crate::{ContextMap, ContextValue, DataSource, Result, SqlParam},
    async_trait::async_trait,
    std::{fmt, sync::Arc},
};

/// Why a session identity did not produce a principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// No user row for the session identity.
    NotFound,
    /// The account is disabled.
    Disabled,
    /// The account is not authorized yet or has no role.
    Unauthorized,
    /// The session holds something other than a user id.
    MalformedIdentity,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::NotFound => write!(f, "user not found"),
            RejectReason::Disabled => write!(f, "account disabled"),
            RejectReason::Unauthorized => write!(f, "account not authorized"),
            RejectReason::MalformedIdentity => write!(f, "malformed session identity"),
        }
    }
}

/// Outcome of resolving a session identity.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Active(Principal),
    Rejected(RejectReason),
}

/// Turns the user id stored in a session into a [`Principal`].
#[async_trait]
pub trait AuthResolver: Send + Sync {
    async fn resolve(&self, user_id: i64) -> Result<Resolution>;
}

/// Loads the user and the permission columns of its role in one query.
pub const PRINCIPAL_QUERY: &str = r#"
    SELECT u.id, u.rol_id, u.correo_electronico,
           u.nombres, u.apellidos, u.sexo,
           u.tipo_documento, u.nacionalidad, u.escuela,
           u.nro_telefono, u.distrito, u.direccion,
           u.deshabilitado, u.autorizado,
           to_jsonb(r) AS permisos
    FROM usuario u
    LEFT JOIN rol_usuario r ON r.id = u.rol_id
    WHERE u.id = $1
    LIMIT 1
"#;

/// [`AuthResolver`] reading the `usuario` and `rol_usuario` tables.
#[derive(Clone)]
pub struct SqlAuthResolver {
    data_source: Arc<dyn DataSource>,
}

impl SqlAuthResolver {
    pub fn new(data_source: Arc<dyn DataSource>) -> Self {
        Self { data_source }
    }

    /// Builds the resolution for a fetched user row.
    pub fn principal_from_row(mut row: ContextMap) -> Resolution {
        if row.get("deshabilitado").and_then(ContextValue::as_bool) == Some(true) {
            return Resolution::Rejected(RejectReason::Disabled);
        }
        if row.get("autorizado").and_then(ContextValue::as_bool) == Some(false) {
            return Resolution::Rejected(RejectReason::Unauthorized);
        }

        let (Some(id), Some(role_id)) = (
            row.remove("id").and_then(|v| v.as_i64()),
            row.remove("rol_id").and_then(|v| v.as_i64()),
        ) else {
            return Resolution::Rejected(RejectReason::Unauthorized);
        };

        let permissions = row
            .remove("permisos")
            .and_then(|v| v.as_map().map(PermissionSet::from_row))
            .unwrap_or_default();
        row.remove("deshabilitado");
        row.remove("autorizado");

        Resolution::Active(Principal {
            id,
            role_id,
            attributes: row,
            permissions,
        })
    }
}

#[async_trait]
impl AuthResolver for SqlAuthResolver {
    async fn resolve(&self, user_id: i64) -> Result<Resolution> {
        let row = self
            .data_source
            .fetch_one(PRINCIPAL_QUERY, &[SqlParam::Int(user_id)])
            .await?;
        Ok(match row {
            Some(row) => Self::principal_from_row(row),
            None => Resolution::Rejected(RejectReason::NotFound),
        })
    }
}
