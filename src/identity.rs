use sqlx::SqlitePool;

/// Lower-case and trim. Idempotent.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Strip every non-digit character. Idempotent.
pub fn normalize_phone(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactField {
    Email,
    Telefone,
}

impl ContactField {
    pub fn normalize(self, raw: &str) -> String {
        match self {
            ContactField::Email => normalize_email(raw),
            ContactField::Telefone => normalize_phone(raw),
        }
    }

    pub fn conflict_code(self) -> &'static str {
        match self {
            ContactField::Email => "email_conflict",
            ContactField::Telefone => "telefone_conflict",
        }
    }
}

/// The four record kinds a contact value can belong to. The variant order is
/// the scan precedence: on a multi-hit value the first matching kind wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityKind {
    Empresa,
    Usuario,
    Cliente,
    Funcionario,
}

impl IdentityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            IdentityKind::Empresa => "empresa",
            IdentityKind::Usuario => "usuario",
            IdentityKind::Cliente => "cliente",
            IdentityKind::Funcionario => "funcionario",
        }
    }

    /// Staff and company accounts have a password login to redirect to.
    pub fn has_login(self) -> bool {
        matches!(self, IdentityKind::Empresa | IdentityKind::Usuario)
    }
}

#[derive(Debug, Clone)]
pub struct IdentityMatch {
    pub kind: IdentityKind,
    pub id: String,
    pub display_name: String,
}

/// Find the owner of a normalized contact value, scanning record kinds in the
/// fixed precedence order. Company and staff lookups are global; client and
/// employee lookups are scoped to `empresa_id` when given. `exclude` lets an
/// update compare a record against itself without reporting a conflict.
///
/// Contact values are stored normalized (the write paths guarantee it), so
/// equality on the normalized input is the comparison.
pub async fn check_uniqueness(
    pool: &SqlitePool,
    field: ContactField,
    value: &str,
    empresa_id: Option<&str>,
    exclude: Option<(IdentityKind, &str)>,
) -> Result<Option<IdentityMatch>, sqlx::Error> {
    let value = field.normalize(value);
    if value.is_empty() {
        return Ok(None);
    }

    let kinds: &[IdentityKind] = match field {
        ContactField::Email => &[
            IdentityKind::Empresa,
            IdentityKind::Usuario,
            IdentityKind::Cliente,
            IdentityKind::Funcionario,
        ],
        // Staff accounts have no phone column.
        ContactField::Telefone => &[
            IdentityKind::Empresa,
            IdentityKind::Cliente,
            IdentityKind::Funcionario,
        ],
    };

    for &kind in kinds {
        if let Some(hit) = find_in_kind(pool, kind, field, &value, empresa_id).await? {
            let excluded = matches!(exclude, Some((k, id)) if k == kind && id == hit.id);
            if !excluded {
                return Ok(Some(hit));
            }
        }
    }

    Ok(None)
}

async fn find_in_kind(
    pool: &SqlitePool,
    kind: IdentityKind,
    field: ContactField,
    value: &str,
    empresa_id: Option<&str>,
) -> Result<Option<IdentityMatch>, sqlx::Error> {
    let column = match field {
        ContactField::Email => "LOWER(email)",
        ContactField::Telefone => "telefone",
    };

    let row = match kind {
        IdentityKind::Empresa => {
            sqlx::query_as::<_, (String, String)>(&format!(
                "SELECT id, nome FROM empresas WHERE ativo = 1 AND {column} = ? LIMIT 1"
            ))
            .bind(value)
            .fetch_optional(pool)
            .await?
        }
        // Staff accounts have no active flag; they count as long as they exist.
        IdentityKind::Usuario => {
            sqlx::query_as::<_, (String, String)>(
                "SELECT id, nome FROM usuarios WHERE LOWER(email) = ? LIMIT 1",
            )
            .bind(value)
            .fetch_optional(pool)
            .await?
        }
        IdentityKind::Cliente | IdentityKind::Funcionario => {
            let table = match kind {
                IdentityKind::Cliente => "clientes",
                _ => "funcionarios",
            };
            match empresa_id {
                Some(empresa_id) => {
                    sqlx::query_as::<_, (String, String)>(&format!(
                        "SELECT id, nome FROM {table} WHERE ativo = 1 AND empresa_id = ? AND {column} = ? LIMIT 1"
                    ))
                    .bind(empresa_id)
                    .bind(value)
                    .fetch_optional(pool)
                    .await?
                }
                None => {
                    sqlx::query_as::<_, (String, String)>(&format!(
                        "SELECT id, nome FROM {table} WHERE ativo = 1 AND {column} = ? LIMIT 1"
                    ))
                    .bind(value)
                    .fetch_optional(pool)
                    .await?
                }
            }
        }
    };

    Ok(row.map(|(id, display_name)| IdentityMatch {
        kind,
        id,
        display_name,
    }))
}

/// Look up an active client of a company by normalized email or phone, for
/// the public "have we seen you before" flow and booking client reuse.
pub async fn find_cliente_by_contact(
    pool: &SqlitePool,
    empresa_id: &str,
    field: ContactField,
    value: &str,
) -> Result<Option<crate::models::ClienteRow>, sqlx::Error> {
    let value = field.normalize(value);
    if value.is_empty() {
        return Ok(None);
    }
    let column = match field {
        ContactField::Email => "LOWER(email)",
        ContactField::Telefone => "telefone",
    };
    sqlx::query_as::<_, crate::models::ClienteRow>(&format!(
        r#"SELECT id, empresa_id, nome, email, telefone, ativo, criado_em
           FROM clientes
           WHERE ativo = 1 AND empresa_id = ? AND {column} = ?
           LIMIT 1"#
    ))
    .bind(empresa_id)
    .bind(value)
    .fetch_optional(pool)
    .await
}
