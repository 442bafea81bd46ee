use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

use crate::identity::{ContactField, IdentityMatch};

/// Error taxonomy for the public and staff APIs. Every variant maps to a
/// significant status code and a JSON body.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0} nao encontrado")]
    NotFound(&'static str),

    #[error("horario indisponivel")]
    SlotConflict,

    #[error("contato ja cadastrado")]
    IdentityConflict {
        field: ContactField,
        owner: IdentityMatch,
    },

    #[error("nao autorizado")]
    Unauthorized,

    #[error("acesso negado")]
    Forbidden,

    #[error("transicao de status invalida: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("erro interno")]
    Database(#[from] sqlx::Error),
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation(message.into())
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::InvalidTransition { .. } => {
                StatusCode::BAD_REQUEST
            }
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::SlotConflict | ApiError::IdentityConflict { .. } => StatusCode::CONFLICT,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            ApiError::Validation(message) => json!({
                "error": "dados_invalidos",
                "message": message,
            }),
            ApiError::NotFound(what) => json!({
                "error": "nao_encontrado",
                "message": format!("{what} nao encontrado"),
            }),
            ApiError::SlotConflict => json!({
                "error": "horario_indisponivel",
                "message": "Este horario acabou de ser reservado. Escolha outro.",
            }),
            ApiError::IdentityConflict { field, owner } => json!({
                "error": field.conflict_code(),
                "message": format!(
                    "Este contato ja pertence a {} \"{}\".",
                    owner.kind.as_str(),
                    owner.display_name
                ),
                "redirect_login": owner.kind.has_login(),
            }),
            ApiError::Unauthorized => json!({ "error": "nao_autorizado" }),
            ApiError::Forbidden => json!({ "error": "acesso_negado" }),
            ApiError::InvalidTransition { from, to } => json!({
                "error": "transicao_invalida",
                "message": format!("Agendamento {from} nao pode mudar para {to}."),
            }),
            ApiError::Database(err) => {
                log::error!("Database error: {err}");
                json!({ "error": "erro_interno" })
            }
        };
        HttpResponse::build(self.status_code()).json(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::IdentityKind;

    #[test]
    fn status_codes_follow_the_taxonomy() {
        assert_eq!(
            ApiError::validation("x").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::NotFound("empresa").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(ApiError::SlotConflict.status_code(), StatusCode::CONFLICT);
        assert_eq!(
            ApiError::Unauthorized.status_code(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn identity_conflict_names_the_owner_without_more() {
        let err = ApiError::IdentityConflict {
            field: ContactField::Email,
            owner: IdentityMatch {
                kind: IdentityKind::Empresa,
                id: "e1".into(),
                display_name: "Studio X".into(),
            },
        };
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        let response = err.error_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
