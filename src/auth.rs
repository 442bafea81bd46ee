use actix_web::{dev::ServiceRequest, error::ErrorUnauthorized, web, Error, HttpMessage};
use actix_web_httpauth::extractors::basic::BasicAuth;
use argon2::{
    password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand_core::OsRng;
use uuid::Uuid;

use crate::{identity::normalize_email, models::UsuarioRow, state::AppState};

#[derive(Clone, Debug)]
pub struct StaffUser {
    pub id: String,
    pub nome: String,
}

pub fn hash_password(password: &str) -> Result<String, password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

fn verify_password(password: &str, password_hash: &str) -> bool {
    match PasswordHash::new(password_hash) {
        Ok(hash) => Argon2::default()
            .verify_password(password.as_bytes(), &hash)
            .is_ok(),
        Err(_) => false,
    }
}

pub async fn authenticate_credentials(
    state: &AppState,
    email: &str,
    password: &str,
) -> Option<StaffUser> {
    let user = sqlx::query_as::<_, UsuarioRow>(
        r#"SELECT id, nome, email, password_hash, criado_em
           FROM usuarios
           WHERE LOWER(email) = ?
           LIMIT 1"#,
    )
    .bind(normalize_email(email))
    .fetch_optional(&state.db)
    .await
    .ok()??;

    if !verify_password(password, &user.password_hash) {
        return None;
    }

    Some(StaffUser {
        id: user.id,
        nome: user.nome,
    })
}

pub async fn staff_validator(
    req: ServiceRequest,
    credentials: BasicAuth,
) -> Result<ServiceRequest, (Error, ServiceRequest)> {
    let Some(state) = req.app_data::<web::Data<AppState>>() else {
        return Err((ErrorUnauthorized("Unauthorized"), req));
    };
    let email = credentials.user_id();
    let password = credentials.password().unwrap_or_default();

    match authenticate_credentials(state, email, password).await {
        Some(user) => {
            req.extensions_mut().insert(user);
            Ok(req)
        }
        None => Err((ErrorUnauthorized("Unauthorized"), req)),
    }
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_round_trip() {
        let hash = hash_password("segredo123").unwrap();
        assert!(verify_password("segredo123", &hash));
        assert!(!verify_password("errado", &hash));
    }

    #[test]
    fn garbage_hash_never_verifies() {
        assert!(!verify_password("qualquer", "not-a-phc-string"));
    }
}
