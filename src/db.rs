use std::{env, fs, path::Path};

use chrono::Utc;
use sqlx::SqlitePool;

use crate::auth::{hash_password, new_id};

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

pub fn ensure_sqlite_dir(db_url: &str) -> std::io::Result<()> {
    let path = if let Some(path) = db_url.strip_prefix("sqlite://") {
        Some(path)
    } else if let Some(path) = db_url.strip_prefix("sqlite:") {
        Some(path)
    } else {
        None
    };

    let Some(path) = path else {
        return Ok(());
    };

    let path = path.split('?').next().unwrap_or(path);
    if path == ":memory:" || path.is_empty() {
        return Ok(());
    }

    let path = path.strip_prefix("file:").unwrap_or(path);
    let db_path = Path::new(path);
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

pub async fn seed_defaults(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    seed_admin(pool).await?;
    if env::var("SEED_DEMO").as_deref() == Ok("true") {
        seed_demo(pool).await?;
    }
    Ok(())
}

/// Best-effort audit trail; a failed write is never allowed to fail the
/// request that triggered it.
pub async fn log_activity(
    pool: &SqlitePool,
    tipo: &str,
    mensagem: &str,
    agendamento_id: Option<&str>,
) {
    let result = sqlx::query(
        r#"INSERT INTO atividades (id, tipo, mensagem, agendamento_id, criado_em)
           VALUES (?, ?, ?, ?, ?)"#,
    )
    .bind(new_id())
    .bind(tipo)
    .bind(mensagem)
    .bind(agendamento_id)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await;
    if let Err(err) = result {
        log::warn!("Activity log write failed: {err}");
    }
}

async fn seed_admin(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let existing = sqlx::query_as::<_, (String,)>("SELECT id FROM usuarios LIMIT 1")
        .fetch_optional(pool)
        .await?;
    if existing.is_some() {
        return Ok(());
    }

    let email = env::var("ADMIN_EMAIL").unwrap_or_else(|_| "admin@agendaja.local".to_string());
    let password = env::var("ADMIN_PASSWORD").unwrap_or_else(|_| "admin".to_string());
    let nome = env::var("ADMIN_NOME").unwrap_or_else(|_| "Administrador".to_string());

    if password == "admin" {
        log::warn!("ADMIN_PASSWORD not set. Using default password 'admin'. Set ADMIN_PASSWORD in production.");
    }

    let password_hash =
        hash_password(&password).map_err(|_| sqlx::Error::Protocol("password hash failed".into()))?;

    sqlx::query(
        r#"INSERT INTO usuarios (id, nome, email, password_hash, criado_em)
           VALUES (?, ?, ?, ?, ?)"#,
    )
    .bind(new_id())
    .bind(nome)
    .bind(crate::identity::normalize_email(&email))
    .bind(password_hash)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// Demo tenant for local development: Mon-Fri 09:00-18:00, one employee with
/// no override, two services.
async fn seed_demo(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let existing =
        sqlx::query_as::<_, (String,)>("SELECT id FROM empresas WHERE slug = 'studio-x' LIMIT 1")
            .fetch_optional(pool)
            .await?;
    if existing.is_some() {
        return Ok(());
    }

    let now = Utc::now().to_rfc3339();
    let empresa_id = new_id();
    sqlx::query(
        r#"INSERT INTO empresas (id, nome, slug, email, telefone, dias_abertura,
                                 horario_abertura, horario_fechamento, ativo, criado_em)
           VALUES (?, 'Studio X', 'studio-x', 'contato@studiox.com', '1133334444',
                   '1,2,3,4,5', '09:00', '18:00', 1, ?)"#,
    )
    .bind(&empresa_id)
    .bind(&now)
    .execute(pool)
    .await?;

    sqlx::query(
        r#"INSERT INTO funcionarios (id, empresa_id, nome, email, telefone,
                                     dias_trabalho, horario_inicio, horario_fim, ativo, criado_em)
           VALUES (?, ?, 'Joao Barbeiro', 'joao@studiox.com', '11955554444',
                   NULL, NULL, NULL, 1, ?)"#,
    )
    .bind(new_id())
    .bind(&empresa_id)
    .bind(&now)
    .execute(pool)
    .await?;

    for (nome, duracao) in [("Corte", 30_i64), ("Corte e Barba", 60)] {
        sqlx::query(
            r#"INSERT INTO servicos (id, empresa_id, nome, duracao_minutos, ativo, criado_em)
               VALUES (?, ?, ?, ?, 1, ?)"#,
        )
        .bind(new_id())
        .bind(&empresa_id)
        .bind(nome)
        .bind(duracao)
        .bind(&now)
        .execute(pool)
        .await?;
    }

    Ok(())
}

#[cfg(test)]
pub async fn test_pool() -> SqlitePool {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    run_migrations(&pool).await.expect("migrations");
    pool
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::models::{format_ts, EmpresaRow, FuncionarioRow, ServicoRow};
    use chrono::NaiveDateTime;

    pub async fn seed_empresa(
        pool: &SqlitePool,
        id: &str,
        nome: &str,
        slug: &str,
        email: &str,
    ) -> EmpresaRow {
        sqlx::query(
            r#"INSERT INTO empresas (id, nome, slug, email, telefone, dias_abertura,
                                     horario_abertura, horario_fechamento, ativo, criado_em)
               VALUES (?, ?, ?, ?, NULL, '1,2,3,4,5', '09:00', '18:00', 1, ?)"#,
        )
        .bind(id)
        .bind(nome)
        .bind(slug)
        .bind(email)
        .bind(Utc::now().to_rfc3339())
        .execute(pool)
        .await
        .unwrap();

        sqlx::query_as::<_, EmpresaRow>("SELECT * FROM empresas WHERE id = ?")
            .bind(id)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    pub async fn seed_usuario(pool: &SqlitePool, id: &str, nome: &str, email: &str) {
        sqlx::query(
            r#"INSERT INTO usuarios (id, nome, email, password_hash, criado_em)
               VALUES (?, ?, ?, 'x', ?)"#,
        )
        .bind(id)
        .bind(nome)
        .bind(email)
        .bind(Utc::now().to_rfc3339())
        .execute(pool)
        .await
        .unwrap();
    }

    pub async fn seed_cliente(
        pool: &SqlitePool,
        id: &str,
        empresa_id: &str,
        nome: &str,
        email: Option<&str>,
        telefone: Option<&str>,
    ) {
        sqlx::query(
            r#"INSERT INTO clientes (id, empresa_id, nome, email, telefone, ativo, criado_em)
               VALUES (?, ?, ?, ?, ?, 1, ?)"#,
        )
        .bind(id)
        .bind(empresa_id)
        .bind(nome)
        .bind(email)
        .bind(telefone)
        .bind(Utc::now().to_rfc3339())
        .execute(pool)
        .await
        .unwrap();
    }

    pub async fn seed_funcionario(
        pool: &SqlitePool,
        id: &str,
        empresa_id: &str,
        nome: &str,
        dias_trabalho: Option<&str>,
        horario_inicio: Option<&str>,
        horario_fim: Option<&str>,
    ) -> FuncionarioRow {
        sqlx::query(
            r#"INSERT INTO funcionarios (id, empresa_id, nome, email, telefone,
                                         dias_trabalho, horario_inicio, horario_fim, ativo, criado_em)
               VALUES (?, ?, ?, NULL, NULL, ?, ?, ?, 1, ?)"#,
        )
        .bind(id)
        .bind(empresa_id)
        .bind(nome)
        .bind(dias_trabalho)
        .bind(horario_inicio)
        .bind(horario_fim)
        .bind(Utc::now().to_rfc3339())
        .execute(pool)
        .await
        .unwrap();

        sqlx::query_as::<_, FuncionarioRow>("SELECT * FROM funcionarios WHERE id = ?")
            .bind(id)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    pub async fn seed_servico(
        pool: &SqlitePool,
        id: &str,
        empresa_id: &str,
        nome: &str,
        duracao_minutos: i64,
    ) -> ServicoRow {
        sqlx::query(
            r#"INSERT INTO servicos (id, empresa_id, nome, duracao_minutos, ativo, criado_em)
               VALUES (?, ?, ?, ?, 1, ?)"#,
        )
        .bind(id)
        .bind(empresa_id)
        .bind(nome)
        .bind(duracao_minutos)
        .bind(Utc::now().to_rfc3339())
        .execute(pool)
        .await
        .unwrap();

        sqlx::query_as::<_, ServicoRow>("SELECT * FROM servicos WHERE id = ?")
            .bind(id)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    pub async fn seed_agendamento(
        pool: &SqlitePool,
        id: &str,
        empresa_id: &str,
        funcionario_id: &str,
        inicio: NaiveDateTime,
        fim: NaiveDateTime,
        status: &str,
    ) {
        // Booking fixtures need a client and service to join against.
        ensure_cliente(pool, empresa_id).await;
        ensure_servico(pool, empresa_id).await;
        sqlx::query(
            r#"INSERT INTO agendamentos (id, empresa_id, cliente_id, funcionario_id, servico_id,
                                         data_inicio, data_fim, status, observacoes, criado_em)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, NULL, ?)"#,
        )
        .bind(id)
        .bind(empresa_id)
        .bind(format!("cliente-{empresa_id}"))
        .bind(funcionario_id)
        .bind(format!("servico-{empresa_id}"))
        .bind(format_ts(inicio))
        .bind(format_ts(fim))
        .bind(status)
        .bind(Utc::now().to_rfc3339())
        .execute(pool)
        .await
        .unwrap();
    }

    async fn ensure_cliente(pool: &SqlitePool, empresa_id: &str) {
        let id = format!("cliente-{empresa_id}");
        let exists = sqlx::query_as::<_, (String,)>("SELECT id FROM clientes WHERE id = ?")
            .bind(&id)
            .fetch_optional(pool)
            .await
            .unwrap();
        if exists.is_none() {
            seed_cliente(pool, &id, empresa_id, "Cliente Teste", None, Some("11900000000")).await;
        }
    }

    async fn ensure_servico(pool: &SqlitePool, empresa_id: &str) {
        let id = format!("servico-{empresa_id}");
        let exists = sqlx::query_as::<_, (String,)>("SELECT id FROM servicos WHERE id = ?")
            .bind(&id)
            .fetch_optional(pool)
            .await
            .unwrap();
        if exists.is_none() {
            seed_servico(pool, &id, empresa_id, "Servico Teste", 30).await;
        }
    }

    /// Company + employee + service + client + one scheduled appointment `a1`
    /// at Monday 2025-03-03 10:00-10:30.
    pub async fn seed_full_booking(pool: &SqlitePool) {
        let date = chrono::NaiveDate::from_ymd_opt(2025, 3, 3).unwrap();
        seed_empresa(pool, "e1", "Studio X", "studio-x", "dono@x.com").await;
        seed_funcionario(pool, "f1", "e1", "Joao", None, None, None).await;
        seed_agendamento(
            pool,
            "a1",
            "e1",
            "f1",
            date.and_hms_opt(10, 0, 0).unwrap(),
            date.and_hms_opt(10, 30, 0).unwrap(),
            "scheduled",
        )
        .await;
    }

    #[test]
    fn sqlite_dir_helper_handles_memory_urls() {
        ensure_sqlite_dir("sqlite::memory:").unwrap();
        ensure_sqlite_dir("postgres://elsewhere").unwrap();
    }

    #[tokio::test]
    async fn one_active_client_per_contact_and_company() {
        let pool = crate::db::test_pool().await;
        seed_empresa(&pool, "e1", "Studio X", "studio-x", "dono@x.com").await;
        seed_empresa(&pool, "e2", "Studio Y", "studio-y", "dono@y.com").await;
        seed_cliente(&pool, "c1", "e1", "Maria", Some("maria@a.com"), Some("11988887777")).await;

        let dup = sqlx::query(
            r#"INSERT INTO clientes (id, empresa_id, nome, email, telefone, ativo, criado_em)
               VALUES ('c2', 'e1', 'Outra', 'maria@a.com', NULL, 1, ?)"#,
        )
        .bind(Utc::now().to_rfc3339())
        .execute(&pool)
        .await;
        assert!(dup.is_err());

        // The same contact under another company is a different client.
        seed_cliente(&pool, "c3", "e2", "Maria", Some("maria@a.com"), None).await;

        // Deactivated rows release the contact.
        sqlx::query("UPDATE clientes SET ativo = 0 WHERE id = 'c1'")
            .execute(&pool)
            .await
            .unwrap();
        seed_cliente(&pool, "c4", "e1", "Maria", Some("maria@a.com"), None).await;
    }
}
