use chrono::{Duration, NaiveDateTime, Utc};
use sqlx::SqlitePool;

use crate::{
    auth::new_id,
    db,
    errors::ApiError,
    identity::{self, ContactField, IdentityKind},
    models::{format_ts, AgendamentoDetalheRow, EmpresaRow, FuncionarioRow, ServicoRow},
    notify::{Notification, Notifier},
    status::{self, AppointmentStatus},
};

/// Contact details supplied by a public booking request. Either email or
/// phone may be blank, not both.
#[derive(Debug, Clone)]
pub struct ClienteInput {
    pub nome: String,
    pub telefone: String,
    pub email: Option<String>,
}

/// Create a booking: resolve or create the client, then insert the
/// appointment with the conflict check and the insert fused into one
/// conditional statement, all inside a single transaction so an error leaves
/// neither a client nor an appointment behind.
pub async fn create_appointment(
    pool: &SqlitePool,
    empresa: &EmpresaRow,
    funcionario: &FuncionarioRow,
    servico: &ServicoRow,
    cliente: ClienteInput,
    inicio: NaiveDateTime,
    observacoes: Option<String>,
    now: NaiveDateTime,
) -> Result<AgendamentoDetalheRow, ApiError> {
    if cliente.nome.trim().is_empty() {
        return Err(ApiError::validation("nome do cliente e obrigatorio"));
    }
    let telefone = identity::normalize_phone(&cliente.telefone);
    if telefone.is_empty() {
        return Err(ApiError::validation("telefone do cliente e obrigatorio"));
    }
    let email = cliente
        .email
        .as_deref()
        .map(identity::normalize_email)
        .filter(|e| !e.is_empty());
    if inicio < now {
        return Err(ApiError::validation("data_hora no passado"));
    }

    let fim = inicio + Duration::minutes(servico.duracao_minutos);
    let resolved = resolve_cliente(pool, empresa, &telefone, email.as_deref()).await?;

    // Client creation (when needed) and the conflict-checked insert share one
    // transaction: an error path commits neither.
    let agendamento_id = new_id();
    let mut tx = pool.begin().await?;
    let cliente_id = match resolved {
        ResolvedCliente::Existing(id) => id,
        ResolvedCliente::New => {
            let novo_id = new_id();
            let inserted = sqlx::query(
                r#"INSERT INTO clientes (id, empresa_id, nome, email, telefone, ativo, criado_em)
                   VALUES (?, ?, ?, ?, ?, 1, ?)"#,
            )
            .bind(&novo_id)
            .bind(&empresa.id)
            .bind(cliente.nome.trim())
            .bind(email.as_deref())
            .bind(&telefone)
            .bind(Utc::now().to_rfc3339())
            .execute(&mut *tx)
            .await;
            match inserted {
                Ok(_) => novo_id,
                // A concurrent first booking created this contact after our
                // lookup; the unique index kept one row. Reuse the winner's.
                Err(err) if is_unique_violation(&err) => {
                    tx.rollback().await?;
                    let ResolvedCliente::Existing(id) =
                        resolve_cliente(pool, empresa, &telefone, email.as_deref()).await?
                    else {
                        return Err(err.into());
                    };
                    tx = pool.begin().await?;
                    id
                }
                Err(err) => return Err(err.into()),
            }
        }
    };
    let inserted = sqlx::query(
        r#"INSERT INTO agendamentos
             (id, empresa_id, cliente_id, funcionario_id, servico_id,
              data_inicio, data_fim, status, observacoes, criado_em)
           SELECT ?, ?, ?, ?, ?, ?, ?, ?, ?, ?
           WHERE NOT EXISTS (
               SELECT 1 FROM agendamentos
               WHERE funcionario_id = ? AND status != ?
                 AND data_inicio < ? AND data_fim > ?
           )"#,
    )
    .bind(&agendamento_id)
    .bind(&empresa.id)
    .bind(&cliente_id)
    .bind(&funcionario.id)
    .bind(&servico.id)
    .bind(format_ts(inicio))
    .bind(format_ts(fim))
    .bind(AppointmentStatus::Scheduled.as_str())
    .bind(&observacoes)
    .bind(Utc::now().to_rfc3339())
    .bind(&funcionario.id)
    .bind(AppointmentStatus::Cancelled.as_str())
    .bind(format_ts(fim))
    .bind(format_ts(inicio))
    .execute(&mut *tx)
    .await?;

    if inserted.rows_affected() == 0 {
        // Another writer took the slot between the caller's availability
        // check and this insert.
        tx.rollback().await?;
        return Err(ApiError::SlotConflict);
    }
    tx.commit().await?;

    db::log_activity(
        pool,
        "agendamento_criado",
        &format!("Novo agendamento de {} em {}", cliente.nome.trim(), format_ts(inicio)),
        Some(&agendamento_id),
    )
    .await;

    status::fetch_detalhe(pool, &agendamento_id).await
}

/// Move an existing appointment to a new start. The duration in effect is the
/// appointment's own stored span, not the service's current one. Status is
/// reset to scheduled; a reschedule implicitly un-confirms.
pub async fn reschedule_appointment(
    pool: &SqlitePool,
    notifier: &Notifier,
    agendamento_id: &str,
    novo_inicio: NaiveDateTime,
    now: NaiveDateTime,
) -> Result<AgendamentoDetalheRow, ApiError> {
    if novo_inicio < now {
        return Err(ApiError::validation("data_hora no passado"));
    }

    let atual = status::fetch_detalhe(pool, agendamento_id).await?;
    let current_status = AppointmentStatus::parse(&atual.status)
        .ok_or_else(|| ApiError::validation(format!("status desconhecido: {}", atual.status)))?;
    if current_status.is_terminal() {
        return Err(ApiError::InvalidTransition {
            from: atual.status.clone(),
            to: AppointmentStatus::Scheduled.as_str().to_string(),
        });
    }

    let (inicio_atual, fim_atual) = match (
        crate::models::parse_ts(&atual.data_inicio),
        crate::models::parse_ts(&atual.data_fim),
    ) {
        (Some(i), Some(f)) => (i, f),
        _ => return Err(ApiError::validation("agendamento com datas corrompidas")),
    };
    let novo_fim = novo_inicio + (fim_atual - inicio_atual);

    // Compare-and-set on the status read above, mirroring `apply_status`: a
    // cancellation landing between the read and this write must not be
    // overwritten back to scheduled.
    let updated = sqlx::query(
        r#"UPDATE agendamentos
           SET data_inicio = ?, data_fim = ?, status = ?
           WHERE id = ?
             AND status = ?
             AND NOT EXISTS (
                 SELECT 1 FROM agendamentos outro
                 WHERE outro.funcionario_id = agendamentos.funcionario_id
                   AND outro.id != agendamentos.id
                   AND outro.status != ?
                   AND outro.data_inicio < ? AND outro.data_fim > ?
             )"#,
    )
    .bind(format_ts(novo_inicio))
    .bind(format_ts(novo_fim))
    .bind(AppointmentStatus::Scheduled.as_str())
    .bind(agendamento_id)
    .bind(&atual.status)
    .bind(AppointmentStatus::Cancelled.as_str())
    .bind(format_ts(novo_fim))
    .bind(format_ts(novo_inicio))
    .execute(pool)
    .await?;

    if updated.rows_affected() == 0 {
        // Re-read to tell a lost status race from a taken slot.
        let agora = status::fetch_detalhe(pool, agendamento_id).await?;
        if agora.status != atual.status {
            return Err(ApiError::InvalidTransition {
                from: agora.status,
                to: AppointmentStatus::Scheduled.as_str().to_string(),
            });
        }
        return Err(ApiError::SlotConflict);
    }

    db::log_activity(
        pool,
        "agendamento_remarcado",
        &format!(
            "Agendamento {agendamento_id} remarcado de {} para {}",
            atual.data_inicio,
            format_ts(novo_inicio)
        ),
        Some(agendamento_id),
    )
    .await;

    let detalhe = status::fetch_detalhe(pool, agendamento_id).await?;
    notifier.send(Notification::Remarcacao {
        agendamento: detalhe.clone(),
        data_anterior: atual.data_inicio,
    });
    Ok(detalhe)
}

enum ResolvedCliente {
    Existing(String),
    New,
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// Reuse an existing client of the company when the email or phone matches;
/// otherwise run the cross-kind uniqueness gate so a conflicting contact
/// blocks the booking before anything is written.
async fn resolve_cliente(
    pool: &SqlitePool,
    empresa: &EmpresaRow,
    telefone: &str,
    email: Option<&str>,
) -> Result<ResolvedCliente, ApiError> {
    if let Some(email) = email {
        if let Some(existing) =
            identity::find_cliente_by_contact(pool, &empresa.id, ContactField::Email, email)
                .await?
        {
            return Ok(ResolvedCliente::Existing(existing.id));
        }
    }
    if let Some(existing) =
        identity::find_cliente_by_contact(pool, &empresa.id, ContactField::Telefone, telefone)
            .await?
    {
        return Ok(ResolvedCliente::Existing(existing.id));
    }

    // New client: neither contact may belong to another record kind.
    if let Some(email) = email {
        if let Some(owner) =
            identity::check_uniqueness(pool, ContactField::Email, email, Some(&empresa.id), None)
                .await?
        {
            if owner.kind != IdentityKind::Cliente {
                return Err(ApiError::IdentityConflict {
                    field: ContactField::Email,
                    owner,
                });
            }
        }
    }
    if let Some(owner) = identity::check_uniqueness(
        pool,
        ContactField::Telefone,
        telefone,
        Some(&empresa.id),
        None,
    )
    .await?
    {
        if owner.kind != IdentityKind::Cliente {
            return Err(ApiError::IdentityConflict {
                field: ContactField::Telefone,
                owner,
            });
        }
    }

    Ok(ResolvedCliente::New)
}
