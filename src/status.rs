use sqlx::SqlitePool;

use crate::{
    db,
    errors::ApiError,
    notify::{Notification, Notifier},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::NoShow => "no_show",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "scheduled" => Some(AppointmentStatus::Scheduled),
            "confirmed" => Some(AppointmentStatus::Confirmed),
            "completed" => Some(AppointmentStatus::Completed),
            "cancelled" => Some(AppointmentStatus::Cancelled),
            "no_show" => Some(AppointmentStatus::NoShow),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AppointmentStatus::Cancelled | AppointmentStatus::Completed
        )
    }

    /// Transition table: scheduled -> confirmed -> completed, cancellation
    /// from scheduled or confirmed, no_show from confirmed only.
    pub fn allows(self, to: AppointmentStatus) -> bool {
        use AppointmentStatus::*;
        matches!(
            (self, to),
            (Scheduled, Confirmed)
                | (Scheduled, Cancelled)
                | (Confirmed, Completed)
                | (Confirmed, Cancelled)
                | (Confirmed, NoShow)
        )
    }
}

/// Apply a staff-driven status transition.
///
/// Same-status re-issue is a no-op and fires nothing. The update itself is a
/// compare-and-set on the previously read status, so transitions on one
/// appointment apply in the order they land; a lost race is re-read and
/// reported as invalid rather than applied out of order.
pub async fn apply_status(
    pool: &SqlitePool,
    notifier: &Notifier,
    agendamento_id: &str,
    to: AppointmentStatus,
) -> Result<crate::models::AgendamentoDetalheRow, ApiError> {
    let current_raw = sqlx::query_scalar::<_, String>(
        "SELECT status FROM agendamentos WHERE id = ?",
    )
    .bind(agendamento_id)
    .fetch_optional(pool)
    .await?
    .ok_or(ApiError::NotFound("agendamento"))?;

    let current = AppointmentStatus::parse(&current_raw)
        .ok_or_else(|| ApiError::validation(format!("status desconhecido: {current_raw}")))?;

    if current == to {
        // Idempotent: no write, no notification.
        return fetch_detalhe(pool, agendamento_id).await;
    }
    if !current.allows(to) {
        return Err(ApiError::InvalidTransition {
            from: current.as_str().to_string(),
            to: to.as_str().to_string(),
        });
    }

    let updated = sqlx::query("UPDATE agendamentos SET status = ? WHERE id = ? AND status = ?")
        .bind(to.as_str())
        .bind(agendamento_id)
        .bind(current.as_str())
        .execute(pool)
        .await?;

    if updated.rows_affected() == 0 {
        // Another transition landed first. Re-read and report honestly.
        let now_raw =
            sqlx::query_scalar::<_, String>("SELECT status FROM agendamentos WHERE id = ?")
                .bind(agendamento_id)
                .fetch_optional(pool)
                .await?
                .ok_or(ApiError::NotFound("agendamento"))?;
        if now_raw == to.as_str() {
            return fetch_detalhe(pool, agendamento_id).await;
        }
        return Err(ApiError::InvalidTransition {
            from: now_raw,
            to: to.as_str().to_string(),
        });
    }

    db::log_activity(
        pool,
        "status_update",
        &format!("Agendamento {agendamento_id}: {} -> {}", current.as_str(), to.as_str()),
        Some(agendamento_id),
    )
    .await;

    let detalhe = fetch_detalhe(pool, agendamento_id).await?;
    match to {
        AppointmentStatus::Confirmed => notifier.send(Notification::Confirmacao {
            agendamento: detalhe.clone(),
        }),
        AppointmentStatus::Cancelled => notifier.send(Notification::Cancelamento {
            agendamento: detalhe.clone(),
        }),
        _ => {}
    }

    Ok(detalhe)
}

pub async fn fetch_detalhe(
    pool: &SqlitePool,
    agendamento_id: &str,
) -> Result<crate::models::AgendamentoDetalheRow, ApiError> {
    sqlx::query_as::<_, crate::models::AgendamentoDetalheRow>(
        r#"SELECT a.id, a.empresa_id, a.cliente_id, a.funcionario_id, a.servico_id,
                  a.data_inicio, a.data_fim, a.status, a.observacoes, a.criado_em,
                  c.nome AS cliente_nome, c.email AS cliente_email, c.telefone AS cliente_telefone,
                  f.nome AS funcionario_nome, s.nome AS servico_nome, e.nome AS empresa_nome
           FROM agendamentos a
           JOIN clientes c ON a.cliente_id = c.id
           JOIN funcionarios f ON a.funcionario_id = f.id
           JOIN servicos s ON a.servico_id = s.id
           JOIN empresas e ON a.empresa_id = e.id
           WHERE a.id = ?"#,
    )
    .bind(agendamento_id)
    .fetch_optional(pool)
    .await?
    .ok_or(ApiError::NotFound("agendamento"))
}
