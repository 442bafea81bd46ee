use actix_web::{web, HttpResponse};
use actix_web_httpauth::middleware::HttpAuthentication;
use chrono::Duration;
use serde::Deserialize;
use serde_json::json;

use crate::{
    auth::{staff_validator, StaffUser},
    db,
    errors::ApiError,
    models::{parse_date, AgendamentoDetalheRow},
    state::AppState,
    status::{self, AppointmentStatus},
};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/staff")
            .wrap(HttpAuthentication::basic(staff_validator))
            .service(web::resource("/agendamentos").route(web::get().to(listar_agendamentos)))
            .service(
                web::resource("/agendamentos/{id}/status")
                    .route(web::patch().to(atualizar_status)),
            ),
    );
}

#[derive(Deserialize)]
struct ListarQuery {
    empresa_id: String,
    data: Option<String>,
}

async fn listar_agendamentos(
    state: web::Data<AppState>,
    query: web::Query<ListarQuery>,
) -> Result<HttpResponse, ApiError> {
    let base = r#"SELECT a.id, a.empresa_id, a.cliente_id, a.funcionario_id, a.servico_id,
                         a.data_inicio, a.data_fim, a.status, a.observacoes, a.criado_em,
                         c.nome AS cliente_nome, c.email AS cliente_email, c.telefone AS cliente_telefone,
                         f.nome AS funcionario_nome, s.nome AS servico_nome, e.nome AS empresa_nome
                  FROM agendamentos a
                  JOIN clientes c ON a.cliente_id = c.id
                  JOIN funcionarios f ON a.funcionario_id = f.id
                  JOIN servicos s ON a.servico_id = s.id
                  JOIN empresas e ON a.empresa_id = e.id
                  WHERE a.empresa_id = ?"#;

    let rows = match &query.data {
        Some(data) => {
            let dia = parse_date(data)
                .ok_or_else(|| ApiError::validation("data invalida (use AAAA-MM-DD)"))?;
            // Half-open day window, same as the availability queries.
            sqlx::query_as::<_, AgendamentoDetalheRow>(&format!(
                "{base} AND a.data_inicio >= ? AND a.data_inicio < ? ORDER BY a.data_inicio"
            ))
            .bind(&query.empresa_id)
            .bind(format!("{dia}T00:00:00"))
            .bind(format!("{}T00:00:00", dia + Duration::days(1)))
            .fetch_all(&state.db)
            .await?
        }
        None => {
            sqlx::query_as::<_, AgendamentoDetalheRow>(&format!(
                "{base} ORDER BY a.data_inicio DESC LIMIT 100"
            ))
            .bind(&query.empresa_id)
            .fetch_all(&state.db)
            .await?
        }
    };

    Ok(HttpResponse::Ok().json(json!({ "agendamentos": rows })))
}

#[derive(Deserialize)]
struct StatusForm {
    status: String,
}

async fn atualizar_status(
    state: web::Data<AppState>,
    staff: web::ReqData<StaffUser>,
    path: web::Path<String>,
    form: web::Json<StatusForm>,
) -> Result<HttpResponse, ApiError> {
    let agendamento_id = path.into_inner();
    let status = AppointmentStatus::parse(&form.status)
        .ok_or_else(|| ApiError::validation(format!("status desconhecido: {}", form.status)))?;

    let detalhe =
        status::apply_status(&state.db, &state.notifier, &agendamento_id, status).await?;

    db::log_activity(
        &state.db,
        "staff_status_update",
        &format!(
            "{} mudou agendamento {} para {}",
            staff.nome,
            agendamento_id,
            status.as_str()
        ),
        Some(&agendamento_id),
    )
    .await;

    Ok(HttpResponse::Ok().json(json!({ "agendamento": detalhe })))
}
