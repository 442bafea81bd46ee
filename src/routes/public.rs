use actix_web::{web, HttpResponse};
use chrono::{Local, NaiveDateTime};
use serde::Deserialize;
use serde_json::json;

use crate::{
    availability::{self, DayAvailability, SLOT_STEP_MINUTES},
    errors::ApiError,
    identity::{self, ContactField, IdentityKind},
    models::{parse_date, parse_time, parse_ts, ClienteRow, EmpresaRow, FuncionarioRow, ServicoRow},
    notify::Notification,
    scheduling::{self, ClienteInput},
    state::AppState,
    status::{self, AppointmentStatus},
    verification::CodeError,
};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/api/public/verificar-cliente/{slug}")
            .route(web::post().to(verificar_cliente)),
    )
    .service(web::resource("/api/public/agendamentos").route(web::post().to(criar_agendamento)))
    .service(
        web::resource("/api/public/agendamentos/{id}").route(web::patch().to(gerenciar_agendamento)),
    )
    .service(
        web::resource("/api/public/agenda/{slug}/{funcionario_id}/{data}")
            .route(web::get().to(agenda_do_dia)),
    )
    .service(web::resource("/api/public/enviar-codigo/{slug}").route(web::post().to(enviar_codigo)))
    .service(web::resource("/api/public/validar-codigo").route(web::post().to(validar_codigo)))
    .service(web::resource("/health").route(web::get().to(health)));
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().body("ok")
}

fn business_now() -> NaiveDateTime {
    // All comparisons happen in business-local time; see DESIGN.md.
    Local::now().naive_local()
}

async fn fetch_empresa(state: &AppState, slug: &str) -> Result<EmpresaRow, ApiError> {
    sqlx::query_as::<_, EmpresaRow>(
        "SELECT * FROM empresas WHERE slug = ? AND ativo = 1 LIMIT 1",
    )
    .bind(slug)
    .fetch_optional(&state.db)
    .await?
    .ok_or(ApiError::NotFound("empresa"))
}

async fn fetch_funcionario(
    state: &AppState,
    empresa_id: &str,
    funcionario_id: &str,
) -> Result<FuncionarioRow, ApiError> {
    sqlx::query_as::<_, FuncionarioRow>(
        "SELECT * FROM funcionarios WHERE id = ? AND empresa_id = ? AND ativo = 1 LIMIT 1",
    )
    .bind(funcionario_id)
    .bind(empresa_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or(ApiError::NotFound("funcionario"))
}

async fn fetch_servico(
    state: &AppState,
    empresa_id: &str,
    servico_id: &str,
) -> Result<ServicoRow, ApiError> {
    sqlx::query_as::<_, ServicoRow>(
        "SELECT * FROM servicos WHERE id = ? AND empresa_id = ? AND ativo = 1 LIMIT 1",
    )
    .bind(servico_id)
    .bind(empresa_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or(ApiError::NotFound("servico"))
}

#[derive(Deserialize)]
struct VerificarQuery {
    email: Option<String>,
    telefone: Option<String>,
}

/// "Have we seen you before?" lookup for the public booking form. A contact
/// owned by a company or staff account is a conflict the form must surface
/// before the customer types anything else.
async fn verificar_cliente(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<VerificarQuery>,
) -> Result<HttpResponse, ApiError> {
    let slug = path.into_inner();
    let empresa = fetch_empresa(&state, &slug).await?;

    let (field, value) = match (&query.email, &query.telefone) {
        (Some(email), _) if !email.trim().is_empty() => (ContactField::Email, email.clone()),
        (_, Some(telefone)) if !telefone.trim().is_empty() => {
            (ContactField::Telefone, telefone.clone())
        }
        _ => return Err(ApiError::validation("informe email ou telefone")),
    };

    let owner =
        identity::check_uniqueness(&state.db, field, &value, Some(&empresa.id), None).await?;
    match owner {
        None => Ok(HttpResponse::Ok().json(json!({ "encontrado": false }))),
        Some(owner) if owner.kind == IdentityKind::Cliente => {
            let cliente = sqlx::query_as::<_, ClienteRow>(
                "SELECT * FROM clientes WHERE id = ? LIMIT 1",
            )
            .bind(&owner.id)
            .fetch_one(&state.db)
            .await?;
            Ok(HttpResponse::Ok().json(json!({ "encontrado": true, "cliente": cliente })))
        }
        Some(owner) => Err(ApiError::IdentityConflict { field, owner }),
    }
}

#[derive(Deserialize)]
struct AgendamentoForm {
    slug: String,
    funcionario_id: String,
    servico_id: String,
    data_hora: String,
    cliente_nome: String,
    cliente_telefone: String,
    cliente_email: Option<String>,
    observacoes: Option<String>,
}

async fn criar_agendamento(
    state: web::Data<AppState>,
    form: web::Json<AgendamentoForm>,
) -> Result<HttpResponse, ApiError> {
    let form = form.into_inner();
    let empresa = fetch_empresa(&state, &form.slug).await?;
    let funcionario = fetch_funcionario(&state, &empresa.id, &form.funcionario_id).await?;
    let servico = fetch_servico(&state, &empresa.id, &form.servico_id).await?;

    let inicio = parse_ts(&form.data_hora)
        .ok_or_else(|| ApiError::validation("data_hora invalida (use AAAA-MM-DDTHH:MM)"))?;

    let detalhe = scheduling::create_appointment(
        &state.db,
        &empresa,
        &funcionario,
        &servico,
        ClienteInput {
            nome: form.cliente_nome,
            telefone: form.cliente_telefone,
            email: form.cliente_email,
        },
        inicio,
        form.observacoes,
        business_now(),
    )
    .await?;

    Ok(HttpResponse::Created().json(json!({ "agendamento": detalhe })))
}

#[derive(Deserialize)]
struct AgendaQuery {
    servico_id: Option<String>,
}

async fn agenda_do_dia(
    state: web::Data<AppState>,
    path: web::Path<(String, String, String)>,
    query: web::Query<AgendaQuery>,
) -> Result<HttpResponse, ApiError> {
    let (slug, funcionario_id, data_raw) = path.into_inner();
    let empresa = fetch_empresa(&state, &slug).await?;
    let funcionario = fetch_funcionario(&state, &empresa.id, &funcionario_id).await?;
    let data = parse_date(&data_raw)
        .ok_or_else(|| ApiError::validation("data invalida (use AAAA-MM-DD)"))?;

    let (duracao, com_slots) = match &query.servico_id {
        Some(servico_id) => {
            let servico = fetch_servico(&state, &empresa.id, servico_id).await?;
            (servico.duracao_minutos, true)
        }
        None => (SLOT_STEP_MINUTES, false),
    };

    let day = availability::day_availability(
        &state.db,
        &empresa,
        &funcionario,
        data,
        duracao,
        business_now(),
    )
    .await?;

    let body = match day {
        DayAvailability::Closed => json!({
            "horario_abertura": empresa.horario_abertura,
            "horario_fechamento": empresa.horario_fechamento,
            "horarios_ocupados": [],
            "dia_fechado": true,
        }),
        DayAvailability::EmployeeOff => json!({
            "horario_abertura": empresa.horario_abertura,
            "horario_fechamento": empresa.horario_fechamento,
            "horarios_ocupados": [],
            "funcionario_nao_trabalha": true,
        }),
        DayAvailability::Open {
            window,
            busy,
            slots,
        } => {
            let ocupados: Vec<_> = busy
                .iter()
                .map(|(inicio, fim)| {
                    json!({
                        "inicio": inicio.format("%H:%M").to_string(),
                        "fim": fim.format("%H:%M").to_string(),
                    })
                })
                .collect();
            let mut body = json!({
                "horario_abertura": window.start.format("%H:%M").to_string(),
                "horario_fechamento": window.end.format("%H:%M").to_string(),
                "horarios_ocupados": ocupados,
            });
            if com_slots {
                let disponiveis: Vec<_> = slots
                    .iter()
                    .map(|slot| slot.format("%H:%M").to_string())
                    .collect();
                body["horarios_disponiveis"] = json!(disponiveis);
            }
            body
        }
    };

    Ok(HttpResponse::Ok().json(body))
}

#[derive(Deserialize)]
struct EnviarCodigoForm {
    email: String,
}

/// Start the passwordless flow. Company/staff emails are rejected outright so
/// the UI can redirect to the staff login; an email that matches no client of
/// the company still answers success, creating no session, so the endpoint
/// does not reveal which emails are registered.
async fn enviar_codigo(
    state: web::Data<AppState>,
    path: web::Path<String>,
    form: web::Json<EnviarCodigoForm>,
) -> Result<HttpResponse, ApiError> {
    let slug = path.into_inner();
    let empresa = fetch_empresa(&state, &slug).await?;

    let email = identity::normalize_email(&form.email);
    if email.is_empty() {
        return Err(ApiError::validation("email e obrigatorio"));
    }

    let owner = identity::check_uniqueness(
        &state.db,
        ContactField::Email,
        &email,
        Some(&empresa.id),
        None,
    )
    .await?;

    match owner {
        Some(owner) if owner.kind == IdentityKind::Empresa => {
            Ok(HttpResponse::Forbidden().json(json!({ "error": "email_empresa" })))
        }
        Some(owner) if owner.kind == IdentityKind::Usuario => {
            Ok(HttpResponse::Forbidden().json(json!({ "error": "email_usuario" })))
        }
        Some(owner) if owner.kind == IdentityKind::Cliente => {
            let (token, codigo) = state.sessions.issue(&email, &empresa.id, &owner.id);
            state.notifier.send(Notification::CodigoVerificacao {
                email,
                empresa: empresa.nome.clone(),
                codigo,
            });
            Ok(HttpResponse::Ok().json(json!({ "success": true, "token": token })))
        }
        // Unknown email or an employee's: same silent success, no session.
        _ => Ok(HttpResponse::Ok().json(json!({ "success": true }))),
    }
}

#[derive(Deserialize)]
struct ValidarCodigoForm {
    token: String,
    codigo: String,
}

async fn validar_codigo(
    state: web::Data<AppState>,
    form: web::Json<ValidarCodigoForm>,
) -> Result<HttpResponse, ApiError> {
    match state.sessions.validate_code(&form.token, &form.codigo) {
        Ok((token_acesso, session)) => {
            let cliente = sqlx::query_as::<_, ClienteRow>(
                "SELECT * FROM clientes WHERE id = ? LIMIT 1",
            )
            .bind(&session.cliente_id)
            .fetch_one(&state.db)
            .await?;
            Ok(HttpResponse::Ok().json(json!({
                "token_acesso": token_acesso,
                "cliente": cliente,
            })))
        }
        Err(CodeError::Expired) => {
            Ok(HttpResponse::BadRequest().json(json!({ "error": "expirado" })))
        }
        Err(CodeError::TooManyAttempts) => {
            Ok(HttpResponse::BadRequest().json(json!({ "error": "muitas_tentativas" })))
        }
        Err(CodeError::WrongCode { remaining }) => Ok(HttpResponse::BadRequest().json(json!({
            "error": "codigo_invalido",
            "tentativas_restantes": remaining,
        }))),
        Err(CodeError::UnknownToken) => {
            Ok(HttpResponse::BadRequest().json(json!({ "error": "token_invalido" })))
        }
    }
}

#[derive(Deserialize)]
struct GerenciarForm {
    token_acesso: String,
    acao: String,
    nova_data: Option<String>,
    nova_hora: Option<String>,
}

/// Self-service cancel/reschedule, gated by a verified access token whose
/// session must own the target appointment.
async fn gerenciar_agendamento(
    state: web::Data<AppState>,
    path: web::Path<String>,
    form: web::Json<GerenciarForm>,
) -> Result<HttpResponse, ApiError> {
    let agendamento_id = path.into_inner();
    let session = state
        .sessions
        .validate_access(&form.token_acesso)
        .ok_or(ApiError::Unauthorized)?;

    let detalhe = status::fetch_detalhe(&state.db, &agendamento_id).await?;
    if detalhe.empresa_id != session.empresa_id || detalhe.cliente_id != session.cliente_id {
        return Err(ApiError::Forbidden);
    }

    match form.acao.as_str() {
        "cancelar" => {
            let detalhe = status::apply_status(
                &state.db,
                &state.notifier,
                &agendamento_id,
                AppointmentStatus::Cancelled,
            )
            .await?;
            Ok(HttpResponse::Ok().json(json!({ "agendamento": detalhe })))
        }
        "remarcar" => {
            let (nova_data, nova_hora) = match (&form.nova_data, &form.nova_hora) {
                (Some(d), Some(h)) => (d, h),
                _ => {
                    return Err(ApiError::validation(
                        "remarcar exige nova_data e nova_hora",
                    ))
                }
            };
            let data = parse_date(nova_data)
                .ok_or_else(|| ApiError::validation("nova_data invalida (use AAAA-MM-DD)"))?;
            let hora = parse_time(nova_hora)
                .ok_or_else(|| ApiError::validation("nova_hora invalida (use HH:MM)"))?;

            let detalhe = scheduling::reschedule_appointment(
                &state.db,
                &state.notifier,
                &agendamento_id,
                data.and_time(hora),
                business_now(),
            )
            .await?;
            Ok(HttpResponse::Ok().json(json!({ "agendamento": detalhe })))
        }
        other => Err(ApiError::validation(format!("acao desconhecida: {other}"))),
    }
}
