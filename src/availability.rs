use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use sqlx::SqlitePool;

use crate::{
    errors::ApiError,
    models::{format_ts, parse_time, parse_ts, EmpresaRow, FuncionarioRow},
    status,
};

/// Candidate start-times are generated on a fixed half-hour cadence.
pub const SLOT_STEP_MINUTES: i64 = 30;

/// Half-open interval overlap: `[a_start, a_end)` intersects `[b_start, b_end)`.
/// Shared by the slot calculator and the scheduler's conflict check so the
/// two can never drift.
pub fn intervals_overlap<T: PartialOrd>(a_start: T, a_end: T, b_start: T, b_end: T) -> bool {
    a_start < b_end && a_end > b_start
}

#[derive(Debug, Clone, Copy)]
pub struct WorkWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

/// Result of resolving one employee's calendar day. An empty slot list is a
/// valid outcome and is distinct from "not found", which surfaces as an error
/// before this is ever built.
#[derive(Debug)]
pub enum DayAvailability {
    /// The company is closed on this weekday.
    Closed,
    /// The employee's explicit workday set excludes this weekday.
    EmployeeOff,
    Open {
        window: WorkWindow,
        /// Non-cancelled bookings for the day, as `[start, end)` pairs.
        busy: Vec<(NaiveDateTime, NaiveDateTime)>,
        /// Surviving candidate start-times, ordered, deduplicated.
        slots: Vec<NaiveTime>,
    },
}

fn day_set_contains(raw: &str, date: NaiveDate) -> bool {
    let weekday = date.weekday().number_from_monday();
    raw.split(',')
        .filter_map(|part| part.trim().parse::<u32>().ok())
        .any(|day| day == weekday)
}

fn effective_window(
    empresa: &EmpresaRow,
    funcionario: &FuncionarioRow,
) -> Result<WorkWindow, ApiError> {
    let start_raw = funcionario
        .horario_inicio
        .as_deref()
        .unwrap_or(&empresa.horario_abertura);
    let end_raw = funcionario
        .horario_fim
        .as_deref()
        .unwrap_or(&empresa.horario_fechamento);

    let start = parse_time(start_raw)
        .ok_or_else(|| ApiError::validation(format!("horario de trabalho invalido: {start_raw}")))?;
    let end = parse_time(end_raw)
        .ok_or_else(|| ApiError::validation(format!("horario de trabalho invalido: {end_raw}")))?;
    if end <= start {
        return Err(ApiError::validation(
            "horario de fechamento anterior ao de abertura".to_string(),
        ));
    }
    Ok(WorkWindow { start, end })
}

/// Fetch the employee's non-cancelled bookings for one calendar day.
pub async fn busy_intervals(
    pool: &SqlitePool,
    funcionario_id: &str,
    date: NaiveDate,
) -> Result<Vec<(NaiveDateTime, NaiveDateTime)>, sqlx::Error> {
    let day_start = format_ts(date.and_hms_opt(0, 0, 0).unwrap_or_default());
    let day_end = format_ts(
        (date + Duration::days(1))
            .and_hms_opt(0, 0, 0)
            .unwrap_or_default(),
    );

    let rows = sqlx::query_as::<_, (String, String)>(
        r#"SELECT data_inicio, data_fim FROM agendamentos
           WHERE funcionario_id = ? AND status != ?
             AND data_inicio < ? AND data_fim > ?
           ORDER BY data_inicio"#,
    )
    .bind(funcionario_id)
    .bind(status::AppointmentStatus::Cancelled.as_str())
    .bind(&day_end)
    .bind(&day_start)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .filter_map(|(start, end)| Some((parse_ts(&start)?, parse_ts(&end)?)))
        .collect())
}

/// Compute the bookable start-times for one employee and date.
///
/// Pure given its inputs: `now` is supplied by the caller (computed once per
/// request, in business-local time) and nothing is written.
pub async fn day_availability(
    pool: &SqlitePool,
    empresa: &EmpresaRow,
    funcionario: &FuncionarioRow,
    date: NaiveDate,
    duracao_minutos: i64,
    now: NaiveDateTime,
) -> Result<DayAvailability, ApiError> {
    if duracao_minutos <= 0 {
        return Err(ApiError::validation("duracao do servico invalida"));
    }

    if !day_set_contains(&empresa.dias_abertura, date) {
        return Ok(DayAvailability::Closed);
    }
    if let Some(dias) = funcionario.dias_trabalho.as_deref() {
        if !day_set_contains(dias, date) {
            return Ok(DayAvailability::EmployeeOff);
        }
    }

    let window = effective_window(empresa, funcionario)?;
    let busy = busy_intervals(pool, &funcionario.id, date).await?;

    let duration = Duration::minutes(duracao_minutos);
    let step = Duration::minutes(SLOT_STEP_MINUTES);
    let mut slots = Vec::new();
    let mut cursor = date.and_time(window.start);
    let window_end = date.and_time(window.end);

    while cursor + duration <= window_end {
        let slot_end = cursor + duration;
        let taken = busy
            .iter()
            .any(|&(b_start, b_end)| intervals_overlap(cursor, slot_end, b_start, b_end));
        if !taken && cursor >= now {
            slots.push(cursor.time());
        }
        cursor += step;
    }

    Ok(DayAvailability::Open {
        window,
        busy,
        slots,
    })
}
