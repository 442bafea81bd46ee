use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;

pub const TS_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Timestamps are naive business-local time, stored as fixed-width text so
/// that lexicographic comparison in SQL matches temporal comparison.
pub fn format_ts(ts: NaiveDateTime) -> String {
    ts.format(TS_FORMAT).to_string()
}

pub fn parse_ts(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, TS_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M"))
        .ok()
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}

pub fn parse_time(raw: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .ok()
}

#[allow(dead_code)]
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EmpresaRow {
    pub id: String,
    pub nome: String,
    pub slug: String,
    pub email: Option<String>,
    pub telefone: Option<String>,
    pub dias_abertura: String,
    pub horario_abertura: String,
    pub horario_fechamento: String,
    pub ativo: i64,
    pub criado_em: String,
}

#[allow(dead_code)]
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UsuarioRow {
    pub id: String,
    pub nome: String,
    pub email: String,
    pub password_hash: String,
    pub criado_em: String,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct ClienteRow {
    pub id: String,
    pub empresa_id: String,
    pub nome: String,
    pub email: Option<String>,
    pub telefone: Option<String>,
    #[serde(skip)]
    pub ativo: i64,
    #[serde(skip)]
    pub criado_em: String,
}

#[allow(dead_code)]
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FuncionarioRow {
    pub id: String,
    pub empresa_id: String,
    pub nome: String,
    pub email: Option<String>,
    pub telefone: Option<String>,
    pub dias_trabalho: Option<String>,
    pub horario_inicio: Option<String>,
    pub horario_fim: Option<String>,
    pub ativo: i64,
    pub criado_em: String,
}

#[allow(dead_code)]
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ServicoRow {
    pub id: String,
    pub empresa_id: String,
    pub nome: String,
    pub duracao_minutos: i64,
    pub ativo: i64,
    pub criado_em: String,
}

/// Appointment joined with the names notification payloads and API responses
/// need.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct AgendamentoDetalheRow {
    pub id: String,
    pub empresa_id: String,
    pub cliente_id: String,
    pub funcionario_id: String,
    pub servico_id: String,
    pub data_inicio: String,
    pub data_fim: String,
    pub status: String,
    pub observacoes: Option<String>,
    pub criado_em: String,
    pub cliente_nome: String,
    pub cliente_email: Option<String>,
    pub cliente_telefone: Option<String>,
    pub funcionario_nome: String,
    pub servico_nome: String,
    pub empresa_nome: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_round_trip_is_fixed_width() {
        let ts = NaiveDate::from_ymd_opt(2025, 3, 3)
            .unwrap()
            .and_hms_opt(9, 5, 0)
            .unwrap();
        let text = format_ts(ts);
        assert_eq!(text, "2025-03-03T09:05:00");
        assert_eq!(parse_ts(&text), Some(ts));
    }

    #[test]
    fn parse_ts_accepts_minute_precision() {
        let ts = parse_ts("2025-03-03T09:30").unwrap();
        assert_eq!(format_ts(ts), "2025-03-03T09:30:00");
    }

    #[test]
    fn parse_time_accepts_both_precisions() {
        assert_eq!(parse_time("09:00"), parse_time("09:00:00"));
        assert!(parse_time("25:00").is_none());
    }
}
