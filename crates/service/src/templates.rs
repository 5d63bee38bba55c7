//! Strict plaintext template parsing and rendering for the two chat-based
//! reply forms (Room-2 doctor decisions, Room-3 scheduler replies) plus the
//! message bodies the state machine posts.
//!
//! Parsing is line-oriented and forgiving only of two things: an optional
//! space after `:`, and English/Portuguese synonyms for enum values.
//! Anything else — missing keys, a forged `doctor_user_id` line, a
//! malformed `caso:` UUID — is a parse failure, never a guess.

use std::collections::HashMap;

use uuid::Uuid;

use triage_core::{AppointmentStatus, DoctorDecision, SupportFlag};

/// A parsed Room-2 chat-based doctor decision reply.
#[derive(Debug, Clone)]
pub struct ParsedRoom2Decision {
    pub decision: DoctorDecision,
    pub support_flag: SupportFlag,
    pub reason: Option<String>,
    pub case_id: Uuid,
}

/// A parsed Room-3 chat-based scheduler reply.
#[derive(Debug, Clone)]
pub struct ParsedRoom3Reply {
    pub appointment_status: AppointmentStatus,
    pub datetime_text: Option<String>,
    pub location: Option<String>,
    pub instructions: Option<String>,
    pub reason: Option<String>,
    pub case_id: Uuid,
}

/// Why a template body failed to parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateParseError {
    /// The reply carried a `doctor_user_id:` line — a field the sender
    /// must never be able to set directly.
    ForgedDoctorUserId,
    /// A required key was absent or its value did not parse.
    MissingOrInvalid(&'static str),
    /// The `caso:`/`case:` line was present but not a well-formed UUID.
    InvalidCaseLine,
}

/// Split a plaintext reply body into `key -> value` pairs. Keys are
/// lower-cased; a single optional space after `:` is tolerated, nothing else.
fn parse_kv_lines(body: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in body.lines() {
        let Some((key, value)) = line.split_once(':') else { continue };
        let key = key.trim().to_ascii_lowercase();
        let value = value.strip_prefix(' ').unwrap_or(value).trim().to_owned();
        map.insert(key, value);
    }
    map
}

fn parse_case_line(fields: &HashMap<String, String>) -> Result<Uuid, TemplateParseError> {
    let raw = fields
        .get("caso")
        .or_else(|| fields.get("case"))
        .ok_or(TemplateParseError::MissingOrInvalid("caso"))?;
    Uuid::parse_str(raw).map_err(|_| TemplateParseError::InvalidCaseLine)
}

/// Parse a Room-2 doctor decision reply body:
/// `decisao: aceitar|negar`, `suporte: nenhum|anestesista|anestesista_uti`,
/// `motivo: …`, `caso: <uuid>` (English equivalents accepted for keys and
/// values too).
pub fn parse_room2_decision(body: &str) -> Result<ParsedRoom2Decision, TemplateParseError> {
    let fields = parse_kv_lines(body);

    if fields.contains_key("doctor_user_id") {
        return Err(TemplateParseError::ForgedDoctorUserId);
    }

    let decision_raw = fields
        .get("decisao")
        .or_else(|| fields.get("decision"))
        .ok_or(TemplateParseError::MissingOrInvalid("decisao"))?;
    let decision = decision_raw
        .parse::<DoctorDecision>()
        .map_err(|_| TemplateParseError::MissingOrInvalid("decisao"))?;

    let support_raw = fields
        .get("suporte")
        .or_else(|| fields.get("support_flag"))
        .or_else(|| fields.get("support"))
        .ok_or(TemplateParseError::MissingOrInvalid("suporte"))?;
    let support_flag = support_raw
        .parse::<SupportFlag>()
        .map_err(|_| TemplateParseError::MissingOrInvalid("suporte"))?;

    let reason = fields.get("motivo").or_else(|| fields.get("reason")).cloned();
    let case_id = parse_case_line(&fields)?;

    Ok(ParsedRoom2Decision { decision, support_flag, reason, case_id })
}

/// Parse a Room-3 scheduler reply body:
/// `status: confirmado|negado`, `data_hora: DD-MM-YYYY HH:MM BRT`,
/// `local:`, `instrucoes:`, `motivo:`, `caso: <uuid>`.
pub fn parse_room3_reply(body: &str) -> Result<ParsedRoom3Reply, TemplateParseError> {
    let fields = parse_kv_lines(body);

    let status_raw = fields.get("status").ok_or(TemplateParseError::MissingOrInvalid("status"))?;
    let appointment_status = status_raw
        .parse::<AppointmentStatus>()
        .map_err(|_| TemplateParseError::MissingOrInvalid("status"))?;

    let datetime_text = fields.get("data_hora").or_else(|| fields.get("datetime")).cloned();
    let location = fields.get("local").or_else(|| fields.get("location")).cloned();
    let instructions = fields.get("instrucoes").or_else(|| fields.get("instructions")).cloned();
    let reason = fields.get("motivo").or_else(|| fields.get("reason")).cloned();
    let case_id = parse_case_line(&fields)?;

    Ok(ParsedRoom3Reply { appointment_status, datetime_text, location, instructions, reason, case_id })
}

/// `resultado: sucesso|erro` ack reply posted after every Room-2 chat-based
/// decision attempt, success or rejection alike.
#[must_use]
pub fn render_room2_ack(success: bool, detail: &str) -> String {
    let resultado = if success { "sucesso" } else { "erro" };
    format!("resultado: {resultado}\ndetalhe: {detail}")
}

/// Strict reformat-prompt reply posted when a Room-3 reply fails to parse.
#[must_use]
pub fn render_room3_reformat_prompt(case_id: Uuid) -> String {
    format!(
        "Não foi possível interpretar a resposta. Use exatamente o formato:\n\
         status: confirmado|negado\n\
         data_hora: DD-MM-YYYY HH:MM BRT\n\
         local: ...\n\
         instrucoes: ...\n\
         motivo: ...\n\
         caso: {case_id}"
    )
}

/// Room-1 final reply body for a doctor-deny outcome.
#[must_use]
pub fn render_room1_final_denial(reason: &str) -> String {
    format!("Solicitação negada pelo médico.\nMotivo: {reason}")
}

/// Room-1 final reply body for a confirmed appointment.
#[must_use]
pub fn render_room1_final_appt_confirmed(
    datetime_text: &str,
    location: &str,
    instructions: &str,
) -> String {
    format!(
        "Agendamento confirmado.\nData/hora: {datetime_text}\nLocal: {location}\nInstruções: {instructions}"
    )
}

/// Room-1 final reply body for a denied appointment.
#[must_use]
pub fn render_room1_final_appt_denied(reason: &str) -> String {
    format!("Agendamento negado.\nMotivo: {reason}")
}

/// Room-1 final reply body for a case that was dead-lettered.
#[must_use]
pub fn render_room1_final_failure(cause: &str, details: &str) -> String {
    format!("Não foi possível concluir o processamento.\nCausa: {cause}\nDetalhes: {details}")
}

/// Deterministic filename for the Room-2 PDF-text attachment reply, stable
/// across retries of `post_room2_widget` so a redelivered job doesn't post
/// under a different name.
#[must_use]
pub fn room2_attachment_filename(case_id: Uuid) -> String {
    format!("caso-{case_id}-relatorio.txt")
}

/// Root message opening a case's Room-2 thread. `prior_case_note` is the
/// §4.6 prior-denial lookup rendered as a one-line note, or `None` when no
/// prior denial falls within the lookup window.
#[must_use]
pub fn render_room2_root(case_id: Uuid, agency_record_number: &str, prior_case_note: Option<&str>) -> String {
    let mut body = format!("Novo caso para avaliação.\nGuia: {agency_record_number}\nCaso: {case_id}");
    if let Some(note) = prior_case_note {
        body.push_str("\n\n");
        body.push_str(note);
    }
    body
}

/// One-line prior-denial note for the Room-2 root message (§4.6).
#[must_use]
pub fn render_prior_case_note(denial_count_in_window: i64, most_recent_reason: &str) -> String {
    format!(
        "Atenção: {denial_count_in_window} negativa(s) para esta guia nos últimos 7 dias. \
         Motivo mais recente: {most_recent_reason}"
    )
}

/// Summary reply built from LLM1's structured data and the reconciled
/// suggested action.
#[must_use]
pub fn render_room2_summary(summary_text: &str, suggested_action_json: &serde_json::Value) -> String {
    format!("Resumo clínico:\n{summary_text}\n\nSugestão do sistema:\n{suggested_action_json}")
}

/// The decision-template reply: instructs the doctor on the exact
/// plaintext form the Room-2 chat-based decision reply must take.
#[must_use]
pub fn render_room2_decision_template(case_id: Uuid) -> String {
    format!(
        "Para decidir, responda a esta mensagem exatamente no formato:\n\
         decisao: aceitar|negar\n\
         suporte: nenhum|anestesista|anestesista_uti\n\
         motivo: ...\n\
         caso: {case_id}"
    )
}

/// The Room-3 scheduling request body, posted once a doctor has accepted
/// a case.
#[must_use]
pub fn render_room3_request(case_id: Uuid, summary_text: &str) -> String {
    format!(
        "Solicitação de agendamento.\nResumo: {summary_text}\n\n\
         Para responder, use exatamente o formato:\n\
         status: confirmado|negado\n\
         data_hora: DD-MM-YYYY HH:MM BRT\n\
         local: ...\n\
         instrucoes: ...\n\
         motivo: ...\n\
         caso: {case_id}"
    )
}

/// Short bot acknowledgement posted alongside a fresh Room-3 request,
/// tracked by a `ROOM3_ACK` reaction checkpoint.
#[must_use]
pub fn render_room3_ack() -> &'static str {
    "Aguardando confirmação de agendamento."
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_room2_decision_with_portuguese_keys() {
        let case_id = Uuid::new_v4();
        let body = format!("decisao: aceitar\nsuporte: nenhum\nmotivo: ok\ncaso: {case_id}");
        let parsed = parse_room2_decision(&body).unwrap();
        assert_eq!(parsed.decision, DoctorDecision::Accept);
        assert_eq!(parsed.support_flag, SupportFlag::None);
        assert_eq!(parsed.case_id, case_id);
    }

    #[test]
    fn parses_room2_decision_with_english_synonyms_and_no_space_after_colon() {
        let case_id = Uuid::new_v4();
        let body = format!("decision:deny\nsupport_flag:none\ncase:{case_id}");
        let parsed = parse_room2_decision(&body).unwrap();
        assert_eq!(parsed.decision, DoctorDecision::Deny);
    }

    #[test]
    fn rejects_forged_doctor_user_id() {
        let body = "decisao: aceitar\nsuporte: nenhum\ndoctor_user_id: @attacker:example.org\ncaso: 00000000-0000-0000-0000-000000000000";
        assert_eq!(parse_room2_decision(body), Err(TemplateParseError::ForgedDoctorUserId));
    }

    #[test]
    fn rejects_missing_case_line() {
        let body = "decisao: aceitar\nsuporte: nenhum";
        assert_eq!(parse_room2_decision(body), Err(TemplateParseError::MissingOrInvalid("caso")));
    }

    #[test]
    fn rejects_malformed_case_uuid() {
        let body = "decisao: aceitar\nsuporte: nenhum\ncaso: not-a-uuid";
        assert_eq!(parse_room2_decision(body), Err(TemplateParseError::InvalidCaseLine));
    }

    #[test]
    fn parses_room3_confirmed_reply() {
        let case_id = Uuid::new_v4();
        let body = format!(
            "status: confirmado\ndata_hora: 16-02-2026 14:30 BRT\nlocal: Sala 2\ninstrucoes: Jejum 8h\nmotivo: \ncaso: {case_id}"
        );
        let parsed = parse_room3_reply(&body).unwrap();
        assert_eq!(parsed.appointment_status, AppointmentStatus::Confirmed);
        assert_eq!(parsed.location.as_deref(), Some("Sala 2"));
        assert_eq!(parsed.case_id, case_id);
    }
}
