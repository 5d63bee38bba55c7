//! Extracts the payer's agency record number ("guia"/authorization number)
//! from an extracted PDF report and strips the matched line from the text
//! handed downstream, so the number isn't duplicated inside the cleaned
//! report body posted to Room 2.

use regex::Regex;
use std::sync::OnceLock;

fn pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^\s*(?:n[uú]mero\s+da\s+guia|guia(?:\s+n[.ºo°]?)?|registro|record\s*number)\s*[:#]?\s*([A-Za-z0-9.\-/]{3,})\s*$")
            .expect("static regex is valid")
    })
}

/// Result of scanning a report for its agency record number.
#[derive(Debug, Clone)]
pub struct RecordNumberResult {
    pub cleaned_text: String,
    pub agency_record_number: Option<String>,
}

/// Scan `text` line by line for the first line matching a known "guia"/
/// record-number label, extract the value, and return the text with that
/// line removed. If no line matches, `agency_record_number` is `None` and
/// the text is returned unchanged.
#[must_use]
pub fn extract_and_strip_agency_record_number(text: &str) -> RecordNumberResult {
    let regex = pattern();
    let mut agency_record_number = None;
    let mut kept_lines = Vec::new();

    for line in text.lines() {
        if agency_record_number.is_none() {
            if let Some(captures) = regex.captures(line) {
                agency_record_number = captures.get(1).map(|m| m.as_str().to_owned());
                continue;
            }
        }
        kept_lines.push(line);
    }

    RecordNumberResult { cleaned_text: kept_lines.join("\n"), agency_record_number }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_guia_label_and_strips_line() {
        let text = "Paciente: Fulano\nGuia: AB-12345\nProcedimento: Apendicectomia";
        let result = extract_and_strip_agency_record_number(text);
        assert_eq!(result.agency_record_number.as_deref(), Some("AB-12345"));
        assert!(!result.cleaned_text.contains("Guia:"));
        assert!(result.cleaned_text.contains("Paciente: Fulano"));
    }

    #[test]
    fn returns_none_when_no_label_present() {
        let text = "Paciente: Fulano\nProcedimento: Apendicectomia";
        let result = extract_and_strip_agency_record_number(text);
        assert!(result.agency_record_number.is_none());
        assert_eq!(result.cleaned_text, text);
    }
}
