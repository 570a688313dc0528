//! Placeholder substitution for action config strings.
//!
//! Two pattern classes, resolved in one linear pass each: `{{lead.<field>}}`
//! from the lead snapshot, then `{{<field>}}` from the trigger event data.
//! Lead-scoped tokens resolve first, so a key present in both sources favors
//! the lead snapshot. Substituted values are never re-scanned, so a value
//! containing `{{...}}` cannot inject further tokens.

use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::OnceLock;

use leadflow_core::types::LeadSnapshot;

fn lead_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{lead\.(\w+)\}\}").expect("valid lead token pattern"))
}

fn event_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{(\w+)\}\}").expect("valid event token pattern"))
}

/// Render an event-data value the way a template consumer expects: strings
/// bare, everything else as its JSON form.
fn render_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Substitute placeholders in `template`. `None` resolves to the empty
/// string. Tokens with no matching field are left verbatim.
pub fn resolve(
    template: Option<&str>,
    lead: Option<&LeadSnapshot>,
    event_data: &HashMap<String, serde_json::Value>,
) -> String {
    let Some(template) = template else {
        return String::new();
    };

    let after_lead = lead_token_re().replace_all(template, |caps: &Captures| {
        let field = &caps[1];
        match lead.and_then(|l| l.field(field)) {
            Some(value) => value,
            None => caps[0].to_string(),
        }
    });

    event_token_re()
        .replace_all(&after_lead, |caps: &Captures| {
            let field = &caps[1];
            match event_data.get(field) {
                Some(value) => render_value(value),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}
