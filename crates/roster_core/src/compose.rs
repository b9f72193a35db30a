//! Renders an [`Event`] through the email template into addresses, a
//! subject line and a plain-text body. Delivery happens elsewhere.

use std::fmt::Write as _;

use shared::{
    domain::{EmailTemplate, Manager, SendType, Shift},
    event::Event,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComposedEmail {
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: String,
    pub body: String,
}

pub fn compose(event: &Event, template: &EmailTemplate, managers: &[Manager]) -> ComposedEmail {
    let values = placeholder_values(event, template);
    let mut email = ComposedEmail::default();

    for manager in managers {
        push_address(&mut email.to, &manager.email);
    }
    let volunteer_field = match template.send_type {
        SendType::To => &mut email.to,
        SendType::Cc => &mut email.cc,
        SendType::Bcc => &mut email.bcc,
    };
    for volunteer in event.assigned_volunteers() {
        push_address(volunteer_field, &volunteer.email);
    }

    email.subject = fill(&template.subject_line_template, &values);

    let mut sections = Vec::new();
    let pre = fill(&template.pre_schedule_text, &values);
    if !pre.trim().is_empty() {
        sections.push(pre);
    }
    sections.push(
        event
            .shifts
            .iter()
            .map(schedule_line)
            .collect::<Vec<_>>()
            .join("\n"),
    );
    let post = fill(&template.post_schedule_text, &values);
    if !post.trim().is_empty() {
        sections.push(post);
    }
    if !managers.is_empty() {
        let contacts: Vec<String> = managers.iter().map(manager_line).collect();
        sections.push(format!("Managers:\n{}", contacts.join("\n")));
    }
    email.body = sections.join("\n\n");
    email
}

fn placeholder_values(event: &Event, template: &EmailTemplate) -> Vec<(String, String)> {
    let date = event
        .date
        .map(|date| template.date_format.format(date))
        .unwrap_or_default();
    std::iter::once(("date".to_string(), date))
        .chain(
            event
                .properties
                .iter()
                .map(|entry| (entry.property.name.clone(), entry.value.clone())),
        )
        .collect()
}

/// Replaces `{name}` tokens with their value; unknown tokens stay as written.
fn fill(text: &str, values: &[(String, String)]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            return out;
        };
        let key = &after[..close];
        if let Some(inner) = key.rfind('{') {
            // stray brace: keep it as text and rescan from the inner one
            let restart = open + 1 + inner;
            out.push_str(&rest[open..restart]);
            rest = &rest[restart..];
            continue;
        }
        match values.iter().find(|(name, _)| name == key) {
            Some((_, value)) => out.push_str(value),
            None => {
                out.push('{');
                out.push_str(key);
                out.push('}');
            }
        }
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    out
}

fn schedule_line(shift: &Shift) -> String {
    let Some(volunteer) = &shift.volunteer else {
        return format!("{}: (open)", shift.description);
    };
    let mut line = format!("{}: {}", shift.description, volunteer.name);
    if shift.display_volunteer_email && !volunteer.email.is_empty() {
        let _ = write!(line, " <{}>", volunteer.email);
    }
    if shift.display_volunteer_phone && !volunteer.phone.is_empty() {
        let _ = write!(line, " ({})", volunteer.phone);
    }
    if shift.display_volunteer_notes && !volunteer.notes.is_empty() {
        let _ = write!(line, " - {}", volunteer.notes);
    }
    line
}

fn manager_line(manager: &Manager) -> String {
    let mut line = manager.name.clone();
    if !manager.email.is_empty() {
        let _ = write!(line, " <{}>", manager.email);
    }
    if !manager.phone.is_empty() {
        let _ = write!(line, " ({})", manager.phone);
    }
    line
}

fn push_address(field: &mut Vec<String>, address: &str) {
    let address = address.trim();
    if !address.is_empty() && !field.iter().any(|known| known == address) {
        field.push(address.to_string());
    }
}

#[cfg(test)]
#[path = "tests/compose_tests.rs"]
mod tests;
