//! Upstream address record to vCard 3.0 serialization
//!
//! Read-only direction: the CardDAV surface never writes addresses back.

use davgate_core::model::{AddressRecord, PostAddress};

/// Serialize an address record as a vCard
///
/// UID is the upstream key; FN falls back to the key when the record has no
/// post address line. The address type travels as a category; tax id and
/// client number ride in X- extensions.
pub fn address_to_vcard(record: &AddressRecord) -> String {
    let key = record.key.as_deref().unwrap_or_default();
    let post = record
        .post_addresses
        .first()
        .and_then(|entry| entry.post_address.as_ref());

    let formatted_name = post
        .and_then(|p| p.line1.as_deref())
        .filter(|l| !l.is_empty())
        .unwrap_or(key);

    let mut lines: Vec<String> = Vec::new();
    lines.push("BEGIN:VCARD".into());
    lines.push("VERSION:3.0".into());
    lines.push(format!("UID:{}", escape_text(key)));
    lines.push(format!("FN:{}", escape_text(formatted_name)));
    lines.push(format!("N:{};;;;", escape_text(formatted_name)));
    lines.push(format!("ORG:{}", escape_text(formatted_name)));

    if let Some(address_type) = record.address_type.as_deref().filter(|t| !t.is_empty()) {
        lines.push(format!(
            "CATEGORIES:{}",
            escape_text(&address_type.to_uppercase())
        ));
    }

    if let Some(post) = post {
        push_post_address(&mut lines, post);
    }

    if let Some(note) = record.note.as_deref().filter(|n| !n.is_empty()) {
        lines.push(format!("NOTE:{}", escape_text(note)));
    }
    if let Some(tax_id) = record.tax_id.as_deref().filter(|t| !t.is_empty()) {
        lines.push(format!("X-TAXID:{}", escape_text(tax_id)));
    }
    if let Some(client_number) = record.client_number.as_deref().filter(|c| !c.is_empty()) {
        lines.push(format!("X-CLIENTNUMBER:{}", escape_text(client_number)));
    }

    lines.push("END:VCARD".into());
    let mut out = lines.join("\r\n");
    out.push_str("\r\n");
    out
}

fn push_post_address(lines: &mut Vec<String>, post: &PostAddress) {
    let street = post.street.as_deref().unwrap_or_default();
    let zip_city = post.zip_code_and_city.as_deref().unwrap_or_default();

    // The upstream stores "12345 City Name" as a single field
    let (postal_code, city) = match zip_city.split_once(' ') {
        Some((zip, city)) if zip.chars().all(|c| c.is_ascii_digit()) => (zip, city),
        _ => ("", zip_city),
    };

    if !street.is_empty() || !city.is_empty() || !postal_code.is_empty() {
        lines.push(format!(
            "ADR;TYPE=WORK:;;{};{};;{};",
            escape_text(street),
            escape_text(city),
            escape_text(postal_code)
        ));
    }

    if let Some(phone) = post.phone.as_deref().filter(|p| !p.is_empty()) {
        lines.push(format!("TEL;TYPE=WORK:{}", escape_text(phone)));
    }
    if let Some(mobile) = post.mobile.as_deref().filter(|m| !m.is_empty()) {
        lines.push(format!("TEL;TYPE=CELL:{}", escape_text(mobile)));
    }
    if let Some(fax) = post.fax.as_deref().filter(|f| !f.is_empty()) {
        lines.push(format!("TEL;TYPE=FAX:{}", escape_text(fax)));
    }
    if let Some(email) = post.email.as_deref().filter(|e| !e.is_empty()) {
        lines.push(format!("EMAIL;TYPE=WORK:{}", escape_text(email)));
    }
    if let Some(website) = post.website.as_deref().filter(|w| !w.is_empty()) {
        lines.push(format!("URL:{}", escape_text(website)));
    }
}

/// vCard text escaping (RFC 6350 §3.4)
fn escape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ',' => out.push_str("\\,"),
            ';' => out.push_str("\\;"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            other => out.push(other),
        }
    }
    out
}
