use crate::models::{Company, SearchFilters};

/// Column titles, in order: name, VAT, address, city, industry, GWh.
pub const CSV_HEADERS: [&str; 6] = ["Nome", "P.IVA", "Indirizzo", "Citta", "Settore", "Consumo GWh"];

/// Quotes a field only when it would otherwise break the row.
fn csv_field(value: &str) -> String {
    if value.contains(&[',', '"', '\n', '\r'][..]) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Renders the lead list as CSV: a header row, then one row per company.
pub fn companies_to_csv(companies: &[Company]) -> String {
    let mut lines = Vec::with_capacity(companies.len() + 1);
    lines.push(CSV_HEADERS.join(","));

    for c in companies {
        let row = [
            csv_field(&c.name),
            csv_field(c.vat_number.as_deref().unwrap_or("N/A")),
            csv_field(&c.address),
            csv_field(&c.city),
            csv_field(&c.industry),
            c.estimated_consumption_gwh.to_string(),
        ];
        lines.push(row.join(","));
    }

    lines.join("\n")
}

/// Download name derived from the last search, e.g. `leads_audit_Milano.csv`.
///
/// The city is kept as typed, accents included; only path separators and
/// control characters are replaced.
pub fn export_filename(filters: Option<&SearchFilters>) -> String {
    let city = filters
        .map(|f| f.city.trim())
        .filter(|c| !c.is_empty())
        .unwrap_or("lombardia");

    let safe: String = city
        .chars()
        .map(|ch| if ch == '/' || ch == '\\' || ch.is_control() { '_' } else { ch })
        .collect();

    format!("leads_audit_{}.csv", safe)
}

/// Plain `filename=` value for clients without RFC 6266 support.
fn ascii_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, ' ' | '-' | '_' | '.') {
                ch
            } else {
                '_'
            }
        })
        .collect()
}

/// RFC 5987 `ext-value` body: UTF-8 bytes, percent-encoded outside `attr-char`.
fn rfc5987_encode(value: &str) -> String {
    let mut encoded = String::with_capacity(value.len());
    for byte in value.bytes() {
        let ch = byte as char;
        if ch.is_ascii_alphanumeric() || "!#$&+-.^_`|~".contains(ch) {
            encoded.push(ch);
        } else {
            encoded.push_str(&format!("%{:02X}", byte));
        }
    }
    encoded
}

/// `Content-Disposition` for a CSV download: an ASCII fallback name plus
/// the exact UTF-8 name as `filename*`.
pub fn content_disposition(filename: &str) -> String {
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        ascii_filename(filename),
        rfc5987_encode(filename)
    )
}
