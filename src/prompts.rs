//! Prompt templates sent to the providers.
//!
//! The prompt text is shared by both providers; only the request envelope
//! differs.

use crate::models::SearchFilters;

/// System message for the chat-completion provider in JSON-object mode.
pub const CEREBRAS_SYSTEM_PROMPT: &str = "Sei un assistente specializzato in analisi industriale lombarda. Rispondi SEMPRE e SOLO con un oggetto JSON contenente un array chiamato \"companies\".";

/// Persona of the live voice assistant.
pub const LIVE_SYSTEM_INSTRUCTION: &str = "You are an energy consultant for Lombardy, Italy. You help users find industrial companies and discuss their electricity consumption. Be concise and professional.";

/// Exclusion line for a follow-up search.
///
/// Lists every already-known name so the model can avoid repeating them.
/// This is advisory; nothing downstream enforces it.
pub fn exclusion_text(existing_names: &[String]) -> String {
    if existing_names.is_empty() {
        "Cerca le aziende più rilevanti.".to_string()
    } else {
        format!(
            "NON includere queste aziende già trovate: {}. Cerca aziende DIVERSE.",
            existing_names.join(", ")
        )
    }
}

/// Generation prompt for a geographic search.
pub fn search_prompt(filters: &SearchFilters, existing_names: &[String]) -> String {
    format!(
        "Agisci come un analista industriale esperto di Lombardia.
Genera un elenco dettagliato di aziende (industrie, logistica, manifattura, grandi strutture) REALI e note situate a {city} ({province}).

ISTRUZIONI DI RICERCA:
1. Focalizzati su zone industriali, distretti e aree artigianali.
2. {exclusion}
3. Per ogni azienda identifica dati verosimili: P.IVA (se nota), indirizzo preciso, settore.
4. Stima il consumo elettrico annuo (GWh) basandoti sulla tipologia di impianto.

Fornisci i risultati in formato JSON strutturato con questi campi: name, vatNumber, address, city, province, industry, estimatedConsumptionGWh (numero), category (HIGH se > 1.5, LOW altrimenti).",
        city = filters.city,
        province = filters.province,
        exclusion = exclusion_text(existing_names),
    )
}

/// Extraction prompt for pasted free text.
pub fn raw_data_prompt(raw: &str) -> String {
    format!(
        "Trasforma questo testo grezzo in una lista JSON di aziende con stima consumi GWh:\n{}",
        raw
    )
}
