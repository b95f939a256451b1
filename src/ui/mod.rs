pub mod components;
pub mod embeds;

/// Recorta a `max` caracteres (no bytes), añadiendo `…` si hizo falta.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}
