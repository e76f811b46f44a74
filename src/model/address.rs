//! Email address rendering and normalization.

/// A display name paired with an address.
///
/// # Examples
/// - name `"Anna Rossi"`, address `"anna@example.com"` → `"Anna Rossi <anna@example.com>"`
/// - name `"Anna Rossi"`, no address → `"Anna Rossi"`
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct EmailAddress {
    /// Human-readable display name (may be empty).
    pub display_name: String,
    /// The address as reported by the store (may be empty or non-SMTP).
    pub address: String,
}

impl EmailAddress {
    /// Build from optional parts, trimming whitespace.
    pub fn from_parts(display_name: Option<&str>, address: Option<&str>) -> Self {
        Self {
            display_name: display_name.map(str::trim).unwrap_or_default().to_string(),
            address: address.map(str::trim).unwrap_or_default().to_string(),
        }
    }

    /// Format for display: `"Display Name <address>"`, or whichever part is present.
    pub fn display(&self) -> String {
        match (self.display_name.is_empty(), self.address.is_empty()) {
            (false, false) => format!("{} <{}>", self.display_name, self.address),
            (false, true) => self.display_name.clone(),
            (true, _) => self.address.clone(),
        }
    }
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}

const ADDRESS_SCHEMES: [&str; 3] = ["smtp", "sip", "mailto"];

/// Reduce the many textual encodings of an address to a lowercase comparable form.
///
/// Handles `Name <addr>`, `SMTP:addr`, `mailto:addr` and `;`/`,` separated
/// lists (the first segment with an `@` wins). Returns the first segment
/// lowercased when none contains an `@`.
pub fn normalize_email_address(value: &str) -> Option<String> {
    let mut text = value.trim();
    if text.is_empty() {
        return None;
    }

    if let (Some(start), Some(end)) = (text.find('<'), text.rfind('>')) {
        if start < end {
            text = &text[start + 1..end];
        }
    }

    let replaced = text.replace(',', ";");
    let segments: Vec<&str> = replaced
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    for segment in &segments {
        let mut candidate = *segment;
        if let Some((prefix, rest)) = candidate.split_once(':') {
            if ADDRESS_SCHEMES.contains(&prefix.to_lowercase().as_str()) {
                candidate = rest;
            }
        }
        let candidate = candidate
            .trim()
            .trim_matches(|c| c == '<' || c == '>')
            .trim()
            .to_lowercase();
        if candidate.contains('@') {
            return Some(candidate);
        }
    }

    let fallback = segments
        .first()
        .map(|s| s.to_lowercase())
        .unwrap_or_else(|| text.trim().to_lowercase());
    if fallback.is_empty() {
        None
    } else {
        Some(fallback)
    }
}

/// Domain part of a normalized address.
pub fn extract_email_domain(address: &str) -> Option<String> {
    let normalized = normalize_email_address(address)?;
    normalized
        .split_once('@')
        .map(|(_, domain)| domain.to_string())
}
