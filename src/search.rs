//! Search-term parsing and matching.
//!
//! A term is a disjunction of token groups: `"invoice acme OR refund"`
//! matches a record containing both `invoice` and `acme`, or `refund`.
//! Matching is case-insensitive substring matching per token.

use crate::model::EmailRecord;

/// Parsed search term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchTerms {
    groups: Vec<Vec<String>>,
}

impl SearchTerms {
    /// Parse a raw term. Returns `None` when it holds no tokens.
    pub fn parse(term: &str) -> Option<Self> {
        let groups: Vec<Vec<String>> = term
            .split(" OR ")
            .map(|group| {
                group
                    .split_whitespace()
                    .map(str::to_lowercase)
                    .collect::<Vec<_>>()
            })
            .filter(|tokens| !tokens.is_empty())
            .collect();
        if groups.is_empty() {
            None
        } else {
            Some(Self { groups })
        }
    }

    pub fn groups(&self) -> &[Vec<String>] {
        &self.groups
    }

    /// `true` when some group has every token in at least one field.
    pub fn matches_fields<S: AsRef<str>>(&self, fields: &[S]) -> bool {
        let lowered: Vec<String> = fields.iter().map(|f| f.as_ref().to_lowercase()).collect();
        self.groups.iter().any(|group| {
            group
                .iter()
                .all(|token| lowered.iter().any(|field| field.contains(token.as_str())))
        })
    }

    /// Match against the searchable fields of a formatted record.
    pub fn matches_record(&self, record: &EmailRecord) -> bool {
        let mut fields: Vec<&str> = vec![
            record.subject.as_str(),
            record.sender.as_str(),
            record.sender_email.as_str(),
            record.body.as_str(),
            record.preview.as_str(),
        ];
        fields.extend(record.recipients().map(String::as_str));
        self.matches_fields(&fields)
    }
}
