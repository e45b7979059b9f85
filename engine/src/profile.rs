//! Source profiles: what a kind of source usually contains.

/// Expectations about one kind of biographical source.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceProfile {
    /// Identifier (`universal`).
    pub source_type: &'static str,
    /// Human-readable name.
    pub display_name: &'static str,
    /// One-line description used in the system prompt.
    pub source_description: &'static str,
    /// Source-specific guidance for the model.
    pub extraction_context: &'static str,
    /// Fields most sources of this kind contain.
    pub common_fields: &'static [&'static str],
    /// Fields that must be checked with an evidence probe before being set.
    pub rare_fields: &'static [&'static str],
    /// Per-field notes.
    pub field_expectations: &'static [(&'static str, &'static str)],
    /// Suggested probe terms per field.
    pub field_search_terms: &'static [(&'static str, &'static [&'static str])],
    /// Confidence below which a record goes to review.
    pub min_confidence_threshold: f64,
}

impl SourceProfile {
    /// The default profile, for any kind of source.
    #[must_use]
    pub const fn universal() -> Self {
        Self {
            source_type: "universal",
            display_name: "Universal Biographical Source",
            source_description: "any biographical source about a PLA officer: an obituary, news \
                                 article, encyclopedia entry, memoir or official biography",
            extraction_context: UNIVERSAL_CONTEXT,
            common_fields: &["notable_positions", "hometown"],
            rare_fields: &["spouse_name", "retirement_date"],
            field_expectations: &[
                (
                    "death_date",
                    "Present in obituaries, usually absent in news articles (subject alive)",
                ),
                ("enlistment_date", "Common in obituaries, rare in news articles"),
                (
                    "promotions",
                    "Detailed in obituaries, recent only in news, varies in other sources",
                ),
                ("notable_positions", "Present in most sources, completeness varies"),
                ("party_membership_date", "Common in obituaries, rare elsewhere"),
                ("spouse_name", "Rare in all sources except detailed obituaries"),
            ],
            field_search_terms: &[
                ("spouse_name", &["妻子", "夫人", "配偶", "爱人", "伴侣"]),
                ("retirement_date", &["退休", "离休", "退役"]),
                ("death_date", &["逝世", "去世", "病逝", "辞世", "died", "death"]),
                ("congress_participation", &["全国代表大会", "党代会", "代表", "Congress"]),
                ("cppcc_participation", &["政协", "全国委员会", "委员", "CPPCC"]),
            ],
            min_confidence_threshold: 0.65,
        }
    }

    /// Suggested probe terms for `field`, empty when none are known.
    #[must_use]
    pub fn search_terms(&self, field: &str) -> &'static [&'static str] {
        self.field_search_terms
            .iter()
            .find_map(|(name, terms)| (*name == field).then_some(*terms))
            .unwrap_or_default()
    }
}

impl Default for SourceProfile {
    fn default() -> Self {
        Self::universal()
    }
}

const UNIVERSAL_CONTEXT: &str = "First identify what kind of source this is, then set \
expectations accordingly.

- Obituary (逝世, 讣告, 悼念): the subject has died; expect a full career, enlistment date, \
promotions and awards. Confidence 0.80-0.95 when most fields are present.
- News article (新闻, 报道, 任命): the subject is usually alive; expect the current position and \
a recent promotion. Confidence 0.60-0.75 is normal.
- Encyclopedia entry (百科): structured entry with key dates and positions. Confidence 0.70-0.85.
- Social media post or memoir: brief, partial information. Confidence 0.40-0.70.

Extract everything that is present, and do not penalize a source for lacking information it \
would not normally contain. Record the identified source kind in source_type.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_terms() {
        let profile = SourceProfile::universal();
        assert_eq!(profile.search_terms("spouse_name")[0], "妻子");
        assert!(profile.search_terms("hometown").is_empty());
    }
}
