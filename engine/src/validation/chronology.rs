//! Ordering checks over the date-bearing fields of a record.

use std::cmp::Ordering;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::FieldError;
use crate::date::PartialDate;
use crate::record::Biography;

/// A promotion as seen by the chronology check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PromotionDate {
    /// Rank attained.
    #[serde(default)]
    pub rank: Option<String>,
    /// Date of the promotion (YYYY or YYYY-MM-DD).
    #[serde(default)]
    pub date: Option<String>,
}

/// A partially filled set of dates to check for ordering.
///
/// Doubles as the input of the `validate_dates` tool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ChronologyInput {
    /// Birth date (YYYY or YYYY-MM-DD).
    #[serde(default)]
    pub birth_date: Option<String>,
    /// Military enlistment date.
    #[serde(default)]
    pub enlistment_date: Option<String>,
    /// Party membership date.
    #[serde(default)]
    pub party_membership_date: Option<String>,
    /// Promotions in source order.
    #[serde(default)]
    pub promotions: Vec<PromotionDate>,
    /// Retirement date.
    #[serde(default)]
    pub retirement_date: Option<String>,
    /// Date of death.
    #[serde(default)]
    pub death_date: Option<String>,
}

impl From<&Biography> for ChronologyInput {
    fn from(record: &Biography) -> Self {
        Self {
            birth_date: record.birth_date.clone(),
            enlistment_date: record.enlistment_date.clone(),
            party_membership_date: record.party_membership_date.clone(),
            promotions: record
                .promotions
                .iter()
                .flatten()
                .map(|p| PromotionDate {
                    rank: Some(p.rank.clone()),
                    date: p.date.clone(),
                })
                .collect(),
            retirement_date: record.retirement_date.clone(),
            death_date: record.death_date.clone(),
        }
    }
}

/// Outcome of [`check_chronology`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChronologyReport {
    /// One entry per violated pair.
    pub errors: Vec<FieldError>,
    /// Unusual but valid orderings.
    pub warnings: Vec<String>,
}

impl ChronologyReport {
    /// True when no ordering was violated. Warnings do not count.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.errors.is_empty()
    }
}

struct Point {
    field: String,
    label: String,
    date: PartialDate,
}

impl Point {
    /// Blank values count as absent. Malformed ones are reported and left
    /// out of the ordering.
    fn parse(
        field: impl Into<String>,
        label: impl Into<String>,
        raw: Option<&str>,
        errors: &mut Vec<FieldError>,
    ) -> Option<Self> {
        let raw = raw.map(str::trim).filter(|raw| !raw.is_empty())?;
        let field = field.into();
        match PartialDate::parse(raw) {
            Ok(date) => Some(Self {
                field,
                label: label.into(),
                date,
            }),
            Err(e) => {
                errors.push(FieldError::new(field, e.to_string()));
                None
            }
        }
    }

    fn violation(earlier: &Self, later: &Self) -> FieldError {
        FieldError::new(
            later.field.clone(),
            format!(
                "{} {} is after {} {}",
                earlier.label, earlier.date, later.label, later.date
            ),
        )
    }
}

/// Checks birth ≤ enlistment ≤ promotions (in list order) ≤ retirement ≤ death,
/// plus birth ≤ party membership ≤ death.
///
/// Absent dates are skipped. A date that is not `YYYY` or a real
/// `YYYY-MM-DD` day is an error on its own field and takes no part in the
/// ordering. Each present date in the main chain reports at most one error,
/// against its nearest predecessor that is
/// later than it, so `2000 / 1990 / 1980` yields the birth/enlistment and
/// enlistment/death pairs. Mixed granularity can break transitivity
/// (`1961-05-01`, `1961`, `1961-03-01`), which is why the scan does not stop
/// at the immediate predecessor.
#[must_use]
pub fn check_chronology(input: &ChronologyInput) -> ChronologyReport {
    let mut report = ChronologyReport::default();
    let errors = &mut report.errors;
    let birth = Point::parse("birth_date", "Birth date", input.birth_date.as_deref(), errors);
    let enlistment = Point::parse(
        "enlistment_date",
        "Enlistment date",
        input.enlistment_date.as_deref(),
        errors,
    );
    let party = Point::parse(
        "party_membership_date",
        "Party membership date",
        input.party_membership_date.as_deref(),
        errors,
    );

    let mut chain: Vec<&Point> = Vec::new();
    chain.extend(birth.as_ref());
    chain.extend(enlistment.as_ref());
    let promotions: Vec<Point> = input
        .promotions
        .iter()
        .enumerate()
        .filter_map(|(index, p)| {
            let label = p
                .rank
                .as_deref()
                .map_or_else(|| "Promotion".to_string(), |rank| format!("Promotion to {rank}"));
            Point::parse(format!("promotions.{index}.date"), label, p.date.as_deref(), errors)
        })
        .collect();
    chain.extend(promotions.iter());
    let retirement = Point::parse(
        "retirement_date",
        "Retirement date",
        input.retirement_date.as_deref(),
        errors,
    );
    chain.extend(retirement.as_ref());
    let death = Point::parse("death_date", "Death date", input.death_date.as_deref(), errors);
    chain.extend(death.as_ref());

    for (index, later) in chain.iter().enumerate() {
        let nearest_violation = chain[..index]
            .iter()
            .rev()
            .find(|earlier| earlier.date.cmp_coarse(&later.date) == Ordering::Greater);
        if let Some(earlier) = nearest_violation {
            report.errors.push(Point::violation(earlier, later));
        }
    }

    if let Some(party) = &party {
        if let Some(birth) = &birth {
            if birth.date.cmp_coarse(&party.date) == Ordering::Greater {
                report.errors.push(Point::violation(birth, party));
            }
        }
        if let Some(death) = &death {
            if party.date.cmp_coarse(&death.date) == Ordering::Greater {
                report.errors.push(Point::violation(party, death));
            }
        }
        if let Some(enlistment) = &enlistment {
            if party.date.cmp_coarse(&enlistment.date) == Ordering::Less {
                report.warnings.push(format!(
                    "Party membership date {} is before enlistment date {}",
                    party.date, enlistment.date
                ));
            }
        }
    }

    report
}
