use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::ValidationError;

pub const MIN_PRICE: Decimal = Decimal::ONE;
pub const MAX_PRICE: Decimal = Decimal::from_parts(25_000, 0, 0, false, 0);

/// Required listing fields in prompt-priority order. The collection flow
/// asks for exactly one missing field at a time, always the first of this
/// order that is still empty.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequiredField {
    Designer,
    ItemType,
    Size,
    Condition,
    Price,
}

pub const REQUIRED_FIELD_PRIORITY: [RequiredField; 5] = [
    RequiredField::Designer,
    RequiredField::ItemType,
    RequiredField::Size,
    RequiredField::Condition,
    RequiredField::Price,
];

impl RequiredField {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Designer => "designer",
            Self::ItemType => "item type",
            Self::Size => "size",
            Self::Condition => "condition",
            Self::Price => "asking price",
        }
    }
}

/// Everything the seller has told us about the item so far.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ListingFields {
    pub designer: Option<String>,
    pub item_type: Option<String>,
    pub size: Option<String>,
    pub condition: Option<String>,
    pub asking_price: Option<Decimal>,
    pub details: Option<String>,
    pub color_material: Option<String>,
    pub reference_link: Option<String>,
}

/// Partial update produced by one extraction pass. A `Some` field
/// overwrites, a `None` field leaves the existing value untouched; the
/// extractor is never authoritative for fields it did not mention. The
/// price arrives as raw text and is validated before any merge.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldPatch {
    pub designer: Option<String>,
    pub item_type: Option<String>,
    pub size: Option<String>,
    pub condition: Option<String>,
    pub asking_price: Option<String>,
    pub details: Option<String>,
    pub color_material: Option<String>,
    pub reference_link: Option<String>,
}

impl FieldPatch {
    pub fn is_empty(&self) -> bool {
        self.designer.is_none()
            && self.item_type.is_none()
            && self.size.is_none()
            && self.condition.is_none()
            && self.asking_price.is_none()
            && self.details.is_none()
            && self.color_material.is_none()
            && self.reference_link.is_none()
    }
}

/// Result of merging one patch into the known fields.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub applied: bool,
    pub invalid_price: Option<ValidationError>,
}

impl ListingFields {
    /// Last-extraction-wins per field: present overwrites, absent
    /// preserves. Blank strings count as absent. An invalid price is
    /// rejected without touching the stored price and reported in the
    /// outcome so the caller can re-prompt for that field only.
    pub fn merge(&mut self, patch: FieldPatch) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();

        outcome.applied |= overwrite(&mut self.designer, patch.designer);
        outcome.applied |= overwrite(&mut self.item_type, patch.item_type);
        outcome.applied |= overwrite(&mut self.size, patch.size);
        outcome.applied |= overwrite(&mut self.condition, patch.condition);
        outcome.applied |= overwrite(&mut self.details, patch.details);
        outcome.applied |= overwrite(&mut self.color_material, patch.color_material);
        outcome.applied |= overwrite(&mut self.reference_link, patch.reference_link);

        if let Some(raw) = patch.asking_price {
            if !raw.trim().is_empty() {
                match parse_price(&raw) {
                    Ok(price) => {
                        if self.asking_price != Some(price) {
                            self.asking_price = Some(price);
                            outcome.applied = true;
                        }
                    }
                    Err(error) => outcome.invalid_price = Some(error),
                }
            }
        }

        outcome
    }

    pub fn missing_required(&self) -> Vec<RequiredField> {
        REQUIRED_FIELD_PRIORITY
            .iter()
            .copied()
            .filter(|field| !self.has_required(*field))
            .collect()
    }

    pub fn next_missing(&self) -> Option<RequiredField> {
        self.missing_required().into_iter().next()
    }

    pub fn is_complete(&self) -> bool {
        self.missing_required().is_empty()
    }

    fn has_required(&self, field: RequiredField) -> bool {
        match field {
            RequiredField::Designer => filled(&self.designer),
            RequiredField::ItemType => filled(&self.item_type),
            RequiredField::Size => filled(&self.size),
            RequiredField::Condition => filled(&self.condition),
            RequiredField::Price => self.asking_price.is_some(),
        }
    }

    pub fn clear_required(&mut self) {
        self.designer = None;
        self.item_type = None;
        self.size = None;
        self.condition = None;
        self.asking_price = None;
    }

    pub fn clear_price(&mut self) {
        self.asking_price = None;
    }
}

fn filled(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|text| !text.trim().is_empty())
}

/// Present-and-changed overwrites; absent, blank, or identical input is
/// not "new information" and leaves the slot (and the applied flag)
/// alone.
fn overwrite(slot: &mut Option<String>, incoming: Option<String>) -> bool {
    match incoming {
        Some(value) if !value.trim().is_empty() => {
            let value = value.trim().to_owned();
            if slot.as_deref() == Some(value.as_str()) {
                false
            } else {
                *slot = Some(value);
                true
            }
        }
        _ => false,
    }
}

/// Parse a user-supplied price: `$85`, `85`, `85.50`, `1,200` and a
/// trailing `usd`/`dollars` are all accepted. Rejects non-numeric input
/// and prices outside `MIN_PRICE..=MAX_PRICE` before anything is written
/// to the draft.
pub fn parse_price(raw: &str) -> Result<Decimal, ValidationError> {
    let mut trimmed = raw.trim().trim_start_matches('$').trim().to_ascii_lowercase();
    for suffix in ["usd", "dollars", "dollar", "bucks"] {
        if let Some(stripped) = trimmed.strip_suffix(suffix) {
            trimmed = stripped.trim().to_owned();
            break;
        }
    }
    let normalized = trimmed.replace(',', "");

    if normalized.is_empty() {
        return Err(ValidationError::InvalidPrice { raw: raw.to_owned() });
    }

    let price = normalized
        .parse::<Decimal>()
        .map_err(|_| ValidationError::InvalidPrice { raw: raw.to_owned() })?;

    if price < MIN_PRICE || price > MAX_PRICE {
        return Err(ValidationError::PriceOutOfRange {
            price: price.to_string(),
            min: MIN_PRICE.to_string(),
            max: MAX_PRICE.to_string(),
        });
    }

    Ok(price.normalize())
}

pub fn format_price(price: Decimal) -> String {
    format!("${}", price.normalize())
}
