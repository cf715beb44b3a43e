//! Demographic normalisation.
//!
//! Caller input arrives as [`RawDemographics`] (loosely typed, as posted by an intake form) and
//! is turned into an immutable [`Demographics`] by [`normalize`]. Normalisation is pure and
//! performs every input check, so a `ValidationError` never reaches the network.

use crate::constants::MAX_NAME_LEN;
use crate::error::ValidationError;
use chrono::NaiveDate;
use intake_types::{Gender, NonEmptyText, TextError};
use serde::{Deserialize, Serialize};

/// Demographics as supplied by the caller, before any validation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawDemographics {
    #[serde(default)]
    pub family_name: String,
    #[serde(default)]
    pub given_name: Option<String>,
    /// ISO-8601 calendar date, `YYYY-MM-DD`.
    #[serde(default)]
    pub birth_date: String,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub address_line: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    /// Two-letter state or region code.
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub phone_home: Option<String>,
    #[serde(default)]
    pub phone_work: Option<String>,
    /// External payer member identifier.
    #[serde(default)]
    pub payer_id: Option<String>,
}

/// A normalised personal name.
///
/// `display` keeps the caller's casing with whitespace collapsed and is what gets written to the
/// registry. `key` is the lower-cased form used for comparison.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PersonName {
    display: NonEmptyText,
    key: String,
}

impl PersonName {
    fn parse(field: &'static str, raw: &str) -> Result<Self, ValidationError> {
        let display =
            NonEmptyText::with_max_len(collapse_whitespace(raw), MAX_NAME_LEN).map_err(|e| {
                match e {
                    TextError::Empty => ValidationError::MissingField(field),
                    TextError::TooLong { max, .. } => ValidationError::TooLong { field, max },
                }
            })?;
        let key = name_key(display.as_str());
        Ok(Self { display, key })
    }

    pub fn display(&self) -> &str {
        self.display.as_str()
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

/// Postal address. At least one field is always present.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Address {
    line: Option<String>,
    city: Option<String>,
    region: Option<String>,
    postal_code: Option<String>,
}

impl Address {
    pub fn line(&self) -> Option<&str> {
        self.line.as_deref()
    }

    pub fn city(&self) -> Option<&str> {
        self.city.as_deref()
    }

    /// Upper-case two-letter region code.
    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    pub fn postal_code(&self) -> Option<&str> {
        self.postal_code.as_deref()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PhoneUse {
    Home,
    Work,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Phone {
    use_type: PhoneUse,
    number: String,
}

impl Phone {
    pub fn use_type(&self) -> PhoneUse {
        self.use_type
    }

    pub fn number(&self) -> &str {
        &self.number
    }
}

/// Normalised demographics. Immutable once constructed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Demographics {
    family_name: PersonName,
    given_name: Option<PersonName>,
    birth_date: NaiveDate,
    gender: Gender,
    address: Option<Address>,
    phones: Vec<Phone>,
    payer_id: Option<String>,
}

impl Demographics {
    pub fn family_name(&self) -> &PersonName {
        &self.family_name
    }

    pub fn given_name(&self) -> Option<&PersonName> {
        self.given_name.as_ref()
    }

    pub fn birth_date(&self) -> NaiveDate {
        self.birth_date
    }

    pub fn gender(&self) -> Gender {
        self.gender
    }

    pub fn address(&self) -> Option<&Address> {
        self.address.as_ref()
    }

    pub fn phones(&self) -> &[Phone] {
        &self.phones
    }

    pub fn payer_id(&self) -> Option<&str> {
        self.payer_id.as_deref()
    }

    /// "Given Family", or just the family name when no given name was supplied.
    pub fn display_name(&self) -> String {
        match &self.given_name {
            Some(given) => format!("{} {}", given.display(), self.family_name.display()),
            None => self.family_name.display().to_string(),
        }
    }
}

/// Normalise caller-supplied demographics.
///
/// # Errors
///
/// Returns [`ValidationError`] when a required field is missing, a name is too long, the birth
/// date is not a real `YYYY-MM-DD` date, or gender, region or a phone number is malformed.
pub fn normalize(raw: &RawDemographics) -> Result<Demographics, ValidationError> {
    let family_name = PersonName::parse("family_name", &raw.family_name)?;
    let given_name = optional(&raw.given_name)
        .map(|g| PersonName::parse("given_name", g))
        .transpose()?;
    let birth_date = parse_birth_date(&raw.birth_date)?;

    let gender = match optional(&raw.gender) {
        Some(g) => g.parse::<Gender>()?,
        None => Gender::Unknown,
    };

    let region = optional(&raw.region).map(parse_region).transpose()?;
    let address = Address {
        line: optional(&raw.address_line).map(collapse_whitespace),
        city: optional(&raw.city).map(collapse_whitespace),
        region,
        postal_code: optional(&raw.postal_code).map(str::to_string),
    };
    let address = (address.line.is_some()
        || address.city.is_some()
        || address.region.is_some()
        || address.postal_code.is_some())
    .then_some(address);

    let mut phones = Vec::new();
    for (field, use_type, value) in [
        ("phone_home", PhoneUse::Home, &raw.phone_home),
        ("phone_work", PhoneUse::Work, &raw.phone_work),
    ] {
        if let Some(number) = optional(value) {
            phones.push(Phone {
                use_type,
                number: parse_phone(field, number)?,
            });
        }
    }

    Ok(Demographics {
        family_name,
        given_name,
        birth_date,
        gender,
        address,
        phones,
        payer_id: optional(&raw.payer_id).map(str::to_string),
    })
}

/// Trim and collapse every run of internal whitespace to a single space.
pub fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Comparison key for a name: whitespace collapsed and lower-cased.
pub fn name_key(input: &str) -> String {
    collapse_whitespace(input).to_lowercase()
}

fn optional(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_birth_date(raw: &str) -> Result<NaiveDate, ValidationError> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(ValidationError::MissingField("birth_date"));
    }
    let invalid = || ValidationError::InvalidDate {
        field: "birth_date",
        value: value.to_string(),
    };
    // chrono accepts single-digit months and days; only the zero-padded form is allowed.
    let shape_ok = value.len() == 10
        && value.bytes().enumerate().all(|(i, b)| match i {
            4 | 7 => b == b'-',
            _ => b.is_ascii_digit(),
        });
    if !shape_ok {
        return Err(invalid());
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| invalid())
}

fn parse_region(raw: &str) -> Result<String, ValidationError> {
    let region = raw.to_ascii_uppercase();
    if region.len() == 2 && region.bytes().all(|b| b.is_ascii_uppercase()) {
        Ok(region)
    } else {
        Err(ValidationError::InvalidRegion(raw.to_string()))
    }
}

fn parse_phone(field: &'static str, raw: &str) -> Result<String, ValidationError> {
    let allowed = raw
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, ' ' | '+' | '-' | '(' | ')' | '.'));
    if !allowed || !raw.chars().any(|c| c.is_ascii_digit()) {
        return Err(ValidationError::InvalidPhone {
            field,
            value: raw.to_string(),
        });
    }
    Ok(raw.to_string())
}
