//! Pet profile schema
//!
//! The fixed question sequence for /editprofile and the per-field
//! validators. Validators are pure: they either return the normalized
//! answer or an `InvalidAnswer` with a reason the user can act on.

use chrono::{NaiveDate, Utc};

use crate::error::BotError;

pub const MAX_NAME_CHARS: usize = 50;
pub const MAX_BREED_CHARS: usize = 80;
pub const MAX_WEIGHT_KG: f64 = 200.0;
pub const BIRTH_DATE_FORMAT: &str = "%Y-%m-%d";

const SPECIES: &[&str] = &["dog", "cat", "bird", "fish", "hamster", "rabbit", "reptile", "other"];
const GENDERS: &[&str] = &["male", "female"];

/// One question of the fixed profile sequence.
pub struct ProfileField {
    pub key: &'static str,
    pub prompt: &'static str,
    /// Predefined answers rendered as a reply keyboard. Empty for free text.
    pub options: &'static [&'static str],
    pub validate: fn(&str) -> Result<String, BotError>,
}

/// Question order is part of the contract: answers are stored by index.
pub const PROFILE_FIELDS: &[ProfileField] = &[
    ProfileField {
        key: "name",
        prompt: "What is your pet's name?",
        options: &[],
        validate: validate_name,
    },
    ProfileField {
        key: "species",
        prompt: "What species is your pet?",
        options: &["Dog", "Cat", "Bird", "Fish", "Hamster", "Rabbit", "Reptile", "Other"],
        validate: validate_species,
    },
    ProfileField {
        key: "breed",
        prompt: "What breed is your pet?",
        options: &[],
        validate: validate_breed,
    },
    ProfileField {
        key: "birth_date",
        prompt: "When was your pet born? (YYYY-MM-DD)",
        options: &[],
        validate: validate_birth_date,
    },
    ProfileField {
        key: "gender",
        prompt: "What is your pet's gender?",
        options: &["Male", "Female"],
        validate: validate_gender,
    },
    ProfileField {
        key: "weight",
        prompt: "How much does your pet weigh, in kilograms?",
        options: &[],
        validate: validate_weight,
    },
];

fn invalid(reason: impl Into<String>) -> BotError {
    BotError::InvalidAnswer(reason.into())
}

fn validate_name(input: &str) -> Result<String, BotError> {
    let name = input.trim();
    if name.is_empty() {
        return Err(invalid("The name cannot be empty."));
    }
    if name.chars().count() > MAX_NAME_CHARS {
        return Err(invalid(format!(
            "The name is too long, please keep it under {} characters.",
            MAX_NAME_CHARS
        )));
    }
    Ok(name.to_string())
}

fn validate_species(input: &str) -> Result<String, BotError> {
    let species = input.trim().to_lowercase();
    if SPECIES.contains(&species.as_str()) {
        Ok(species)
    } else {
        Err(invalid(format!(
            "Please pick one of: {}.",
            SPECIES.join(", ")
        )))
    }
}

fn validate_breed(input: &str) -> Result<String, BotError> {
    let breed = input.trim();
    if breed.is_empty() {
        return Err(invalid("The breed cannot be empty. Write \"unknown\" if unsure."));
    }
    if breed.chars().count() > MAX_BREED_CHARS {
        return Err(invalid(format!(
            "The breed is too long, please keep it under {} characters.",
            MAX_BREED_CHARS
        )));
    }
    Ok(breed.to_string())
}

fn validate_birth_date(input: &str) -> Result<String, BotError> {
    let date = NaiveDate::parse_from_str(input.trim(), BIRTH_DATE_FORMAT)
        .map_err(|_| invalid("Please use the YYYY-MM-DD format, for example 2020-05-17."))?;
    if date > Utc::now().date_naive() {
        return Err(invalid("The birth date cannot be in the future."));
    }
    Ok(date.format(BIRTH_DATE_FORMAT).to_string())
}

fn validate_gender(input: &str) -> Result<String, BotError> {
    let gender = input.trim().to_lowercase();
    if GENDERS.contains(&gender.as_str()) {
        Ok(gender)
    } else {
        Err(invalid("Please answer \"male\" or \"female\"."))
    }
}

fn validate_weight(input: &str) -> Result<String, BotError> {
    // Accept a decimal comma, common in hand-typed weights.
    let raw = input.trim().replace(',', ".");
    let weight: f64 = raw
        .parse()
        .map_err(|_| invalid("Please send the weight as a number, for example 4.5."))?;
    if weight <= 0.0 {
        return Err(invalid("The weight must be greater than zero."));
    }
    if weight > MAX_WEIGHT_KG {
        return Err(invalid(format!(
            "That looks too heavy - the limit is {} kg.",
            MAX_WEIGHT_KG
        )));
    }
    Ok(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reason(result: Result<String, BotError>) -> String {
        match result {
            Err(BotError::InvalidAnswer(reason)) => reason,
            other => panic!("expected InvalidAnswer, got {:?}", other),
        }
    }

    #[test]
    fn test_name_bounds() {
        assert_eq!(validate_name("  Rex ").unwrap(), "Rex");
        assert!(reason(validate_name("   ")).contains("empty"));
        assert!(reason(validate_name(&"x".repeat(51))).contains("too long"));
    }

    #[test]
    fn test_species_membership() {
        assert_eq!(validate_species("Cat").unwrap(), "cat");
        assert_eq!(validate_species(" DOG ").unwrap(), "dog");
        assert!(validate_species("dinosaur").is_err());
    }

    #[test]
    fn test_breed_bounds() {
        assert_eq!(validate_breed("Maine Coon").unwrap(), "Maine Coon");
        assert!(validate_breed("").is_err());
        assert!(validate_breed(&"b".repeat(81)).is_err());
    }

    #[test]
    fn test_birth_date_format_and_future() {
        assert_eq!(validate_birth_date("2020-05-17").unwrap(), "2020-05-17");
        assert!(reason(validate_birth_date("17.05.2020")).contains("YYYY-MM-DD"));
        assert!(reason(validate_birth_date("2999-01-01")).contains("future"));
    }

    #[test]
    fn test_gender_membership() {
        assert_eq!(validate_gender("Male").unwrap(), "male");
        assert_eq!(validate_gender("female").unwrap(), "female");
        assert!(validate_gender("yes").is_err());
    }

    #[test]
    fn test_weight_bounds() {
        assert_eq!(validate_weight("4.5").unwrap(), "4.5");
        assert_eq!(validate_weight("4,5").unwrap(), "4.5");
        assert!(validate_weight("heavy").is_err());
        assert!(validate_weight("0").is_err());
        assert!(validate_weight("-2").is_err());
        assert!(validate_weight("900").is_err());
    }

    #[test]
    fn test_schema_shape() {
        assert_eq!(PROFILE_FIELDS.len(), 6);
        let keys: Vec<&str> = PROFILE_FIELDS.iter().map(|f| f.key).collect();
        assert_eq!(
            keys,
            vec!["name", "species", "breed", "birth_date", "gender", "weight"]
        );
        // Enum-backed fields offer keyboard options, free-text ones do not.
        assert!(!PROFILE_FIELDS[1].options.is_empty());
        assert!(PROFILE_FIELDS[3].options.is_empty());
    }
}
