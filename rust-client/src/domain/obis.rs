use std::{collections::HashMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Direction of energy flow a measurement code describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ObisCategory {
    Consumption,
    Production,
}

impl ObisCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Consumption => "Consumption",
            Self::Production => "Production",
        }
    }
}

impl fmt::Display for ObisCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObisCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Consumption" => Ok(Self::Consumption),
            "Production" => Ok(Self::Production),
            other => Err(format!("unknown OBIS category '{other}'")),
        }
    }
}

/// Classify a code by the first character of the segment after the first colon.
///
/// `1-1:1.29.0` is consumption, `1-65:2.29.9` is production. Any other
/// structure is rejected rather than defaulted.
pub fn classify(code: &str) -> Result<ObisCategory, DomainError> {
    let (medium, rest) = code
        .split_once(':')
        .ok_or_else(|| DomainError::MalformedCode(code.to_string()))?;

    if medium.is_empty() {
        return Err(DomainError::MalformedCode(code.to_string()));
    }

    match rest.chars().next() {
        Some('1') => Ok(ObisCategory::Consumption),
        Some('2') => Ok(ObisCategory::Production),
        _ => Err(DomainError::MalformedCode(code.to_string())),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObisCodeDefinition {
    pub code: String,
    pub category: ObisCategory,
    pub description: String,
}

/// Immutable set of registered measurement codes.
///
/// Registration order is preserved and used for fetch planning.
#[derive(Debug, Clone, Default)]
pub struct ObisCatalog {
    definitions: Vec<ObisCodeDefinition>,
    index: HashMap<String, usize>,
}

impl ObisCatalog {
    pub fn new<I, C, D>(entries: I) -> Result<Self, DomainError>
    where
        I: IntoIterator<Item = (C, D)>,
        C: Into<String>,
        D: Into<String>,
    {
        let mut catalog = Self::default();

        for (code, description) in entries {
            let code = code.into();
            let category = classify(&code)?;
            if catalog.index.contains_key(&code) {
                return Err(DomainError::DuplicateCode(code));
            }

            catalog.index.insert(code.clone(), catalog.definitions.len());
            catalog.definitions.push(ObisCodeDefinition {
                code,
                category,
                description: description.into(),
            });
        }

        Ok(catalog)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn get(&self, code: &str) -> Option<&ObisCodeDefinition> {
        self.index.get(code).map(|&i| &self.definitions[i])
    }

    pub fn describe(&self, code: &str) -> Result<&str, DomainError> {
        self.get(code)
            .map(|d| d.description.as_str())
            .ok_or_else(|| DomainError::UnknownCode(code.to_string()))
    }

    pub fn codes_for(
        &self,
        category: ObisCategory,
    ) -> impl Iterator<Item = &ObisCodeDefinition> + '_ {
        self.definitions.iter().filter(move |d| d.category == category)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ObisCodeDefinition> + '_ {
        self.definitions.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> ObisCatalog {
        ObisCatalog::new([
            ("1-1:1.29.0", "Measured active consumption"),
            ("1-1:2.29.0", "Measured active production"),
            ("1-65:1.29.9", "Remaining consumption after sharing"),
            ("1-65:2.29.9", "Remaining production after sharing"),
        ])
        .unwrap()
    }

    #[test]
    fn classify_uses_digit_after_first_colon() {
        assert_eq!(classify("1-1:1.29.0"), Ok(ObisCategory::Consumption));
        assert_eq!(classify("1-65:1.29.3"), Ok(ObisCategory::Consumption));
        assert_eq!(classify("1-1:2.29.0"), Ok(ObisCategory::Production));
        assert_eq!(classify("1-65:2.29.9"), Ok(ObisCategory::Production));
    }

    #[test]
    fn classify_rejects_unrecognized_structures() {
        for code in ["1-1:3.29.0", "1-1.29.0", "", ":1.29.0", "1-1:", "1-1:x.29.0"] {
            assert!(
                matches!(classify(code), Err(DomainError::MalformedCode(_))),
                "{code} should be malformed"
            );
        }
    }

    #[test]
    fn catalog_rejects_malformed_and_duplicate_codes() {
        let malformed = ObisCatalog::new([("1-1:3.29.0", "Reactive")]);
        assert!(matches!(malformed, Err(DomainError::MalformedCode(_))));

        let dup = ObisCatalog::new([("1-1:1.29.0", "a"), ("1-1:1.29.0", "b")]);
        assert_eq!(dup.unwrap_err(), DomainError::DuplicateCode("1-1:1.29.0".into()));
    }

    #[test]
    fn codes_for_keeps_registration_order_per_category() {
        let c = catalog();
        let consumption: Vec<_> = c
            .codes_for(ObisCategory::Consumption)
            .map(|d| d.code.as_str())
            .collect();
        let production: Vec<_> = c
            .codes_for(ObisCategory::Production)
            .map(|d| d.code.as_str())
            .collect();

        assert_eq!(consumption, vec!["1-1:1.29.0", "1-65:1.29.9"]);
        assert_eq!(production, vec!["1-1:2.29.0", "1-65:2.29.9"]);
    }

    #[test]
    fn describe_unknown_code_fails() {
        let c = catalog();
        assert_eq!(c.describe("1-1:2.29.0"), Ok("Measured active production"));
        assert_eq!(
            c.describe("1-65:1.29.1"),
            Err(DomainError::UnknownCode("1-65:1.29.1".into()))
        );
    }
}
