use std::borrow::Borrow;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::error::ValidationError;

/// A claim/coverage category symbol. Only a `CategoryRegistry` can mint one,
/// so holding a `Category` means the symbol was validated.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Category(Arc<str>);

impl Category {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Category {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Terms from the healthcare.gov glossary, https://www.healthcare.gov/glossary/
const HEALTHCARE_GOV: &[&str] = &[
    "primary_care_visit",
    "specialist_visit",
    "emergency_accidental",
    "diagnostic_test",
    "diagnostic_test_stat",
    "imaging",
    "generic_drugs",
    "preferred_brand_drugs",
    "non_preferred_brand_drugs",
    "specialty_drugs",
    "outpatient_surgery_facility",
    "outpatient_surgery",
    "emergency_room_care",
    "emergency_medical_transportation",
    "urgent_care",
    "inpatient_hospital_facility",
    "inpatient_hospital",
    "inpatient_surgery",
    "mental_outpatient",
    "mental_inpatient",
    "home_health_care",
    "rehabilitation_services",
    "habilitation_services",
    "skilled_nursing_care",
    "durable_medical_equipment",
    "eye_exam",
    "childrens_eye_exam",
    "childrens_glasses",
    "dental_checkup",
    "childrens_dental_checkup",
    "dental_b",
    "dental_c",
];

/// Immutable set of valid category symbols.
#[derive(Debug, Clone)]
pub struct CategoryRegistry {
    symbols: BTreeSet<Category>,
}

impl CategoryRegistry {
    pub fn new<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let symbols = symbols
            .into_iter()
            .map(|s| Category(Arc::from(s.as_ref().trim())))
            .filter(|c| !c.0.is_empty())
            .collect();
        CategoryRegistry { symbols }
    }

    pub fn healthcare_gov() -> Self {
        Self::new(HEALTHCARE_GOV.iter().copied())
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.symbols.contains(symbol)
    }

    /// Validate `symbol` and return the registry's shared `Category` for it.
    pub fn category(&self, symbol: &str) -> Result<Category, ValidationError> {
        self.symbols
            .get(symbol)
            .cloned()
            .ok_or_else(|| ValidationError::UnknownCategory(symbol.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Category> {
        self.symbols.iter()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl Default for CategoryRegistry {
    fn default() -> Self {
        Self::healthcare_gov()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn healthcare_gov_contains_common_terms() {
        let reg = CategoryRegistry::healthcare_gov();
        for term in ["primary_care_visit", "emergency_room_care", "generic_drugs", "inpatient_hospital"] {
            assert!(reg.contains(term), "{term} missing from catalog");
        }
    }

    #[test]
    fn unknown_category_is_rejected() {
        let reg = CategoryRegistry::healthcare_gov();
        assert_eq!(
            reg.category("acupuncture"),
            Err(ValidationError::UnknownCategory("acupuncture".to_string()))
        );
    }

    #[test]
    fn category_lookup_shares_the_registry_symbol() {
        let reg = CategoryRegistry::new(["imaging"]);
        let a = reg.category("imaging").unwrap();
        let b = reg.category("imaging").unwrap();
        assert_eq!(a, b);
        assert!(Arc::ptr_eq(&a.0, &b.0));
        assert_eq!(a.to_string(), "imaging");
    }

    #[test]
    fn lookup_by_str_respects_category_order() {
        let reg = CategoryRegistry::new(["urgent_care", "imaging", "dental_b"]);
        let names: Vec<&str> = reg.iter().map(Category::as_str).collect();
        assert_eq!(names, ["dental_b", "imaging", "urgent_care"]);
        for name in names {
            assert!(reg.contains(name));
            assert_eq!(reg.category(name).unwrap().as_str(), name);
        }
        assert!(!reg.contains("imaging "));
    }

    #[test]
    fn blank_symbols_are_dropped() {
        let reg = CategoryRegistry::new(["imaging", "  ", ""]);
        assert_eq!(reg.len(), 1);
    }
}
