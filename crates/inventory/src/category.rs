use serde::{Deserialize, Serialize};

use stockledger_core::{CategoryId, DomainError, DomainResult};

/// Item category. Created on demand; never renamed or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
}

/// Normalize a category name (trimmed, non-empty).
pub fn validate_category_name(name: &str) -> DomainResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DomainError::validation("category name cannot be empty"));
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_category_names() {
        assert_eq!(validate_category_name("  Beans ").unwrap(), "Beans");
    }

    #[test]
    fn rejects_blank_category_names() {
        assert!(matches!(
            validate_category_name(" \t"),
            Err(DomainError::Validation(_))
        ));
    }
}
