use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Brand {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Material {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Color {
    pub id: i64,
    pub name: String,
    pub hex_code: Option<String>,
    pub base_category: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Supplier {
    pub id: i64,
    pub name: String,
    pub website: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StorageLocation {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CategoryType {
    pub id: i64,
    pub name: String,
    /// Prefix of the article reference codes, e.g. "VRO".
    pub code: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ItemUser {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EventType {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DayMoment {
    pub id: i64,
    pub name: String,
    pub sort_order: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum AvailabilityType {
    InStock,
    OutOfStock,
    Limbo,
}

/// Behaviour a status triggers when an article moves into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum StatusCategory {
    /// Worn: event type and item user are mandatory, wear statistics move.
    Usage,
    /// Cleaning, repair, sale: supplier and cost may be recorded.
    Service,
    /// Put away: a storage location is mandatory.
    Storage,
    Other,
}

const USAGE_KEYWORDS: &[&str] = &["utilisation", "porté"];
const SERVICE_KEYWORDS: &[&str] = &["nettoyage", "réparation", "vendu"];
const STORAGE_KEYWORDS: &[&str] = &["disponible et rangé"];

impl StatusCategory {
    /// Keyword match on the status display name, case-insensitive. Usage wins over service,
    /// service over storage.
    pub fn from_status_name(name: &str) -> StatusCategory {
        let name = name.to_lowercase();
        let matches = |keywords: &[&str]| keywords.iter().any(|k| name.contains(k));

        if matches(USAGE_KEYWORDS) {
            StatusCategory::Usage
        } else if matches(SERVICE_KEYWORDS) {
            StatusCategory::Service
        } else if matches(STORAGE_KEYWORDS) {
            StatusCategory::Storage
        } else {
            StatusCategory::Other
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Status {
    pub id: i64,
    pub name: String,
    pub availability_type: AvailabilityType,
    pub description: Option<String>,
    /// Explicit override; when absent the category comes from the name.
    pub behavior_category: Option<StatusCategory>,
}

impl Status {
    pub fn category(&self) -> StatusCategory {
        self.behavior_category
            .unwrap_or_else(|| StatusCategory::from_status_name(&self.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(name: &str, behavior_category: Option<StatusCategory>) -> Status {
        Status {
            id: 1,
            name: name.to_string(),
            availability_type: AvailabilityType::InStock,
            description: None,
            behavior_category,
        }
    }

    #[test]
    fn classifies_seeded_status_names() {
        assert_eq!(
            StatusCategory::from_status_name("En cours d'utilisation (porté)"),
            StatusCategory::Usage
        );
        assert_eq!(StatusCategory::from_status_name("En nettoyage"), StatusCategory::Service);
        assert_eq!(StatusCategory::from_status_name("En réparation"), StatusCategory::Service);
        assert_eq!(StatusCategory::from_status_name("Vendu"), StatusCategory::Service);
        assert_eq!(
            StatusCategory::from_status_name("Disponible et rangé"),
            StatusCategory::Storage
        );
        assert_eq!(StatusCategory::from_status_name("Acheté (Nouveau)"), StatusCategory::Other);
    }

    #[test]
    fn matching_ignores_case() {
        assert_eq!(StatusCategory::from_status_name("PORTÉ ce soir"), StatusCategory::Usage);
        assert_eq!(
            StatusCategory::from_status_name("DISPONIBLE ET RANGÉ"),
            StatusCategory::Storage
        );
    }

    #[test]
    fn explicit_category_overrides_name() {
        let renamed = status("Au placard", Some(StatusCategory::Storage));
        assert_eq!(renamed.category(), StatusCategory::Storage);

        let inferred = status("Vendu", None);
        assert_eq!(inferred.category(), StatusCategory::Service);
    }
}
