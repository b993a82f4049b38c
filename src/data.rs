use std::{
    default::Default,
    ops::{Deref, DerefMut},
    sync::Arc,
};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serenity::model::prelude::*;

/// Guild configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuildConfig {
    // The ID of the guild
    pub guild_id: u64,
    // Cooldown override for the slowmode engine, in seconds
    pub slowmode_interval_secs: Option<u64>,
    // How long a member keeps the "New Member" role
    pub new_member_retention_days: i64,
}

impl Default for GuildConfig {
    fn default() -> Self {
        Self {
            guild_id: 0,
            slowmode_interval_secs: None,
            new_member_retention_days: 3,
        }
    }
}

/// A self-service role category members pick from with `/roles`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleCategory {
    pub category: String,
    pub role_names: Vec<String>,
    #[serde(default)]
    pub allow_multiple: bool,
}

impl RoleCategory {
    /// Match a user-supplied choice against the category's configured role
    /// names, returning the canonical spelling.
    #[must_use]
    pub fn canonical_role_name(&self, choice: &str) -> Option<&str> {
        self.role_names
            .iter()
            .find(|name| name.eq_ignore_ascii_case(choice))
            .map(String::as_str)
    }
}

/// One entry of the daily verse rotation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verse {
    pub reference: String,
    pub text: String,
}

/// Centralized data structure for the bot
#[derive(Clone)]
pub struct Data(pub Arc<DataInner>);

impl Default for Data {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Data {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Data")
            .field("guild_configs", &self.guild_configs)
            .field("role_categories", &self.role_categories)
            .field("verses", &self.verses.len())
            .finish()
    }
}

impl Data {
    /// Create a new Data instance
    #[must_use]
    pub fn new() -> Self {
        Self(DataInner::new().into())
    }

    /// Load data from YAML files
    pub async fn load() -> Self {
        Self(Arc::new(DataInner::load().await))
    }

    /// Save data to YAML files
    /// # Errors
    /// This function will return an error if:
    /// - The data directory cannot be created
    /// - The guild configurations cannot be serialized to YAML
    /// - The YAML data cannot be written to the config file
    pub async fn save(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.0.save().await
    }

    /// Get the guild configuration for a specific guild
    #[must_use]
    pub fn get_guild_config(&self, guild_id: GuildId) -> Option<GuildConfig> {
        self.0
            .guild_configs
            .get(&guild_id)
            .map(|entry| entry.value().clone())
    }

    /// Look up a role category by name, case-insensitively
    #[must_use]
    pub fn role_category(&self, name: &str) -> Option<RoleCategory> {
        self.0
            .role_categories
            .iter()
            .find(|category| category.category.eq_ignore_ascii_case(name))
            .cloned()
    }

    /// Names of all configured role categories
    #[must_use]
    pub fn category_names(&self) -> Vec<String> {
        self.0
            .role_categories
            .iter()
            .map(|category| category.category.clone())
            .collect()
    }
}

impl Deref for Data {
    type Target = DataInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Data {
    fn deref_mut(&mut self) -> &mut Self::Target {
        Arc::make_mut(&mut self.0)
    }
}

/// Main centralized data structure for the bot
#[derive(Clone)]
pub struct DataInner {
    // Map of guild_id -> guild configuration
    pub guild_configs: DashMap<GuildId, GuildConfig>,
    // Role categories members may self-select from
    pub role_categories: Vec<RoleCategory>,
    // Rotation for the daily verse task
    pub verses: Vec<Verse>,
}

impl Default for DataInner {
    fn default() -> Self {
        Self::new()
    }
}

impl DataInner {
    // Create a new Data instance
    #[must_use]
    pub fn new() -> Self {
        Self {
            guild_configs: DashMap::new(),
            role_categories: default_role_categories(),
            verses: Vec::new(),
        }
    }

    /// Load data from YAML files
    ///
    /// Missing or unreadable files leave the corresponding defaults in
    /// place, so a fresh checkout starts with a usable configuration.
    pub async fn load() -> Self {
        const CONFIG_FILE: &str = "data/warden_config.yaml";
        const CATEGORIES_FILE: &str = "data/role_categories.yaml";
        const VERSES_FILE: &str = "data/verses.yaml";

        let mut data = Self::new();

        if let Ok(file_content) = tokio::fs::read_to_string(CONFIG_FILE).await {
            if let Ok(configs) = serde_yaml::from_str::<Vec<GuildConfig>>(&file_content) {
                for config in configs {
                    let guild_id = GuildId::new(config.guild_id);
                    data.guild_configs.insert(guild_id, config);
                }
            }
        }

        if let Ok(file_content) = tokio::fs::read_to_string(CATEGORIES_FILE).await {
            if let Ok(categories) = serde_yaml::from_str::<Vec<RoleCategory>>(&file_content) {
                data.role_categories = categories;
            }
        }

        if let Ok(file_content) = tokio::fs::read_to_string(VERSES_FILE).await {
            if let Ok(verses) = serde_yaml::from_str::<Vec<Verse>>(&file_content) {
                data.verses = verses;
            }
        }

        data
    }

    /// Save guild configurations to YAML
    ///
    /// Role categories and verses are operator-authored and only read.
    ///
    /// # Errors
    ///
    /// This function will return an error if:
    /// - The data directory cannot be created
    /// - The guild configurations cannot be serialized to YAML
    /// - The YAML data cannot be written to the config file
    pub async fn save(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        const DATA_DIR: &str = "data";
        const CONFIG_FILE: &str = "data/warden_config.yaml";

        if !std::path::Path::new(DATA_DIR).exists() {
            tokio::fs::create_dir_all(DATA_DIR).await?;
        }

        let configs: Vec<GuildConfig> = self
            .guild_configs
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        let yaml = serde_yaml::to_string(&configs)?;
        tokio::fs::write(CONFIG_FILE, yaml).await?;

        Ok(())
    }
}

fn default_role_categories() -> Vec<RoleCategory> {
    vec![
        RoleCategory {
            category: "Religion".to_string(),
            role_names: vec![
                "Submitter".to_string(),
                "Traditional Muslim - Sunni".to_string(),
                "Traditional Muslim - Shia".to_string(),
                "Quranist".to_string(),
                "Christian".to_string(),
                "Jewish".to_string(),
                "Agnostic / Atheist".to_string(),
                "Undecided / Exploring".to_string(),
                "Other Religion".to_string(),
            ],
            allow_multiple: false,
        },
        RoleCategory {
            category: "Age".to_string(),
            role_names: vec![
                "13-17".to_string(),
                "18-24".to_string(),
                "25-29".to_string(),
                "30-39".to_string(),
                "40+".to_string(),
            ],
            allow_multiple: false,
        },
        RoleCategory {
            category: "Region".to_string(),
            role_names: vec![
                "United States".to_string(),
                "Canada".to_string(),
                "South America".to_string(),
                "Europe".to_string(),
                "Middle East".to_string(),
                "Asia".to_string(),
                "Africa".to_string(),
                "Australia".to_string(),
            ],
            allow_multiple: false,
        },
        RoleCategory {
            category: "Gender".to_string(),
            role_names: vec!["Male".to_string(), "Female".to_string()],
            allow_multiple: false,
        },
        RoleCategory {
            category: "Other Languages".to_string(),
            role_names: vec![
                "Arabic".to_string(),
                "French".to_string(),
                "Turkish".to_string(),
                "Persian".to_string(),
                "Urdu".to_string(),
            ],
            allow_multiple: true,
        },
    ]
}

/// Tests for the data module
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_new() {
        let data = Data::new();
        assert_eq!(data.guild_configs.len(), 0);
        assert!(!data.role_categories.is_empty());
        assert!(data.verses.is_empty());
    }

    #[test]
    fn test_guild_config_default() {
        let config = GuildConfig::default();
        assert_eq!(config.guild_id, 0);
        assert!(config.slowmode_interval_secs.is_none());
        assert_eq!(config.new_member_retention_days, 3);
    }

    #[test]
    fn test_guild_config_serialization() {
        let config = GuildConfig {
            guild_id: 12345,
            slowmode_interval_secs: Some(3),
            new_member_retention_days: 7,
        };

        let serialized = serde_yaml::to_string(&config).expect("Failed to serialize");
        assert!(serialized.contains("guild_id: 12345"));
        assert!(serialized.contains("slowmode_interval_secs: 3"));

        let deserialized: GuildConfig =
            serde_yaml::from_str(&serialized).expect("Failed to deserialize");
        assert_eq!(deserialized.guild_id, 12345);
        assert_eq!(deserialized.slowmode_interval_secs, Some(3));
        assert_eq!(deserialized.new_member_retention_days, 7);
    }

    #[test]
    fn test_role_category_lookup() {
        let data = Data::new();

        let category = data.role_category("religion").expect("category exists");
        assert_eq!(category.category, "Religion");
        assert!(!category.allow_multiple);

        assert!(data.role_category("Shoe Size").is_none());
        assert!(data.category_names().contains(&"Gender".to_string()));
    }

    #[test]
    fn test_canonical_role_name_matching() {
        let category = RoleCategory {
            category: "Gender".to_string(),
            role_names: vec!["Male".to_string(), "Female".to_string()],
            allow_multiple: false,
        };

        assert_eq!(category.canonical_role_name("female"), Some("Female"));
        assert_eq!(category.canonical_role_name("FEMALE"), Some("Female"));
        assert_eq!(category.canonical_role_name("Other"), None);
    }

    #[test]
    fn test_role_category_serialization_defaults() {
        let yaml = "category: Region\nrole_names:\n  - Europe\n  - Asia\n";
        let category: RoleCategory = serde_yaml::from_str(yaml).expect("Failed to deserialize");
        assert_eq!(category.category, "Region");
        assert!(!category.allow_multiple);
    }
}
