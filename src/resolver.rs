//! Role and channel resolution by name
//!
//! Handlers refer to roles and channels by their well-known names rather than
//! ids. The resolver searches the context guild first, then the configured
//! default guild, then every other cached guild, preferring exact name
//! matches and falling back to a case-insensitive substring match.

use serenity::cache::Cache;
use serenity::model::prelude::*;
use std::sync::Arc;

/// Channel kinds the resolver distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Text,
    Voice,
}

/// Read-only view over guild rosters, implemented by the serenity cache
pub trait GuildDirectory: Send + Sync {
    fn guild_ids(&self) -> Vec<GuildId>;
    fn roles(&self, guild: GuildId) -> Vec<(RoleId, String)>;
    fn channels(&self, guild: GuildId, kind: ChannelKind) -> Vec<(ChannelId, String)>;
}

/// Directory backed by the gateway cache
pub struct CacheDirectory {
    cache: Arc<Cache>,
}

impl CacheDirectory {
    #[must_use]
    pub fn new(cache: Arc<Cache>) -> Self {
        Self { cache }
    }
}

impl GuildDirectory for CacheDirectory {
    fn guild_ids(&self) -> Vec<GuildId> {
        self.cache.guilds()
    }

    fn roles(&self, guild: GuildId) -> Vec<(RoleId, String)> {
        self.cache
            .guild(guild)
            .map(|g| {
                g.roles
                    .iter()
                    .map(|(id, role)| (*id, role.name.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn channels(&self, guild: GuildId, kind: ChannelKind) -> Vec<(ChannelId, String)> {
        let wanted = match kind {
            ChannelKind::Text => ChannelType::Text,
            ChannelKind::Voice => ChannelType::Voice,
        };
        self.cache
            .guild(guild)
            .map(|g| {
                g.channels
                    .iter()
                    .filter(|(_, channel)| channel.kind == wanted)
                    .map(|(id, channel)| (*id, channel.name.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Name-based lookup across the context guild, default guild, and any guild
pub struct Resolver {
    directory: Arc<dyn GuildDirectory>,
    default_guild: GuildId,
}

impl Resolver {
    #[must_use]
    pub fn new(directory: Arc<dyn GuildDirectory>, default_guild: GuildId) -> Self {
        Self {
            directory,
            default_guild,
        }
    }

    #[must_use]
    pub fn default_guild(&self) -> GuildId {
        self.default_guild
    }

    /// Resolve a role by name
    #[must_use]
    pub fn role(&self, context: Option<GuildId>, name: &str) -> Option<RoleId> {
        self.search(context, |guild| self.directory.roles(guild), name)
    }

    /// Resolve a text channel by name
    #[must_use]
    pub fn text_channel(&self, context: Option<GuildId>, name: &str) -> Option<ChannelId> {
        self.search(
            context,
            |guild| self.directory.channels(guild, ChannelKind::Text),
            name,
        )
    }

    /// Resolve a voice channel by name
    #[must_use]
    pub fn voice_channel(&self, context: Option<GuildId>, name: &str) -> Option<ChannelId> {
        self.search(
            context,
            |guild| self.directory.channels(guild, ChannelKind::Voice),
            name,
        )
    }

    /// Translate role ids back to their names within a guild
    #[must_use]
    pub fn role_names(&self, guild: GuildId, roles: &[RoleId]) -> Vec<String> {
        let known = self.directory.roles(guild);
        roles
            .iter()
            .filter_map(|id| {
                known
                    .iter()
                    .find(|(known_id, _)| known_id == id)
                    .map(|(_, name)| name.clone())
            })
            .collect()
    }

    fn search<Id: Copy>(
        &self,
        context: Option<GuildId>,
        lookup: impl Fn(GuildId) -> Vec<(Id, String)>,
        name: &str,
    ) -> Option<Id> {
        if let Some(guild) = context {
            if let Some(id) = Self::find(&lookup(guild), name) {
                return Some(id);
            }
        }

        if context != Some(self.default_guild) {
            if let Some(id) = Self::find(&lookup(self.default_guild), name) {
                return Some(id);
            }
        }

        for guild in self.directory.guild_ids() {
            if Some(guild) == context || guild == self.default_guild {
                continue;
            }
            if let Some(id) = Self::find(&lookup(guild), name) {
                return Some(id);
            }
        }

        None
    }

    fn find<Id: Copy>(candidates: &[(Id, String)], name: &str) -> Option<Id> {
        if let Some((id, _)) = candidates.iter().find(|(_, n)| n == name) {
            return Some(*id);
        }
        let needle = name.to_lowercase();
        candidates
            .iter()
            .find(|(_, n)| n.to_lowercase().contains(&needle))
            .map(|(id, _)| *id)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::MemoryDirectory;
    use super::*;

    const DEFAULT: GuildId = GuildId::new(100);
    const OTHER: GuildId = GuildId::new(200);

    fn resolver(directory: MemoryDirectory) -> Resolver {
        Resolver::new(Arc::new(directory), DEFAULT)
    }

    #[test]
    fn test_exact_match_in_context_guild() {
        let directory = MemoryDirectory::new();
        directory.add_role(OTHER, RoleId::new(1), "Moderator");
        directory.add_role(DEFAULT, RoleId::new(2), "Moderator");
        let resolver = resolver(directory);

        assert_eq!(
            resolver.role(Some(OTHER), "Moderator"),
            Some(RoleId::new(1))
        );
    }

    #[test]
    fn test_falls_back_to_default_guild() {
        let directory = MemoryDirectory::new();
        directory.add_role(DEFAULT, RoleId::new(2), "Moderator");
        let resolver = resolver(directory);

        assert_eq!(
            resolver.role(Some(OTHER), "Moderator"),
            Some(RoleId::new(2))
        );
        assert_eq!(resolver.role(None, "Moderator"), Some(RoleId::new(2)));
    }

    #[test]
    fn test_falls_back_to_any_guild() {
        let directory = MemoryDirectory::new();
        directory.add_role(OTHER, RoleId::new(7), "Jail");
        let resolver = resolver(directory);

        assert_eq!(resolver.role(None, "Jail"), Some(RoleId::new(7)));
    }

    #[test]
    fn test_substring_fallback_prefers_exact() {
        let directory = MemoryDirectory::new();
        directory.add_role(DEFAULT, RoleId::new(1), "New Member (2024)");
        directory.add_role(DEFAULT, RoleId::new(2), "New Member");
        let resolver = resolver(directory);

        // Exact wins over the substring candidate listed first
        assert_eq!(resolver.role(None, "New Member"), Some(RoleId::new(2)));
        // Substring match is case-insensitive
        assert_eq!(resolver.role(None, "new member ("), Some(RoleId::new(1)));
    }

    #[test]
    fn test_missing_name_resolves_to_none() {
        let directory = MemoryDirectory::new();
        directory.add_role(DEFAULT, RoleId::new(1), "Moderator");
        let resolver = resolver(directory);

        assert_eq!(resolver.role(None, "Ghost"), None);
        assert_eq!(resolver.text_channel(None, "staff-log"), None);
    }

    #[test]
    fn test_channel_kinds_are_disjoint() {
        let directory = MemoryDirectory::new();
        directory.add_text_channel(DEFAULT, ChannelId::new(10), "general");
        directory.add_voice_channel(DEFAULT, ChannelId::new(11), "general");
        let resolver = resolver(directory);

        assert_eq!(
            resolver.text_channel(None, "general"),
            Some(ChannelId::new(10))
        );
        assert_eq!(
            resolver.voice_channel(None, "general"),
            Some(ChannelId::new(11))
        );
    }

    #[test]
    fn test_role_names_translation() {
        let directory = MemoryDirectory::new();
        directory.add_role(DEFAULT, RoleId::new(1), "Moderator");
        directory.add_role(DEFAULT, RoleId::new(2), "Slow");
        let resolver = resolver(directory);

        let names = resolver.role_names(DEFAULT, &[RoleId::new(2), RoleId::new(9)]);
        assert_eq!(names, vec!["Slow".to_string()]);
    }
}
