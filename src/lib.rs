pub mod commands;
pub mod data;
pub mod handlers;
pub mod listeners;
pub mod logging;
pub mod platform;
pub mod resolver;
pub mod router;
pub mod slowmode;
pub mod store;
pub mod sync;
pub mod tasks;

// Customize these constants for your bot
pub const BOT_NAME: &str = "guild_warden";
pub const COMMAND_TARGET: &str = "guild_warden::command";
pub const ERROR_TARGET: &str = "guild_warden::error";
pub const EVENT_TARGET: &str = "guild_warden::handlers";
pub const CONSOLE_TARGET: &str = "guild_warden";

// Well-known role names (single-guild naming convention)
pub const ROLE_SLOW: &str = "Slow";
pub const ROLE_HUSH: &str = "Hush";
pub const ROLE_JAIL: &str = "Jail";
pub const ROLE_UNVERIFIED: &str = "Unverified";
pub const ROLE_VERIFIED: &str = "Verified";
pub const ROLE_NEW_MEMBER: &str = "New Member";

// Well-known channel names
pub const CHANNEL_STAFF_LOG: &str = "staff-log";
pub const CHANNEL_VC_LOGS: &str = "vc-logs";
pub const CHANNEL_MESSAGE_LOGS: &str = "message-logs";
pub const CHANNEL_WELCOME: &str = "welcome";
pub const CHANNEL_ADMISSIONS: &str = "admissions";
pub const CHANNEL_JAIL: &str = "jail";
pub const CHANNEL_VERIFY: &str = "verify";
pub const CHANNEL_JAIL_VC: &str = "Jail VC";
pub const CHANNEL_VERSE: &str = "daily-verse";

pub use data::{Data, DataInner};
pub type Error = Box<dyn std::error::Error + Send + Sync>;
