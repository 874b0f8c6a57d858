//! Static core schema of the hub
//!
//! The shape assembled here is fixed for the process lifetime; only the
//! dynamic containers (`autoresponse`, `notifications`) accept entries
//! created at runtime, built from the templates below so they obey the same
//! invariants as static entries.

use tracing::warn;

use crate::schema::{FieldSpec, SchemaNode};
use crate::tree::{NodePath, SettingsError, SettingsTree, TreeError, Validator};

/// Reserved mount segment for plugin-contributed subtrees.
pub const PLUGINS_MOUNT: &str = "plugins";

/// Backing file stem of a plugin mounted at `plugins.<plugin_id>`.
pub fn plugin_backing(plugin_id: &str) -> String {
    format!("{}/{}", PLUGINS_MOUNT, plugin_id)
}

/// The static core schema: hub identity, telegram credentials, marketplace
/// settings, auto-response rules and notification targets.
pub fn core_schema() -> SchemaNode {
    SchemaNode::group(
        "root",
        "Settings",
        vec![
            hub_section(),
            telegram_section(),
            marketplace_section(),
            autoresponse_section(),
            notifications_section(),
            SchemaNode::group(PLUGINS_MOUNT, "Plugins", Vec::new()),
        ],
    )
}

fn hub_section() -> SchemaNode {
    SchemaNode::backed_group(
        "hub",
        "Hub",
        "hub",
        vec![
            SchemaNode::Field(
                FieldSpec::text("version", "Version", env!("CARGO_PKG_VERSION"))
                    .describe("Installed hub version"),
            ),
            SchemaNode::Field(
                FieldSpec::text("instance_name", "Instance name", "chathub")
                    .describe("Name shown in menus and notifications")
                    .validate(Validator::NonEmpty)
                    .validate(Validator::MaxLen(64)),
            ),
            SchemaNode::Field(
                FieldSpec::choice(
                    "log_level",
                    "Log level",
                    &["error", "warn", "info", "debug", "trace"],
                    2,
                )
                .describe("Runtime log verbosity"),
            ),
        ],
    )
}

fn telegram_section() -> SchemaNode {
    SchemaNode::backed_group(
        "telegram",
        "Telegram",
        "telegram",
        vec![
            SchemaNode::Field(
                FieldSpec::text("bot_token", "Bot token", "")
                    .describe("Token issued by @BotFather")
                    .validate(
                        Validator::matches(
                            r"^$|^\d+:[A-Za-z0-9_-]{30,}$",
                            "expected a bot token like 123456789:AA...",
                        )
                        .expect("static pattern compiles"),
                    )
                    .sensitive(),
            ),
            SchemaNode::Field(
                FieldSpec::int("api_id", "API id", 0).describe("Application id from my.telegram.org"),
            ),
            SchemaNode::Field(
                FieldSpec::text("api_hash", "API hash", "")
                    .describe("Application hash from my.telegram.org")
                    .sensitive(),
            ),
            SchemaNode::Field(
                FieldSpec::int("owner_chat_id", "Owner chat id", 0)
                    .describe("Chat that receives administrative prompts"),
            ),
            SchemaNode::Field(
                FieldSpec::text("session_name", "Session name", "chathub")
                    .validate(Validator::NonEmpty),
            ),
        ],
    )
}

fn marketplace_section() -> SchemaNode {
    SchemaNode::backed_group(
        "marketplace",
        "Marketplace",
        "marketplace",
        vec![
            SchemaNode::Field(
                FieldSpec::toggle("enabled", "Enabled", true)
                    .describe("Whether the marketplace client polls for updates"),
            ),
            SchemaNode::Field(
                FieldSpec::text("endpoint", "Endpoint", "https://market.chathub.dev/api")
                    .validate(Validator::NonEmpty),
            ),
            SchemaNode::Field(
                FieldSpec::int("refresh_minutes", "Refresh interval (minutes)", 60)
                    .validate(Validator::IntRange { min: 5, max: 1440 }),
            ),
            SchemaNode::Field(FieldSpec::choice(
                "channel",
                "Release channel",
                &["stable", "beta", "nightly"],
                0,
            )),
        ],
    )
}

fn autoresponse_section() -> SchemaNode {
    SchemaNode::backed_group(
        "autoresponse",
        "Auto-response rules",
        "autoresponse",
        Vec::new(),
    )
}

fn notifications_section() -> SchemaNode {
    SchemaNode::backed_group(
        "notifications",
        "Notification targets",
        "notifications",
        Vec::new(),
    )
}

/// Template for one auto-response rule, mounted under `autoresponse.<rule_id>`.
pub fn auto_response_entry(rule_id: &str) -> SchemaNode {
    SchemaNode::group(
        rule_id,
        rule_id,
        vec![
            SchemaNode::Field(
                FieldSpec::text("pattern", "Pattern", "").describe("Text the rule matches on"),
            ),
            SchemaNode::Field(FieldSpec::toggle("case_sensitive", "Case sensitive", false)),
            SchemaNode::Field(
                FieldSpec::toggle("react_on_me", "React to own messages", false),
            ),
            SchemaNode::Field(
                FieldSpec::toggle("react_on_others", "React to others", true),
            ),
            SchemaNode::Field(
                FieldSpec::toggle("reply", "Reply instead of plain send", true),
            ),
            SchemaNode::Field(
                FieldSpec::text("response_text", "Response text", "")
                    .describe("Message sent when the rule fires"),
            ),
            SchemaNode::Field(
                FieldSpec::list("hooks", "Hook channels")
                    .describe("Handler channels that receive rule hits")
                    .validate(Validator::HookNames),
            ),
        ],
    )
}

/// Composite key of a notification target entry.
///
/// The thread part renders as `None` when absent, e.g. `111_None`.
pub fn notification_target_key(chat_id: i64, thread_id: Option<i64>) -> String {
    match thread_id {
        Some(thread) => format!("{}_{}", chat_id, thread),
        None => format!("{}_None", chat_id),
    }
}

/// Template for one notification target, mounted under
/// `notifications.<chat_id>_<thread>`.
pub fn notification_target_entry(chat_id: i64, thread_id: Option<i64>) -> SchemaNode {
    let key = notification_target_key(chat_id, thread_id);
    SchemaNode::group(
        &key,
        &key,
        vec![
            SchemaNode::Field(FieldSpec::int("chat_id", "Chat id", chat_id)),
            SchemaNode::Field(FieldSpec::int(
                "thread_id",
                "Thread id",
                thread_id.unwrap_or(-1),
            )),
            SchemaNode::Field(FieldSpec::toggle("enabled", "Enabled", true)),
            SchemaNode::Field(FieldSpec::choice(
                "severity",
                "Minimum severity",
                &["info", "warning", "error"],
                0,
            )),
        ],
    )
}

/// Split a composite notification target key back into its pair.
pub fn parse_notification_target_key(key: &str) -> Option<(i64, Option<i64>)> {
    let (chat, thread) = key.rsplit_once('_')?;
    let chat_id = chat.parse::<i64>().ok()?;
    let thread_id = match thread {
        "None" => None,
        other => Some(other.parse::<i64>().ok()?),
    };
    Some((chat_id, thread_id))
}

/// Re-create the dynamic entries recorded in the backing files, so a
/// following `load` can hydrate their values. Hydration itself never creates
/// structure, so this runs between assembly and `load` at startup.
pub async fn restore_dynamic_entries(tree: &SettingsTree) -> Result<usize, SettingsError> {
    let mut restored = 0;

    let rules_path = NodePath::from(["autoresponse"]);
    for rule_id in tree.saved_entry_ids(&rules_path).await? {
        match tree
            .add_entry(&rules_path, &auto_response_entry(&rule_id), false)
            .await
        {
            Ok(_) => restored += 1,
            Err(SettingsError::Tree(TreeError::DuplicateId { .. })) => {}
            Err(err) => return Err(err),
        }
    }

    let targets_path = NodePath::from(["notifications"]);
    for key in tree.saved_entry_ids(&targets_path).await? {
        let Some((chat_id, thread_id)) = parse_notification_target_key(&key) else {
            warn!(key = %key, "ignoring malformed notification target key");
            continue;
        };
        match tree
            .add_entry(
                &targets_path,
                &notification_target_entry(chat_id, thread_id),
                false,
            )
            .await
        {
            Ok(_) => restored += 1,
            Err(SettingsError::Tree(TreeError::DuplicateId { .. })) => {}
            Err(err) => return Err(err),
        }
    }

    Ok(restored)
}
