//! User-facing texts.

use archivist_core::{format_size, ArchivistError, MenuButton, OwnerId};

pub const CONFIGURE_MENU: &str = "⚙️ Configure your ZIP:";
pub const ASK_NAME: &str = "📝 Reply with ZIP name (e.g., data.zip)";
pub const ASK_PASSWORD: &str = "🔒 Reply with password (or /skip)";
pub const INVALID_NAME: &str = "❌ Invalid name! Use: example.zip";
pub const INVALID_INPUT: &str = "❌ Input rejected! Send a shorter value or /skip.";
pub const PASSWORD_REMOVED: &str = "🔒 Password removed!";
pub const NO_FILES: &str = "⚠️ No files to archive!";
pub const NO_SESSION: &str = "⚠️ No active session. Send /zip to start";
pub const SESSION_EXPIRED: &str = "Session expired! Start with /zip";
pub const BUSY: &str = "⏳ Your archive is being built, please wait";
pub const QUEUE_FULL: &str = "⏳ Too many pending requests, please wait and try again";
pub const CANCELLED: &str = "🗑️ Session cancelled, staged files removed";
pub const NOTHING_TO_CANCEL: &str = "Nothing to cancel";
pub const IDLE_EXPIRED: &str = "⌛ Session closed after inactivity. Start again with /zip";
pub const UNAUTHORIZED: &str = "🔒 Contact owner for access";
pub const PRIVATE_ONLY: &str = "❌ Use me in private chats!";
pub const AUTHORISE_USAGE: &str = "❌ Use: /authorise <user_id>";
pub const ALREADY_AUTHORIZED: &str = "✅ User already authorized!";

pub fn banner(ceiling: u64) -> String {
    format!(
        "📁 ZIP Archiver Bot\nSend /zip to start\nMax Archive Size: {}",
        format_size(ceiling)
    )
}

pub fn session_opened(ceiling: u64) -> String {
    format!(
        "🔄 Send files (Total ≤ {}):\nSupported: All file types\nSend /createzip when done",
        format_size(ceiling)
    )
}

pub fn file_saved(name: &str, total: u64) -> String {
    format!("✅ Saved: {name}\n📏 Total Size: {}", format_size(total))
}

pub fn over_budget(ceiling: u64) -> String {
    format!("⚠️ Total size exceeds {}!", format_size(ceiling))
}

pub fn name_set(name: &str) -> String {
    format!("📁 Name set: {name}")
}

/// Confirms a password without echoing it: one bullet per character.
pub fn password_set(password: &str) -> String {
    format!("🔐 Password set: {}", "•".repeat(password.chars().count()))
}

pub fn splitting(max_part_size: u64) -> String {
    format!("⚡ Splitting into {} parts...", format_size(max_part_size))
}

pub fn artifact_caption(name: &str, password: Option<&str>) -> String {
    match password {
        Some(password) => format!("📁 {name}\n🔒 Password: {password}"),
        None => format!("📁 {name}"),
    }
}

pub fn part_caption(index: u32, name: &str) -> String {
    format!("📦 Part {index} of {name}")
}

pub fn build_failed(err: &ArchivistError) -> String {
    format!("❌ Failed: {err}")
}

pub fn delivery_failed(err: &ArchivistError) -> String {
    format!("❌ Delivery failed: {err}\nYour files are kept, send /createzip to retry")
}

pub fn authorized(user: OwnerId) -> String {
    format!("🔓 Authorized user: {user}")
}

pub fn status(
    files: usize,
    total: u64,
    ceiling: u64,
    archive_name: &str,
    password_set: bool,
) -> String {
    format!(
        "📋 Files: {files}\n📏 Total Size: {} of {}\n📁 Name: {archive_name}\n🔑 Password: {}",
        format_size(total),
        format_size(ceiling),
        if password_set { "set" } else { "none" }
    )
}

/// The `/createzip` inline menu.
pub fn configure_menu() -> Vec<Vec<MenuButton>> {
    vec![
        vec![
            MenuButton::new("📝 Set Name", "set_name"),
            MenuButton::new("🔑 Set Password", "set_password"),
        ],
        vec![MenuButton::new("🚀 Create ZIP", "create_zip")],
    ]
}

/// Text reported for a rejected request.
pub fn rejection(err: &ArchivistError) -> String {
    match err {
        ArchivistError::OverBudget { ceiling, .. } => over_budget(*ceiling),
        ArchivistError::InvalidName(_) => INVALID_NAME.to_string(),
        ArchivistError::InvalidInput(_) => INVALID_INPUT.to_string(),
        ArchivistError::NoActiveSession(_) => NO_SESSION.to_string(),
        ArchivistError::EmptyInput => NO_FILES.to_string(),
        ArchivistError::Busy(_) => BUSY.to_string(),
        ArchivistError::Unauthorized(_) => UNAUTHORIZED.to_string(),
        other => format!("❌ Error: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_is_masked() {
        assert_eq!(password_set("hunter2"), "🔐 Password set: •••••••");
        assert_eq!(password_set("pä"), "🔐 Password set: ••");
    }

    #[test]
    fn test_captions() {
        assert_eq!(artifact_caption("out.zip", None), "📁 out.zip");
        assert_eq!(
            artifact_caption("out.zip", Some("pw")),
            "📁 out.zip\n🔒 Password: pw"
        );
        assert_eq!(part_caption(3, "big.zip"), "📦 Part 3 of big.zip");
    }

    #[test]
    fn test_rejection_texts() {
        let err = ArchivistError::OverBudget {
            current: 1,
            incoming: 2,
            ceiling: 20 * 1024 * 1024 * 1024,
        };
        assert_eq!(rejection(&err), "⚠️ Total size exceeds 20 GB!");
        assert_eq!(rejection(&ArchivistError::EmptyInput), NO_FILES);
    }

    #[test]
    fn test_menu_actions() {
        let actions: Vec<String> = configure_menu()
            .into_iter()
            .flatten()
            .map(|b| b.action)
            .collect();
        assert_eq!(actions, vec!["set_name", "set_password", "create_zip"]);
    }
}
