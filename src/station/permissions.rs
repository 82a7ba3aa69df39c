//! Permissions forwarding into the station worktree.
//!
//! When `permissions` is configured, the allow/deny lists are written
//! verbatim into `.claude/settings.json` inside the worktree before the
//! agent starts. The engine assumes nothing about their meaning beyond
//! "write the file before invocation".

use std::fs;
use std::io;
use std::path::Path;

use crate::config::Permissions;

/// Write `.claude/settings.json` in the worktree.
pub fn write_permissions(worktree: &Path, permissions: &Permissions) -> io::Result<()> {
    let claude_dir = worktree.join(".claude");
    fs::create_dir_all(&claude_dir)?;

    let settings = serde_json::json!({ "permissions": permissions });
    let mut rendered = serde_json::to_string_pretty(&settings)?;
    rendered.push('\n');
    fs::write(claude_dir.join("settings.json"), rendered)
}
