use std::path::{Path, PathBuf};

/// Directory holding `session.json` when no `--session-dir` is given.
pub const SESSION_DIR_NAME: &str = ".astar";

/// Resolve the session directory.
///
/// Priority:
/// 1. `--session-dir` flag / `ASTAR_SESSION_DIR` env var (passed in as `explicit`)
/// 2. `~/.astar`
/// 3. `./.astar` when no home directory can be determined
pub fn resolve_session_dir(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    match home::home_dir() {
        Some(home) => home.join(SESSION_DIR_NAME),
        None => PathBuf::from(SESSION_DIR_NAME),
    }
}
