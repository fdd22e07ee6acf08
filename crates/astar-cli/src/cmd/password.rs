use crate::output::print_json;
use astar_core::password::hash_password;

/// Print an Argon2id hash, ready to paste into a `users` entry.
pub fn run(password: &str, json: bool) -> anyhow::Result<()> {
    if password.is_empty() {
        anyhow::bail!("password must not be empty");
    }
    let password_hash = hash_password(password)?;

    if json {
        print_json(&serde_json::json!({ "password_hash": password_hash }))?;
    } else {
        println!("password_hash: '{password_hash}'");
    }
    Ok(())
}
