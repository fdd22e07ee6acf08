use crate::output::print_json;
use anyhow::Context;
use astar_core::{AccessRequest, AstarError, Config, Permission, PermissionEvaluator, Subject};
use std::path::Path;
use std::sync::Arc;

const LOCAL_USER: &str = "local";

/// Evaluate `permission` for a subject holding `roles`, against the
/// configured role hierarchy. Exits non-zero on denial.
pub fn run(
    config_path: &Path,
    permission: &str,
    roles: &[String],
    owned: bool,
    json: bool,
) -> anyhow::Result<()> {
    let config = Config::load_or_default(config_path).context("failed to load config")?;
    let hierarchy = config.role_hierarchy().context("invalid role definitions")?;
    if let Some(unknown) = roles.iter().find(|r| !hierarchy.contains(r)) {
        return Err(AstarError::RoleNotFound(unknown.clone()).into());
    }

    let permission = Permission::parse(permission)?;
    let subject = Subject {
        user_id: LOCAL_USER.to_string(),
        tenant: LOCAL_USER.to_string(),
        roles: roles.to_vec(),
    };
    let mut request = AccessRequest::new(permission);
    if owned {
        request = request.owned_by(LOCAL_USER);
    }

    let evaluator = PermissionEvaluator::new(Arc::new(hierarchy));
    let decision = evaluator.evaluate(&subject, &request);

    if json {
        print_json(&decision)?;
    } else if decision.allowed {
        println!("allowed: {}", decision.reason);
    } else {
        println!("denied: {}", decision.reason);
    }

    if !decision.allowed {
        anyhow::bail!("permission denied");
    }
    Ok(())
}
