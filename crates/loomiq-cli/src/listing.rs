//! Plain-text views of tasks, agents, stats and the signed-in profile.

use loomiq_stream::{AgentInfo, TaskRecord, TaskStats, UserProfile};

use crate::render::short_task_id;

/// Capabilities shown per agent.
const MAX_CAPABILITIES: usize = 4;

/// `id  status  priority  type  title  @agent`, one row per task.
pub fn format_task_row(task: &TaskRecord, agents: &[AgentInfo]) -> String {
    let mut row = format!(
        "{:<9}  {:<10}  {:<6}  {:<14}  {}",
        short_task_id(&task.id),
        task.status.as_deref().unwrap_or("unknown"),
        task.priority.as_deref().unwrap_or("-"),
        task.task_type.as_deref().unwrap_or("-"),
        task.title.as_deref().unwrap_or(""),
    )
    .trim_end()
    .to_string();
    if let Some(agent_id) = task.assigned_agent.as_deref().filter(|id| !id.is_empty()) {
        row.push_str(&format!("  @{}", agent_name(agents, agent_id)));
    }
    row
}

/// Name of the agent a task is assigned to, falling back to the raw id.
pub fn agent_name<'a>(agents: &'a [AgentInfo], agent_id: &'a str) -> &'a str {
    agents
        .iter()
        .find(|agent| agent.id == agent_id)
        .map(|agent| agent.name.as_str())
        .filter(|name| !name.is_empty())
        .unwrap_or(agent_id)
}

pub fn format_agent(agent: &AgentInfo) -> String {
    let mut text = format!(
        "{} ({})  {}\n  tasks completed: {}  success rate: {}%  avg response: {}ms",
        agent.name,
        agent.provider.as_deref().unwrap_or("unknown provider"),
        agent.status.state,
        agent.status.total_tasks_completed,
        agent.status.success_rate.round(),
        agent.status.average_response_time.round(),
    );
    let capabilities: Vec<&str> = agent
        .capabilities
        .iter()
        .take(MAX_CAPABILITIES)
        .map(|c| c.name.as_str())
        .collect();
    if !capabilities.is_empty() {
        text.push_str(&format!("\n  capabilities: {}", capabilities.join(", ")));
    }
    text
}

pub fn format_stats(stats: &TaskStats) -> String {
    format!(
        "Total {}  Done {}  Running {}",
        stats.total, stats.completed, stats.running
    )
}

/// Profile card followed by roles and permissions grouped by resource.
pub fn format_profile(user: &UserProfile) -> String {
    let mut lines = vec![
        format!("{} (@{})", user.display_name(), user.username),
        format!("email: {}", user.email.as_deref().unwrap_or("—")),
        format!("user id: {}", user.id.as_deref().unwrap_or("—")),
        String::new(),
        "Roles:".to_string(),
    ];
    if user.roles.is_empty() {
        lines.push("  No roles assigned.".to_string());
    }
    for role in &user.roles {
        let kind = if role.is_system { "System" } else { "Custom" };
        match role.description.as_deref().filter(|d| !d.is_empty()) {
            Some(description) => lines.push(format!("  {} [{kind}]  {description}", role.name)),
            None => lines.push(format!("  {} [{kind}]", role.name)),
        }
    }

    lines.push(String::new());
    let count = user.permissions.len();
    lines.push(format!(
        "Permissions ({count} granted through your roles):"
    ));
    if count == 0 {
        lines.push("  No permissions found.".to_string());
    }
    for (resource, permissions) in user.permissions_by_resource() {
        let actions: Vec<&str> = permissions.iter().map(|p| p.action_name()).collect();
        lines.push(format!("  {resource}: {}", actions.join(", ")));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use loomiq_stream::{AgentCapability, AgentStatus};

    use super::*;

    fn task(json: &str) -> TaskRecord {
        serde_json::from_str(json).expect("task")
    }

    #[test]
    fn task_row_shows_short_id_and_fallbacks() {
        let agents = vec![AgentInfo {
            id: "a1".into(),
            name: "Claude Coder".into(),
            ..AgentInfo::default()
        }];
        let row = format_task_row(
            &task(
                r#"{"id":"0123456789abcdef","title":"Parser","status":"running","priority":"high","type":"implementation","assignedAgent":"a1"}"#,
            ),
            &agents,
        );
        assert_eq!(row, "01234567…  running     high    implementation  Parser  @Claude Coder");

        let bare = format_task_row(&task(r#"{"id":"t1"}"#), &[]);
        assert!(bare.starts_with("t1 "));
        assert!(bare.contains("unknown"));
    }

    #[test]
    fn agent_card_rounds_and_limits_capabilities() {
        let agent = AgentInfo {
            id: "a1".into(),
            name: "Claude Coder".into(),
            provider: Some("anthropic".into()),
            status: AgentStatus {
                state: "idle".into(),
                total_tasks_completed: 12,
                success_rate: 91.6,
                average_response_time: 1830.4,
            },
            capabilities: ["code", "review", "docs", "tests", "deploy"]
                .into_iter()
                .map(|name| AgentCapability { name: name.into() })
                .collect(),
        };
        let card = format_agent(&agent);
        assert!(card.starts_with("Claude Coder (anthropic)  idle"));
        assert!(card.contains("success rate: 92%"));
        assert!(card.contains("avg response: 1830ms"));
        assert!(card.ends_with("capabilities: code, review, docs, tests"));
    }

    #[test]
    fn assigned_agent_falls_back_to_id() {
        let agents = vec![AgentInfo {
            id: "a1".into(),
            name: "Claude Coder".into(),
            ..AgentInfo::default()
        }];
        assert_eq!(agent_name(&agents, "a1"), "Claude Coder");
        assert_eq!(agent_name(&agents, "a9"), "a9");
    }

    #[test]
    fn stats_line() {
        let stats = TaskStats {
            total: 7,
            completed: 4,
            running: 2,
            ..TaskStats::default()
        };
        assert_eq!(format_stats(&stats), "Total 7  Done 4  Running 2");
    }

    #[test]
    fn profile_lists_roles_and_grouped_permissions() {
        let user: UserProfile = serde_json::from_str(
            r#"{"id":7,"username":"ada","firstName":"Ada","lastName":"Lovelace",
                "roles":[{"name":"developer","description":"Builds things","isSystem":true},"viewer"],
                "permissions":["tasks:create","tasks:read",{"resource":"agents","action":"read"}]}"#,
        )
        .expect("user");
        let text = format_profile(&user);
        assert!(text.starts_with("Ada Lovelace (@ada)"));
        assert!(text.contains("user id: 7"));
        assert!(text.contains("  developer [System]  Builds things"));
        assert!(text.contains("  viewer [Custom]"));
        assert!(text.contains("Permissions (3 granted through your roles):"));
        assert!(text.contains("  tasks: create, read"));
        assert!(text.ends_with("  agents: read"));
    }

    #[test]
    fn empty_profile_says_so() {
        let user = UserProfile {
            username: "ada".into(),
            ..UserProfile::default()
        };
        let text = format_profile(&user);
        assert!(text.contains("No roles assigned."));
        assert!(text.contains("No permissions found."));
    }
}
