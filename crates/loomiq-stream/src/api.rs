//! REST calls that surround a task stream: auth, tasks, agents and stats.

use reqwest::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::ClientConfig;
use crate::errors::ApiError;
use crate::session::{AuthSession, UserProfile};

/// Minimum password length accepted at registration.
pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
}

/// Body of `POST /tasks`.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    pub prompt: String,
    #[serde(rename = "type")]
    pub task_type: String,
    pub priority: TaskPriority,
    pub use_collaboration: bool,
}

impl NewTask {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            task_type: "implementation".to_string(),
            priority: TaskPriority::default(),
            use_collaboration: false,
        }
    }

    pub fn task_type(mut self, task_type: impl Into<String>) -> Self {
        self.task_type = task_type.into();
        self
    }

    pub fn priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn use_collaboration(mut self, enabled: bool) -> Self {
        self.use_collaboration = enabled;
        self
    }
}

/// Task as reported by the backend. Fields this client does not read are
/// kept in `extra`.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, rename = "type")]
    pub task_type: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub assigned_agent: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Executor registered with the backend, as listed by `GET /agents`.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentInfo {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub status: AgentStatus,
    #[serde(default)]
    pub capabilities: Vec<AgentCapability>,
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStatus {
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub total_tasks_completed: u64,
    /// Percentage, 0 to 100.
    #[serde(default)]
    pub success_rate: f64,
    /// Milliseconds.
    #[serde(default)]
    pub average_response_time: f64,
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AgentCapability {
    #[serde(default)]
    pub name: String,
}

/// Task counters from `GET /stats`.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TaskStats {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub completed: u64,
    #[serde(default)]
    pub running: u64,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Body of `POST /legacy-auth/me/change-password`. The confirmation is
/// checked locally and never sent.
#[derive(Clone, Debug, Default, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
    #[serde(skip)]
    pub confirm_password: String,
}

impl ChangePasswordRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.old_password.is_empty() {
            return Err(ApiError::Validation("current password is required".into()));
        }
        if self.new_password != self.confirm_password {
            return Err(ApiError::Validation("new passwords don't match".into()));
        }
        if self.new_password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ApiError::Validation(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        Ok(())
    }
}

/// Body of `POST /legacy-auth/register`.
#[derive(Clone, Debug, Default, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

impl RegisterRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.username.trim().is_empty() || self.password.is_empty() {
            return Err(ApiError::Validation(
                "username and password are required".into(),
            ));
        }
        if self.first_name.trim().is_empty() || self.last_name.trim().is_empty() {
            return Err(ApiError::Validation(
                "first and last name are required".into(),
            ));
        }
        if self.email.trim().is_empty() {
            return Err(ApiError::Validation("email is required".into()));
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ApiError::Validation(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        Ok(())
    }
}

#[derive(serde::Deserialize)]
#[serde(untagged)]
enum TokenField {
    Plain(String),
    Wrapped {
        #[serde(rename = "accessToken")]
        access_token: String,
    },
}

#[derive(serde::Deserialize)]
struct AuthResponse {
    #[serde(default)]
    user: Option<UserProfile>,
    token: TokenField,
}

#[derive(serde::Deserialize)]
struct SubmitResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    task: Option<TaskRecord>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(serde::Deserialize)]
struct TaskResponse {
    #[serde(default)]
    task: Option<TaskRecord>,
}

#[derive(serde::Deserialize)]
struct TaskListResponse {
    #[serde(default)]
    tasks: Vec<TaskRecord>,
}

#[derive(serde::Deserialize)]
struct AgentListResponse {
    #[serde(default)]
    agents: Vec<AgentInfo>,
}

#[derive(serde::Deserialize)]
struct StatsResponse {
    #[serde(default)]
    stats: Option<TaskStats>,
}

#[derive(serde::Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// HTTP client for the task backend's REST endpoints.
#[derive(Clone)]
pub struct TaskApi {
    client: reqwest::Client,
    config: ClientConfig,
}

impl TaskApi {
    pub fn new(config: ClientConfig) -> Result<Self, ApiError> {
        config
            .validate()
            .map_err(|e| ApiError::Config(e.to_string()))?;
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ApiError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// `POST /legacy-auth/login`, returning a checked session.
    pub async fn login(&self, username: &str, password: &str) -> Result<AuthSession, ApiError> {
        if username.trim().is_empty() || password.is_empty() {
            return Err(ApiError::Validation(
                "username and password are required".into(),
            ));
        }
        let body = serde_json::json!({ "username": username, "password": password });
        let url = self.url(&["legacy-auth", "login"])?;
        debug!(%url, "logging in");
        let response = self.client.post(url).json(&body).send().await;
        let auth: AuthResponse = read_json(response).await?;
        session_from(auth)
    }

    /// `POST /legacy-auth/register`, returning a checked session.
    pub async fn register(&self, request: &RegisterRequest) -> Result<AuthSession, ApiError> {
        request.validate()?;
        let url = self.url(&["legacy-auth", "register"])?;
        debug!(%url, username = %request.username, "registering");
        let response = self.client.post(url).json(request).send().await;
        let auth: AuthResponse = read_json(response).await?;
        session_from(auth)
    }

    /// `POST /tasks`.
    pub async fn submit_task(
        &self,
        session: &AuthSession,
        task: &NewTask,
    ) -> Result<TaskRecord, ApiError> {
        if task.prompt.trim().is_empty() {
            return Err(ApiError::Validation("task prompt must not be empty".into()));
        }
        let url = self.url(&["tasks"])?;
        debug!(%url, priority = ?task.priority, collaboration = task.use_collaboration, "submitting task");
        let response = self
            .client
            .post(url)
            .bearer_auth(session.token())
            .header(CONTENT_TYPE, "application/json")
            .json(task)
            .send()
            .await;
        let submitted: SubmitResponse = read_json(response).await?;
        match (submitted.success, submitted.task) {
            (true, Some(task)) => Ok(task),
            _ => Err(ApiError::Protocol(submitted.error.unwrap_or_else(|| {
                "task submission was not acknowledged".to_string()
            }))),
        }
    }

    /// `GET /tasks/{id}`.
    pub async fn get_task(
        &self,
        session: &AuthSession,
        task_id: &str,
    ) -> Result<TaskRecord, ApiError> {
        if task_id.trim().is_empty() {
            return Err(ApiError::Validation("task id must not be empty".into()));
        }
        let fetched: TaskResponse = self.get_json(session, &["tasks", task_id]).await?;
        fetched
            .task
            .ok_or_else(|| ApiError::Protocol(format!("no task in response for {task_id}")))
    }

    /// `GET /tasks`, newest first as the backend orders them.
    pub async fn list_tasks(&self, session: &AuthSession) -> Result<Vec<TaskRecord>, ApiError> {
        let listed: TaskListResponse = self.get_json(session, &["tasks"]).await?;
        Ok(listed.tasks)
    }

    /// `GET /agents`.
    pub async fn list_agents(&self, session: &AuthSession) -> Result<Vec<AgentInfo>, ApiError> {
        let listed: AgentListResponse = self.get_json(session, &["agents"]).await?;
        Ok(listed.agents)
    }

    /// `GET /stats`. A missing `stats` object reads as all zeroes.
    pub async fn stats(&self, session: &AuthSession) -> Result<TaskStats, ApiError> {
        let fetched: StatsResponse = self.get_json(session, &["stats"]).await?;
        Ok(fetched.stats.unwrap_or_default())
    }

    /// `POST /legacy-auth/me/change-password`.
    pub async fn change_password(
        &self,
        session: &AuthSession,
        request: &ChangePasswordRequest,
    ) -> Result<(), ApiError> {
        request.validate()?;
        let url = self.url(&["legacy-auth", "me", "change-password"])?;
        debug!(%url, "changing password");
        let response = self
            .client
            .post(url)
            .bearer_auth(session.token())
            .json(request)
            .send()
            .await;
        let _: serde_json::Value = read_json(response).await?;
        Ok(())
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        session: &AuthSession,
        segments: &[&str],
    ) -> Result<T, ApiError> {
        let url = self.url(segments)?;
        debug!(%url, "fetching");
        let response = self
            .client
            .get(url)
            .bearer_auth(session.token())
            .send()
            .await;
        read_json(response).await
    }

    fn url(&self, segments: &[&str]) -> Result<reqwest::Url, ApiError> {
        self.config
            .endpoint_url(segments)
            .map_err(|e| ApiError::Config(e.to_string()))
    }
}

fn session_from(auth: AuthResponse) -> Result<AuthSession, ApiError> {
    let token = match auth.token {
        TokenField::Plain(token) => token,
        TokenField::Wrapped { access_token } => access_token,
    };
    Ok(AuthSession::new(token, auth.user)?)
}

async fn read_json<T: DeserializeOwned>(
    response: Result<reqwest::Response, reqwest::Error>,
) -> Result<T, ApiError> {
    let response = response.map_err(|e| ApiError::Transport(format!("request failed: {e}")))?;
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| ApiError::Transport(format!("failed to read response: {e}")))?;
    if !status.is_success() {
        return Err(ApiError::Status {
            status: status.as_u16(),
            message: error_message(&body),
        });
    }
    serde_json::from_str(&body).map_err(|e| ApiError::Protocol(format!("invalid JSON body: {e}")))
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error.or(b.message))
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                "Something went wrong".to_string()
            } else {
                body.trim().to_string()
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_task_serializes_like_dashboard_form() {
        let task = NewTask::new("Write a parser")
            .priority(TaskPriority::High)
            .use_collaboration(true);
        let value = serde_json::to_value(&task).expect("serialize");
        assert_eq!(
            value,
            serde_json::json!({
                "prompt": "Write a parser",
                "type": "implementation",
                "priority": "high",
                "useCollaboration": true,
            })
        );
    }

    #[test]
    fn token_field_accepts_plain_and_wrapped_forms() {
        let plain: AuthResponse =
            serde_json::from_str(r#"{"user":{"username":"ada"},"token":"abc"}"#).expect("plain");
        let session = session_from(plain).expect("session");
        assert_eq!(session.token(), "abc");
        assert_eq!(session.user().map(|u| u.username.as_str()), Some("ada"));

        let wrapped: AuthResponse =
            serde_json::from_str(r#"{"token":{"accessToken":"xyz","refreshToken":"r"}}"#)
                .expect("wrapped");
        assert_eq!(session_from(wrapped).expect("session").token(), "xyz");
    }

    #[test]
    fn task_record_keeps_unknown_fields() {
        let record: TaskRecord = serde_json::from_str(
            r#"{"id":"t1","title":"Parser","status":"completed","type":"analysis","assignedAgent":"coder","createdAt":"2026-03-01T12:00:00Z","tokens":42}"#,
        )
        .expect("record");
        assert_eq!(record.status.as_deref(), Some("completed"));
        assert_eq!(record.task_type.as_deref(), Some("analysis"));
        assert_eq!(record.assigned_agent.as_deref(), Some("coder"));
        assert_eq!(record.extra.get("tokens"), Some(&serde_json::json!(42)));
        assert!(!record.extra.contains_key("assignedAgent"));
    }

    #[test]
    fn register_validation_mirrors_form_rules() {
        let mut request = RegisterRequest {
            username: "ada".into(),
            email: "ada@example.com".into(),
            password: "short".into(),
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
        };
        assert!(matches!(request.validate(), Err(ApiError::Validation(msg)) if msg.contains("at least 8")));
        request.password = "long enough".into();
        assert!(request.validate().is_ok());
        request.email.clear();
        assert!(matches!(request.validate(), Err(ApiError::Validation(msg)) if msg.contains("email")));
    }

    #[test]
    fn error_message_prefers_error_field() {
        assert_eq!(error_message(r#"{"error":"Invalid credentials"}"#), "Invalid credentials");
        assert_eq!(error_message(r#"{"message":"nope"}"#), "nope");
        assert_eq!(error_message("plain failure"), "plain failure");
        assert_eq!(error_message(""), "Something went wrong");
    }

    #[tokio::test]
    async fn empty_prompt_is_rejected_before_sending() {
        let api = TaskApi::new(ClientConfig::default().api_base("http://127.0.0.1:9/api"))
            .expect("api");
        let session = AuthSession::new("tok", None).expect("session");
        let err = api
            .submit_task(&session, &NewTask::new("   "))
            .await
            .expect_err("empty prompt");
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn login_requires_credentials() {
        let api = TaskApi::new(ClientConfig::default()).expect("api");
        let err = api.login("", "pw").await.expect_err("missing username");
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[test]
    fn agent_list_reads_status_and_capabilities() {
        let listed: AgentListResponse = serde_json::from_str(
            r#"{"agents":[{"id":"a1","name":"Claude Coder","provider":"anthropic",
                "status":{"state":"idle","totalTasksCompleted":12,"successRate":91.7,"averageResponseTime":1830.4},
                "capabilities":[{"name":"code","level":5},{"name":"review"}]},
               {"id":"a2","name":"Bare"}]}"#,
        )
        .expect("agents");
        let coder = &listed.agents[0];
        assert_eq!(coder.provider.as_deref(), Some("anthropic"));
        assert_eq!(coder.status.state, "idle");
        assert_eq!(coder.status.total_tasks_completed, 12);
        assert_eq!(coder.capabilities[1].name, "review");
        assert_eq!(listed.agents[1].status, AgentStatus::default());
    }

    #[test]
    fn stats_and_task_list_tolerate_missing_fields() {
        let stats: StatsResponse =
            serde_json::from_str(r#"{"stats":{"total":7,"completed":4,"running":2,"failed":1}}"#)
                .expect("stats");
        let stats = stats.stats.expect("present");
        assert_eq!((stats.total, stats.completed, stats.running), (7, 4, 2));
        assert_eq!(stats.extra.get("failed"), Some(&serde_json::json!(1)));

        let empty: StatsResponse = serde_json::from_str(r#"{"stats":null}"#).expect("null");
        assert_eq!(empty.stats.unwrap_or_default().total, 0);

        let tasks: TaskListResponse = serde_json::from_str("{}").expect("no tasks");
        assert!(tasks.tasks.is_empty());
    }

    #[test]
    fn change_password_checks_confirmation_and_length() {
        let mut request = ChangePasswordRequest {
            old_password: "old secret".into(),
            new_password: "new secret".into(),
            confirm_password: "new secrex".into(),
        };
        assert!(matches!(request.validate(), Err(ApiError::Validation(msg)) if msg.contains("match")));
        request.new_password = "short".into();
        request.confirm_password = "short".into();
        assert!(matches!(request.validate(), Err(ApiError::Validation(msg)) if msg.contains("at least 8")));
        request.new_password = "long enough".into();
        request.confirm_password = "long enough".into();
        assert!(request.validate().is_ok());

        let body = serde_json::to_value(&request).expect("serialize");
        assert_eq!(
            body,
            serde_json::json!({"oldPassword": "old secret", "newPassword": "long enough"})
        );
    }

    #[tokio::test]
    async fn change_password_is_validated_before_sending() {
        let api = TaskApi::new(ClientConfig::default().api_base("http://127.0.0.1:9/api"))
            .expect("api");
        let session = AuthSession::new("tok", None).expect("session");
        let request = ChangePasswordRequest {
            old_password: "old".into(),
            new_password: "a".into(),
            confirm_password: "b".into(),
        };
        let err = api
            .change_password(&session, &request)
            .await
            .expect_err("mismatch");
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn listing_against_closed_port_is_transport_error() {
        let api = TaskApi::new(
            ClientConfig::default()
                .api_base("http://127.0.0.1:9/api")
                .connect_timeout(std::time::Duration::from_millis(500)),
        )
        .expect("api");
        let session = AuthSession::new("tok", None).expect("session");
        let err = api.list_agents(&session).await.expect_err("nothing listens");
        assert!(matches!(err, ApiError::Transport(_)));
    }
}
