//! REST implementation of the backend contract.

use crate::config::ClientConfig;
use crate::error::ClientError;
use async_trait::async_trait;
use fithero_core::{
    Achievement, AchievementId, AchievementUnlock, ApiError, ApiResult, DailyTask, DailyTaskId,
    GamificationApi, LeaderboardEntry, Profile, TaskCompletion, UserAchievement,
};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

#[derive(Deserialize)]
struct ProfileEnvelope {
    user: Profile,
}

#[derive(Deserialize)]
struct TasksEnvelope {
    tasks: Vec<DailyTask>,
}

#[derive(Deserialize)]
struct UnlockedEnvelope {
    achievements: Vec<UserAchievement>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// HTTP client for the FitHero backend, authenticated with a bearer token.
#[derive(Clone)]
pub struct RestClient {
    client: reqwest::Client,
    base_url: String,
    auth_header: HeaderMap,
}

impl RestClient {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        let auth_header = build_auth_headers(&config.auth.token)?;
        Ok(Self {
            client,
            base_url: config.api_base_url.trim().trim_end_matches('/').to_string(),
            auth_header,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T, Q>(&self, path: &str, query: Option<&Q>) -> ApiResult<T>
    where
        T: DeserializeOwned,
        Q: serde::Serialize + ?Sized,
    {
        let url = endpoint_url(&self.base_url, path);
        debug!(%url, "GET");
        let mut request = self.client.get(url).headers(self.auth_header.clone());
        if let Some(query) = query {
            request = request.query(query);
        }
        let response = request.send().await.map_err(transport_error)?;
        parse_response(response).await
    }

    async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        let url = endpoint_url(&self.base_url, path);
        debug!(%url, "POST");
        let response = self
            .client
            .post(url)
            .headers(self.auth_header.clone())
            .send()
            .await
            .map_err(transport_error)?;
        parse_response(response).await
    }
}

#[async_trait]
impl GamificationApi for RestClient {
    async fn profile(&self) -> ApiResult<Profile> {
        let envelope: ProfileEnvelope = self.get_json::<_, ()>("/api/me", None).await?;
        Ok(envelope.user)
    }

    async fn daily_tasks(&self) -> ApiResult<Vec<DailyTask>> {
        let envelope: TasksEnvelope = self.get_json::<_, ()>("/api/tasks/daily", None).await?;
        Ok(envelope.tasks)
    }

    async fn complete_task(&self, task_id: DailyTaskId) -> ApiResult<TaskCompletion> {
        let path = format!("/api/tasks/daily/{}/complete", task_id);
        self.post_empty(&path).await
    }

    async fn generate_daily_tasks(&self) -> ApiResult<Vec<DailyTask>> {
        let envelope: TasksEnvelope = self.post_empty("/api/tasks/daily/generate").await?;
        Ok(envelope.tasks)
    }

    async fn achievements(&self) -> ApiResult<Vec<Achievement>> {
        self.get_json::<_, ()>("/api/achievements/", None).await
    }

    async fn unlocked_achievements(&self) -> ApiResult<Vec<UserAchievement>> {
        let envelope: UnlockedEnvelope =
            self.get_json::<_, ()>("/api/achievements/user", None).await?;
        Ok(envelope.achievements)
    }

    async fn unlock_achievement(&self, achievement_id: AchievementId) -> ApiResult<AchievementUnlock> {
        let path = format!("/api/achievements/{}/unlock", achievement_id);
        self.post_empty(&path).await
    }

    async fn leaderboard(&self, limit: usize) -> ApiResult<Vec<LeaderboardEntry>> {
        self.get_json("/api/public/leaderboard", Some(&[("limit", limit)]))
            .await
    }
}

async fn parse_response<T: DeserializeOwned>(response: reqwest::Response) -> ApiResult<T> {
    let status = response.status();
    let body = response.text().await.map_err(transport_error)?;
    if status.is_success() {
        decode_body(&body)
    } else {
        Err(ApiError::from_status(status.as_u16(), error_message(&body)))
    }
}

/// Decode a success body, reporting malformed JSON as [`ApiError::Decode`].
pub fn decode_body<T: DeserializeOwned>(body: &str) -> ApiResult<T> {
    serde_json::from_str(body).map_err(|err| ApiError::Decode {
        reason: err.to_string(),
    })
}

/// The `error` field of a `{"error": "..."}` failure body, if present and
/// non-blank.
pub fn error_message(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .map(|body| body.error)
        .filter(|message| !message.trim().is_empty())
}

/// Join `path` onto a base URL that may or may not end in `/`.
pub fn endpoint_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

fn transport_error(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        ApiError::Timeout
    } else if err.is_decode() {
        ApiError::Decode {
            reason: err.to_string(),
        }
    } else {
        ApiError::Transport {
            reason: err.to_string(),
        }
    }
}

fn build_auth_headers(token: &str) -> Result<HeaderMap, ClientError> {
    let mut headers = HeaderMap::new();
    let value = format!("Bearer {}", token.trim());
    let mut value =
        HeaderValue::from_str(&value).map_err(|e| ClientError::InvalidToken(e.to_string()))?;
    value.set_sensitive(true);
    headers.insert(AUTHORIZATION, value);
    Ok(headers)
}
