use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use alchemy_core::{ArtifactRef, Identity};

use crate::cache::{CacheError, ElementCache};
use crate::rate_limit::{LimiterError, RateDecision, RateLimiter};

#[derive(Debug, thiserror::Error)]
pub enum UpstashError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("request timed out")]
    Timeout,
    #[error("redis error: {0}")]
    Backend(String),
    #[error("unexpected reply: {0}")]
    Decode(String),
}

impl From<UpstashError> for CacheError {
    fn from(err: UpstashError) -> Self {
        match err {
            UpstashError::Transport(e) => Self::Transport(e),
            UpstashError::Timeout => Self::Timeout,
            UpstashError::Backend(e) => Self::Backend(e),
            UpstashError::Decode(e) => Self::Decode(e),
        }
    }
}

impl From<UpstashError> for LimiterError {
    fn from(err: UpstashError) -> Self {
        Self::Unavailable(format!("upstash {err}"))
    }
}

/// Upstash Redis over its REST API: each command is a JSON array POSTed to
/// the database URL with a bearer token.
pub struct UpstashClient {
    client: reqwest::Client,
    url: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct UpstashReply {
    #[serde(default)]
    result: Value,
    error: Option<String>,
}

impl UpstashClient {
    pub fn new(url: &str, token: &str, timeout: Duration) -> Result<Self, UpstashError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| UpstashError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            url: url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    pub async fn command(&self, args: &[&str]) -> Result<Value, UpstashError> {
        let resp = self
            .client
            .post(&self.url)
            .bearer_auth(&self.token)
            .json(args)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    UpstashError::Timeout
                } else {
                    UpstashError::Transport(e.to_string())
                }
            })?;
        let status = resp.status();
        let reply: UpstashReply = resp
            .json()
            .await
            .map_err(|e| UpstashError::Decode(format!("status {status}: {e}")))?;
        if let Some(err) = reply.error {
            return Err(UpstashError::Backend(err));
        }
        Ok(reply.result)
    }
}

/// Artwork cache stored as plain Redis strings keyed by identity.
pub struct UpstashCache {
    client: UpstashClient,
}

impl UpstashCache {
    pub fn new(url: &str, token: &str, timeout: Duration) -> Result<Self, CacheError> {
        Ok(Self {
            client: UpstashClient::new(url, token, timeout)?,
        })
    }
}

fn artifact_from(value: Value) -> Result<Option<ArtifactRef>, CacheError> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(ArtifactRef::new(s))),
        other => Err(CacheError::Decode(format!("expected string, got {other}"))),
    }
}

#[async_trait]
impl ElementCache for UpstashCache {
    fn backend(&self) -> &'static str {
        "upstash"
    }

    async fn get(&self, id: &Identity) -> Result<Option<ArtifactRef>, CacheError> {
        artifact_from(self.client.command(&["GET", id.as_str()]).await?)
    }

    async fn set(&self, id: &Identity, artifact: &ArtifactRef) -> Result<(), CacheError> {
        self.client
            .command(&["SET", id.as_str(), artifact.as_str()])
            .await?;
        Ok(())
    }

    async fn multi_get(&self, ids: &[Identity]) -> Result<Vec<Option<ArtifactRef>>, CacheError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut args = Vec::with_capacity(ids.len() + 1);
        args.push("MGET");
        args.extend(ids.iter().map(Identity::as_str));

        let Value::Array(values) = self.client.command(&args).await? else {
            return Err(CacheError::Decode("MGET did not return an array".to_string()));
        };
        if values.len() != ids.len() {
            return Err(CacheError::Decode(format!(
                "MGET returned {} values for {} keys",
                values.len(),
                ids.len()
            )));
        }
        values.into_iter().map(artifact_from).collect()
    }
}

/// Token bucket kept in a Redis hash so every server instance draws from the
/// same bucket. Refill follows the in-process limiter: each whole interval
/// since the last refill adds `refill` tokens, capped at `capacity`. Time is
/// read from the Redis server clock.
///
/// Returns `{allowed, remaining, retry_after_ms}`; `retry_after_ms` is -1 when
/// the bucket is full or never refills.
const TOKEN_BUCKET_SCRIPT: &str = r#"
local capacity = tonumber(ARGV[1])
local refill = tonumber(ARGV[2])
local interval = tonumber(ARGV[3])
local t = redis.call("TIME")
local now = tonumber(t[1]) * 1000 + math.floor(tonumber(t[2]) / 1000)

local state = redis.call("HMGET", KEYS[1], "tokens", "refilled_at")
local tokens = tonumber(state[1])
local refilled_at = tonumber(state[2])
if tokens == nil or refilled_at == nil then
  tokens = capacity
  refilled_at = now
end

if refill > 0 and interval > 0 then
  local periods = math.floor((now - refilled_at) / interval)
  if periods > 0 then
    tokens = tokens + periods * refill
    if tokens >= capacity then
      tokens = capacity
      refilled_at = now
    else
      refilled_at = refilled_at + periods * interval
    end
  end
end

local allowed = 0
if tokens > 0 then
  tokens = tokens - 1
  allowed = 1
end

redis.call("HSET", KEYS[1], "tokens", tokens, "refilled_at", refilled_at)
if refill > 0 and interval > 0 then
  local full_after = math.ceil(capacity / refill) * interval
  redis.call("PEXPIRE", KEYS[1], full_after + interval)
end

local retry = -1
if tokens < capacity and refill > 0 and interval > 0 then
  retry = interval - (now - refilled_at)
end
return {allowed, tokens, retry}
"#;

const LIMITER_KEY_PREFIX: &str = "alchemy:ratelimit:";

/// Rate limiter shared by all instances through Upstash Redis.
pub struct UpstashLimiter {
    client: UpstashClient,
    capacity: u32,
    refill_amount: u32,
    refill_interval: Duration,
}

impl UpstashLimiter {
    pub fn new(
        url: &str,
        token: &str,
        timeout: Duration,
        capacity: u32,
        refill_amount: u32,
        refill_interval: Duration,
    ) -> Result<Self, LimiterError> {
        Ok(Self {
            client: UpstashClient::new(url, token, timeout)?,
            capacity,
            refill_amount,
            refill_interval,
        })
    }
}

fn decision_from(value: Value) -> Result<RateDecision, UpstashError> {
    let fields = match value {
        Value::Array(fields) if fields.len() == 3 => fields,
        other => {
            return Err(UpstashError::Decode(format!(
                "expected [allowed, remaining, retry], got {other}"
            )));
        },
    };
    let int = |v: &Value| {
        v.as_i64()
            .ok_or_else(|| UpstashError::Decode(format!("expected integer, got {v}")))
    };
    let allowed = int(&fields[0])? == 1;
    let remaining = u32::try_from(int(&fields[1])?.max(0)).unwrap_or(u32::MAX);
    let retry_ms = int(&fields[2])?;
    Ok(RateDecision {
        allowed,
        remaining,
        retry_after: u64::try_from(retry_ms).ok().map(Duration::from_millis),
    })
}

#[async_trait]
impl RateLimiter for UpstashLimiter {
    async fn acquire(&self, scope: &str) -> Result<RateDecision, LimiterError> {
        let key = format!("{LIMITER_KEY_PREFIX}{scope}");
        let capacity = self.capacity.to_string();
        let refill = self.refill_amount.to_string();
        let interval_ms = self.refill_interval.as_millis().to_string();
        let result = self
            .client
            .command(&[
                "EVAL",
                TOKEN_BUCKET_SCRIPT,
                "1",
                key.as_str(),
                capacity.as_str(),
                refill.as_str(),
                interval_ms.as_str(),
            ])
            .await?;
        decision_from(result).map_err(Into::into)
    }
}
