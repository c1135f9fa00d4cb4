//! Process settings read from environment variables.
//!
//! Every variable has a default, so an empty environment gives a single
//! in-memory process serving HTTP and running workers.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use errand_core::app::JobOptions;
use errand_core::domain::RetryPolicy;
use errand_core::impls::DEFAULT_QUEUE;

/// Which halves of the pipeline this process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// HTTP only: submit and poll.
    Api,
    /// Workers only.
    Worker,
    /// Both, in one process.
    All,
}

impl Role {
    pub fn serves_http(self) -> bool {
        matches!(self, Role::Api | Role::All)
    }

    pub fn runs_workers(self) -> bool {
        matches!(self, Role::Worker | Role::All)
    }
}

impl FromStr for Role {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "api" => Ok(Role::Api),
            "worker" => Ok(Role::Worker),
            "all" => Ok(Role::All),
            other => Err(ConfigError::Invalid {
                var: "ERRAND_ROLE",
                value: other.to_string(),
                reason: "expected api, worker or all".to_string(),
            }),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var}={value:?} is invalid: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub role: Role,
    pub http_addr: SocketAddr,
    pub redis_url: Option<String>,
    pub queue_name: String,
    pub workers: usize,
    pub job_ttl: Duration,
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub backoff_jitter: bool,
    pub report_delay: Duration,
    pub record_failures: bool,
    pub lease_heartbeat: Option<Duration>,
}

pub const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:5000";

impl Settings {
    /// Read from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read through `lookup`; missing or blank variables take their default.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let redis_url = get("REDIS_URL");
        let mut role = match get("ERRAND_ROLE") {
            Some(v) => v.parse()?,
            None => Role::All,
        };
        // api と worker はストアを共有しないと出会えないので、in-memory なら両方を動かす
        if redis_url.is_none() && role != Role::All {
            tracing::warn!(
                requested = ?role,
                "REDIS_URL is not set, running api and workers in one process"
            );
            role = Role::All;
        }

        let workers: usize = parse_or("ERRAND_WORKERS", get("ERRAND_WORKERS"), 2)?;
        if role.runs_workers() && workers == 0 {
            return Err(invalid("ERRAND_WORKERS", "0", "at least one worker is required"));
        }

        let job_ttl_secs: u64 = parse_or("ERRAND_JOB_TTL_SECS", get("ERRAND_JOB_TTL_SECS"), 3600)?;
        if job_ttl_secs == 0 {
            return Err(invalid("ERRAND_JOB_TTL_SECS", "0", "ttl must be positive"));
        }

        let lease_heartbeat = match get("ERRAND_LEASE_HEARTBEAT_SECS") {
            None => None,
            Some(raw) => {
                let secs: u64 = parse_or("ERRAND_LEASE_HEARTBEAT_SECS", Some(raw.clone()), 0)?;
                if secs == 0 || secs >= job_ttl_secs {
                    return Err(invalid(
                        "ERRAND_LEASE_HEARTBEAT_SECS",
                        &raw,
                        "must be positive and shorter than ERRAND_JOB_TTL_SECS",
                    ));
                }
                Some(Duration::from_secs(secs))
            }
        };

        let http_addr = get("ERRAND_HTTP_ADDR").unwrap_or_else(|| DEFAULT_HTTP_ADDR.to_string());
        let http_addr = http_addr.parse().map_err(|e: std::net::AddrParseError| {
            invalid("ERRAND_HTTP_ADDR", &http_addr, &e.to_string())
        })?;

        Ok(Self {
            role,
            http_addr,
            redis_url,
            queue_name: get("ERRAND_QUEUE").unwrap_or_else(|| DEFAULT_QUEUE.to_string()),
            workers,
            job_ttl: Duration::from_secs(job_ttl_secs),
            max_retries: parse_or("ERRAND_MAX_RETRIES", get("ERRAND_MAX_RETRIES"), 3)?,
            backoff_base: Duration::from_millis(parse_or(
                "ERRAND_BACKOFF_BASE_MS",
                get("ERRAND_BACKOFF_BASE_MS"),
                1_000,
            )?),
            backoff_max: Duration::from_millis(parse_or(
                "ERRAND_BACKOFF_MAX_MS",
                get("ERRAND_BACKOFF_MAX_MS"),
                600_000,
            )?),
            backoff_jitter: parse_bool(
                "ERRAND_BACKOFF_JITTER",
                get("ERRAND_BACKOFF_JITTER"),
                true,
            )?,
            report_delay: Duration::from_millis(parse_or(
                "ERRAND_REPORT_DELAY_MS",
                get("ERRAND_REPORT_DELAY_MS"),
                2_000,
            )?),
            record_failures: parse_bool(
                "ERRAND_RECORD_FAILURES",
                get("ERRAND_RECORD_FAILURES"),
                true,
            )?,
            lease_heartbeat,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: self.backoff_base,
            max_delay: self.backoff_max.max(self.backoff_base),
            jitter: self.backoff_jitter,
            ..RetryPolicy::default()
        }
    }

    pub fn job_options(&self) -> JobOptions {
        JobOptions {
            ttl: self.job_ttl,
            record_failures: self.record_failures,
            lease_heartbeat: self.lease_heartbeat,
        }
    }
}

fn invalid(var: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_or<T>(var: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| invalid(var, &raw, &e.to_string())),
    }
}

fn parse_bool(var: &'static str, raw: Option<String>, default: bool) -> Result<bool, ConfigError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(var, &raw, "expected true or false")),
    }
}
