use std::time::Duration;

use crate::models::Session;

const DEFAULT_BASE_URL: &str = "https://crmsl.com";
const DEFAULT_LEAD_LIST_PATH: &str = "/GetLeadTaskList/S4";
const DEFAULT_ALLOCATE_PATH: &str = "/allocateLeads";
const DEFAULT_LOGIN_PATH: &str = "/login";

#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: String,
    pub csrf_token: String,
    pub session_cookie: Option<String>,
    pub user_id: Option<u64>,
    pub customer_id: Option<u64>,
    pub auto_allocate: bool,
    pub check_interval_ms: u64,
    pub lead_list_path: String,
    pub allocate_path: String,
    pub login_path: String,
    pub request_timeout_secs: u64,
    pub accept_invalid_certs: bool,
    pub retry_failed_allocations: bool,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::from_lookup(|key| std::env::var(key).ok())?;

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!("CRM Base URL: {}", config.base_url);
        tracing::debug!(
            "Lead list path: {}, allocate path: {}",
            config.lead_list_path,
            config.allocate_path
        );
        tracing::debug!(
            "Session cookie configured: {}",
            config.session_cookie.is_some()
        );
        if config.auto_allocate && (config.user_id.is_none() || config.customer_id.is_none()) {
            tracing::warn!(
                "CRM_USER_ID or CRM_CUSTOMER_ID not set; allocation requests will send empty identifiers"
            );
        }
        if config.accept_invalid_certs {
            tracing::warn!("TLS certificate verification is DISABLED");
        }

        Ok(config)
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let config = Self {
            base_url: validate_base_url(
                non_empty("CRM_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            )?,
            csrf_token: lookup("CRM_CSRF_TOKEN")
                .map(|t| t.trim().to_string())
                .unwrap_or_default(),
            session_cookie: non_empty("CRM_SESSION_COOKIE").map(|c| c.trim().to_string()),
            user_id: parse_optional_id(non_empty("CRM_USER_ID"), "CRM_USER_ID")?,
            customer_id: parse_optional_id(non_empty("CRM_CUSTOMER_ID"), "CRM_CUSTOMER_ID")?,
            auto_allocate: parse_flag(non_empty("AUTO_ALLOCATE"), true, "AUTO_ALLOCATE")?,
            check_interval_ms: parse_positive(
                non_empty("CHECK_INTERVAL_MS"),
                700,
                "CHECK_INTERVAL_MS",
            )?,
            lead_list_path: non_empty("LEAD_LIST_PATH")
                .map(normalize_path)
                .unwrap_or_else(|| DEFAULT_LEAD_LIST_PATH.to_string()),
            allocate_path: non_empty("ALLOCATE_PATH")
                .map(normalize_path)
                .unwrap_or_else(|| DEFAULT_ALLOCATE_PATH.to_string()),
            login_path: non_empty("LOGIN_PATH")
                .map(normalize_path)
                .unwrap_or_else(|| DEFAULT_LOGIN_PATH.to_string()),
            request_timeout_secs: parse_positive(
                non_empty("HTTP_TIMEOUT_SECS"),
                30,
                "HTTP_TIMEOUT_SECS",
            )?,
            accept_invalid_certs: parse_flag(non_empty("ACCEPT_INVALID_CERTS"), false, "ACCEPT_INVALID_CERTS")?,
            retry_failed_allocations: parse_flag(non_empty("RETRY_FAILED_ALLOCATIONS"), false, "RETRY_FAILED_ALLOCATIONS")?,
            username: non_empty("CRM_USERNAME"),
            password: non_empty("CRM_PASSWORD"),
        };

        Ok(config)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Username and password, when both are configured.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => Some((user.as_str(), pass.as_str())),
            _ => None,
        }
    }

    /// Session context for the given cookie.
    pub fn session(&self, cookie: String) -> Session {
        Session {
            base_url: self.base_url.clone(),
            auth_token: self.csrf_token.clone(),
            cookie,
            user_id: self.user_id,
            customer_id: self.customer_id,
        }
    }
}

fn validate_base_url(raw: String) -> anyhow::Result<String> {
    let raw = raw.trim();
    let parsed = url::Url::parse(raw)
        .map_err(|e| anyhow::anyhow!("CRM_BASE_URL is not a valid URL: {}", e))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        anyhow::bail!("CRM_BASE_URL must start with http:// or https://");
    }
    Ok(raw.trim_end_matches('/').to_string())
}

fn parse_optional_id(raw: Option<String>, key: &str) -> anyhow::Result<Option<u64>> {
    raw.map(|v| {
        v.trim()
            .parse::<u64>()
            .map_err(|_| anyhow::anyhow!("{} must be a numeric identifier", key))
    })
    .transpose()
}

fn parse_positive(raw: Option<String>, default: u64, key: &str) -> anyhow::Result<u64> {
    let value = match raw {
        Some(v) => v
            .trim()
            .parse::<u64>()
            .map_err(|_| anyhow::anyhow!("{} must be a valid number", key))?,
        None => default,
    };
    if value == 0 {
        anyhow::bail!("{} must be greater than zero", key);
    }
    Ok(value)
}

fn parse_flag(raw: Option<String>, default: bool, key: &str) -> anyhow::Result<bool> {
    match raw {
        Some(v) => parse_bool(&v)
            .ok_or_else(|| anyhow::anyhow!("{} must be a boolean (true/false)", key)),
        None => Ok(default),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn normalize_path(path: String) -> String {
    let path = path.trim();
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}
