use chrono::Utc;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::redirect::Policy;

use crate::config::Config;
use crate::errors::AppError;
use crate::models::{AllocationReceipt, AllocationRequest, AllocationResponse, Lead, Session};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";
const ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

/// Client for the CRM's lead list and allocation endpoints.
///
/// Every request carries the session cookie and the browser-like headers the
/// CRM expects from its own web UI.
#[derive(Clone)]
pub struct CrmClient {
    client: reqwest::Client,
    session: Session,
    lead_list_path: String,
    allocate_path: String,
}

impl CrmClient {
    /// Creates a new `CrmClient` bound to `session`.
    ///
    /// # Arguments
    ///
    /// * `config` - Endpoint paths, timeout and TLS settings.
    /// * `session` - The authenticated session used for every request.
    pub fn new(config: &Config, session: Session) -> Result<Self, AppError> {
        let client = build_http_client(config, Some(&session.cookie), Policy::default())?;

        Ok(Self {
            client,
            session,
            lead_list_path: config.lead_list_path.clone(),
            allocate_path: config.allocate_path.clone(),
        })
    }

    /// Fetches the raw lead list page.
    ///
    /// # Returns
    ///
    /// * `Result<String, AppError>` - The page markup.
    pub async fn fetch_lead_list(&self) -> Result<String, AppError> {
        let url = self.session.url(&self.lead_list_path);
        tracing::debug!("Fetching lead list: {}", url);

        let response =
            self.client.get(&url).send().await.map_err(|e| {
                AppError::Http(format!("Lead list request failed: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::UnexpectedStatus {
                status: status.as_u16(),
                body: error_text,
            });
        }

        response
            .text()
            .await
            .map_err(|e| AppError::Http(format!("Failed to read lead list body: {}", e)))
    }

    /// Claims a batch of leads in a single request.
    ///
    /// The batch succeeds or fails as a whole.
    ///
    /// # Arguments
    ///
    /// * `leads` - The leads to claim, in the order their tokens are sent.
    ///
    /// # Returns
    ///
    /// * `Result<AllocationReceipt, AppError>` - The claimed lead ids, or why the batch failed.
    pub async fn allocate(&self, leads: &[Lead]) -> Result<AllocationReceipt, AppError> {
        if leads.is_empty() {
            return Ok(AllocationReceipt {
                lead_ids: Vec::new(),
                allocated_at: Utc::now(),
            });
        }

        let url = self.session.url(&self.allocate_path);
        let request = AllocationRequest::new(leads, &self.session);
        tracing::info!("Attempting to allocate {} lead(s)...", request.check_list.len());

        let response = self
            .client
            .post(&url)
            .form(&request.form_fields())
            .send()
            .await
            .map_err(|e| AppError::Http(format!("Allocation request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::Http(format!("Failed to read allocation response: {}", e)))?;

        if !status.is_success() {
            return Err(AppError::UnexpectedStatus {
                status: status.as_u16(),
                body,
            });
        }

        if body.trim().is_empty() {
            return Err(AppError::AllocationRejected("empty response".to_string()));
        }

        match serde_json::from_str::<AllocationResponse>(&body) {
            Ok(parsed) => {
                if let Some(message) = parsed.error_message() {
                    return Err(AppError::AllocationRejected(message));
                }
            }
            Err(e) => {
                tracing::warn!(
                    "Allocation response is not JSON ({}); treating as success",
                    e
                );
            }
        }

        Ok(AllocationReceipt {
            lead_ids: leads.iter().map(|lead| lead.id.clone()).collect(),
            allocated_at: Utc::now(),
        })
    }
}

/// Logs in with username and password and returns the resulting session cookie.
///
/// Each `Set-Cookie` header is reduced to its `name=value` pair and the pairs
/// are joined into a single `Cookie` header value.
pub async fn login(config: &Config, username: &str, password: &str) -> Result<String, AppError> {
    tracing::info!("Attempting to login...");

    // The session cookie is set on the login response itself, so redirects are not followed
    let client = build_http_client(config, None, Policy::none())?;
    let url = format!("{}{}", config.base_url, config.login_path);

    let response = client
        .post(&url)
        .form(&[
            ("username", username),
            ("password", password),
            ("csrf_token", config.csrf_token.as_str()),
        ])
        .send()
        .await
        .map_err(|e| AppError::Login(format!("Login request failed: {}", e)))?;

    let status = response.status();
    if !status.is_success() && !status.is_redirection() {
        return Err(AppError::UnexpectedStatus {
            status: status.as_u16(),
            body: response.text().await.unwrap_or_default(),
        });
    }

    let cookie = cookie_from_set_cookie(response.headers())
        .ok_or_else(|| AppError::Login("no session cookie received".to_string()))?;

    tracing::info!("✓ Login successful!");
    Ok(cookie)
}

/// Joins the `name=value` part of every `Set-Cookie` header.
pub fn cookie_from_set_cookie(headers: &HeaderMap) -> Option<String> {
    let pairs: Vec<&str> = headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| value.split(';').next())
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .collect();

    if pairs.is_empty() {
        None
    } else {
        Some(pairs.join("; "))
    }
}

fn build_http_client(
    config: &Config,
    cookie: Option<&str>,
    redirect: Policy,
) -> Result<reqwest::Client, AppError> {
    let mut headers = HeaderMap::new();
    headers.insert(header::USER_AGENT, HeaderValue::from_static(USER_AGENT));
    headers.insert(header::ACCEPT, HeaderValue::from_static(ACCEPT));
    headers.insert(
        header::ACCEPT_LANGUAGE,
        HeaderValue::from_static(ACCEPT_LANGUAGE),
    );
    if let Some(cookie) = cookie {
        let mut value = HeaderValue::from_str(cookie).map_err(|e| {
            AppError::Config(format!("Session cookie is not a valid header value: {}", e))
        })?;
        value.set_sensitive(true);
        headers.insert(header::COOKIE, value);
    }

    reqwest::Client::builder()
        .timeout(config.request_timeout())
        .default_headers(headers)
        .redirect(redirect)
        .danger_accept_invalid_certs(config.accept_invalid_certs)
        .build()
        .map_err(|e| AppError::Config(format!("Failed to create CRM client: {}", e)))
}
