//! Asynchronous client for the ProFast REST backend.
//!
//! - Attaches a fresh bearer token from the identity provider to every request.
//! - Maps 401/403/404 onto dedicated error variants the session reacts to.
//! - Caches role lookups for a few minutes.
//! - Requests issued through a scoped client are dropped when the scope ends.

use std::{future::Future, sync::Arc, time::Duration};

use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::domain::{
    AssignedRider, Parcel, ParcelStatus, PaymentConfirmation, PaymentRecord, RecordId, Rider,
    RiderStatus, Role, RoleInfo, RoleResolution, User,
};
use crate::infra::cache::RoleCache;
use crate::infra::identity::TokenSource;
use crate::infra::scope::RequestScope;
use crate::util::{persistence::Config, version};

const GENERIC_FAILURE: &str = "Something went wrong. Please try again.";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("base URL cannot take path segments")]
    BaseUrl,
    #[error("http request error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("session expired, please sign in again")]
    Unauthorized,
    #[error("You have no permission to access this resource")]
    Forbidden,
    #[error("{0} not found")]
    NotFound(String),
    #[error("backend returned status {code}")]
    Status { code: u16, message: Option<String> },
    #[error("request cancelled")]
    Cancelled,
    #[error("api error: {0}")]
    Api(String),
}

impl ApiError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized => Some(401),
            ApiError::Forbidden => Some(403),
            ApiError::NotFound(_) => Some(404),
            ApiError::Status { code, .. } => Some(*code),
            ApiError::Http(err) => err.status().map(|status| status.as_u16()),
            ApiError::InvalidUrl(_) | ApiError::BaseUrl | ApiError::Cancelled | ApiError::Api(_) => {
                None
            }
        }
    }

    /// Backend message verbatim when there is one, a generic line otherwise.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Status {
                message: Some(message),
                ..
            } if !message.trim().is_empty() => message.clone(),
            ApiError::Api(message) => message.clone(),
            ApiError::Unauthorized | ApiError::Forbidden | ApiError::NotFound(_) => self.to_string(),
            _ => GENERIC_FAILURE.to_string(),
        }
    }
}

/// Write acknowledgement; the backend answers with some subset of these.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ack {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub inserted_id: Option<String>,
    #[serde(default)]
    pub modified_count: Option<u64>,
    #[serde(default)]
    pub deleted_count: Option<u64>,
}

impl Ack {
    fn accepted(self, action: &str) -> Result<Self, ApiError> {
        let rejected = self.success == Some(false)
            || (self.success.is_none()
                && (self.modified_count == Some(0) || self.deleted_count == Some(0)));
        if rejected {
            return Err(ApiError::Api(
                self.message
                    .unwrap_or_else(|| format!("Failed to {action}")),
            ));
        }
        Ok(self)
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TrackEnvelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<Parcel>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaymentIntentDto {
    client_secret: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PaymentIntentRequest<'a> {
    amount: u64,
    parcel_id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PaymentUpdate<'a> {
    payment_intent_id: &'a str,
    status: ParcelStatus,
    payment_amount: f64,
    user_email: &'a str,
    #[serde(with = "time::serde::rfc3339")]
    payment_date: time::OffsetDateTime,
}

#[derive(Serialize)]
struct AssignmentUpdate<'a> {
    #[serde(flatten)]
    rider: &'a AssignedRider,
    status: ParcelStatus,
}

#[derive(Serialize)]
struct RiderStatusUpdate {
    status: RiderStatus,
}

#[derive(Serialize)]
struct RoleUpdate {
    role: Role,
}

#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: Url,
    tokens: Arc<dyn TokenSource>,
    roles: Arc<Mutex<RoleCache>>,
    role_ttl: Duration,
    cancel: CancellationToken,
}

impl ApiClient {
    pub fn new(tokens: Arc<dyn TokenSource>) -> Result<Self, ApiError> {
        Self::from_config(&Config::default(), tokens)
    }

    pub fn from_config(config: &Config, tokens: Arc<dyn TokenSource>) -> Result<Self, ApiError> {
        let base_url = Url::parse(&config.api_base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::BaseUrl);
        }
        let http = Client::builder()
            .user_agent(version::user_agent())
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            http,
            base_url,
            tokens,
            roles: Arc::new(Mutex::new(RoleCache::default())),
            role_ttl: config.role_cache_ttl(),
            cancel: CancellationToken::new(),
        })
    }

    pub fn with_role_ttl(mut self, ttl: Duration) -> Self {
        self.role_ttl = ttl;
        self
    }

    /// A client whose requests end when `scope` is aborted or dropped.
    /// The role cache stays shared with the parent client.
    pub fn scoped(&self, scope: &RequestScope) -> Self {
        let mut client = self.clone();
        client.cancel = scope.token();
        client
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ---- users & roles -------------------------------------------------

    /// Role for `email`. An account the backend does not know yet is a plain user.
    pub async fn get_user_role(&self, email: &str) -> Result<RoleInfo, ApiError> {
        if let Some(info) = self.roles.lock().await.fresh(email, self.role_ttl) {
            return Ok(info);
        }

        let url = self.endpoint(&["users", "role", email])?;
        let mut info = match self.fetch_data::<RoleInfo>(self.http.get(url)).await {
            Ok(info) => info,
            Err(ApiError::NotFound(_)) => {
                tracing::info!(email, "no account record yet; defaulting to user role");
                RoleInfo::unprovisioned(email)
            }
            Err(err) => return Err(err),
        };
        if info.email.is_empty() {
            info.email = email.to_string();
        }

        self.roles.lock().await.insert(info.clone());
        Ok(info)
    }

    /// Role lookup that never fails open: any error settles on the lowest privilege.
    pub async fn resolve_role(&self, email: &str) -> RoleResolution {
        match self.get_user_role(email).await {
            Ok(info) => RoleResolution::Resolved(info.role),
            Err(err) => {
                tracing::warn!(email, error = %err, "role lookup failed");
                RoleResolution::Failed
            }
        }
    }

    pub async fn invalidate_role(&self, email: &str) {
        self.roles.lock().await.invalidate(email);
    }

    pub async fn clear_cache(&self) {
        self.roles.lock().await.clear();
    }

    /// Upsert the account record after sign-in or sign-up.
    pub async fn save_user(&self, user: &User) -> Result<Ack, ApiError> {
        let url = self.endpoint(&["users"])?;
        self.fetch_data::<Ack>(self.http.post(url).json(user))
            .await?
            .accepted("save user")
    }

    pub async fn list_users(&self) -> Result<Vec<User>, ApiError> {
        let url = self.endpoint(&["users"])?;
        self.fetch_data(self.http.get(url)).await
    }

    pub async fn update_user_role(&self, user_id: &str, role: Role) -> Result<Ack, ApiError> {
        let url = self.endpoint(&["users", user_id, "role"])?;
        let ack = self
            .fetch_data::<Ack>(self.http.patch(url).json(&RoleUpdate { role }))
            .await?
            .accepted("update user role")?;
        // Role changes must be visible on the next lookup.
        self.clear_cache().await;
        Ok(ack)
    }

    // ---- parcels -------------------------------------------------------

    /// Returns the id the backend assigned.
    pub async fn create_parcel(&self, parcel: &Parcel) -> Result<RecordId, ApiError> {
        let url = self.endpoint(&["parcels"])?;
        let ack = self
            .fetch_data::<Ack>(self.http.post(url).json(parcel))
            .await?
            .accepted("book parcel")?;
        ack.inserted_id
            .ok_or_else(|| ApiError::Api("response missing insertedId".into()))
    }

    pub async fn list_parcels(&self, email: Option<&str>) -> Result<Vec<Parcel>, ApiError> {
        let mut url = self.endpoint(&["parcels"])?;
        if let Some(email) = email {
            url.query_pairs_mut().append_pair("email", email);
        }
        self.fetch_data(self.http.get(url)).await
    }

    pub async fn get_parcel(&self, id: &str) -> Result<Parcel, ApiError> {
        let url = self.endpoint(&["parcels", id])?;
        self.fetch_data(self.http.get(url)).await
    }

    /// Look a parcel up by tracking code, falling back to treating the input
    /// as a parcel id.
    pub async fn track_parcel(&self, code: &str) -> Result<Parcel, ApiError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(ApiError::Api("Please enter a tracking number".into()));
        }

        let url = self.endpoint(&["parcels", "track", code])?;
        match self.fetch_data::<TrackEnvelope>(self.http.get(url)).await {
            Ok(TrackEnvelope {
                success: true,
                data: Some(parcel),
            }) => return Ok(parcel),
            Ok(_) => tracing::debug!(code, "tracking endpoint had no parcel; trying id lookup"),
            Err(err @ (ApiError::Unauthorized | ApiError::Forbidden | ApiError::Cancelled)) => {
                return Err(err)
            }
            Err(err) => {
                tracing::debug!(code, error = %err, "tracking endpoint failed; trying id lookup")
            }
        }

        match self.get_parcel(code).await {
            Ok(parcel) => Ok(parcel),
            Err(ApiError::NotFound(_)) | Err(ApiError::Status { .. }) => {
                Err(ApiError::NotFound(format!("parcel {code}")))
            }
            Err(err) => Err(err),
        }
    }

    pub async fn delete_parcel(&self, id: &str) -> Result<Ack, ApiError> {
        let url = self.endpoint(&["parcels", id])?;
        self.fetch_data::<Ack>(self.http.delete(url))
            .await?
            .accepted("delete parcel")
    }

    /// Record a confirmed charge against the parcel (`pending -> paid`).
    pub async fn mark_parcel_paid(
        &self,
        parcel_id: &str,
        payer_email: &str,
        confirmation: &PaymentConfirmation,
    ) -> Result<Ack, ApiError> {
        let url = self.endpoint(&["parcels", parcel_id, "payment"])?;
        let body = PaymentUpdate {
            payment_intent_id: &confirmation.payment_intent_id,
            status: ParcelStatus::Paid,
            payment_amount: confirmation.amount,
            user_email: payer_email,
            payment_date: confirmation.paid_at,
        };
        self.fetch_data::<Ack>(self.http.patch(url).json(&body))
            .await?
            .accepted("update parcel status")
    }

    pub async fn assign_rider(
        &self,
        parcel_id: &str,
        assignment: &AssignedRider,
    ) -> Result<Ack, ApiError> {
        let url = self.endpoint(&["parcels", parcel_id, "assign-rider"])?;
        let body = AssignmentUpdate {
            rider: assignment,
            status: ParcelStatus::Assigned,
        };
        self.fetch_data::<Ack>(self.http.patch(url).json(&body))
            .await?
            .accepted("assign rider")
    }

    // ---- riders --------------------------------------------------------

    pub async fn submit_rider_application(&self, rider: &Rider) -> Result<RecordId, ApiError> {
        let url = self.endpoint(&["riders"])?;
        let ack = self
            .fetch_data::<Ack>(self.http.post(url).json(rider))
            .await?
            .accepted("submit rider application")?;
        ack.inserted_id
            .ok_or_else(|| ApiError::Api("response missing insertedId".into()))
    }

    pub async fn list_riders(&self, status: Option<RiderStatus>) -> Result<Vec<Rider>, ApiError> {
        let mut url = self.endpoint(&["riders"])?;
        if let Some(status) = status {
            url.query_pairs_mut().append_pair("status", status.as_str());
        }
        self.fetch_data(self.http.get(url)).await
    }

    pub async fn update_rider_status(
        &self,
        rider_id: &str,
        status: RiderStatus,
    ) -> Result<Ack, ApiError> {
        let url = self.endpoint(&["riders", rider_id, "status"])?;
        self.fetch_data::<Ack>(self.http.patch(url).json(&RiderStatusUpdate { status }))
            .await?
            .accepted("update rider status")
    }

    pub async fn delete_rider(&self, rider_id: &str) -> Result<Ack, ApiError> {
        let url = self.endpoint(&["riders", rider_id])?;
        self.fetch_data::<Ack>(self.http.delete(url))
            .await?
            .accepted("reject rider")
    }

    // ---- payments ------------------------------------------------------

    pub async fn list_payments(&self, email: Option<&str>) -> Result<Vec<PaymentRecord>, ApiError> {
        let mut url = self.endpoint(&["payments"])?;
        if let Some(email) = email {
            url.query_pairs_mut().append_pair("email", email);
        }
        self.fetch_data(self.http.get(url)).await
    }

    /// Returns the client secret the payment processor confirms against.
    pub async fn create_payment_intent(
        &self,
        amount_cents: u64,
        parcel_id: &str,
    ) -> Result<String, ApiError> {
        let url = self.endpoint(&["create-payment-intent"])?;
        let body = PaymentIntentRequest {
            amount: amount_cents,
            parcel_id,
        };
        let dto: PaymentIntentDto = self.fetch_data(self.http.post(url).json(&body)).await?;
        Ok(dto.client_secret)
    }

    // ---- plumbing ------------------------------------------------------

    async fn fetch_data<T>(&self, builder: RequestBuilder) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
    {
        self.cancellable(async {
            let builder = self.authorize(builder).await;
            let response = check_status(builder.send().await?).await?;
            Ok::<T, ApiError>(response.json::<T>().await?)
        })
        .await
    }

    async fn cancellable<T, F>(&self, request: F) -> Result<T, ApiError>
    where
        F: Future<Output = Result<T, ApiError>>,
    {
        if self.cancel.is_cancelled() {
            return Err(ApiError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                tracing::debug!("request dropped: scope ended");
                Err(ApiError::Cancelled)
            }
            result = request => result,
        }
    }

    async fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.tokens.id_token().await {
            Ok(Some(token)) => builder.bearer_auth(token),
            Ok(None) => builder,
            Err(err) => {
                tracing::warn!(error = %err, "could not obtain id token; sending request without it");
                builder
            }
        }
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| ApiError::BaseUrl)?;
            path.pop_if_empty().extend(segments);
        }
        Ok(url)
    }
}

async fn check_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let path = response.url().path().to_string();
    let message = response
        .json::<ErrorBody>()
        .await
        .ok()
        .and_then(|body| body.message.or(body.error));
    tracing::debug!(%status, path = %path, ?message, "backend rejected request");

    Err(match status {
        StatusCode::UNAUTHORIZED => ApiError::Unauthorized,
        StatusCode::FORBIDDEN => ApiError::Forbidden,
        StatusCode::NOT_FOUND => ApiError::NotFound(path),
        other => ApiError::Status {
            code: other.as_u16(),
            message,
        },
    })
}
