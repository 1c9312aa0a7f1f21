// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Interface for making API requests to an OpenStack cloud
//!
//! This covers the small slice of Keystone (identity), Neutron (network), Nova
//! (compute) and Glance (image) that tierctl needs.  A [`Client`] is created by
//! authenticating with a cloud profile (see [`clouds`]); the token and the
//! service endpoints from the catalog are then used for every request.

pub mod clouds;
pub mod compute;
pub mod identity;
pub mod image;
pub mod network;

use reqwest::Method;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use slog::debug;
use slog::o;
use slog::Logger;
use std::time::Duration;

pub use clouds::CloudProfile;
pub use clouds::ProfileError;
pub use identity::Endpoints;

/// header carrying the Keystone token on every authenticated request
pub const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Errors returned by [`Client`]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The request could not be sent or its response could not be read.
    #[error("communication error: {0}")]
    CommunicationError(#[source] reqwest::Error),

    /// The service returned an error status.
    #[error("{method} {url}: {status}: {message}")]
    ErrorResponse {
        method: Method,
        url: String,
        status: StatusCode,
        message: String,
    },

    /// The response body did not match what the API documents.
    #[error("invalid response payload from {url}: {source}")]
    InvalidResponsePayload {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The response was well-formed but semantically unusable.
    #[error("unexpected response from {url}: {message}")]
    UnexpectedResponse { url: String, message: String },

    /// The service catalog has no endpoint for a service we need.
    #[error(
        "no \"{service_type}\" endpoint with interface \"{interface}\"{} \
         in the service catalog",
        region_suffix(.region)
    )]
    MissingEndpoint {
        service_type: String,
        interface: String,
        region: Option<String>,
    },

    /// More than one resource shares the name we looked up.
    #[error("more than one {kind} named \"{name}\"")]
    DuplicateName { kind: &'static str, name: String },

    /// The cloud profile could not be used.
    #[error(transparent)]
    Profile(#[from] ProfileError),
}

fn region_suffix(region: &Option<String>) -> String {
    match region {
        Some(r) => format!(" in region \"{}\"", r),
        None => String::new(),
    }
}

impl Error {
    /// Returns the HTTP status of an error response, if this is one
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::ErrorResponse { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Authenticated handle for one OpenStack project
pub struct Client {
    http: reqwest::Client,
    token: String,
    endpoints: Endpoints,
    log: Logger,
}

impl Client {
    /// Authenticate with the given profile and resolve the service endpoints
    /// from the returned catalog.
    pub async fn new(log: &Logger, profile: &CloudProfile) -> Result<Client, Error> {
        let log = log.new(o!("component" => "OpenStackClient"));
        let http = reqwest::ClientBuilder::new()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .danger_accept_invalid_certs(!profile.verify)
            .build()
            .map_err(Error::CommunicationError)?;
        let token = identity::issue_token(&http, &log, profile).await?;
        let endpoints = Endpoints::from_catalog(
            &token.catalog,
            profile.interface(),
            profile.region_name.as_deref(),
        )?;
        debug!(log, "resolved service endpoints";
            "compute" => &endpoints.compute,
            "network" => &endpoints.network,
            "image" => &endpoints.image,
        );
        Ok(Client { http, token: token.value, endpoints, log })
    }

    /// Construct a client from an existing token and endpoints, skipping
    /// authentication
    pub fn new_with_token(
        log: &Logger,
        token: String,
        endpoints: Endpoints,
    ) -> Result<Client, Error> {
        let http = reqwest::ClientBuilder::new()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(Error::CommunicationError)?;
        Ok(Client {
            http,
            token,
            endpoints,
            log: log.new(o!("component" => "OpenStackClient")),
        })
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    fn request(&self, method: Method, url: &str) -> reqwest::RequestBuilder {
        self.http.request(method, url).header(AUTH_TOKEN_HEADER, &self.token)
    }

    async fn execute(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, Error> {
        let request = builder.build().map_err(Error::CommunicationError)?;
        debug!(self.log, "client request";
            "method" => %request.method(),
            "uri" => %request.url(),
        );
        let method = request.method().clone();
        let url = request.url().to_string();
        let result = self.http.execute(request).await;
        debug!(self.log, "client response";
            "method" => %method,
            "uri" => &url,
            "result" => ?result.as_ref().map(|r| r.status()),
        );
        check_response(method, url, result).await
    }

    async fn get<T: DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<T, Error> {
        let response = self.execute(builder).await?;
        decode(response).await
    }

    async fn get_by_url<T: DeserializeOwned>(
        &self,
        url: &str,
    ) -> Result<T, Error> {
        self.get(self.request(Method::GET, url)).await
    }

    async fn post<B, T>(&self, url: &str, body: &B) -> Result<T, Error>
    where
        B: serde::Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response =
            self.execute(self.request(Method::POST, url).json(body)).await?;
        decode(response).await
    }

    async fn post_no_content<B>(&self, url: &str, body: &B) -> Result<(), Error>
    where
        B: serde::Serialize + ?Sized,
    {
        self.execute(self.request(Method::POST, url).json(body)).await?;
        Ok(())
    }

    async fn put<B, T>(&self, url: &str, body: &B) -> Result<T, Error>
    where
        B: serde::Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response =
            self.execute(self.request(Method::PUT, url).json(body)).await?;
        decode(response).await
    }

    async fn delete(&self, url: &str) -> Result<(), Error> {
        self.execute(self.request(Method::DELETE, url)).await?;
        Ok(())
    }
}

/// Turns a non-success status into an [`Error::ErrorResponse`], extracting
/// the message from the service's error document where there is one.
async fn check_response(
    method: Method,
    url: String,
    result: Result<reqwest::Response, reqwest::Error>,
) -> Result<reqwest::Response, Error> {
    let response = result.map_err(Error::CommunicationError)?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(Error::ErrorResponse { method, url, status, message: error_message(&body) })
}

async fn decode<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, Error> {
    let url = response.url().to_string();
    response
        .json::<T>()
        .await
        .map_err(|source| Error::InvalidResponsePayload { url, source })
}

/// Extract a human-readable message from an OpenStack error body
///
/// The services disagree on the shape: Nova wraps the message in an object
/// named for the fault (`{"itemNotFound": {"message": ...}}`), Neutron uses
/// `{"NeutronError": {"message": ...}}`, Keystone uses `{"error": {"message":
/// ...}}`, and proxies in front of any of them may return plain text.
pub fn error_message(body: &str) -> String {
    const MAX_RAW_LEN: usize = 256;

    if let Ok(serde_json::Value::Object(map)) =
        serde_json::from_str::<serde_json::Value>(body)
    {
        if let Some(message) = map.get("message").and_then(|m| m.as_str()) {
            return message.to_string();
        }
        for value in map.values() {
            if let Some(message) = value.get("message").and_then(|m| m.as_str())
            {
                return message.to_string();
            }
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        return String::from("(no message)");
    }
    match trimmed.char_indices().nth(MAX_RAW_LEN) {
        Some((index, _)) => format!("{}...", &trimmed[..index]),
        None => trimmed.to_string(),
    }
}

/// Implemented by list-item views so that name lookups can be checked for
/// exact, unique matches.
pub(crate) trait Named {
    fn name(&self) -> &str;
}

/// Reduce a list result to the single item with exactly `name`
///
/// Names are the natural key for every resource tierctl manages, so two
/// resources with the same name is an error rather than something to pick
/// from.
pub(crate) fn exactly_one<T: Named>(
    kind: &'static str,
    name: &str,
    items: Vec<T>,
) -> Result<Option<T>, Error> {
    let mut matching = items.into_iter().filter(|item| item.name() == name);
    let first = matching.next();
    if first.is_some() && matching.next().is_some() {
        return Err(Error::DuplicateName { kind, name: name.to_string() });
    }
    Ok(first)
}
