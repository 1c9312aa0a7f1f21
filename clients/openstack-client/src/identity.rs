// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Keystone v3: token issue and the service catalog

use crate::check_response;
use crate::clouds::CloudProfile;
use crate::Error;
use crate::ProfileError;
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use slog::debug;
use slog::Logger;

/// header in which Keystone returns a newly issued token
pub const SUBJECT_TOKEN_HEADER: &str = "X-Subject-Token";

/// A scoped token and the catalog that came with it
#[derive(Clone, Debug)]
pub struct Token {
    pub value: String,
    pub catalog: Vec<CatalogEntry>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CatalogEntry {
    #[serde(rename = "type")]
    pub service_type: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub endpoints: Vec<EndpointView>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct EndpointView {
    pub interface: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub region_id: Option<String>,
    pub url: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    token: TokenBody,
}

#[derive(Deserialize)]
struct TokenBody {
    #[serde(default)]
    catalog: Vec<CatalogEntry>,
}

/// Base URLs for the services tierctl talks to
///
/// `network` and `image` are unversioned; callers append `/v2.0` and `/v2`
/// respectively.  `compute` is used exactly as the catalog gives it, since
/// Nova endpoints commonly embed the project id.
#[derive(Clone, Debug, PartialEq)]
pub struct Endpoints {
    pub compute: String,
    pub network: String,
    pub image: String,
}

impl Endpoints {
    /// Select the compute, network and image endpoints with the given
    /// interface (and region, if one is configured) from the catalog.
    pub fn from_catalog(
        catalog: &[CatalogEntry],
        interface: &str,
        region: Option<&str>,
    ) -> Result<Endpoints, Error> {
        let find = |service_type: &str| -> Result<String, Error> {
            catalog
                .iter()
                .filter(|entry| entry.service_type == service_type)
                .flat_map(|entry| entry.endpoints.iter())
                .find(|endpoint| {
                    endpoint.interface == interface
                        && region.map_or(true, |r| {
                            endpoint.region.as_deref() == Some(r)
                                || endpoint.region_id.as_deref() == Some(r)
                        })
                })
                .map(|endpoint| endpoint.url.trim_end_matches('/').to_string())
                .ok_or_else(|| Error::MissingEndpoint {
                    service_type: service_type.to_string(),
                    interface: interface.to_string(),
                    region: region.map(str::to_string),
                })
        };

        Ok(Endpoints {
            compute: find("compute")?,
            network: strip_version(&find("network")?, "/v2.0"),
            image: strip_version(&find("image")?, "/v2"),
        })
    }
}

fn strip_version(url: &str, version: &str) -> String {
    url.strip_suffix(version).unwrap_or(url).trim_end_matches('/').to_string()
}

/// Returns the token-issue URL for the configured `auth_url`, which may or may
/// not already name the v3 API.
pub fn tokens_url(auth_url: &str) -> String {
    let base = auth_url.trim_end_matches('/');
    if base.ends_with("/v3") {
        format!("{}/auth/tokens", base)
    } else {
        format!("{}/v3/auth/tokens", base)
    }
}

/// Build the body of a token-issue request for `profile`
pub fn auth_request_body(
    profile: &CloudProfile,
) -> Result<serde_json::Value, ProfileError> {
    let auth = &profile.auth;

    if profile.uses_application_credential() {
        let id = auth
            .application_credential_id
            .as_deref()
            .ok_or(ProfileError::MissingField("application_credential_id"))?;
        let secret = auth
            .application_credential_secret
            .as_deref()
            .ok_or(ProfileError::MissingField(
                "application_credential_secret",
            ))?;
        // Application credentials are already scoped to a project.
        return Ok(json!({
            "auth": {
                "identity": {
                    "methods": ["application_credential"],
                    "application_credential": { "id": id, "secret": secret }
                }
            }
        }));
    }

    let password =
        auth.password.as_deref().ok_or(ProfileError::MissingField("password"))?;
    let user = match (&auth.user_id, &auth.username) {
        (Some(id), _) => json!({ "id": id, "password": password }),
        (None, Some(name)) => json!({
            "name": name,
            "domain": domain(&auth.user_domain_id, &auth.user_domain_name),
            "password": password,
        }),
        (None, None) => return Err(ProfileError::MissingField("username")),
    };
    let project = match (&auth.project_id, &auth.project_name) {
        (Some(id), _) => json!({ "id": id }),
        (None, Some(name)) => json!({
            "name": name,
            "domain": domain(&auth.project_domain_id, &auth.project_domain_name),
        }),
        (None, None) => return Err(ProfileError::MissingField("project_name")),
    };

    Ok(json!({
        "auth": {
            "identity": {
                "methods": ["password"],
                "password": { "user": user }
            },
            "scope": { "project": project }
        }
    }))
}

fn domain(id: &Option<String>, name: &Option<String>) -> serde_json::Value {
    match (id, name) {
        (Some(id), _) => json!({ "id": id }),
        (None, Some(name)) => json!({ "name": name }),
        (None, None) => json!({ "name": "Default" }),
    }
}

/// Authenticate against Keystone and return the issued token with its
/// catalog
pub async fn issue_token(
    http: &reqwest::Client,
    log: &Logger,
    profile: &CloudProfile,
) -> Result<Token, Error> {
    let url = tokens_url(&profile.auth.auth_url);
    let body = auth_request_body(profile)?;
    debug!(log, "requesting token"; "uri" => &url);

    let result = http.request(Method::POST, &url).json(&body).send().await;
    let response = check_response(Method::POST, url.clone(), result).await?;

    let value = response
        .headers()
        .get(SUBJECT_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| Error::UnexpectedResponse {
            url: url.clone(),
            message: format!("no {} header", SUBJECT_TOKEN_HEADER),
        })?;
    let body: TokenResponse = crate::decode(response).await?;
    debug!(log, "token issued"; "catalog_entries" => body.token.catalog.len());
    Ok(Token { value, catalog: body.token.catalog })
}

#[cfg(test)]
mod test {
    use super::auth_request_body;
    use super::tokens_url;
    use super::CatalogEntry;
    use super::Endpoints;
    use crate::clouds::AuthConfig;
    use crate::clouds::CloudProfile;
    use crate::Error;
    use serde_json::json;

    fn catalog() -> Vec<CatalogEntry> {
        serde_json::from_value(json!([
            {
                "type": "compute",
                "name": "nova",
                "endpoints": [
                    { "interface": "public", "region": "nz-por-1",
                      "url": "https://compute.por.example.com/v2.1/abc" },
                    { "interface": "public", "region": "nz-hlz-1",
                      "url": "https://compute.hlz.example.com/v2.1/abc" },
                    { "interface": "internal", "region": "nz-por-1",
                      "url": "http://10.0.0.1:8774/v2.1/abc" }
                ]
            },
            {
                "type": "network",
                "endpoints": [
                    { "interface": "public", "region": "nz-por-1",
                      "url": "https://network.por.example.com/v2.0/" },
                    { "interface": "public", "region": "nz-hlz-1",
                      "url": "https://network.hlz.example.com" }
                ]
            },
            {
                "type": "image",
                "endpoints": [
                    { "interface": "public", "region_id": "nz-por-1",
                      "url": "https://image.por.example.com/v2" },
                    { "interface": "public", "region_id": "nz-hlz-1",
                      "url": "https://image.hlz.example.com" }
                ]
            }
        ]))
        .unwrap()
    }

    #[test]
    fn test_endpoints_from_catalog() {
        let endpoints =
            Endpoints::from_catalog(&catalog(), "public", Some("nz-por-1"))
                .unwrap();
        assert_eq!(
            endpoints,
            Endpoints {
                compute: "https://compute.por.example.com/v2.1/abc".into(),
                network: "https://network.por.example.com".into(),
                image: "https://image.por.example.com".into(),
            }
        );

        let endpoints =
            Endpoints::from_catalog(&catalog(), "public", Some("nz-hlz-1"))
                .unwrap();
        assert_eq!(endpoints.network, "https://network.hlz.example.com");

        // Without a region, the first matching endpoint wins.
        let endpoints =
            Endpoints::from_catalog(&catalog(), "public", None).unwrap();
        assert_eq!(endpoints.compute, "https://compute.por.example.com/v2.1/abc");
    }

    #[test]
    fn test_endpoints_missing() {
        let error = Endpoints::from_catalog(&catalog(), "internal", None)
            .unwrap_err();
        assert!(matches!(error, Error::MissingEndpoint { .. }));
        assert_eq!(
            error.to_string(),
            "no \"network\" endpoint with interface \"internal\" in the \
             service catalog"
        );

        let error =
            Endpoints::from_catalog(&catalog(), "public", Some("us-east"))
                .unwrap_err();
        assert_eq!(
            error.to_string(),
            "no \"compute\" endpoint with interface \"public\" in region \
             \"us-east\" in the service catalog"
        );
    }

    #[test]
    fn test_tokens_url() {
        assert_eq!(
            tokens_url("https://keystone.example.com:5000"),
            "https://keystone.example.com:5000/v3/auth/tokens"
        );
        assert_eq!(
            tokens_url("https://keystone.example.com:5000/v3/"),
            "https://keystone.example.com:5000/v3/auth/tokens"
        );
    }

    fn profile(auth: AuthConfig) -> CloudProfile {
        CloudProfile {
            auth_type: None,
            auth,
            region_name: None,
            interface: None,
            verify: true,
        }
    }

    #[test]
    fn test_password_auth_body() {
        let body = auth_request_body(&profile(AuthConfig {
            auth_url: "https://keystone.example.com".into(),
            username: Some("alice".into()),
            password: Some("hunter2".into()),
            project_name: Some("alice-project".into()),
            user_domain_name: Some("Default".into()),
            ..Default::default()
        }))
        .unwrap();
        assert_eq!(
            body,
            json!({
                "auth": {
                    "identity": {
                        "methods": ["password"],
                        "password": {
                            "user": {
                                "name": "alice",
                                "domain": { "name": "Default" },
                                "password": "hunter2"
                            }
                        }
                    },
                    "scope": {
                        "project": {
                            "name": "alice-project",
                            "domain": { "name": "Default" }
                        }
                    }
                }
            })
        );
    }

    #[test]
    fn test_application_credential_auth_body() {
        let body = auth_request_body(&profile(AuthConfig {
            auth_url: "https://keystone.example.com".into(),
            application_credential_id: Some("abc".into()),
            application_credential_secret: Some("s3cret".into()),
            ..Default::default()
        }))
        .unwrap();
        assert_eq!(
            body["auth"]["identity"]["methods"],
            json!(["application_credential"])
        );
        assert!(body["auth"].get("scope").is_none());
    }

    #[test]
    fn test_auth_body_missing_fields() {
        let error = auth_request_body(&profile(AuthConfig {
            auth_url: "https://keystone.example.com".into(),
            username: Some("alice".into()),
            ..Default::default()
        }))
        .unwrap_err();
        assert_eq!(error.to_string(), "cloud profile is missing \"password\"");

        let error = auth_request_body(&profile(AuthConfig {
            auth_url: "https://keystone.example.com".into(),
            username: Some("alice".into()),
            password: Some("pw".into()),
            ..Default::default()
        }))
        .unwrap_err();
        assert_eq!(
            error.to_string(),
            "cloud profile is missing \"project_name\""
        );
    }
}
