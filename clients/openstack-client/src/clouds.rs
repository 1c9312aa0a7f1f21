// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Resolution of named cloud profiles
//!
//! Profiles are read from the first `clouds.yaml` that exists among:
//!
//! 1. `$OS_CLIENT_CONFIG_FILE`
//! 2. `./clouds.yaml`
//! 3. `$XDG_CONFIG_HOME/openstack/clouds.yaml` (`~/.config/openstack/...` when
//!    `XDG_CONFIG_HOME` is unset)
//! 4. `/etc/openstack/clouds.yaml`
//!
//! When none of those exist, a profile is assembled from the `OS_*`
//! environment variables instead, provided `OS_AUTH_URL` is set.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;

const DEFAULT_INTERFACE: &str = "public";

#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("read \"{}\": {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse \"{}\": {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("cloud \"{name}\" not found in \"{}\"", .path.display())]
    NotFound { name: String, path: PathBuf },

    #[error(
        "cloud \"{name}\" not found: no clouds.yaml (searched {searched}) and \
         OS_AUTH_URL is not set"
    )]
    NoConfig { name: String, searched: String },

    #[error("cloud profile is missing \"{0}\"")]
    MissingField(&'static str),
}

/// Where a resolved profile came from
#[derive(Clone, Debug, PartialEq)]
pub enum ProfileSource {
    File(PathBuf),
    Environment,
}

/// Authentication parameters for a cloud, as in the `auth` section of a
/// `clouds.yaml` entry
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct AuthConfig {
    pub auth_url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub project_name: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub user_domain_name: Option<String>,
    #[serde(default)]
    pub user_domain_id: Option<String>,
    #[serde(default)]
    pub project_domain_name: Option<String>,
    #[serde(default)]
    pub project_domain_id: Option<String>,
    #[serde(default)]
    pub application_credential_id: Option<String>,
    #[serde(default)]
    pub application_credential_secret: Option<String>,
}

/// One named cloud
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct CloudProfile {
    #[serde(default)]
    pub auth_type: Option<String>,
    pub auth: AuthConfig,
    #[serde(default)]
    pub region_name: Option<String>,
    #[serde(default)]
    pub interface: Option<String>,
    /// whether to verify the TLS certificates of the cloud's endpoints
    #[serde(default = "default_verify")]
    pub verify: bool,
}

fn default_verify() -> bool {
    true
}

impl CloudProfile {
    /// Which catalog interface (public, internal, admin) to use
    pub fn interface(&self) -> &str {
        self.interface.as_deref().unwrap_or(DEFAULT_INTERFACE)
    }

    /// Returns whether this profile authenticates with an application
    /// credential rather than a password
    pub fn uses_application_credential(&self) -> bool {
        self.auth_type.as_deref() == Some("v3applicationcredential")
            || self.auth.application_credential_id.is_some()
    }
}

#[derive(Debug, Deserialize)]
struct CloudsFile {
    #[serde(default)]
    clouds: BTreeMap<String, CloudProfile>,
}

/// A profile, together with where it was found
#[derive(Clone, Debug)]
pub struct ResolvedProfile {
    pub name: String,
    pub source: ProfileSource,
    pub profile: CloudProfile,
}

/// Resolve the cloud profile `name` using the process environment and
/// working directory.
pub fn resolve(name: &str) -> Result<ResolvedProfile, ProfileError> {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    resolve_with(name, &cwd, |var| std::env::var(var).ok())
}

/// Resolve the cloud profile `name`, reading environment variables through
/// `env` and treating `cwd` as the working directory.
pub fn resolve_with<F>(
    name: &str,
    cwd: &Path,
    env: F,
) -> Result<ResolvedProfile, ProfileError>
where
    F: Fn(&str) -> Option<String>,
{
    let candidates = candidate_paths(cwd, &env);
    if let Some(path) = candidates.iter().find(|p| p.is_file()) {
        let profile = load_from_file(path, name)?;
        return Ok(ResolvedProfile {
            name: name.to_string(),
            source: ProfileSource::File(path.clone()),
            profile,
        });
    }

    match profile_from_env(&env) {
        Some(profile) => Ok(ResolvedProfile {
            name: name.to_string(),
            source: ProfileSource::Environment,
            profile,
        }),
        None => Err(ProfileError::NoConfig {
            name: name.to_string(),
            searched: candidates
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
        }),
    }
}

fn candidate_paths<F>(cwd: &Path, env: &F) -> Vec<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    let mut paths = Vec::new();
    if let Some(file) = env("OS_CLIENT_CONFIG_FILE") {
        paths.push(PathBuf::from(file));
    }
    paths.push(cwd.join("clouds.yaml"));
    let config_home = env("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| env("HOME").map(|home| Path::new(&home).join(".config")));
    if let Some(config_home) = config_home {
        paths.push(config_home.join("openstack").join("clouds.yaml"));
    }
    paths.push(PathBuf::from("/etc/openstack/clouds.yaml"));
    paths
}

/// Load the profile `name` from the `clouds.yaml` at `path`
pub fn load_from_file(
    path: &Path,
    name: &str,
) -> Result<CloudProfile, ProfileError> {
    let contents = std::fs::read_to_string(path).map_err(|source| {
        ProfileError::Read { path: path.to_path_buf(), source }
    })?;
    let mut file: CloudsFile =
        serde_yaml::from_str(&contents).map_err(|source| {
            ProfileError::Parse { path: path.to_path_buf(), source }
        })?;
    file.clouds.remove(name).ok_or_else(|| ProfileError::NotFound {
        name: name.to_string(),
        path: path.to_path_buf(),
    })
}

fn profile_from_env<F>(env: &F) -> Option<CloudProfile>
where
    F: Fn(&str) -> Option<String>,
{
    let auth_url = env("OS_AUTH_URL")?;
    let auth = AuthConfig {
        auth_url,
        username: env("OS_USERNAME"),
        user_id: env("OS_USER_ID"),
        password: env("OS_PASSWORD"),
        project_name: env("OS_PROJECT_NAME").or_else(|| env("OS_TENANT_NAME")),
        project_id: env("OS_PROJECT_ID").or_else(|| env("OS_TENANT_ID")),
        user_domain_name: env("OS_USER_DOMAIN_NAME"),
        user_domain_id: env("OS_USER_DOMAIN_ID"),
        project_domain_name: env("OS_PROJECT_DOMAIN_NAME"),
        project_domain_id: env("OS_PROJECT_DOMAIN_ID"),
        application_credential_id: env("OS_APPLICATION_CREDENTIAL_ID"),
        application_credential_secret: env(
            "OS_APPLICATION_CREDENTIAL_SECRET",
        ),
    };
    Some(CloudProfile {
        auth_type: env("OS_AUTH_TYPE"),
        auth,
        region_name: env("OS_REGION_NAME"),
        interface: env("OS_INTERFACE"),
        verify: env("OS_INSECURE").map_or(true, |v| {
            !matches!(v.to_lowercase().as_str(), "1" | "true" | "yes")
        }),
    })
}

#[cfg(test)]
mod test {
    use super::resolve_with;
    use super::ProfileError;
    use super::ProfileSource;
    use std::collections::BTreeMap;

    const CLOUDS_YAML: &str = r##"
clouds:
  openstack:
    auth:
      auth_url: https://api.cloud.example.com:5000/v3
      username: alice
      password: hunter2
      project_name: alice-project
      user_domain_name: Default
      project_domain_name: Default
    region_name: nz-por-1
    interface: public
  other:
    auth_type: v3applicationcredential
    auth:
      auth_url: https://keystone.example.org
      application_credential_id: abc123
      application_credential_secret: s3cret
    verify: false
"##;

    fn env_from(
        vars: &[(&str, &str)],
    ) -> impl Fn(&str) -> Option<String> {
        let map: BTreeMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn test_profile_from_client_config_file() {
        let dir = camino_tempfile::tempdir().unwrap();
        let path = dir.path().join("my-clouds.yaml");
        std::fs::write(&path, CLOUDS_YAML).unwrap();

        let env = env_from(&[("OS_CLIENT_CONFIG_FILE", path.as_str())]);
        let resolved =
            resolve_with("openstack", dir.path().as_std_path(), &env).unwrap();
        assert_eq!(
            resolved.source,
            ProfileSource::File(path.clone().into_std_path_buf())
        );
        let profile = resolved.profile;
        assert_eq!(profile.auth.username.as_deref(), Some("alice"));
        assert_eq!(profile.auth.project_name.as_deref(), Some("alice-project"));
        assert_eq!(profile.region_name.as_deref(), Some("nz-por-1"));
        assert_eq!(profile.interface(), "public");
        assert!(profile.verify);
        assert!(!profile.uses_application_credential());

        let other = resolve_with("other", dir.path().as_std_path(), &env)
            .unwrap()
            .profile;
        assert!(other.uses_application_credential());
        assert!(!other.verify);
    }

    #[test]
    fn test_profile_missing_from_file() {
        let dir = camino_tempfile::tempdir().unwrap();
        let path = dir.path().join("clouds.yaml");
        std::fs::write(&path, CLOUDS_YAML).unwrap();

        // The working directory's clouds.yaml is found without any variables.
        let env = env_from(&[]);
        let error =
            resolve_with("nonexistent", dir.path().as_std_path(), &env)
                .unwrap_err();
        assert!(matches!(error, ProfileError::NotFound { .. }));
        assert_eq!(
            error.to_string(),
            format!("cloud \"nonexistent\" not found in \"{}\"", path)
        );
    }

    #[test]
    fn test_profile_bad_yaml() {
        let dir = camino_tempfile::tempdir().unwrap();
        let path = dir.path().join("clouds.yaml");
        std::fs::write(&path, "clouds: [").unwrap();
        let error =
            resolve_with("openstack", dir.path().as_std_path(), &env_from(&[]))
                .unwrap_err();
        assert!(error.to_string().starts_with(&format!("parse \"{}\"", path)));
    }

    #[test]
    fn test_profile_from_environment() {
        let dir = camino_tempfile::tempdir().unwrap();
        let env = env_from(&[
            ("HOME", dir.path().as_str()),
            ("OS_CLIENT_CONFIG_FILE", "/nonexistent/clouds.yaml"),
            ("OS_AUTH_URL", "https://keystone.example.org:5000"),
            ("OS_USERNAME", "bob"),
            ("OS_PASSWORD", "pw"),
            ("OS_TENANT_NAME", "bob-project"),
            ("OS_INTERFACE", "internal"),
            ("OS_INSECURE", "true"),
        ]);
        // This only holds if the machine running the test has no system-wide
        // clouds.yaml.
        if std::path::Path::new("/etc/openstack/clouds.yaml").exists() {
            return;
        }
        let resolved =
            resolve_with("openstack", dir.path().as_std_path(), &env).unwrap();
        assert_eq!(resolved.source, ProfileSource::Environment);
        let profile = resolved.profile;
        assert_eq!(profile.auth.auth_url, "https://keystone.example.org:5000");
        assert_eq!(profile.auth.project_name.as_deref(), Some("bob-project"));
        assert_eq!(profile.interface(), "internal");
        assert!(!profile.verify);
    }

    #[test]
    fn test_profile_nowhere() {
        if std::path::Path::new("/etc/openstack/clouds.yaml").exists() {
            return;
        }
        let dir = camino_tempfile::tempdir().unwrap();
        let env = env_from(&[("XDG_CONFIG_HOME", dir.path().as_str())]);
        let error = resolve_with("openstack", dir.path().as_std_path(), &env)
            .unwrap_err();
        assert!(matches!(error, ProfileError::NoConfig { .. }));
        let message = error.to_string();
        assert!(message.starts_with("cloud \"openstack\" not found: no clouds.yaml"));
        assert!(message.contains("/etc/openstack/clouds.yaml"));
    }
}
