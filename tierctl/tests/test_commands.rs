// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Tests for the tierctl executable
//!
//! The operations themselves are tested against the simulated cloud in the
//! library.  These check argument handling, exit codes, and one trip through
//! the real client against a fake cloud.

use httptest::matchers::*;
use httptest::responders::*;
use httptest::Expectation;
use httptest::Server;
use serde_json::json;
use std::path::PathBuf;
use subprocess::Exec;
use tierctl_test_utils::dev::test_cmds::assert_exit_code;
use tierctl_test_utils::dev::test_cmds::error_for_enoent;
use tierctl_test_utils::dev::test_cmds::path_to_executable;
use tierctl_test_utils::dev::test_cmds::run_command;
use tierctl_test_utils::dev::test_cmds::temp_file_path;
use tierctl_test_utils::dev::test_cmds::write_temp_file;
use tierctl_test_utils::dev::test_cmds::EXIT_FAILURE;
use tierctl_test_utils::dev::test_cmds::EXIT_SUCCESS;
use tierctl_test_utils::dev::test_cmds::EXIT_USAGE;

/// name of the "tierctl" executable
const CMD_TIERCTL: &str = env!("CARGO_BIN_EXE_tierctl");

fn path_to_tierctl() -> PathBuf {
    path_to_executable(CMD_TIERCTL)
}

/// A command with none of the caller's OpenStack settings leaking in
fn tierctl() -> Exec {
    Exec::cmd(path_to_tierctl()).env_clear()
}

fn clouds_yaml(auth_url: &str) -> PathBuf {
    write_temp_file(
        "clouds.yaml",
        &format!(
            "clouds:\n  \
               test:\n    \
                 auth:\n      \
                   auth_url: {}\n      \
                   username: alice\n      \
                   password: hunter2\n      \
                   project_name: alice-project\n    \
                 region_name: test-1\n",
            auth_url
        ),
    )
}

#[test]
fn test_tierctl_no_args() {
    let (exit_status, stdout_text, stderr_text) = run_command(tierctl());
    assert_exit_code(exit_status, EXIT_USAGE);
    assert_eq!(stdout_text, "");
    assert!(stderr_text.contains("<OPERATION>"), "stderr: {}", stderr_text);
}

#[test]
fn test_tierctl_help() {
    let (exit_status, stdout_text, stderr_text) =
        run_command(tierctl().arg("--help"));
    assert_exit_code(exit_status, EXIT_SUCCESS);
    assert_eq!(stderr_text, "");
    assert!(
        stdout_text.contains("Optional: overrides the built-in settings"),
        "stdout: {}",
        stdout_text
    );
    assert!(
        stdout_text.contains("Optional: overrides the built-in cloud profile"),
        "stdout: {}",
        stdout_text
    );
}

#[test]
fn test_tierctl_unknown_operation() {
    // Nothing past the operation is looked at, so there's no cloud to reach.
    let exec = tierctl().arg("bogus").arg("--config").arg("/nonexistent");
    let (exit_status, stdout_text, stderr_text) = run_command(exec);
    assert_exit_code(exit_status, EXIT_SUCCESS);
    assert_eq!(stdout_text, "bogus: no such operation\n");
    assert_eq!(stderr_text, "");
}

#[test]
fn test_tierctl_bad_config_path() {
    let config_path = temp_file_path("test_tierctl_bad_config_path");
    let exec = tierctl().arg("status").arg("--config").arg(&config_path);
    let (exit_status, stdout_text, stderr_text) = run_command(exec);
    assert_exit_code(exit_status, EXIT_FAILURE);
    assert_eq!(stdout_text, "");
    assert_eq!(
        stderr_text,
        format!(
            "tierctl: read \"{}\": {}\n",
            config_path.display(),
            error_for_enoent()
        )
    );
}

#[test]
fn test_tierctl_invalid_config() {
    let config_path = write_temp_file(
        "test_tierctl_invalid_config",
        "[topology]\ncidr = \"10.10.0.0/24\"\nip_version = 6\n",
    );
    let exec = tierctl().arg("create").arg("--config").arg(&config_path);
    let (exit_status, stdout_text, stderr_text) = run_command(exec);
    assert_exit_code(exit_status, EXIT_FAILURE);
    assert_eq!(stdout_text, "");
    assert!(
        stderr_text.starts_with(&format!(
            "tierctl: invalid config \"{}\": ",
            config_path.display()
        )),
        "stderr: {}",
        stderr_text
    );
    std::fs::remove_file(&config_path).expect("failed to remove config");
}

#[test]
fn test_tierctl_missing_cloud() {
    let clouds_path = clouds_yaml("http://127.0.0.1:1/identity");
    let exec = tierctl()
        .arg("status")
        .arg("--cloud")
        .arg("elsewhere")
        .env("OS_CLIENT_CONFIG_FILE", &clouds_path);
    let (exit_status, stdout_text, stderr_text) = run_command(exec);
    assert_exit_code(exit_status, EXIT_FAILURE);
    assert_eq!(stdout_text, "");
    assert_eq!(
        stderr_text,
        format!(
            "tierctl: connect to cloud \"elsewhere\": cloud \"elsewhere\" not \
             found in \"{}\"\n",
            clouds_path.display()
        )
    );
    std::fs::remove_file(&clouds_path).expect("failed to remove clouds.yaml");
}

fn expect_token(server: &Server) {
    let base = format!("http://{}", server.addr());
    let catalog = json!({
        "token": {
            "catalog": [
                { "type": "compute", "endpoints": [
                    { "interface": "public", "region": "test-1",
                      "url": format!("{}/compute/v2.1", base) }
                ]},
                { "type": "network", "endpoints": [
                    { "interface": "public", "region": "test-1",
                      "url": format!("{}/network", base) }
                ]},
                { "type": "image", "endpoints": [
                    { "interface": "public", "region": "test-1",
                      "url": format!("{}/image", base) }
                ]}
            ]
        }
    });
    server.expect(
        Expectation::matching(request::method_path(
            "POST",
            "/identity/v3/auth/tokens",
        ))
        .respond_with(
            status_code(201)
                .insert_header("X-Subject-Token", "gAAAAABtoken")
                .insert_header("Content-Type", "application/json")
                .body(catalog.to_string()),
        ),
    );
}

#[test]
fn test_tierctl_status() {
    let server = Server::run();
    expect_token(&server);
    server.expect(
        Expectation::matching(all_of![
            request::method_path("GET", "/compute/v2.1/servers/detail"),
            request::query(url_decoded(contains(("name", "^tawaab1-web$")))),
        ])
        .respond_with(json_encoded(json!({
            "servers": [
                { "id": "srv-1", "name": "tawaab1-web", "status": "ACTIVE",
                  "addresses": {} }
            ]
        }))),
    );
    server.expect(
        Expectation::matching(request::method_path(
            "GET",
            "/compute/v2.1/servers/srv-1",
        ))
        .respond_with(json_encoded(json!({
            "server": { "id": "srv-1", "name": "tawaab1-web",
                        "status": "ACTIVE", "addresses": {} }
        }))),
    );
    for name in ["^tawaab1-app$", "^tawaab1-db$"] {
        server.expect(
            Expectation::matching(all_of![
                request::method_path("GET", "/compute/v2.1/servers/detail"),
                request::query(url_decoded(contains(("name", name)))),
            ])
            .respond_with(json_encoded(json!({ "servers": [] }))),
        );
    }

    let clouds_path =
        clouds_yaml(&format!("http://{}/identity", server.addr()));
    let exec = tierctl()
        .arg("status")
        .env("OS_CLIENT_CONFIG_FILE", &clouds_path)
        .env("OS_CLOUD", "test");
    let (exit_status, stdout_text, stderr_text) = run_command(exec);
    assert_exit_code(exit_status, EXIT_SUCCESS);
    assert_eq!(
        stdout_text,
        "tawaab1-web status is ACTIVE\n\
         tawaab1-app was not found\n\
         tawaab1-db was not found\n"
    );
    assert_eq!(stderr_text, "");
    std::fs::remove_file(&clouds_path).expect("failed to remove clouds.yaml");
}

#[test]
fn test_tierctl_rejected_credentials() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path(
            "POST",
            "/identity/v3/auth/tokens",
        ))
        .respond_with(
            status_code(401)
                .insert_header("Content-Type", "application/json")
                .body(
                    json!({ "error": {
                        "code": 401,
                        "title": "Unauthorized",
                        "message": "The request you have made requires \
                                    authentication."
                    }})
                    .to_string(),
                ),
        ),
    );

    let clouds_path =
        clouds_yaml(&format!("http://{}/identity", server.addr()));
    let exec = tierctl()
        .arg("run")
        .arg("--cloud")
        .arg("test")
        .env("OS_CLIENT_CONFIG_FILE", &clouds_path);
    let (exit_status, stdout_text, stderr_text) = run_command(exec);
    assert_exit_code(exit_status, EXIT_FAILURE);
    assert_eq!(stdout_text, "");
    assert!(
        stderr_text.starts_with("tierctl: connect to cloud \"test\": "),
        "stderr: {}",
        stderr_text
    );
    assert!(stderr_text.contains("401"), "stderr: {}", stderr_text);
    std::fs::remove_file(&clouds_path).expect("failed to remove clouds.yaml");
}
