// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Facilities for testing executable commands

use std::env::temp_dir;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::process;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::time::Duration;
use subprocess::Exec;
use subprocess::ExitStatus;
use subprocess::NullFile;
use subprocess::Redirection;

/// maximum time to wait for any command
///
/// A command that gets as far as talking to a cloud that isn't there can
/// spend a while on connection timeouts, so this is generous.
const TIMEOUT: Duration = Duration::from_secs(30);

pub const EXIT_SUCCESS: u32 = libc::EXIT_SUCCESS as u32;
pub const EXIT_FAILURE: u32 = libc::EXIT_FAILURE as u32;
/// what clap exits with for bad arguments
pub const EXIT_USAGE: u32 = 2;

/// `cmd_name` without any platform executable suffix, so that it reads the
/// same in every platform's usage messages
pub fn path_to_executable(cmd_name: &str) -> PathBuf {
    let mut path = PathBuf::from(cmd_name);
    path.set_extension("");
    path
}

/// Run `exec` with empty stdin and return its exit status, stdout and stderr
///
/// Panics if the command can't be started or doesn't finish within
/// [`TIMEOUT`]; a command that overruns is killed first.
pub fn run_command(exec: Exec) -> (ExitStatus, String, String) {
    let cmdline = exec.to_cmdline_lossy();
    let mut child = exec
        .stdin(NullFile)
        .stdout(Redirection::Pipe)
        .stderr(Redirection::Pipe)
        .popen()
        .unwrap_or_else(|e| panic!("start {}: {}", cmdline, e));

    let output =
        child.communicate_start(None).limit_time(TIMEOUT).read_string();
    let (stdout_text, stderr_text) = match output {
        Ok((stdout_text, stderr_text)) => (
            stdout_text.unwrap_or_default(),
            stderr_text.unwrap_or_default(),
        ),
        Err(error) => {
            let _ = child.kill();
            panic!("read output of {}: {}", cmdline, error);
        }
    };

    // Both pipes reached EOF, so the command is exiting.
    let exit_status = child
        .wait_timeout(TIMEOUT)
        .unwrap_or_else(|e| panic!("wait for {}: {}", cmdline, e))
        .unwrap_or_else(|| {
            let _ = child.kill();
            panic!("{} closed its output but did not exit", cmdline)
        });
    (exit_status, stdout_text, stderr_text)
}

pub fn assert_exit_code(exit_status: ExitStatus, code: u32) {
    match exit_status {
        ExitStatus::Exited(exit_code) => assert_eq!(exit_code, code),
        other => panic!("expected exit with code {}, got {:?}", code, other),
    }
}

/// The OS's message for a missing file, as it appears in error chains
pub fn error_for_enoent() -> String {
    io::Error::from_raw_os_error(libc::ENOENT).to_string()
}

/// Write `contents` to a new temporary file and return its path
pub fn write_temp_file(label: &str, contents: &str) -> PathBuf {
    let path = temp_file_path(label);
    fs::write(&path, contents)
        .unwrap_or_else(|e| panic!("write {}: {}", path.display(), e));
    path
}

static FILE_COUNTER: AtomicU32 = AtomicU32::new(0);

/// A path in the temporary directory that no other call in any test process
/// will return
pub fn temp_file_path(label: &str) -> PathBuf {
    temp_dir().join(format!(
        "{}.{}.{}",
        label,
        process::id(),
        FILE_COUNTER.fetch_add(1, Ordering::SeqCst)
    ))
}
