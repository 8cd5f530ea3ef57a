//! Test doubles shared by unit tests.

use std::path::Path;

use netvol_common::{NetvolError, NetvolResult};
use parking_lot::Mutex;

use crate::exec::{CommandLine, CommandRunner};

/// Records every command and answers from canned state.
#[derive(Default)]
pub struct RecordingRunner {
    /// Raw argv of each command, program first.
    pub calls: Mutex<Vec<Vec<String>>>,
    /// Output returned for `mount -t <type>` listings.
    pub listing: Mutex<String>,
    /// Programs that exit non-zero.
    pub failing: Mutex<Vec<String>>,
}

impl RecordingRunner {
    pub fn fail(&self, program: &str) {
        self.failing.lock().push(program.to_string());
    }

    pub fn list_mount(&self, source: &str, hostdir: &Path, fs_type: &str) {
        let mut listing = self.listing.lock();
        listing.push_str(&format!("{source} on {} type {fs_type} (rw)\n", hostdir.display()));
    }

    /// Physical mount commands (`mount -t <type> ... <source> <target>`).
    pub fn mounts(&self) -> Vec<Vec<String>> {
        self.filter(|argv| argv[0] == "mount" && !is_listing(argv))
    }

    /// `umount` commands.
    pub fn unmounts(&self) -> Vec<Vec<String>> {
        self.filter(|argv| argv[0] == "umount")
    }

    /// `mount -t <type>` listings.
    pub fn listings(&self) -> Vec<Vec<String>> {
        self.filter(|argv| is_listing(argv))
    }

    fn filter(&self, keep: impl Fn(&[String]) -> bool) -> Vec<Vec<String>> {
        self.calls
            .lock()
            .iter()
            .filter(|argv| keep(argv))
            .cloned()
            .collect()
    }
}

fn is_listing(argv: &[String]) -> bool {
    argv[0] == "mount" && argv.len() == 3
}

impl CommandRunner for RecordingRunner {
    fn run(&self, command: &CommandLine) -> NetvolResult<String> {
        let mut argv = vec![command.program().to_string()];
        argv.extend(command.args().iter().cloned());
        let listing = is_listing(&argv);
        self.calls.lock().push(argv);

        if self.failing.lock().iter().any(|p| p == command.program()) {
            return Err(NetvolError::CommandFailed {
                command: command.to_string(),
                status: "exit status: 32".to_string(),
                output: command.redact("mount error(13): Permission denied"),
            });
        }
        if listing {
            return Ok(self.listing.lock().clone());
        }
        Ok(String::new())
    }
}
