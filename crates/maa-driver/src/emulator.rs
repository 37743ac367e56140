use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use conductor_core::config::EmulatorSettings;
use tokio::process::Command;

use crate::{DriverError, Result};

// ─── Seams ────────────────────────────────────────────────────────────────

/// Checks and starts emulators by configured id.
#[async_trait]
pub trait EmulatorControl: Send + Sync {
    /// The device address once the emulator accepts connections, `None`
    /// while it is not (yet) reachable.
    async fn is_running(&self, id: &str) -> Result<Option<String>>;

    /// Ask the emulator to start. Returns once the request is issued; the
    /// caller polls [`is_running`](EmulatorControl::is_running).
    async fn start(&self, id: &str) -> Result<()>;
}

/// Finds a device address when none is configured.
#[async_trait]
pub trait AddressDiscovery: Send + Sync {
    async fn discover(&self) -> Result<Option<String>>;
}

// ─── adb ──────────────────────────────────────────────────────────────────

const DEVICES_TIMEOUT: Duration = Duration::from_secs(15);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(20);
const SHELL_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdbDevice {
    pub serial: String,
    pub state: String,
}

impl AdbDevice {
    pub fn is_online(&self) -> bool {
        self.state == "device"
    }

    fn is_network(&self) -> bool {
        is_network_serial(&self.serial)
    }
}

fn is_network_serial(serial: &str) -> bool {
    serial.contains(':') && !serial.starts_with("emulator-")
}

/// Parse `adb devices` output, skipping the header and blank lines.
pub fn parse_devices(output: &str) -> Vec<AdbDevice> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("List of devices"))
        .filter(|line| !line.starts_with('*'))
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let serial = parts.next()?;
            let state = parts.next()?;
            Some(AdbDevice {
                serial: serial.to_string(),
                state: state.to_string(),
            })
        })
        .collect()
}

/// Thin async wrapper around the `adb` binary.
#[derive(Debug, Clone)]
pub struct Adb {
    program: PathBuf,
}

struct AdbOutput {
    success: bool,
    stdout: String,
}

impl Adb {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Use `explicit` if given, otherwise find `adb` on `PATH`.
    pub fn locate(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Ok(Self::new(path));
        }
        which::which("adb").map(Self::new).map_err(|_| {
            DriverError::EmulatorUnavailable(
                "adb not found on PATH; set adb_path for the emulator".into(),
            )
        })
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    async fn run(&self, args: &[&str], limit: Duration) -> Result<AdbOutput> {
        let mut cmd = Command::new(&self.program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let output = tokio::time::timeout(limit, cmd.output())
            .await
            .map_err(|_| {
                DriverError::EmulatorUnavailable(format!(
                    "adb {} timed out after {}s",
                    args.join(" "),
                    limit.as_secs()
                ))
            })?
            .map_err(|source| DriverError::ProcessSpawn {
                program: self.program.display().to_string(),
                source,
            })?;
        if !output.status.success() {
            tracing::debug!(
                args = ?args,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "adb command failed"
            );
        }
        Ok(AdbOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        })
    }

    pub async fn devices(&self) -> Result<Vec<AdbDevice>> {
        let out = self.run(&["devices"], DEVICES_TIMEOUT).await?;
        if !out.success {
            return Ok(Vec::new());
        }
        Ok(parse_devices(&out.stdout))
    }

    /// Connect to `serial` (for network addresses) and confirm a shell
    /// answers.
    pub async fn probe(&self, serial: &str) -> Result<bool> {
        if is_network_serial(serial) {
            let out = self.run(&["connect", serial], CONNECT_TIMEOUT).await?;
            let text = out.stdout.to_lowercase();
            if text.contains("failed") || text.contains("cannot") {
                tracing::debug!(serial, output = %out.stdout.trim(), "adb connect refused");
                return Ok(false);
            }
        }
        let out = self
            .run(&["-s", serial, "shell", "echo", "ok"], SHELL_TIMEOUT)
            .await?;
        Ok(out.success)
    }
}

/// [`EmulatorControl`] over adb, using the emulators declared in the
/// configuration.
pub struct AdbEmulator {
    emulators: BTreeMap<String, EmulatorSettings>,
}

impl AdbEmulator {
    pub fn new(emulators: BTreeMap<String, EmulatorSettings>) -> Self {
        Self { emulators }
    }

    fn settings(&self, id: &str) -> Result<&EmulatorSettings> {
        self.emulators
            .get(id)
            .ok_or_else(|| DriverError::EmulatorUnavailable(format!("unknown emulator '{id}'")))
    }
}

#[async_trait]
impl EmulatorControl for AdbEmulator {
    async fn is_running(&self, id: &str) -> Result<Option<String>> {
        let settings = self.settings(id)?;
        let adb = Adb::locate(settings.adb_path.as_deref())?;
        if adb.probe(&settings.address).await? {
            Ok(Some(settings.address.clone()))
        } else {
            Ok(None)
        }
    }

    async fn start(&self, id: &str) -> Result<()> {
        let settings = self.settings(id)?;
        let Some((program, args)) = settings.start_command.split_first() else {
            return Err(DriverError::EmulatorUnavailable(format!(
                "emulator '{id}' is not running and has no start_command"
            )));
        };
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        let child = cmd.spawn().map_err(|source| DriverError::ProcessSpawn {
            program: program.clone(),
            source,
        })?;
        tracing::info!(emulator = id, pid = child.id(), "emulator start requested");
        Ok(())
    }
}

/// [`AddressDiscovery`] that picks the first online adb device, preferring
/// network addresses.
pub struct AdbDiscovery {
    adb: Option<PathBuf>,
}

impl AdbDiscovery {
    pub fn new(adb: Option<PathBuf>) -> Self {
        Self { adb }
    }
}

#[async_trait]
impl AddressDiscovery for AdbDiscovery {
    async fn discover(&self) -> Result<Option<String>> {
        let adb = Adb::locate(self.adb.as_deref())?;
        let devices = adb.devices().await?;
        let mut online: Vec<&AdbDevice> = devices.iter().filter(|d| d.is_online()).collect();
        online.sort_by_key(|d| !d.is_network());
        let found = online.first().map(|d| d.serial.clone());
        tracing::debug!(found = ?found, candidates = devices.len(), "adb discovery");
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEVICES: &str = "List of devices attached\n\
        emulator-5554\tdevice\n\
        127.0.0.1:16384\tdevice\n\
        127.0.0.1:5555\toffline\n\
        \n";

    #[test]
    fn parses_device_list() {
        let devices = parse_devices(DEVICES);
        assert_eq!(devices.len(), 3);
        assert_eq!(devices[1].serial, "127.0.0.1:16384");
        assert!(devices[1].is_online());
        assert!(!devices[2].is_online());
    }

    #[test]
    fn daemon_banner_lines_are_ignored() {
        let out = "* daemon not running; starting now at tcp:5037\n\
            * daemon started successfully\n\
            List of devices attached\n";
        assert!(parse_devices(out).is_empty());
    }

    #[test]
    fn emulator_serials_are_not_network() {
        assert!(is_network_serial("127.0.0.1:16384"));
        assert!(!is_network_serial("emulator-5554"));
    }

    #[tokio::test]
    async fn unknown_emulator_is_unavailable() {
        let control = AdbEmulator::new(BTreeMap::new());
        let err = control.is_running("mumu").await.unwrap_err();
        assert!(matches!(err, DriverError::EmulatorUnavailable(_)));
    }

    #[tokio::test]
    async fn start_without_command_is_unavailable() {
        let mut emulators = BTreeMap::new();
        emulators.insert(
            "mumu".to_string(),
            EmulatorSettings {
                address: "127.0.0.1:16384".into(),
                adb_path: None,
                start_command: Vec::new(),
            },
        );
        let err = AdbEmulator::new(emulators).start("mumu").await.unwrap_err();
        assert!(err.to_string().contains("no start_command"));
    }

    #[cfg(unix)]
    mod fake_adb {
        use super::*;
        use std::os::unix::fs::PermissionsExt;
        use tempfile::TempDir;

        fn script(dir: &TempDir, body: &str) -> PathBuf {
            let path = dir.path().join("adb");
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        #[tokio::test]
        async fn discovery_prefers_network_device() {
            let dir = TempDir::new().unwrap();
            let adb = script(
                &dir,
                &format!("cat <<'EOF'\n{DEVICES}EOF"),
            );
            let found = AdbDiscovery::new(Some(adb)).discover().await.unwrap();
            assert_eq!(found.as_deref(), Some("127.0.0.1:16384"));
        }

        #[tokio::test]
        async fn probe_reports_refused_connect() {
            let dir = TempDir::new().unwrap();
            let adb = script(
                &dir,
                r#"if [ "$1" = connect ]; then echo "cannot connect to $2: refused"; fi"#,
            );
            assert!(!Adb::new(adb).probe("127.0.0.1:16384").await.unwrap());
        }

        #[tokio::test]
        async fn running_emulator_reports_address() {
            let dir = TempDir::new().unwrap();
            let adb = script(
                &dir,
                r#"case "$1" in connect) echo "connected to $2";; -s) echo ok;; esac"#,
            );
            let mut emulators = BTreeMap::new();
            emulators.insert(
                "mumu".to_string(),
                EmulatorSettings {
                    address: "127.0.0.1:16384".into(),
                    adb_path: Some(adb),
                    start_command: Vec::new(),
                },
            );
            let control = AdbEmulator::new(emulators);
            assert_eq!(
                control.is_running("mumu").await.unwrap().as_deref(),
                Some("127.0.0.1:16384")
            );
        }
    }
}
