//! Folder Copier - command-line front end for the backup-and-copy engine.
//!
//! `copy` replaces a destination folder with a fresh copy of a source folder,
//! keeping the previous contents as `<destination>_old` and restoring them if
//! anything goes wrong. `check` runs only the read-only preconditions.
//! `settings` manages the password-protected defaults both commands fall
//! back to. `network` checks that the stored file-sharing host answers.

mod logging;
mod network;
mod report;
mod session;
mod settings;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use copier_engine::{
    spawn_copy, ChecksumAlgorithm, CopyOptions, CopyOutcome, CopyRequest, SpaceReserve,
};

use crate::report::{JsonReporter, Reporter, TerminalReporter};
use crate::session::{PasswordPolicy, SaltedSha256, Session};
use crate::settings::{FolderType, Settings, SettingsStore};

const EXIT_OK: u8 = 0;
const EXIT_FAILED: u8 = 1;
const EXIT_USAGE: u8 = 2;
const EXIT_ROLLBACK_FAILED: u8 = 3;

/// Copy a folder over another, keeping the previous contents as a backup
#[derive(Parser, Debug)]
#[command(name = "folder-copier")]
#[command(version)]
#[command(about = "Copy a folder over another, keeping the previous contents as <destination>_old")]
struct Cli {
    /// Settings file (defaults to the platform config directory)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(long, global = true)]
    quiet: bool,

    /// Also write logs to this file (defaults to the stored log file)
    #[arg(long, value_name = "FILE", global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Copy the source folder to the destination
    Copy(CopyArgs),
    /// Check that a copy could run, without changing anything
    Check(CheckArgs),
    /// Show or change stored settings
    Settings {
        #[command(subcommand)]
        action: SettingsCommand,
    },
    /// Check that the network host accepts file-sharing connections
    Network(NetworkArgs),
}

#[derive(Args, Debug)]
struct NetworkArgs {
    /// Host to check (defaults to the stored host)
    #[arg(long, value_name = "HOST")]
    host: Option<String>,

    /// Seconds to wait for each port
    #[arg(long, value_name = "SECONDS", default_value_t = 3)]
    timeout: u64,
}

#[derive(Args, Debug)]
struct PathArgs {
    /// Source directory (defaults to the stored source)
    #[arg(long, value_name = "PATH")]
    src: Option<PathBuf>,

    /// Destination directory (defaults to the stored destination)
    #[arg(long, value_name = "PATH")]
    dst: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ReserveArgs {
    /// Keep this percentage of the copy size free on the destination volume
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u8).range(0..=100))]
    reserve_percent: Option<u8>,

    /// Keep this many bytes free on the destination volume
    #[arg(long, value_name = "N", conflicts_with = "reserve_percent")]
    reserve_bytes: Option<u64>,
}

impl ReserveArgs {
    fn space_reserve(&self) -> SpaceReserve {
        match (self.reserve_percent, self.reserve_bytes) {
            (Some(p), _) => SpaceReserve::Percent(p),
            (None, Some(b)) => SpaceReserve::Bytes(b),
            (None, None) => SpaceReserve::None,
        }
    }
}

#[derive(Args, Debug)]
struct CopyArgs {
    #[command(flatten)]
    paths: PathArgs,

    #[command(flatten)]
    reserve: ReserveArgs,

    /// Verify every copied file: md5, sha256 or blake3
    #[arg(long, value_name = "ALGORITHM")]
    verify: Option<ChecksumAlgorithm>,

    /// Do not carry modification times over to the copies
    #[arg(long)]
    no_preserve_mtime: bool,

    /// Treat the destination as a network share and probe its host first
    #[arg(long)]
    network: bool,

    /// Network host to probe (defaults to the stored host)
    #[arg(long, value_name = "HOST")]
    host: Option<String>,

    /// Print progress and the outcome as JSON lines on stdout
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct CheckArgs {
    #[command(flatten)]
    paths: PathArgs,

    #[command(flatten)]
    reserve: ReserveArgs,
}

#[derive(Subcommand, Debug)]
enum SettingsCommand {
    /// Print the stored settings (without the password hash)
    Show,
    /// Change stored settings
    Set(SetArgs),
    /// Set or change the settings password
    Password {
        /// New password
        #[arg(long, value_name = "PASSWORD")]
        new: String,
        /// Current password, required once a password is set
        #[arg(long, value_name = "PASSWORD")]
        current: Option<String>,
    },
    /// Write the settings, without the password hash, to a file
    Export {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Replace the settings with those from a file
    Import {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long, value_name = "PASSWORD")]
        password: String,
    },
    /// Put every setting except the password back to its default
    Reset {
        #[arg(long, value_name = "PASSWORD")]
        password: String,
    },
}

#[derive(Args, Debug)]
struct SetArgs {
    #[arg(long, value_name = "PATH")]
    source: Option<String>,

    #[arg(long, value_name = "PATH")]
    destination: Option<String>,

    #[arg(long, value_name = "HOST")]
    host: Option<String>,

    #[arg(long, value_enum, value_name = "TYPE")]
    folder_type: Option<FolderType>,

    /// Default verification algorithm; "none" clears it
    #[arg(long, value_name = "ALGORITHM")]
    verify: Option<String>,

    #[arg(long, value_name = "MINUTES")]
    timeout_minutes: Option<u64>,

    /// Log file used when --log-file is not given; "none" clears it
    #[arg(long, value_name = "FILE")]
    log_file: Option<String>,

    /// Settings password
    #[arg(long, value_name = "PASSWORD")]
    password: String,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let store = settings_store(&cli);
    let log_file = cli
        .log_file
        .clone()
        .or_else(|| store.load().log_file.map(PathBuf::from));
    if let Err(e) = logging::init(cli.verbose, cli.quiet, log_file.as_deref()) {
        eprintln!("Error: {:#}", e);
        return ExitCode::from(EXIT_USAGE);
    }
    tracing::debug!("Parsed CLI arguments: {:?}", cli);

    match run_cli(cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::debug!("Command failed: {:?}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::from(EXIT_USAGE)
        }
    }
}

/// Dispatch a parsed command line. `Err` means a usage or configuration error.
fn run_cli(cli: Cli) -> anyhow::Result<u8> {
    let store = settings_store(&cli);

    match cli.command {
        Commands::Copy(args) => run_copy(&store, args),
        Commands::Check(args) => run_check(&store, args),
        Commands::Settings { action } => run_settings(&store, action),
        Commands::Network(args) => run_network(&store, args),
    }
}

fn settings_store(cli: &Cli) -> SettingsStore {
    SettingsStore::new(
        cli.config
            .clone()
            .unwrap_or_else(SettingsStore::default_path),
    )
}

/// Pick the flag value, else the stored value, else fail.
fn resolve_path(flag: Option<PathBuf>, stored: &str, what: &str) -> anyhow::Result<PathBuf> {
    match flag {
        Some(path) => Ok(path),
        None if !stored.trim().is_empty() => Ok(PathBuf::from(stored)),
        None => bail!("no {} path given and none stored in settings", what),
    }
}

fn resolve_paths(paths: PathArgs, settings: &Settings) -> anyhow::Result<(PathBuf, PathBuf)> {
    let src = resolve_path(paths.src, &settings.source_path, "source")?;
    let dst = resolve_path(paths.dst, &settings.destination_path, "destination")?;
    Ok((src, dst))
}

fn outcome_exit_code(outcome: &CopyOutcome) -> u8 {
    if outcome.is_success() {
        EXIT_OK
    } else if outcome.is_degraded() {
        EXIT_ROLLBACK_FAILED
    } else {
        EXIT_FAILED
    }
}

fn run_copy(store: &SettingsStore, args: CopyArgs) -> anyhow::Result<u8> {
    let settings = store.load();
    let (src, dst) = resolve_paths(args.paths, &settings)?;

    if args.network || settings.folder_type == FolderType::Network {
        let host = args.host.unwrap_or_else(|| settings.network_host.clone());
        if !network::is_reachable(&host, network::DEFAULT_PROBE_TIMEOUT) {
            eprintln!("Network host '{}' is not reachable; nothing was changed.", host);
            return Ok(EXIT_FAILED);
        }
    }

    let options = CopyOptions {
        space_reserve: args.reserve.space_reserve(),
        preserve_mtime: !args.no_preserve_mtime,
        verify: args.verify.or(settings.verify),
    };

    let request = CopyRequest::new(&src, &dst);
    signal_hook::flag::register(signal_hook::consts::SIGINT, request.cancel.flag())
        .context("Failed to install Ctrl-C handler")?;

    if !args.json {
        eprintln!("Copying {} -> {}", src.display(), dst.display());
    }

    let handle = spawn_copy(request, options).context("Failed to start copy worker")?;
    let mut reporter: Box<dyn Reporter> = if args.json {
        Box::new(JsonReporter)
    } else {
        Box::new(TerminalReporter::new())
    };
    for message in handle.events().iter() {
        reporter.message(&message);
    }

    let outcome = handle.join();
    Ok(outcome_exit_code(&outcome))
}

fn run_check(store: &SettingsStore, args: CheckArgs) -> anyhow::Result<u8> {
    let settings = store.load();
    let (src, dst) = resolve_paths(args.paths, &settings)?;
    let options = CopyOptions {
        space_reserve: args.reserve.space_reserve(),
        ..CopyOptions::default()
    };

    match copier_engine::check(&src, &dst, &options) {
        Ok(report) => {
            println!("{}", report::describe_check(&report));
            println!("Ready to copy {} -> {}", src.display(), dst.display());
            Ok(EXIT_OK)
        }
        Err(e) => {
            println!("Not ready ({}): {}", e.kind(), e);
            Ok(EXIT_FAILED)
        }
    }
}

fn run_network(store: &SettingsStore, args: NetworkArgs) -> anyhow::Result<u8> {
    let host = args.host.unwrap_or_else(|| store.load().network_host);
    if network::is_reachable(&host, Duration::from_secs(args.timeout)) {
        println!("Network host '{}' is reachable", host);
        Ok(EXIT_OK)
    } else {
        println!("Network host '{}' is not reachable", host);
        Ok(EXIT_FAILED)
    }
}

/// Open a session against the stored hash or fail.
fn login(settings: &Settings, password: &str) -> anyhow::Result<Session> {
    let mut session = Session::new(settings.session_timeout_minutes);
    if settings.password_hash.is_none() {
        bail!("no settings password set; run `settings password --new <PASSWORD>` first");
    }
    if !session.authenticate(password, settings.password_hash.as_deref(), &SaltedSha256) {
        bail!("incorrect password");
    }
    tracing::debug!(
        remaining_secs = session.remaining().as_secs(),
        "settings session opened"
    );
    Ok(session)
}

fn run_settings(store: &SettingsStore, action: SettingsCommand) -> anyhow::Result<u8> {
    match action {
        SettingsCommand::Show => {
            let settings = store.load();
            eprintln!("Settings file: {}", store.path().display());
            eprintln!(
                "Password: {}",
                if settings.password_hash.is_some() {
                    "set"
                } else {
                    "not set"
                }
            );
            println!("{}", serde_json::to_string_pretty(&settings.without_secret())?);
        }
        SettingsCommand::Set(args) => {
            let mut settings = store.load();
            let mut session = login(&settings, &args.password)?;
            apply_changes(&mut settings, args)?;
            settings.validate()?;
            store.save(&mut session, &settings)?;
            eprintln!("Settings saved to {}", store.path().display());
        }
        SettingsCommand::Password { new, current } => {
            set_password(store, &new, current.as_deref())?;
            eprintln!("Password updated");
        }
        SettingsCommand::Export { file } => {
            store
                .export(&file)
                .with_context(|| format!("Failed to export settings to {}", file.display()))?;
            eprintln!("Settings exported to {}", file.display());
        }
        SettingsCommand::Import { file, password } => {
            let mut session = login(&store.load(), &password)?;
            store
                .import(&mut session, &file)
                .with_context(|| format!("Failed to import settings from {}", file.display()))?;
            eprintln!("Settings imported from {}", file.display());
        }
        SettingsCommand::Reset { password } => {
            let mut session = login(&store.load(), &password)?;
            store.reset(&mut session)?;
            eprintln!("Settings reset to defaults in {}", store.path().display());
        }
    }
    Ok(EXIT_OK)
}

fn apply_changes(settings: &mut Settings, args: SetArgs) -> anyhow::Result<()> {
    if let Some(source) = args.source {
        settings.source_path = source;
    }
    if let Some(destination) = args.destination {
        settings.destination_path = destination;
    }
    if let Some(host) = args.host {
        settings.network_host = host;
    }
    if let Some(folder_type) = args.folder_type {
        settings.folder_type = folder_type;
    }
    if let Some(verify) = args.verify {
        settings.verify = match verify.as_str() {
            "none" => None,
            other => Some(other.parse::<ChecksumAlgorithm>().map_err(anyhow::Error::msg)?),
        };
    }
    if let Some(minutes) = args.timeout_minutes {
        if minutes == 0 {
            bail!("session timeout must be at least one minute");
        }
        settings.session_timeout_minutes = minutes;
    }
    if let Some(log_file) = args.log_file {
        settings.log_file = match log_file.as_str() {
            "none" | "" => None,
            _ => Some(log_file),
        };
    }
    Ok(())
}

fn set_password(store: &SettingsStore, new: &str, current: Option<&str>) -> anyhow::Result<()> {
    if new.is_empty() {
        bail!("password must not be empty");
    }
    let mut settings = store.load();
    let policy = SaltedSha256;

    if settings.password_hash.is_none() {
        settings.password_hash = Some(policy.hash(new));
        store.write(&settings)?;
        tracing::info!("initial settings password stored");
        return Ok(());
    }

    let current = current.context("--current is required to change an existing password")?;
    let mut session = login(&settings, current)?;
    settings.password_hash = Some(policy.hash(new));
    store.save(&mut session, &settings)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use copier_engine::ErrorKind;
    use tempfile::TempDir;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_copy_flags() {
        let cli = Cli::try_parse_from([
            "folder-copier",
            "copy",
            "--src",
            "/a",
            "--dst",
            "/b",
            "--verify",
            "blake3",
            "--reserve-percent",
            "10",
            "--json",
        ])
        .unwrap();
        match cli.command {
            Commands::Copy(args) => {
                assert_eq!(args.paths.src, Some(PathBuf::from("/a")));
                assert_eq!(args.verify, Some(ChecksumAlgorithm::Blake3));
                assert_eq!(args.reserve.space_reserve(), SpaceReserve::Percent(10));
                assert!(args.json);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_reserve_flags_conflict() {
        let result = Cli::try_parse_from([
            "folder-copier",
            "copy",
            "--reserve-percent",
            "5",
            "--reserve-bytes",
            "100",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_exit_codes() {
        let ok = CopyOutcome::Success {
            files_copied: 1,
            bytes_copied: 1,
        };
        let failed = CopyOutcome::Failed {
            reason: ErrorKind::CopyFailed,
            message: String::new(),
            rolled_back: true,
        };
        let degraded = CopyOutcome::Failed {
            reason: ErrorKind::RollbackFailed,
            message: String::new(),
            rolled_back: false,
        };
        assert_eq!(outcome_exit_code(&ok), EXIT_OK);
        assert_eq!(outcome_exit_code(&failed), EXIT_FAILED);
        assert_eq!(outcome_exit_code(&degraded), EXIT_ROLLBACK_FAILED);
    }

    #[test]
    fn test_paths_fall_back_to_settings() {
        let settings = Settings {
            source_path: "/stored/src".to_string(),
            ..Settings::default()
        };
        let paths = PathArgs {
            src: None,
            dst: Some(PathBuf::from("/flag/dst")),
        };
        let (src, dst) = resolve_paths(paths, &settings).unwrap();
        assert_eq!(src, PathBuf::from("/stored/src"));
        assert_eq!(dst, PathBuf::from("/flag/dst"));

        let missing = PathArgs {
            src: None,
            dst: None,
        };
        assert!(resolve_paths(missing, &settings).is_err());
    }

    #[test]
    fn test_parse_network_and_reset() {
        let cli = Cli::try_parse_from(["folder-copier", "network", "--host", "nas.local"]).unwrap();
        match cli.command {
            Commands::Network(args) => {
                assert_eq!(args.host.as_deref(), Some("nas.local"));
                assert_eq!(args.timeout, 3);
            }
            other => panic!("unexpected command {:?}", other),
        }

        let cli = Cli::try_parse_from([
            "folder-copier",
            "--log-file",
            "/tmp/copier.log",
            "settings",
            "reset",
            "--password",
            "pw",
        ])
        .unwrap();
        assert_eq!(cli.log_file, Some(PathBuf::from("/tmp/copier.log")));
        assert!(matches!(
            cli.command,
            Commands::Settings {
                action: SettingsCommand::Reset { .. }
            }
        ));
    }

    #[test]
    fn test_network_reports_unreachable_host() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = SettingsStore::new(temp_dir.path().join("settings.json"));
        let args = NetworkArgs {
            host: Some(String::new()),
            timeout: 1,
        };
        assert_eq!(run_network(&store, args).unwrap(), EXIT_FAILED);
    }

    #[test]
    fn test_log_file_setting_can_be_cleared() {
        let mut settings = Settings::default();
        let mut args = SetArgs {
            source: None,
            destination: None,
            host: None,
            folder_type: None,
            verify: None,
            timeout_minutes: None,
            log_file: Some("/var/log/copier.log".to_string()),
            password: "pw".to_string(),
        };
        apply_changes(&mut settings, args).unwrap();
        assert_eq!(settings.log_file.as_deref(), Some("/var/log/copier.log"));

        args = SetArgs {
            source: None,
            destination: None,
            host: None,
            folder_type: None,
            verify: None,
            timeout_minutes: None,
            log_file: Some("none".to_string()),
            password: "pw".to_string(),
        };
        apply_changes(&mut settings, args).unwrap();
        assert_eq!(settings.log_file, None);
    }

    #[test]
    fn test_save_restarts_session_timer() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = SettingsStore::new(temp_dir.path().join("settings.json"));
        set_password(&store, "pw", None).unwrap();
        let settings = store.load();

        let mut session = login(&settings, "pw").unwrap();
        std::thread::sleep(Duration::from_millis(20));
        let before = session.remaining();
        store.save(&mut session, &settings).unwrap();
        assert!(session.remaining() > before);
    }

    #[test]
    fn test_password_first_set_then_change() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = SettingsStore::new(temp_dir.path().join("settings.json"));

        set_password(&store, "first", None).unwrap();
        assert!(set_password(&store, "second", None).is_err());
        assert!(set_password(&store, "second", Some("wrong")).is_err());
        set_password(&store, "second", Some("first")).unwrap();

        let stored = store.load().password_hash.unwrap();
        assert!(SaltedSha256.verify("second", &stored));
        assert!(!SaltedSha256.verify("first", &stored));
    }

    #[test]
    fn test_copy_with_settings_defaults() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        std::fs::create_dir(&src).unwrap();
        std::fs::write(src.join("test.txt"), "hello").unwrap();
        let dst = temp_dir.path().join("dst");

        let store = SettingsStore::new(temp_dir.path().join("settings.json"));
        set_password(&store, "pw", None).unwrap();
        let mut settings = store.load();
        let mut session = login(&settings, "pw").unwrap();
        settings.source_path = src.display().to_string();
        settings.destination_path = dst.display().to_string();
        store.save(&mut session, &settings).unwrap();

        let args = CopyArgs {
            paths: PathArgs {
                src: None,
                dst: None,
            },
            reserve: ReserveArgs {
                reserve_percent: None,
                reserve_bytes: None,
            },
            verify: Some(ChecksumAlgorithm::Md5),
            no_preserve_mtime: false,
            network: false,
            host: None,
            json: true,
        };
        assert_eq!(run_copy(&store, args).unwrap(), EXIT_OK);
        assert_eq!(std::fs::read_to_string(dst.join("test.txt")).unwrap(), "hello");
    }
}
