//! CLI command implementations

use std::io::BufRead;
use std::path::PathBuf;

use chrono::{DateTime, Local, Utc};
use clap::{Parser, Subcommand, ValueEnum};

use warden_core::{
    Clock, LockState, LockoutPolicy, ScreenKey, SystemClock, UnlockOutcome, Verdict,
    WHOLE_APP_SCREEN,
};
use warden_daemon::{DaemonConfig, EngineEvent};

use crate::client::{ClientError, WardenClient};

/// Warden CLI - per-screen application locking
#[derive(Parser)]
#[command(name = "warden")]
#[command(about = "Control the Warden access-control daemon")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to daemon socket
    #[arg(long)]
    pub socket: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check daemon status
    Status,

    /// Report a foreground window change
    Event {
        /// Package name
        package: String,

        /// Screen (activity) name
        screen: String,

        /// Re-evaluate even if the screen did not change
        #[arg(long)]
        forced: bool,
    },

    /// Report the device lock screen state
    Device {
        #[arg(value_enum)]
        state: DeviceState,
    },

    /// Submit a credential for the screen being challenged
    Submit {
        /// Credential; read from stdin when omitted
        secret: Option<String>,
    },

    /// Choose what happens after a successful unlock
    Unlock {
        /// Never challenge this screen again
        #[arg(long, conflicts_with = "ignore_minutes")]
        exclude: bool,

        /// Grace window in minutes (defaults to the preference)
        #[arg(long)]
        ignore_minutes: Option<u64>,
    },

    /// Lock a screen, or the whole package when no screen is given
    Lock {
        package: String,
        #[arg(default_value = WHOLE_APP_SCREEN)]
        screen: String,
    },

    /// Exempt one screen from challenges
    Whitelist { package: String, screen: String },

    /// Remove the entry for a screen or package
    Clear {
        package: String,
        #[arg(default_value = WHOLE_APP_SCREEN)]
        screen: String,
    },

    /// List stored entries
    List {
        /// Include system apps
        #[arg(long)]
        all: bool,
    },

    /// Manage the master secret
    #[command(subcommand)]
    Secret(SecretCommand),

    /// Show or change preferences
    Prefs(PrefsArgs),

    /// Print engine events as they happen
    Watch {
        /// Emit raw JSON lines
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum DeviceState {
    Locked,
    Unlocked,
}

#[derive(Subcommand)]
pub enum SecretCommand {
    /// Set or replace the master secret
    Set {
        /// New secret
        secret: String,

        /// Hint shown on the prompt
        #[arg(long)]
        hint: Option<String>,

        /// Current secret, required when replacing
        #[arg(long)]
        current: Option<String>,
    },

    /// Remove the master secret and stop monitoring
    Clear {
        /// Current secret
        current: String,
    },
}

#[derive(clap::Args)]
pub struct PrefsArgs {
    /// Turn window monitoring on or off
    #[arg(long)]
    pub monitoring: Option<bool>,

    /// Show system apps in listings
    #[arg(long)]
    pub system_apps: Option<bool>,

    /// Re-evaluate on package changes too
    #[arg(long)]
    pub package_change: Option<bool>,

    /// Drop events while the device is locked
    #[arg(long)]
    pub restricted: Option<bool>,

    /// Lockout length in minutes (0 disables lockout)
    #[arg(long)]
    pub timeout_minutes: Option<u64>,

    /// Default grace window in minutes
    #[arg(long)]
    pub ignore_minutes: Option<u64>,

    /// Recheck when a grace window ends
    #[arg(long)]
    pub recheck: Option<bool>,
}

impl PrefsArgs {
    fn is_empty(&self) -> bool {
        self.monitoring.is_none()
            && self.system_apps.is_none()
            && self.package_change.is_none()
            && self.restricted.is_none()
            && self.timeout_minutes.is_none()
            && self.ignore_minutes.is_none()
            && self.recheck.is_none()
    }
}

/// Run the CLI
pub async fn run(cli: Cli) -> Result<(), ClientError> {
    let socket = cli.socket.unwrap_or_else(DaemonConfig::default_ipc_path);
    let client = WardenClient::with_socket_path(socket);

    match cli.command {
        Commands::Status => {
            let version = match client.ping().await {
                Ok(version) => version,
                Err(ClientError::DaemonNotRunning) => {
                    println!("Warden daemon is not running");
                    println!("Start it with: warden-daemon");
                    return Err(ClientError::DaemonNotRunning);
                }
                Err(e) => return Err(e),
            };
            let status = client.status().await?;

            println!("Warden daemon v{} is running", version);
            println!(
                "Monitoring:    {}",
                if status.monitoring { "on" } else { "off" }
            );
            if !status.secret_configured {
                println!("No master secret set; run `warden secret set`");
            } else if let Some(hint) = &status.hint {
                println!("Hint:          {}", hint);
            }
            println!(
                "Device:        {}",
                if status.device_locked { "locked" } else { "unlocked" }
            );
            if let Some(active) = &status.active {
                println!("Foreground:    {}", active);
            }
            if let Some(challenge) = &status.challenge {
                println!(
                    "Challenge:     {} (matched {}, {} failed)",
                    challenge.key, challenge.matched, challenge.failures
                );
                if let Some(until) = challenge.locked_until {
                    println!("Locked until:  {}", format_time(until));
                }
            }
            if let Some(key) = &status.awaiting_unlock_choice {
                println!("Unlocked:      {} (run `warden unlock`)", key);
            }
        }

        Commands::Event {
            package,
            screen,
            forced,
        } => {
            client
                .window_changed(ScreenKey::new(package, screen), forced)
                .await?;
        }

        Commands::Device { state } => {
            client
                .device_lock(matches!(state, DeviceState::Locked))
                .await?;
        }

        Commands::Submit { secret } => {
            let secret = match secret {
                Some(secret) => secret,
                None => read_secret()?,
            };
            match client.submit(secret).await? {
                Verdict::Success => {
                    println!("Unlocked");
                    println!("Run `warden unlock --exclude` or `warden unlock --ignore-minutes N`");
                }
                Verdict::Fail {
                    failures,
                    attempts_remaining,
                } => {
                    println!("Wrong credential ({} failed)", failures);
                    if attempts_remaining > 0 {
                        println!("{} attempts before lockout", attempts_remaining);
                    }
                }
                Verdict::LockedOut { until } => {
                    let now = SystemClock.now_millis();
                    println!("{}", LockoutPolicy::describe_remaining(until, now));
                }
            }
        }

        Commands::Unlock {
            exclude,
            ignore_minutes,
        } => match client.post_unlock(exclude, ignore_minutes).await? {
            UnlockOutcome::Excluded { key } => {
                println!("{} will no longer be challenged", key);
            }
            UnlockOutcome::Ignoring {
                key,
                ignore_until,
                recheck_at,
            } => {
                println!("{} unlocked until {}", key, format_time(ignore_until));
                if let Some(at) = recheck_at {
                    println!("Recheck at {}", format_time(at));
                }
            }
        },

        Commands::Lock { package, screen } => {
            let key = ScreenKey::new(package, screen);
            let transition = client.set_state(key.clone(), LockState::Locked).await?;
            println!("{}: locked ({:?})", key, transition);
        }

        Commands::Whitelist { package, screen } => {
            let key = ScreenKey::new(package, screen);
            let transition = client
                .set_state(key.clone(), LockState::Whitelisted)
                .await?;
            println!("{}: whitelisted ({:?})", key, transition);
        }

        Commands::Clear { package, screen } => {
            let key = ScreenKey::new(package, screen);
            let transition = client.set_state(key.clone(), LockState::Default).await?;
            println!("{}: cleared ({:?})", key, transition);
        }

        Commands::List { all } => {
            let entries = client.list_entries(all).await?;
            if entries.is_empty() {
                println!("No entries");
            }
            for view in entries {
                let mut line = format!("{:<12} {} [{}]", view.state.to_string(), view.entry.key, view.label);
                if view.entry.is_system_app {
                    line.push_str(" system");
                }
                if view.entry.override_secret.is_some() {
                    line.push_str(" own-secret");
                }
                println!("{}", line);
            }
        }

        Commands::Secret(SecretCommand::Set {
            secret,
            hint,
            current,
        }) => {
            client.set_master_secret(secret, hint, current).await?;
            println!("Master secret saved");
        }

        Commands::Secret(SecretCommand::Clear { current }) => {
            client.clear_master_secret(current).await?;
            println!("Master secret removed; monitoring is off");
        }

        Commands::Prefs(args) => {
            let mut preferences = client.status().await?.preferences;
            if !args.is_empty() {
                if let Some(v) = args.monitoring {
                    preferences.monitoring_enabled = v;
                }
                if let Some(v) = args.system_apps {
                    preferences.system_apps_visible = v;
                }
                if let Some(v) = args.package_change {
                    preferences.lock_on_package_change_only = v;
                }
                if let Some(v) = args.restricted {
                    preferences.restricted_while_device_locked = v;
                }
                if let Some(v) = args.timeout_minutes {
                    preferences.timeout_period_minutes = v;
                }
                if let Some(v) = args.ignore_minutes {
                    preferences.default_ignore_minutes = v;
                }
                if let Some(v) = args.recheck {
                    preferences.recheck_enabled = v;
                }
                preferences = client.set_preferences(preferences).await?;
            }
            println!("{}", serde_json::to_string_pretty(&preferences)?);
        }

        Commands::Watch { json } => {
            let mut events = client.subscribe().await?;
            while let Some(event) = events
                .next()
                .await
                .map_err(|e| ClientError::DaemonError(e.to_string()))?
            {
                if json {
                    println!("{}", serde_json::to_string(&event)?);
                } else {
                    println!("{}", describe_event(&event));
                }
            }
        }
    }

    Ok(())
}

/// Read one line from stdin, without the trailing newline
fn read_secret() -> Result<String, ClientError> {
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn format_time(epoch_millis: u64) -> String {
    DateTime::<Utc>::from_timestamp_millis(epoch_millis as i64)
        .map(|t| t.with_timezone(&Local).format("%H:%M:%S").to_string())
        .unwrap_or_else(|| epoch_millis.to_string())
}

fn describe_event(event: &EngineEvent) -> String {
    match event {
        EngineEvent::Challenge {
            key,
            matched,
            hint,
            locked_until,
        } => {
            let mut line = format!("challenge  {}", key);
            if matched != key {
                line.push_str(&format!(" (via {})", matched));
            }
            if let Some(hint) = hint {
                line.push_str(&format!(" hint: {}", hint));
            }
            if let Some(until) = locked_until {
                line.push_str(&format!(" locked until {}", format_time(*until)));
            }
            line
        }
        EngineEvent::Cleared { key } => format!("cleared    {}", key),
        EngineEvent::LockedOut { key, remaining, .. } => {
            format!("lockout    {}: {}", key, remaining)
        }
        EngineEvent::EvaluationFailed { key, reason } => {
            format!("failed     {}: {}", key, reason)
        }
        EngineEvent::Defect { reason } => format!("defect     {}", reason),
    }
}
