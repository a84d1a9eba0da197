//! BorealVPN CLI — manage accounts, relay constraints and tunnel keys

use anyhow::{anyhow, bail, Context, Result};
use borealvpn_relays::{
    cache_refresh_interval, default_cache_path, RelayConstraint, RelayListCache, RelaySelector,
};
use borealvpn_store::{
    default_settings_path, log_in, log_out, ApiClient, ApiError, AppSettings, KeyringStore,
    PrivateKey, ProfileError, TunnelConfigurationManager, VpnProfile,
    WireguardAssociatedAddresses, WireguardKeyRequest,
};
use borealvpn_tunnel::UapiConfigBuilder;
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// BorealVPN — location-aware WireGuard VPN client
#[derive(Parser)]
#[command(name = "borealvpn")]
#[command(version)]
#[command(about = "Manage BorealVPN accounts, relay constraints and keys", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new WireGuard key pair
    Genkey,

    /// Derive the public key from a private key (reads base64 from stdin)
    Pubkey,

    /// Manage the logged-in account
    Account {
        #[command(subcommand)]
        command: AccountCommands,
    },

    /// Manage relay selection constraints
    Relay {
        #[command(subcommand)]
        command: RelayCommands,
    },

    /// Dry-run the relay selector against the cached directory
    Select,

    /// Print a diagnostic WireGuard configuration for the current selection
    DumpConfig,

    /// Show the relay cache state
    Cache,

    /// Show account and configuration status
    Status,
}

#[derive(Subcommand)]
enum AccountCommands {
    /// Log in with an account token
    Login {
        /// The account token
        token: String,
    },

    /// Log out of the current account
    Logout,

    /// Show the current account
    Get,
}

#[derive(Subcommand)]
enum RelayCommands {
    /// Set the relay location constraint
    Set {
        /// Location: nothing for any, or country [city [hostname]]
        #[arg(num_args = 0..=3)]
        location: Vec<String>,
    },

    /// Show the current constraint
    Get,

    /// List relay locations from the cached directory
    List,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Commands::Genkey => cmd_genkey(),
        Commands::Pubkey => cmd_pubkey(),
        Commands::Account { command } => match command {
            AccountCommands::Login { token } => cmd_account_login(&token),
            AccountCommands::Logout => cmd_account_logout(),
            AccountCommands::Get => cmd_account_get(),
        },
        Commands::Relay { command } => match command {
            RelayCommands::Set { location } => cmd_relay_set(&location),
            RelayCommands::Get => cmd_relay_get(),
            RelayCommands::List => cmd_relay_list(),
        },
        Commands::Select => cmd_select(),
        Commands::DumpConfig => cmd_dump_config(),
        Commands::Cache => cmd_cache(),
        Commands::Status => cmd_status(),
    }
}

/// The CLI has no control-plane transport of its own; the application
/// process owns that session. Key pushes initiated here are picked up on
/// the next app sync, so the client reports every call as unreachable and
/// the managers treat it as deferred.
struct OfflineApi;

impl ApiClient for OfflineApi {
    fn relay_list(&self) -> std::result::Result<borealvpn_relays::RelayList, ApiError> {
        Err(ApiError::Transport("control plane session not available in the CLI".into()))
    }

    fn account_expiry(
        &self,
        _account_token: &str,
    ) -> std::result::Result<chrono::DateTime<Utc>, ApiError> {
        Err(ApiError::Transport("control plane session not available in the CLI".into()))
    }

    fn push_wg_key(
        &self,
        _request: &WireguardKeyRequest,
    ) -> std::result::Result<WireguardAssociatedAddresses, ApiError> {
        Err(ApiError::Transport("control plane session not available in the CLI".into()))
    }

    fn check_wg_key(
        &self,
        _request: &WireguardKeyRequest,
    ) -> std::result::Result<bool, ApiError> {
        Err(ApiError::Transport("control plane session not available in the CLI".into()))
    }
}

/// The CLI never owns a VPN profile; profile propagation happens in the
/// application process.
struct DetachedProfile;

impl VpnProfile for DetachedProfile {
    fn reconfigure_and_start(
        &self,
        _store_ref: &[u8],
        _server_address: &str,
    ) -> std::result::Result<(), ProfileError> {
        Ok(())
    }
}

fn settings_path() -> Result<PathBuf> {
    default_settings_path().ok_or_else(|| anyhow!("No usable settings directory on this system"))
}

fn cache_path() -> Result<PathBuf> {
    default_cache_path().ok_or_else(|| anyhow!("No usable cache directory on this system"))
}

fn make_manager() -> Result<TunnelConfigurationManager> {
    Ok(TunnelConfigurationManager::new(
        Arc::new(KeyringStore::new()),
        Arc::new(OfflineApi),
        Arc::new(DetachedProfile),
        settings_path()?,
    ))
}

fn active_account() -> Result<String> {
    let settings = AppSettings::load(&settings_path()?)?;
    settings
        .account_token
        .ok_or_else(|| anyhow!("Not logged in. Run `borealvpn account login <token>` first."))
}

fn cmd_genkey() -> Result<()> {
    let private_key = PrivateKey::new();

    println!("# Generated: {}", Utc::now().to_rfc3339());
    println!("private key: {}", base64::encode(private_key.to_bytes()));
    println!("public key:  {}", base64::encode(private_key.public_key()));
    Ok(())
}

fn cmd_pubkey() -> Result<()> {
    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .context("Failed to read the private key from stdin")?;

    let decoded = base64::decode(input.trim()).context("The private key is not valid base64")?;
    let bytes: [u8; 32] = decoded
        .try_into()
        .map_err(|_| anyhow!("A private key must be exactly 32 bytes"))?;

    println!("{}", base64::encode(PrivateKey::from_bytes(bytes).public_key()));
    Ok(())
}

fn cmd_account_login(token: &str) -> Result<()> {
    let manager = make_manager()?;
    let api = OfflineApi;

    log_in(&api, &manager, &settings_path()?, token).context("Login failed")?;
    manager.flush();

    println!("Logged in. The app will verify the account when it next syncs.");
    Ok(())
}

fn cmd_account_logout() -> Result<()> {
    log_out(&settings_path()?).context("Logout failed")?;
    println!("Logged out.");
    Ok(())
}

fn cmd_account_get() -> Result<()> {
    let settings = AppSettings::load(&settings_path()?)?;

    match settings.account_token {
        Some(token) => {
            println!("account: {}", token);
            match settings.account_expiry {
                Some(expiry) => println!("paid until: {}", expiry.to_rfc3339()),
                None => println!("paid until: unknown (verification pending)"),
            }
        }
        None => println!("Not logged in."),
    }
    Ok(())
}

fn parse_location(location: &[String]) -> Result<RelayConstraint> {
    match location {
        [] => Ok(RelayConstraint::Any),
        [country] => Ok(RelayConstraint::Country(country.clone())),
        [country, city] => Ok(RelayConstraint::City(country.clone(), city.clone())),
        [country, city, hostname] => Ok(RelayConstraint::Hostname(
            country.clone(),
            city.clone(),
            hostname.clone(),
        )),
        _ => bail!("Give at most country, city and hostname"),
    }
}

fn cmd_relay_set(location: &[String]) -> Result<()> {
    let constraint = parse_location(location)?;
    let account = active_account()?;

    let manager = make_manager()?;
    manager
        .update_constraint(&account, constraint.clone())
        .context("Failed to update the relay constraint")?;
    manager.flush();

    println!("Relay constraint set to {}", constraint);
    Ok(())
}

fn cmd_relay_get() -> Result<()> {
    let account = active_account()?;
    let manager = make_manager()?;

    let config = manager
        .get_configuration(&account)
        .context("No stored tunnel configuration for this account")?;
    println!("{}", config.relay_constraint);
    Ok(())
}

fn cmd_relay_list() -> Result<()> {
    let cache = RelayListCache::read(&cache_path()?)
        .context("Failed to read the relay cache; let the app fetch the directory first")?;

    for country in &cache.relay_list.countries {
        println!("{} ({})", country.name, country.code);
        for city in &country.cities {
            println!("\t{} ({}) @ {:.5}, {:.5}", city.name, city.code, city.latitude, city.longitude);
            for relay in &city.relays {
                let wireguard = relay
                    .tunnels
                    .as_ref()
                    .and_then(|tunnels| tunnels.wireguard.as_ref())
                    .map(|descriptors| !descriptors.is_empty())
                    .unwrap_or(false);
                if wireguard {
                    println!("\t\t{} ({})", relay.hostname, relay.ipv4_addr_in);
                }
            }
        }
    }
    Ok(())
}

fn cmd_select() -> Result<()> {
    let account = active_account()?;
    let manager = make_manager()?;
    let config = manager
        .get_configuration(&account)
        .context("No stored tunnel configuration for this account")?;

    let selector = RelaySelector::from_cache(&cache_path()?)
        .context("Failed to read the relay cache")?;

    match selector.evaluate(&config.relay_constraint, &mut rand::thread_rng()) {
        Some(endpoint) => {
            println!("relay:        {}", endpoint);
            println!("ipv4 gateway: {}", endpoint.ipv4_gateway);
            println!("ipv6 gateway: {}", endpoint.ipv6_gateway);
            println!("public key:   {}", base64::encode(endpoint.public_key));
            Ok(())
        }
        None => bail!("No relay satisfies the constraint {}", config.relay_constraint),
    }
}

fn cmd_dump_config() -> Result<()> {
    let account = active_account()?;
    let manager = make_manager()?;
    let config = manager
        .get_configuration(&account)
        .context("No stored tunnel configuration for this account")?;

    let selector = RelaySelector::from_cache(&cache_path()?)
        .context("Failed to read the relay cache")?;
    let endpoint = selector
        .evaluate(&config.relay_constraint, &mut rand::thread_rng())
        .ok_or_else(|| anyhow!("No relay satisfies the constraint {}", config.relay_constraint))?;

    // Diagnostic output uses the hex-keyed builder; the live backend path
    // in borealvpn-tunnel::settings is base64. The two never mix.
    let document = UapiConfigBuilder::new()
        .private_key(config.interface.private_key.to_bytes())
        .listen_port(0)
        .replace_peers(true)
        .peer(endpoint.endpoint_addr(), endpoint.public_key)
        .replace_allowed_ips(true)
        .allowed_ip("0.0.0.0/0".parse().context("default route literal")?)
        .build();

    println!("{}", document);
    Ok(())
}

fn cmd_cache() -> Result<()> {
    let path = cache_path()?;
    let cache = RelayListCache::read(&path)
        .with_context(|| format!("Failed to read the relay cache at {}", path.display()))?;

    let countries = cache.relay_list.countries.len();
    let relays: usize = cache
        .relay_list
        .countries
        .iter()
        .flat_map(|country| &country.cities)
        .map(|city| city.relays.len())
        .sum();

    println!("cache file:  {}", path.display());
    println!("updated at:  {}", cache.updated_at.to_rfc3339());
    println!("contents:    {} countries, {} relays", countries, relays);

    if cache.needs_update(Utc::now()) {
        println!(
            "state:       stale (older than {} minutes)",
            cache_refresh_interval().num_minutes()
        );
    } else {
        println!("state:       fresh");
    }
    Ok(())
}

fn cmd_status() -> Result<()> {
    let settings = AppSettings::load(&settings_path()?)?;

    let Some(account) = settings.account_token else {
        println!("Not logged in.");
        return Ok(());
    };

    println!("account: {}", account);

    let manager = make_manager()?;
    match manager.get_configuration(&account) {
        Ok(config) => {
            println!("constraint: {}", config.relay_constraint);
            println!(
                "public key: {}",
                base64::encode(config.interface.private_key.public_key())
            );
            if config.interface.addresses.is_empty() {
                println!("addresses: not yet assigned");
            } else {
                let addresses: Vec<String> = config
                    .interface
                    .addresses
                    .iter()
                    .map(|address| address.to_string())
                    .collect();
                println!("addresses: {}", addresses.join(", "));
            }
        }
        Err(error) => println!("tunnel configuration: unavailable ({})", error),
    }
    Ok(())
}
