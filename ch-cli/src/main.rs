//! Chassis CLI
//!
//! Command-line front end over the synchronization core: inspect and change
//! the platform profile, battery charge limit, GPU mode and lighting, or
//! stream the event feed the GUI would consume.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::debug;

use ch_bus::{default_socket_dir, ExecTransport, SocketTransport, Transport};
use ch_core::constants::{glyph, services};
use ch_core::controllers::{
    BatteryController, GlyphController, GpuController, LampController, PerformanceController,
};
use ch_core::{
    glyph_command_map, GfxClient, GfxEvent, LampMode, MonitorEvent, PlatformClient, PlatformEvent,
    ServiceMonitor,
};

/// How long one-shot commands wait for fetches to settle
const SETTLE_DELAY: Duration = Duration::from_millis(500);

/// How long a set command waits for its confirmation or error event
const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "chassis")]
#[command(version)]
#[command(about = "Chassis - laptop control panel CLI")]
#[command(long_about = "Chassis - laptop control panel CLI

Talks to the platform/power daemon (powerd) and the graphics-mode daemon
(gfxd), mirroring their state locally and forwarding commands.

EXAMPLES:
    chassis status                     Show daemon connectivity and cached state
    chassis profile set turbo          Switch the platform profile
    chassis charge-limit set 80        Stop charging at 80%
    chassis gpu set dedicated          Request the MUX mode (needs logout)
    chassis lamp brightness 2          Set keyboard lamp brightness
    chassis glyph mode Pulse           Set the lid glyph animation
    chassis watch                      Stream state-change events

ENVIRONMENT VARIABLES:
    RUST_LOG=debug         Enable debug logging")]
#[command(propagate_version = true)]
struct Cli {
    /// Directory holding the daemon sockets (default: $XDG_RUNTIME_DIR/chassis)
    #[arg(long)]
    socket_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show daemon connectivity and cached state
    Status,

    /// Platform performance profile
    #[command(subcommand)]
    Profile(ProfileCommands),

    /// Battery charge limit
    #[command(subcommand, name = "charge-limit")]
    ChargeLimit(ChargeCommands),

    /// GPU mode switching
    #[command(subcommand)]
    Gpu(GpuCommands),

    /// Keyboard lamp LEDs
    #[command(subcommand)]
    Lamp(LampCommands),

    /// Lid glyph display
    #[command(subcommand)]
    Glyph(GlyphCommands),

    /// Show sysfs sensor readings
    Sensors,

    /// Stream state-change events until interrupted
    Watch,
}

#[derive(Subcommand)]
enum ProfileCommands {
    /// Show the current profile
    Get,
    /// Set the profile (silent | balanced | turbo, or 0-2)
    Set { profile: String },
}

#[derive(Subcommand)]
enum ChargeCommands {
    /// Show the current charge limit
    Get,
    /// Set the charge limit in percent (20-100)
    Set { limit: u8 },
}

#[derive(Subcommand)]
enum GpuCommands {
    /// Show mode, pending switch and dGPU power state
    Status,
    /// List supported modes
    Modes,
    /// Request a mode switch (eco | hybrid | dedicated | vfio | egpu)
    Set { mode: String },
}

#[derive(Subcommand)]
enum LampCommands {
    /// Set lamp brightness (0-3)
    Brightness { level: u32 },
    /// Apply an effect mode
    Effect { mode: String },
}

#[derive(Subcommand)]
enum GlyphCommands {
    /// Enable the glyph display
    Enable,
    /// Disable the glyph display
    Disable,
    /// Set glyph brightness (0-255)
    Brightness { level: u8 },
    /// Set the glyph animation mode
    Mode { mode: String },
    /// List available animation modes
    Modes,
}

/// Assembled client stack
struct Panel {
    monitor: ServiceMonitor,
    platform: Arc<PlatformClient>,
    gfx: Arc<GfxClient>,
}

impl Panel {
    async fn build(socket_dir: PathBuf) -> Self {
        debug!(dir = ?socket_dir, "Connecting to daemon sockets");
        let transport: Arc<dyn Transport> =
            Arc::new(SocketTransport::new(socket_dir, services::WATCHED));
        let monitor = ServiceMonitor::spawn(transport.clone(), services::WATCHED).await;
        let platform = Arc::new(PlatformClient::spawn(transport.clone()).await);
        let gfx = Arc::new(GfxClient::spawn(transport).await);
        Self {
            monitor,
            platform,
            gfx,
        }
    }

    /// Give in-flight fetches a moment to land before reading the cache
    async fn settle(&self) {
        tokio::time::sleep(SETTLE_DELAY).await;
    }
}

fn glyph_transport() -> Arc<dyn Transport> {
    Arc::new(ExecTransport::new(
        glyph::PROGRAM,
        &["--help"],
        glyph_command_map,
    ))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let socket_dir = cli.socket_dir.unwrap_or_else(default_socket_dir);

    match cli.command {
        Commands::Status => cmd_status(socket_dir).await,
        Commands::Profile(cmd) => cmd_profile(socket_dir, cmd).await,
        Commands::ChargeLimit(cmd) => cmd_charge(socket_dir, cmd).await,
        Commands::Gpu(cmd) => cmd_gpu(socket_dir, cmd).await,
        Commands::Lamp(cmd) => cmd_lamp(socket_dir, cmd).await,
        Commands::Glyph(cmd) => cmd_glyph(cmd).await,
        Commands::Sensors => cmd_sensors(),
        Commands::Watch => cmd_watch(socket_dir).await,
    }
}

async fn cmd_status(socket_dir: PathBuf) -> anyhow::Result<()> {
    let panel = Panel::build(socket_dir).await;
    panel.settle().await;

    println!("Connectivity: {}", panel.monitor.connection_status().await);

    let platform = panel.platform.snapshot().await;
    if platform.available() {
        let profile = platform
            .profile()
            .map(PerformanceController::profile_name)
            .unwrap_or("Unknown");
        println!("Profile:      {}", profile);
        match platform.charge_limit() {
            Some(limit) => println!("Charge limit: {}%", limit),
            None => println!("Charge limit: unknown"),
        }
        match platform.lamp_brightness() {
            Some(level) => println!("Lamp:         brightness {}", level),
            None => println!("Lamp:         unavailable"),
        }
    } else {
        println!("Platform:     unavailable");
    }

    let gfx = panel.gfx.snapshot().await;
    if gfx.available() {
        print!("GPU mode:     {}", gfx.current_mode().display_name());
        match gfx.pending_mode() {
            Some(pending) => println!(" (pending: {}, logout required)", pending.display_name()),
            None => println!(),
        }
        println!("dGPU power:   {}", gfx.power().display_name());
    } else {
        println!("GPU control:  unavailable");
    }

    let glyph = GlyphController::new(glyph_transport()).await;
    println!(
        "Glyph:        {}",
        if glyph.available() { "available" } else { "unavailable" }
    );
    Ok(())
}

async fn cmd_profile(socket_dir: PathBuf, cmd: ProfileCommands) -> anyhow::Result<()> {
    let panel = Panel::build(socket_dir).await;
    let controller = PerformanceController::new(panel.platform.clone());

    match cmd {
        ProfileCommands::Get => {
            panel.settle().await;
            println!("{}", controller.current_profile_name().await);
        }
        ProfileCommands::Set { profile } => {
            let profile = parse_profile(&profile)
                .with_context(|| format!("unknown profile '{}'", profile))?;
            panel.settle().await;
            if controller.current_profile().await == Some(profile) {
                println!("Profile already {}", PerformanceController::profile_name(profile));
                return Ok(());
            }
            let mut events = controller.subscribe();
            controller.set_profile(profile).await?;
            await_platform_outcome(&mut events, |event| {
                matches!(event, PlatformEvent::ProfileChanged(p) if *p == profile)
            })
            .await?;
            println!("Profile set to {}", PerformanceController::profile_name(profile));
        }
    }
    Ok(())
}

async fn cmd_charge(socket_dir: PathBuf, cmd: ChargeCommands) -> anyhow::Result<()> {
    let panel = Panel::build(socket_dir).await;
    let controller = BatteryController::new(panel.platform.clone(), std::path::Path::new("/sys"));

    match cmd {
        ChargeCommands::Get => {
            panel.settle().await;
            match controller.charge_limit().await {
                Some(limit) => println!("{}%", limit),
                None => println!("unknown"),
            }
        }
        ChargeCommands::Set { limit } => {
            panel.settle().await;
            if controller.charge_limit().await == Some(limit) {
                println!("Charge limit already {}%", limit);
                return Ok(());
            }
            let mut events = controller.subscribe();
            controller.set_charge_limit(limit).await?;
            await_platform_outcome(&mut events, |event| {
                matches!(event, PlatformEvent::ChargeLimitChanged(l) if *l == limit)
            })
            .await?;
            println!("Charge limit set to {}%", limit);
        }
    }
    Ok(())
}

async fn cmd_gpu(socket_dir: PathBuf, cmd: GpuCommands) -> anyhow::Result<()> {
    let panel = Panel::build(socket_dir).await;
    let controller = GpuController::new(panel.gfx.clone());

    match cmd {
        GpuCommands::Status => {
            panel.settle().await;
            let mode = controller.current_mode().await;
            println!("Mode:    {} - {}", mode.display_name(), mode.description());
            if let Some(pending) = controller.pending_mode().await {
                println!("Pending: {} (logout required)", pending.display_name());
            }
            println!("Power:   {}", controller.power().await.display_name());
        }
        GpuCommands::Modes => {
            panel.settle().await;
            let current = controller.current_mode().await;
            for mode in controller.supported_modes().await {
                let restart = if controller.requires_restart(mode).await {
                    " (logout required)"
                } else {
                    ""
                };
                let marker = if mode == current { "*" } else { " " };
                println!("{} {}{} - {}", marker, mode.display_name(), restart, mode.description());
            }
        }
        GpuCommands::Set { mode } => {
            let target = GpuController::parse_mode(&mode)
                .with_context(|| format!("unknown GPU mode '{}'", mode))?;
            panel.settle().await;
            let mut events = controller.subscribe();
            controller.set_mode(target).await?;

            let outcome = tokio::time::timeout(Duration::from_secs(10), async {
                loop {
                    match events.recv().await {
                        Ok(GfxEvent::ModeChanged(mode)) if mode == target => {
                            break Ok(format!("GPU mode set to {}", mode.display_name()));
                        }
                        Ok(GfxEvent::RestartRequired { display_name, .. }) => {
                            break Ok(format!(
                                "Switch to {} accepted - log out to apply it",
                                display_name
                            ));
                        }
                        Ok(GfxEvent::Error(message)) => break Err(anyhow::anyhow!(message)),
                        Ok(_) => continue,
                        Err(e) => break Err(anyhow::anyhow!("event stream closed: {}", e)),
                    }
                }
            })
            .await
            .context("timed out waiting for the daemon")??;
            println!("{}", outcome);
        }
    }
    Ok(())
}

async fn cmd_lamp(socket_dir: PathBuf, cmd: LampCommands) -> anyhow::Result<()> {
    let panel = Panel::build(socket_dir).await;
    panel.settle().await;
    let mut controller = LampController::new(panel.platform.clone());

    match cmd {
        LampCommands::Brightness { level } => {
            if controller.brightness().await == Some(level) {
                println!("Lamp brightness already {}", level);
                return Ok(());
            }
            let mut events = controller.subscribe();
            controller.set_brightness(level).await?;
            await_platform_outcome(&mut events, |event| {
                matches!(event, PlatformEvent::LampBrightnessChanged(l) if *l == level)
            })
            .await?;
            println!("Lamp brightness set to {}", level);
        }
        LampCommands::Effect { mode } => {
            let mode = parse_lamp_mode(&mode)
                .with_context(|| format!("unknown lamp effect '{}'", mode))?;
            controller.set_mode(mode);
            controller.apply_effect().await?;
            println!("Lamp effect set to {}", mode.name());
        }
    }
    Ok(())
}

async fn cmd_glyph(cmd: GlyphCommands) -> anyhow::Result<()> {
    let mut controller = GlyphController::new(glyph_transport()).await;

    match cmd {
        GlyphCommands::Enable => {
            controller.set_enabled(true).await?;
            println!("Glyph display enabled");
        }
        GlyphCommands::Disable => {
            controller.set_enabled(false).await?;
            println!("Glyph display disabled");
        }
        GlyphCommands::Brightness { level } => {
            controller.set_brightness(level).await?;
            println!("Glyph brightness set to {}", level);
        }
        GlyphCommands::Mode { mode } => {
            controller.set_mode(&mode).await?;
            println!("Glyph mode set to {}", mode);
        }
        GlyphCommands::Modes => {
            for mode in ch_core::GLYPH_MODES {
                println!("{}", mode);
            }
        }
    }
    Ok(())
}

fn cmd_sensors() -> anyhow::Result<()> {
    let root = std::path::Path::new("/sys");
    let paths = ch_sensors::discover(root);

    match paths.cpu_temp.as_deref().and_then(ch_sensors::read_temperature_c) {
        Some(temp) => println!("CPU temp:   {}°C", temp),
        None => println!("CPU temp:   unsupported"),
    }
    match paths.gpu_temp.as_deref().and_then(ch_sensors::read_temperature_c) {
        Some(temp) => println!("GPU temp:   {}°C", temp),
        None => println!("GPU temp:   unsupported"),
    }
    match paths.cpu_fan.as_deref().and_then(ch_sensors::read_fan_rpm) {
        Some(rpm) => println!("CPU fan:    {} RPM", rpm),
        None => println!("CPU fan:    unsupported"),
    }
    match paths.gpu_fan.as_deref().and_then(ch_sensors::read_fan_rpm) {
        Some(rpm) => println!("GPU fan:    {} RPM", rpm),
        None => println!("GPU fan:    unsupported"),
    }

    let apu_power = paths.apu_power.as_deref().and_then(ch_sensors::read_power_w);
    match apu_power {
        Some(power) => println!("APU power:  {:.1} W", power),
        None => println!("APU power:  unsupported"),
    }

    let battery = ch_sensors::read_battery_status(&ch_sensors::BatteryPaths::new(root));
    if let Some(capacity) = battery.capacity_percent {
        let state = if battery.charging {
            "charging"
        } else if battery.plugged_in {
            "plugged in"
        } else {
            "discharging"
        };
        println!("Battery:    {}% ({})", capacity, state);
        if let Some(draw) = battery.power_draw_w {
            println!("Draw:       {:.1} W", draw);
        }
        if let Some(time) = &battery.time_remaining {
            println!("Time:       {}", time);
        }
    } else {
        println!("Battery:    unsupported");
    }

    let brightness = paths.backlight.as_ref().and_then(|b| b.read_percent());
    if let Some(percent) = brightness {
        let display_power = ch_sensors::estimate_display_power_w(percent);
        let total = ch_sensors::estimate_system_power_w(
            !battery.plugged_in,
            battery.power_draw_w,
            apu_power,
            display_power,
        );
        println!("Display:    {}% (≈{:.1} W)", percent, display_power);
        println!("System:     ≈{:.1} W", total);
    }
    Ok(())
}

async fn cmd_watch(socket_dir: PathBuf) -> anyhow::Result<()> {
    let panel = Panel::build(socket_dir).await;
    let mut monitor_events = panel.monitor.subscribe();
    let mut platform_events = panel.platform.subscribe();
    let mut gfx_events = panel.gfx.subscribe();

    println!("Watching for events, Ctrl-C to stop");
    loop {
        tokio::select! {
            Ok(event) = monitor_events.recv() => match event {
                MonitorEvent::ReachabilityChanged { service, reachable } => {
                    println!("[monitor] {} {}", service, if reachable { "up" } else { "down" });
                    if reachable {
                        // A daemon came back: re-pull everything it owns
                        panel.platform.refresh();
                        panel.gfx.refresh();
                    }
                }
                MonitorEvent::StatusChanged(status) => println!("[monitor] {}", status),
            },
            Ok(event) = platform_events.recv() => match event {
                PlatformEvent::AvailableChanged(up) => println!("[platform] available: {}", up),
                PlatformEvent::ProfileChanged(profile) => println!(
                    "[platform] profile: {}",
                    PerformanceController::profile_name(profile)
                ),
                PlatformEvent::ChargeLimitChanged(limit) => {
                    println!("[platform] charge limit: {}%", limit)
                }
                PlatformEvent::LampBrightnessChanged(level) => {
                    println!("[platform] lamp brightness: {}", level)
                }
                PlatformEvent::Error(message) => println!("[platform] error: {}", message),
            },
            Ok(event) = gfx_events.recv() => match event {
                GfxEvent::AvailableChanged(up) => println!("[gfx] available: {}", up),
                GfxEvent::ModeChanged(mode) => println!("[gfx] mode: {}", mode.display_name()),
                GfxEvent::PendingChanged(pending) => println!(
                    "[gfx] pending: {}",
                    pending.map(|m| m.display_name()).unwrap_or("none")
                ),
                GfxEvent::SwitchPending(pending) => println!("[gfx] switch pending: {}", pending),
                GfxEvent::RestartRequired { display_name, .. } => {
                    println!("[gfx] log out to finish switching to {}", display_name)
                }
                GfxEvent::SwitchConfirmed(mode) => {
                    println!("[gfx] switch confirmed: {}", mode.display_name())
                }
                GfxEvent::PowerChanged(power) => println!("[gfx] dGPU power: {}", power.display_name()),
                GfxEvent::SupportedModesChanged(modes) => println!(
                    "[gfx] supported: {}",
                    modes.iter().map(|m| m.display_name()).collect::<Vec<_>>().join(", ")
                ),
                GfxEvent::Error(message) => println!("[gfx] error: {}", message),
            },
            _ = tokio::signal::ctrl_c() => {
                println!("Stopped");
                return Ok(());
            }
        }
    }
}

// ============================================================================
// Argument Parsing
// ============================================================================

fn parse_profile(input: &str) -> Option<u32> {
    match input.to_ascii_lowercase().as_str() {
        "silent" | "quiet" => Some(0),
        "balanced" => Some(1),
        "turbo" | "performance" => Some(2),
        other => other.parse().ok(),
    }
}

fn parse_lamp_mode(input: &str) -> Option<LampMode> {
    ch_core::controllers::lamp::ALL_LAMP_MODES
        .iter()
        .copied()
        .find(|mode| mode.name().eq_ignore_ascii_case(input))
}

/// Wait for a platform event satisfying `accept`, failing on an error event
async fn await_platform_outcome<F>(
    events: &mut tokio::sync::broadcast::Receiver<PlatformEvent>,
    accept: F,
) -> anyhow::Result<()>
where
    F: Fn(&PlatformEvent) -> bool,
{
    tokio::time::timeout(COMMAND_TIMEOUT, async {
        loop {
            match events.recv().await {
                Ok(event) if accept(&event) => break Ok(()),
                Ok(PlatformEvent::Error(message)) => break Err(anyhow::anyhow!(message)),
                Ok(_) => continue,
                Err(e) => break Err(anyhow::anyhow!("event stream closed: {}", e)),
            }
        }
    })
    .await
    .context("timed out waiting for the daemon")?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_profile() {
        assert_eq!(parse_profile("silent"), Some(0));
        assert_eq!(parse_profile("Balanced"), Some(1));
        assert_eq!(parse_profile("TURBO"), Some(2));
        assert_eq!(parse_profile("2"), Some(2));
        assert_eq!(parse_profile("ludicrous"), None);
    }

    #[test]
    fn test_parse_lamp_mode() {
        assert_eq!(parse_lamp_mode("pulse"), Some(LampMode::Pulse));
        assert_eq!(parse_lamp_mode("Rainbow"), Some(LampMode::Rainbow));
        assert_eq!(parse_lamp_mode("disco"), None);
    }

    #[test]
    fn test_cli_parses() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
