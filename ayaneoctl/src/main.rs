/* ayaneoctl CLI: clap-driven client that talks to ayaneo-platformd over DBus to show the board
 * state and read or change the LED color, brightness, suspend mode and bypass charging. */
mod dbus_client;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use dbus_client::PlatformClient;

/// ayaneoctl: control AYANEO handheld lighting and charging via ayaneo-platformd.
#[derive(Parser)]
#[command(name = "ayaneoctl", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the detected model, daemon state and current settings.
    Info,

    /// Get or set the LED color.
    Color {
        /// New color as RRGGBB hex (e.g. ff0080). Omit to print the current one.
        color: Option<String>,
    },

    /// Get or set the LED brightness.
    Brightness {
        /// New brightness (0-255). Omit to print the current one.
        value: Option<u32>,
    },

    /// Get or set the per-channel LED intensity.
    Intensity {
        /// Red, green and blue intensity (0-255 each). Omit to print.
        #[arg(num_args = 3, value_names = ["R", "G", "B"])]
        rgb: Option<Vec<u32>>,
    },

    /// Get or set what the lights do while the system sleeps.
    #[command(name = "suspend-mode")]
    SuspendMode {
        /// One of: oem, keep, off. Omit to print the current one.
        mode: Option<String>,
    },

    /// Get or set the bypass charging behaviour.
    Charge {
        /// One of: auto, inhibit. Omit to print the current one.
        behaviour: Option<String>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = PlatformClient::connect()
        .await
        .context("Failed to connect to ayaneo-platformd on org.ayaneo.platform1")?;

    match cli.command {
        Commands::Info => cmd_info(&client).await,
        Commands::Color { color } => cmd_color(&client, color.as_deref()).await,
        Commands::Brightness { value } => cmd_brightness(&client, value).await,
        Commands::Intensity { rgb } => cmd_intensity(&client, rgb.as_deref()).await,
        Commands::SuspendMode { mode } => cmd_suspend_mode(&client, mode.as_deref()).await,
        Commands::Charge { behaviour } => cmd_charge(&client, behaviour.as_deref()).await,
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Parse a hex color string like "ff0000" or "#ff0000" into (r, g, b).
fn parse_hex_color(s: &str) -> Result<(u32, u32, u32)> {
    let s = s.strip_prefix('#').unwrap_or(s);
    anyhow::ensure!(
        s.len() == 6 && s.is_ascii(),
        "Color must be a 6-digit hex string (e.g. ff0000)"
    );
    let r = u32::from_str_radix(&s[0..2], 16).context("Invalid red component")?;
    let g = u32::from_str_radix(&s[2..4], 16).context("Invalid green component")?;
    let b = u32::from_str_radix(&s[4..6], 16).context("Invalid blue component")?;
    Ok((r, g, b))
}

fn hex(rgb: (u32, u32, u32)) -> String {
    format!("#{:02x}{:02x}{:02x}", rgb.0, rgb.1, rgb.2)
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn cmd_info(client: &PlatformClient) -> Result<()> {
    let api = client.get_api_version().await?;
    let model = client.get_model().await?;
    let state = client.get_state().await?;
    let (applied, failed) = client.get_cascade_counts().await?;
    let color = client.get_led_color().await?;
    let brightness = client.get_led_brightness().await?;
    let suspend_mode = client.get_suspend_mode().await?;

    println!("Model:           {}", model);
    println!("State:           {}", state);
    println!("API version:     {}", api);
    println!("Color:           {}", hex(color));
    println!("Brightness:      {}", brightness);
    println!("Suspend mode:    {}", suspend_mode);
    println!("Cascades:        {} applied, {} failed", applied, failed);

    if client.get_charge_available().await? {
        let requested = client.get_charge_behaviour().await?;
        let applied = client.get_applied_charge_behaviour().await?;
        println!("Bypass charging: {} (hardware: {})", requested, applied);
    } else {
        println!("Bypass charging: unavailable");
    }
    Ok(())
}

async fn cmd_color(client: &PlatformClient, color: Option<&str>) -> Result<()> {
    let Some(color) = color else {
        println!("{}", hex(client.get_led_color().await?));
        return Ok(());
    };
    let (r, g, b) = parse_hex_color(color)?;
    client.set_led_color(r, g, b).await?;
    println!("Color set to {}.", hex((r, g, b)));
    Ok(())
}

async fn cmd_brightness(client: &PlatformClient, value: Option<u32>) -> Result<()> {
    let Some(value) = value else {
        println!("{}", client.get_led_brightness().await?);
        return Ok(());
    };
    client.set_led_brightness(value).await?;
    println!("Brightness set to {}.", value);
    Ok(())
}

async fn cmd_intensity(client: &PlatformClient, rgb: Option<&[u32]>) -> Result<()> {
    let Some(rgb) = rgb else {
        let (r, g, b) = client.get_led_intensity().await?;
        println!("{} {} {}", r, g, b);
        return Ok(());
    };
    let [r, g, b] = rgb else {
        anyhow::bail!("Intensity needs exactly three values");
    };
    client.set_led_intensity(*r, *g, *b).await?;
    println!("Intensity set to {} {} {}.", r, g, b);
    Ok(())
}

async fn cmd_suspend_mode(client: &PlatformClient, mode: Option<&str>) -> Result<()> {
    let Some(mode) = mode else {
        let current = client.get_suspend_mode().await?;
        let modes = client.get_suspend_modes().await?;
        println!("{} (supported: {})", current, modes.join(", "));
        return Ok(());
    };
    client.set_suspend_mode(mode).await?;
    println!("Suspend mode set to {}.", mode);
    Ok(())
}

async fn cmd_charge(client: &PlatformClient, behaviour: Option<&str>) -> Result<()> {
    let Some(behaviour) = behaviour else {
        if !client.get_charge_available().await? {
            println!("unavailable");
            return Ok(());
        }
        let requested = client.get_charge_behaviour().await?;
        let applied = client.get_applied_charge_behaviour().await?;
        println!("{} (hardware: {})", requested, applied);
        return Ok(());
    };
    client.set_charge_behaviour(behaviour).await?;
    println!("Bypass charging set to {}.", behaviour);
    Ok(())
}
