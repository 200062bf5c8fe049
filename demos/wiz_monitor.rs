//! Watch Wiz lights appear on the network and follow their state.
//!
//! Optionally paints every discovered color bulb with a hue/saturation or a
//! raw RGBW color.
//!
//! Run with: RUST_LOG=wiz_lan=debug cargo run --example wiz_monitor -- --help

use std::net::Ipv4Addr;
use std::time::Duration;

use clap::Parser;
use futures::StreamExt;
use futures::channel::mpsc::UnboundedReceiver;
use wiz_lan::translate::BridgeAttributes;
use wiz_lan::{
    ColorRGBW, Feature, HueSaturation, LanComm, LanEvent, LanOptions, Payload, StartOptions,
    runtime,
};

#[derive(Parser)]
#[command(name = "wiz-monitor")]
#[command(about = "Discover Wiz lights and print their state changes", long_about = None)]
struct Cli {
    /// Local IPv4 address to announce (defaults to the first interface)
    #[arg(short, long)]
    bind_to: Option<Ipv4Addr>,

    /// Hue (0-254) to set on every discovered color device
    #[arg(long, requires = "saturation", conflicts_with = "color")]
    hue: Option<u8>,

    /// Saturation (0-254) to set on every discovered color device
    #[arg(long, requires = "hue")]
    saturation: Option<u8>,

    /// RGBW color to set on every discovered color device (e.g., "255,0,0,0")
    #[arg(long)]
    color: Option<ColorRGBW>,

    /// Stop after this many seconds instead of running until Ctrl-C
    #[arg(short, long)]
    duration: Option<u64>,

    /// Print events as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();

    let color = match (cli.hue, cli.saturation, cli.color) {
        (Some(hue), Some(saturation), _) => Some(
            HueSaturation::create(hue, saturation)
                .ok_or("hue and saturation must be 0-254")?
                .to_rgbw(),
        ),
        (_, _, color) => color,
    };

    let lan = LanComm::new(LanOptions {
        bind_to: cli.bind_to,
        ..LanOptions::default()
    })?;
    let identity = lan.identity();
    println!(
        "Announcing as {} ({})",
        identity.address, identity.hardware_id
    );

    let events = lan.subscribe();
    lan.start(StartOptions::default()).await;

    let watching = follow(&lan, events, color, cli.json);
    match cli.duration {
        Some(secs) => {
            if runtime::timeout(Duration::from_secs(secs), watching)
                .await
                .is_err()
            {
                lan.end();
            }
        }
        None => watching.await,
    }

    let diagnostics = lan.diagnostics();
    println!(
        "Saw {} device(s), {} synced",
        diagnostics.known_devices, diagnostics.synced_devices
    );
    Ok(())
}

async fn follow(
    lan: &LanComm,
    mut events: UnboundedReceiver<LanEvent>,
    color: Option<ColorRGBW>,
    json: bool,
) {
    while let Some(event) = events.next().await {
        match event {
            LanEvent::Discover {
                hardware_id,
                device,
            } => {
                if json {
                    println!("{}", serde_json::json!(device));
                } else {
                    println!(
                        "+ {} {:15} {} [{}]",
                        hardware_id,
                        device.address().to_string(),
                        device.name().unwrap_or(device.module_name()),
                        device
                            .features()
                            .iter()
                            .map(ToString::to_string)
                            .collect::<Vec<_>>()
                            .join(", ")
                    );
                }

                if let Some(color) = &color {
                    if device.profile().supports(Feature::HueSaturation) {
                        lan.set_state(&hardware_id, &Payload::from(color));
                    }
                }
            }
            LanEvent::StateChange {
                hardware_id,
                changes,
                ..
            } => {
                if json {
                    println!(
                        "{}",
                        serde_json::json!({"hardwareId": hardware_id, "changes": changes})
                    );
                } else {
                    let attrs = BridgeAttributes::from_state(&changes);
                    println!("~ {} {:?}", hardware_id, attrs);
                }
            }
            LanEvent::End => break,
        }
    }
}
