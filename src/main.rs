use std::net::IpAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use jawbone::bridge::Supervisor;
use jawbone::config::{
    ActuatorConfig, AudioConfig, Config, ControlConfig, RealtimeConfig, TransportConfig,
};
use jawbone::control::{ControlChannel, ControlPublisher};

/// Jawbone - audio bridge between a UDP hardware endpoint and a realtime
/// speech service
#[derive(Parser)]
#[command(name = "jawbone", version, about)]
struct Cli {
    /// WebSocket URL of the realtime speech service
    #[arg(
        long,
        env = "JAWBONE_REALTIME_URL",
        default_value = "wss://api.openai.com/v1/realtime?model=gpt-realtime"
    )]
    realtime_url: String,

    /// Bearer token for the realtime service
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Voice preset for synthesized speech
    #[arg(long, env = "JAWBONE_VOICE", default_value = "ash")]
    voice: String,

    /// File containing system instructions for the session
    #[arg(long, env = "JAWBONE_INSTRUCTIONS")]
    instructions: Option<PathBuf>,

    /// UDP port to listen on for microphone frames
    #[arg(long, env = "JAWBONE_LISTEN_PORT", default_value = "5001")]
    listen_port: u16,

    /// UDP port on the device that receives speaker frames
    #[arg(long, env = "JAWBONE_DEVICE_PORT", default_value = "5002")]
    device_port: u16,

    /// Device IP address; omit to learn it from the first inbound datagram
    #[arg(long, env = "JAWBONE_DEVICE_IP")]
    device_ip: Option<IpAddr>,

    /// Device sample rate in Hz
    #[arg(long, default_value = "16000")]
    device_rate: u32,

    /// Cloud sample rate in Hz
    #[arg(long, default_value = "24000")]
    cloud_rate: u32,

    /// Device frame duration in milliseconds
    #[arg(long, default_value = "40")]
    frame_ms: u32,

    /// MQTT broker host; omit to disable the control channel
    #[arg(long, env = "JAWBONE_MQTT_HOST")]
    mqtt_host: Option<String>,

    /// MQTT broker port
    #[arg(long, env = "JAWBONE_MQTT_PORT", default_value = "1883")]
    mqtt_port: u16,

    /// Topic the actuator openness is published on
    #[arg(long, default_value = "prop/jaw")]
    openness_topic: String,

    /// Topic to receive volume commands on
    #[arg(long, default_value = "prop/volume")]
    volume_topic: String,

    /// Topic volume commands are forwarded to for the device
    #[arg(long, default_value = "device/volume")]
    device_volume_topic: String,

    /// Recompute actuator openness every Nth frame
    #[arg(long, default_value = "6")]
    actuator_stride: u64,

    /// Mean absolute amplitude that maps to full jaw deflection
    #[arg(long, default_value = "8000")]
    actuator_divisor: f32,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info,jawbone=info",
        1 => "info,jawbone=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = build_config(cli)?;

    tracing::info!(
        listen_port = config.transport.listen_port,
        device_port = config.transport.device_port,
        device_rate = config.audio.device_rate,
        cloud_rate = config.audio.cloud_rate,
        "starting jawbone bridge"
    );

    // the control channel is process-wide: the broker connection outlives
    // any one cloud session
    let control = if config.control.broker_host.is_some() {
        ControlChannel::connect(&config.control)?.publisher()
    } else {
        tracing::warn!("control channel disabled, actuator output unavailable");
        ControlPublisher::disabled()
    };

    let supervisor = Supervisor::new(config, control);

    tokio::select! {
        result = supervisor.run() => Ok(result?),
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
            Ok(())
        }
    }
}

/// Assemble the configuration, failing on anything unrecoverable
fn build_config(cli: Cli) -> anyhow::Result<Config> {
    let api_key = cli
        .api_key
        .filter(|k| !k.is_empty())
        .ok_or_else(|| anyhow::anyhow!("missing API key: set OPENAI_API_KEY or --api-key"))?;

    let instructions = match &cli.instructions {
        Some(path) => std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("cannot read instructions file {}: {e}", path.display()))?,
        None => String::new(),
    };

    Ok(Config {
        audio: AudioConfig {
            device_rate: cli.device_rate,
            cloud_rate: cli.cloud_rate,
            frame_ms: cli.frame_ms,
            ..AudioConfig::default()
        },
        transport: TransportConfig {
            listen_port: cli.listen_port,
            device_port: cli.device_port,
            device_ip: cli.device_ip,
            ..TransportConfig::default()
        },
        realtime: RealtimeConfig {
            url: cli.realtime_url,
            api_key,
            voice: cli.voice,
            instructions,
            max_backoff: Duration::from_secs(60),
            ..RealtimeConfig::default()
        },
        control: ControlConfig {
            broker_host: cli.mqtt_host,
            broker_port: cli.mqtt_port,
            openness_topic: cli.openness_topic,
            volume_topic: cli.volume_topic,
            device_volume_topic: cli.device_volume_topic,
            ..ControlConfig::default()
        },
        actuator: ActuatorConfig {
            stride: cli.actuator_stride,
            divisor: cli.actuator_divisor,
            ..ActuatorConfig::default()
        },
    })
}
