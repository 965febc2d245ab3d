use clap::Parser;
use rustcec_client::{
    CecControllerBuilder, ClientError, DiscoveryConfig, HdmiDeviceInfo, LocalDevice,
};
use rustcec_core::types::LogicalAddress;
use rustcec_link::capture::CapturingLink;
use rustcec_link::{CecLink, VirtualBus};
use rustcec_tools::BusSpec;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "cec-discover")]
struct Args {
    /// JSON description of the simulated bus.
    #[arg(long)]
    bus: PathBuf,
    /// Settling delay between polling and the first query.
    #[arg(long, default_value_t = 0)]
    delay_ms: u64,
    /// How long to wait for each answer.
    #[arg(long, default_value_t = 2000)]
    timeout_ms: u64,
    #[arg(long, default_value_t = 5)]
    retries: u32,
    /// Write the TV's bus traffic to this file.
    #[arg(long)]
    capture: Option<PathBuf>,
    #[arg(long)]
    json: bool,
}

async fn discover<L: CecLink + 'static>(
    link: L,
    config: DiscoveryConfig,
) -> Result<Vec<HdmiDeviceInfo>, ClientError> {
    let controller = CecControllerBuilder::new(link, LocalDevice::tv()).build();
    let devices = controller.discover_devices(config).await;
    controller.shutdown();
    devices
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();
    let spec = BusSpec::load(&args.bus)?;
    let bus = VirtualBus::new();
    // Attach the TV first so it hears the devices announce themselves.
    let link = bus.attach(LogicalAddress::Tv).await?;
    let _devices = spec.spawn(&bus).await?;

    let config = DiscoveryConfig::default()
        .with_delay_period(Duration::from_millis(args.delay_ms))
        .with_query_timeout(Duration::from_millis(args.timeout_ms))
        .with_retry_limit(args.retries);
    let devices = match &args.capture {
        Some(path) => discover(CapturingLink::to_file(link, path)?, config).await?,
        None => discover(link, config).await?,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
    } else if devices.is_empty() {
        println!("no devices found");
    } else {
        for device in &devices {
            println!("{device}");
        }
    }
    Ok(())
}
