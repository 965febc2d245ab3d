use clap::Parser;
use rustcec_client::{ArcConfig, CecControllerBuilder, ControlResult, LocalDevice};
use rustcec_core::types::LogicalAddress;
use rustcec_link::VirtualBus;
use rustcec_tools::{parse_logical_address, ArcDirectionArg, BusSpec};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "cec-arc")]
struct Args {
    /// JSON description of the simulated bus.
    #[arg(long)]
    bus: PathBuf,
    #[arg(value_enum)]
    direction: ArcDirectionArg,
    #[arg(long, default_value = "5", value_parser = parse_logical_address)]
    avr: LogicalAddress,
    #[arg(long, default_value_t = 2000)]
    timeout_ms: u64,
    /// Re-sends after a timeout.
    #[arg(long, default_value_t = 0)]
    retries: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();
    let spec = BusSpec::load(&args.bus)?;
    let bus = VirtualBus::new();
    let _devices = spec.spawn(&bus).await?;

    let link = bus.attach(LogicalAddress::Tv).await?;
    let controller = CecControllerBuilder::new(link, LocalDevice::tv()).build();
    let config = ArcConfig::default()
        .with_response_timeout(Duration::from_millis(args.timeout_ms))
        .with_request_retries(args.retries);
    let result = controller
        .request_arc(args.direction.into_direction(), args.avr, config)
        .await?;
    let enabled = controller.arc_enabled().await?;
    controller.shutdown();

    match result {
        ControlResult::Success => println!("{:?} confirmed by {}", args.direction, args.avr),
        ControlResult::TargetNotAvailable => {
            println!("{:?} failed: {} not available", args.direction, args.avr)
        }
    }
    println!("arc enabled: {enabled}");
    Ok(())
}
