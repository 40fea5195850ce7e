mod console;
mod domain;
mod infrastructure;

use clap::Parser;
use domain::models::{AddressPolicy, BeaconEvent, DeviceAddress};
use domain::settings::{BeaconSettings, SettingsService};
use infrastructure::bluetooth::controller::BeaconController;
use infrastructure::bluetooth::dry_run::DryRunTransport;
use infrastructure::bluetooth::transport::BeaconTransport;
use infrastructure::bluetooth::BeaconService;
use infrastructure::logging::init_logger;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Console BLE beacon with counter-driven payload fuzzing
#[derive(Debug, Parser)]
#[command(name = "axonapotamus", version, long_about = None)]
struct Cli {
    /// Log frames instead of putting them on air
    #[arg(short, long)]
    dry_run: bool,

    /// Advertise from the host adapter address instead of a random one
    #[arg(short = 'a', long)]
    host_address: bool,

    /// Print every advertisement pulse
    #[arg(short = 'p', long = "pulses")]
    verbose_pulses: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = SettingsService::new()?;
    let _guard = init_logger(&settings.get().log_settings)?;
    info!("Starting Axonapotamus");

    if let Some(e) = settings.load_error() {
        warn!(
            "Ignoring unreadable settings at {}: {}",
            settings.path().display(),
            e
        );
    }

    if !settings.path().exists() {
        settings.save()?;
        info!("Wrote default settings to {}", settings.path().display());
    }
    if cli.host_address {
        settings.get_mut().beacon.address_policy = AddressPolicy::HostHardwareAddress;
    }
    let beacon_settings = settings.get().beacon.clone();

    if cli.dry_run {
        return run(dry_run_transport(), beacon_settings, cli.verbose_pulses).await;
    }

    #[cfg(windows)]
    {
        use infrastructure::bluetooth::publisher::WindowsAdvertisementPublisher;

        let publisher = WindowsAdvertisementPublisher::new().await?;
        run(publisher, beacon_settings, cli.verbose_pulses).await
    }

    #[cfg(not(windows))]
    {
        warn!("No advertising transport for this platform, using dry run");
        run(dry_run_transport(), beacon_settings, cli.verbose_pulses).await
    }
}

fn dry_run_transport() -> DryRunTransport {
    // Locally administered, so it never collides with a real adapter
    DryRunTransport::new().with_hardware_address(DeviceAddress::new([
        0x02, 0x00, 0x00, 0x00, 0x00, 0x01,
    ]))
}

async fn run<T>(transport: T, settings: BeaconSettings, verbose_pulses: bool) -> anyhow::Result<()>
where
    T: BeaconTransport + Send + 'static,
{
    let (event_sender, event_receiver) = mpsc::unbounded_channel::<BeaconEvent>();
    let controller = BeaconController::new(transport, settings, event_sender)?;
    let (handle, task) = BeaconService::spawn(controller);

    console::run(handle, event_receiver, verbose_pulses).await?;
    task.await?;

    info!("Axonapotamus exited");
    Ok(())
}
