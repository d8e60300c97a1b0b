mod logging;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use roadradar_core::config::RadarConfig;
use roadradar_core::demo::DemoRadar;
use roadradar_core::protocol::{list_ports, DataFrequency, SerialChannel};
use roadradar_core::radar::{Parameters, Radar, RadarDevice, StreamEvent, DEFAULT_TARGET_CAPACITY};

use crate::logging::{init_logging, LogLevel};

#[derive(Parser, Debug)]
#[command(name = "roadradar", version, about = "Smart road radar command line client")]
struct Cli {
    /// Serial port the radar is attached to
    #[arg(long, short, env = "ROADRADAR_PORT", global = true)]
    port: Option<String>,

    /// Baud rate override
    #[arg(long, global = true)]
    baud: Option<u32>,

    /// JSON configuration file
    #[arg(long, short, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Minimum log level (stderr). Defaults to RUST_LOG, then warn.
    #[arg(long, value_name = "LEVEL", global = true)]
    log_level: Option<LogLevel>,

    /// Use the built-in demo radar instead of a serial port
    #[arg(long, global = true)]
    demo: bool,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// List serial ports
    Ports,
    /// Print the firmware version
    Version,
    /// Print the detection envelope as JSON
    GetParams,
    /// Write the detection envelope; unspecified fields keep their current value
    SetParams(SetParamsArgs),
    /// Configure the target number
    TargetNum { number: u8 },
    /// Wait for one target report and print it as JSON
    Targets {
        #[arg(long, default_value_t = DEFAULT_TARGET_CAPACITY)]
        capacity: usize,
    },
    /// Start streaming target reports
    Enable,
    /// Stop streaming target reports
    Disable,
    /// Set the report rate in reports per second (1-10, 15 or 20)
    Freq {
        #[arg(value_parser = parse_frequency)]
        rate: DataFrequency,
    },
    /// Toggle reports with zero detections
    ZeroReport {
        #[arg(action = clap::ArgAction::Set)]
        enabled: bool,
    },
    /// Enable transmit and print streamed events as JSON lines
    Stream {
        /// Stop after this many seconds
        #[arg(long, default_value_t = 10)]
        seconds: u64,
    },
}

#[derive(clap::Args, Debug, Default)]
struct SetParamsArgs {
    #[arg(long)]
    min_distance: Option<f32>,
    #[arg(long)]
    max_distance: Option<f32>,
    #[arg(long)]
    min_speed: Option<f32>,
    #[arg(long)]
    max_speed: Option<f32>,
    #[arg(long, allow_negative_numbers = true)]
    min_angle: Option<f32>,
    #[arg(long, allow_negative_numbers = true)]
    max_angle: Option<f32>,
    #[arg(long, allow_negative_numbers = true)]
    left_border: Option<f32>,
    #[arg(long, allow_negative_numbers = true)]
    right_border: Option<f32>,
}

impl SetParamsArgs {
    fn apply(&self, params: &mut Parameters) {
        let fields = [
            (self.min_distance, &mut params.min_distance),
            (self.max_distance, &mut params.max_distance),
            (self.min_speed, &mut params.min_speed),
            (self.max_speed, &mut params.max_speed),
            (self.min_angle, &mut params.min_angle),
            (self.max_angle, &mut params.max_angle),
            (self.left_border, &mut params.left_border),
            (self.right_border, &mut params.right_border),
        ];
        for (value, field) in fields {
            if let Some(v) = value {
                *field = v;
            }
        }
    }
}

fn parse_frequency(s: &str) -> Result<DataFrequency, String> {
    let rate: u8 = s.parse().map_err(|e| format!("{e}"))?;
    DataFrequency::from_code(rate).map_err(|e| e.to_string())
}

fn load_config(cli: &Cli) -> Result<RadarConfig> {
    let mut config = match &cli.config {
        Some(path) => RadarConfig::from_file(path)?,
        None => RadarConfig::default(),
    };
    if let Some(port) = &cli.port {
        config.port.name = port.clone();
    }
    if let Some(baud) = cli.baud {
        config.port.baud_rate = baud;
    }
    Ok(config)
}

fn open_radar(config: &RadarConfig) -> Result<Radar<SerialChannel>> {
    if config.port.name.is_empty() {
        bail!("no serial port given (use --port, ROADRADAR_PORT or a config file)");
    }
    Radar::open(&config.port, config.client.clone())
        .with_context(|| format!("failed to open radar on {}", config.port.name))
}

/// Run one capability call, turning failures into the reason shown to users
fn run_device(device: &mut dyn RadarDevice, command: &Cmd) -> Result<()> {
    let outcome = match command {
        Cmd::Version => device.get_firmware_version().map(|v| println!("{v}")),
        Cmd::GetParams => device
            .get_parameters()
            .map(|p| println!("{}", serde_json::to_string_pretty(&p).unwrap_or_default())),
        Cmd::SetParams(args) => device.get_parameters().and_then(|mut params| {
            args.apply(&mut params);
            device.set_parameters(&params)
        }),
        Cmd::TargetNum { number } => device.set_target_number(*number),
        Cmd::Targets { capacity } => device
            .get_target_data(*capacity)
            .map(|t| println!("{}", serde_json::to_string(&t).unwrap_or_default())),
        Cmd::Enable => device.enable_data_transmit(),
        Cmd::Disable => device.disable_data_transmit(),
        Cmd::Freq { rate } => device.set_data_transmit_frequency(*rate),
        Cmd::ZeroReport { enabled } => device.set_zero_data_reporting(*enabled),
        Cmd::Ports | Cmd::Stream { .. } => return Ok(()),
    };

    outcome.map_err(|e| anyhow::anyhow!("{}", e.reason()))
}

fn print_event(event: &StreamEvent) {
    let line = match event {
        StreamEvent::Targets(targets) => serde_json::to_string(targets),
        StreamEvent::Parameters(params) => serde_json::to_string(params),
        StreamEvent::Version(version) => Ok(format!("\"{version}\"")),
        StreamEvent::Status(status) => Ok(format!("{{\"status\":{}}}", status.byte())),
    };
    if let Ok(line) = line {
        println!("{line}");
    }
}

fn stream_hardware(radar: &mut Radar<SerialChannel>, seconds: u64) -> Result<()> {
    radar.start_streaming(|event| print_event(&event))?;
    if let Err(e) = radar.enable_data_transmit() {
        radar.stop_streaming();
        bail!("enable transmit: {}", e.reason());
    }

    let deadline = Instant::now() + Duration::from_secs(seconds);
    while Instant::now() < deadline && radar.is_streaming() {
        thread::sleep(Duration::from_millis(100));
    }

    let failed = !radar.is_streaming();
    if !failed {
        if let Err(e) = radar.disable_data_transmit() {
            tracing::warn!("disable transmit: {}", e.reason());
        }
    }
    radar.stop_streaming();
    if failed {
        bail!("stream reader stopped early, see log for the channel error");
    }
    Ok(())
}

fn stream_demo(radar: &mut DemoRadar, seconds: u64) -> Result<()> {
    let deadline = Instant::now() + Duration::from_secs(seconds);
    while Instant::now() < deadline {
        let targets = radar.get_target_data(DEFAULT_TARGET_CAPACITY)?;
        print_event(&StreamEvent::Targets(targets));
    }
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    if let Cmd::Ports = cli.command {
        for port in list_ports() {
            match (port.vid, port.pid) {
                (Some(vid), Some(pid)) => println!(
                    "{}\t{:04x}:{:04x}\t{}",
                    port.name,
                    vid,
                    pid,
                    port.product.unwrap_or_default()
                ),
                _ => println!("{}", port.name),
            }
        }
        return Ok(());
    }

    if cli.demo {
        let mut radar = DemoRadar::new();
        return match cli.command {
            Cmd::Stream { seconds } => stream_demo(&mut radar, seconds),
            ref command => run_device(&mut radar, command),
        };
    }

    let config = load_config(&cli)?;
    let mut radar = open_radar(&config)?;
    match cli.command {
        Cmd::Stream { seconds } => stream_hardware(&mut radar, seconds),
        ref command => run_device(&mut radar, command),
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_level);

    if let Err(err) = run(cli) {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
