use anyhow::{anyhow, bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use std::fs;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use device_model::{self as dm, AttrValue, Device, DeviceOptions, MetricsHub, Schema};
use device_publish::{HttpPublisher, MockPublisher, PlatformConfig, Publisher};

#[derive(Parser, Debug)]
#[command(
    name = "devices",
    version,
    about = "Schema-driven device tool",
    disable_help_subcommand = true
)]
struct Cli {
    /// Print Prometheus counters to stderr on exit
    #[arg(long, action = ArgAction::SetTrue, global = true)]
    metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct SchemaArgs {
    /// Schema document (.json, .yaml or .yml)
    #[arg(long, conflicts_with = "schema_dir")]
    schema: Option<PathBuf>,
    /// Directory of schema documents
    #[arg(long, requires = "class")]
    schema_dir: Option<PathBuf>,
    /// Device class id to pick from --schema-dir
    #[arg(long)]
    class: Option<u32>,
}

#[derive(Args, Debug)]
struct DeviceArgs {
    #[command(flatten)]
    schema: SchemaArgs,
    /// Vendor device id, e.g. a MAC address
    #[arg(long)]
    device_id: String,
    /// Readable value as SLUG=VALUE; VALUE is JSON, anything else is text
    #[arg(long = "set", value_name = "SLUG=VALUE")]
    set: Vec<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List a schema's attributes
    Attributes {
        #[command(flatten)]
        schema: SchemaArgs,
        /// Print each attribute's description
        #[arg(long, action = ArgAction::SetTrue)]
        describe: bool,
    },
    /// Build an outbound message and print it as JSON
    Message {
        #[command(flatten)]
        device: DeviceArgs,
    },
    /// Build an outbound message and publish it
    Publish {
        #[command(flatten)]
        device: DeviceArgs,
        /// Platform config JSON; HYPER_API_URL, HYPER_API_KEY and HYPER_SITE_ID override it
        #[arg(long)]
        config: Option<PathBuf>,
        /// Record the message in memory instead of sending it
        #[arg(long, action = ArgAction::SetTrue)]
        mock: bool,
    },
    /// Apply an inbound update message (file or stdin) to a device
    Dispatch {
        #[command(flatten)]
        device: DeviceArgs,
        /// Update message JSON; `-` reads stdin
        #[arg(long, default_value = "-")]
        input: String,
    },
}

fn main() -> Result<()> {
    setup_tracing();
    let cli = Cli::parse();
    let hub = MetricsHub::new().map_err(|e| anyhow!(e))?;

    match cli.command {
        Commands::Attributes { schema, describe } => attributes(&schema, describe)?,
        Commands::Message { device } => {
            let dev = build_device(&device, &hub)?;
            let env = dev.to_message()?;
            println!("{}", serde_json::to_string_pretty(&env)?);
        }
        Commands::Publish {
            device,
            config,
            mock,
        } => publish(&device, config, mock, &hub)?,
        Commands::Dispatch { device, input } => dispatch(&device, &input, &hub)?,
    }

    if cli.metrics {
        eprint!("{}", hub.encode_text());
    }
    Ok(())
}

fn setup_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_schema(args: &SchemaArgs) -> Result<Arc<Schema>> {
    match (&args.schema, &args.schema_dir, args.class) {
        (Some(path), _, _) => Ok(Arc::new(dm::load_schema_file(path)?)),
        (None, Some(dir), Some(class)) => {
            let reg = dm::load_schemas_dir(dir)?;
            reg.get(class)
                .ok_or_else(|| anyhow!("no schema with id {class} in {}", dir.display()))
        }
        _ => bail!("pass --schema FILE or --schema-dir DIR --class ID"),
    }
}

fn parse_assignment(raw: &str) -> Result<(String, AttrValue)> {
    let (slug, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("expected SLUG=VALUE, got `{raw}`"))?;
    let value = serde_json::from_str::<AttrValue>(value)
        .unwrap_or_else(|_| AttrValue::Text(value.to_string()));
    Ok((slug.trim().to_string(), value))
}

fn build_device(args: &DeviceArgs, hub: &MetricsHub) -> Result<Device> {
    let schema = load_schema(&args.schema)?;
    let options = DeviceOptions {
        metrics: Some(hub.dev.clone()),
        ..Default::default()
    };
    let mut dev = Device::with_options(schema, &args.device_id, options)?;
    for raw in &args.set {
        let (slug, value) = parse_assignment(raw)?;
        dev.set(&slug, value)
            .with_context(|| format!("setting `{slug}`"))?;
    }
    Ok(dev)
}

fn attributes(args: &SchemaArgs, describe: bool) -> Result<()> {
    let schema = load_schema(args)?;
    println!("{} ({})", schema.name(), schema.id());
    for (slot, attr) in schema.attributes() {
        let access = match (attr.access.read, attr.access.write) {
            (true, true) => "rw",
            (true, false) => "r",
            _ => "w",
        };
        println!(
            "{slot}\t{}\t{access}\t{}",
            dm::slug(slot, attr),
            attr.format.kind_tag()
        );
        if describe {
            println!("{}\n", attr.describe(slot));
        }
    }
    Ok(())
}

fn publish(
    args: &DeviceArgs,
    config: Option<PathBuf>,
    mock: bool,
    hub: &MetricsHub,
) -> Result<()> {
    let dev = build_device(args, hub)?;
    let env = dev.to_message()?;
    if mock {
        let mut publisher = MockPublisher::new();
        publisher.publish(std::slice::from_ref(&env))?;
        info!(count = publisher.envelopes().count(), "recorded message");
        println!("{}", dm::encode_envelopes(publisher.batches().concat().as_slice())?);
        return Ok(());
    }
    let config = PlatformConfig::load(config.as_deref())?;
    let mut publisher = HttpPublisher::new(&config)?;
    publisher.publish(std::slice::from_ref(&env))?;
    println!("published {} to {}", env.message_uuid, publisher.url());
    Ok(())
}

fn dispatch(args: &DeviceArgs, input: &str, hub: &MetricsHub) -> Result<()> {
    let raw = if input == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        fs::read_to_string(input).with_context(|| format!("reading {input}"))?
    };
    let message = dm::decode_update(&raw)?;

    let mut dev = build_device(args, hub)?;
    for slot in dev.registry().writable().to_vec() {
        let slug = dev.registry().slug_for(&slot).unwrap_or_default().to_string();
        dev.bind_slot(&slot, move |value| {
            info!(attribute = %slug, %value, "write received");
            Ok(())
        })?;
    }
    dev.dispatch(&message)?;
    println!("{}", serde_json::to_string_pretty(&dev.values())?);
    Ok(())
}
