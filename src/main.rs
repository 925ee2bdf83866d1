// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `noodle-hub` daemon.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use noodle_hub::gpio::{LineProvider, MemoryLineProvider, SysfsLineProvider};
use noodle_hub::protocol::{InboundMessage, MqttBus};
use noodle_hub::{BusError, Config, Engine, Error, Registry};

#[derive(clap::Parser)]
#[command(name = "noodle-hub")]
#[command(about = "Power controller for networked 3D printers")]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Keep GPIO lines in memory instead of driving hardware
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() {
    let cli: Cli = clap::Parser::parse();

    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)))
        .init();

    tracing::info!(
        path = %cli.config.display(),
        printers = config.printers.len(),
        "Loaded configuration"
    );

    if let Err(e) = run(&cli, &config).await {
        tracing::error!(error = %e, "Noodle hub stopped");
        std::process::exit(1);
    }
}

async fn run(cli: &Cli, config: &Config) -> noodle_hub::Result<()> {
    let registry = Registry::from_config(config)?;

    let mut builder = MqttBus::builder()
        .host(&config.mqtt_host)
        .port(config.mqtt_port);
    if let Some((username, password)) = config.credentials() {
        builder = builder.credentials(username, password);
    }
    let bus = builder.build().await?;
    let messages = bus.take_messages().ok_or(Error::Bus(BusError::Closed))?;

    let provider: Box<dyn LineProvider> = if cli.dry_run {
        tracing::warn!("Dry run, GPIO lines are simulated");
        Box::new(MemoryLineProvider::new())
    } else {
        Box::new(SysfsLineProvider::new(&config.gpio_chip))
    };

    let engine = Engine::builder(registry)
        .with_config(config)
        .build(Arc::new(bus.clone()), provider.as_ref())?;

    let pump = tokio::spawn(pump_messages(messages, engine.clone()));

    tokio::select! {
        result = noodle_hub::web::run_server(config.web_listen, engine.clone()) => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("Shutting down"),
        _ = pump => tracing::warn!("Bus message stream ended"),
    }

    engine.shutdown();
    if let Err(e) = bus.disconnect().await {
        tracing::debug!(error = %e, "Disconnect failed");
    }
    Ok(())
}

async fn pump_messages(mut messages: mpsc::Receiver<InboundMessage>, engine: Engine) {
    while let Some(message) = messages.recv().await {
        engine.handle_message(&message.topic, &message.payload);
    }
}
