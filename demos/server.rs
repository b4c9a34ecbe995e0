#![allow(unused_crate_dependencies)]
#![allow(clippy::print_stdout)]

use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;
use tracing::info;

use bluelet::ble::{Config, Event, Peripheral};
use bluelet::gatt::{Characteristic, Handler, IoResult, Prop, Service};
use bluelet::host::{self, Transport};
use bluelet::le::Addr;
use bluelet::smp::KeyStore;
use bluelet_crypto::Key;

/// Stand-in transport that logs outbound packets. A real embedder would
/// bind a raw HCI socket here and feed its reads into
/// [`Peripheral::on_data`].
#[derive(Debug, Default)]
struct LogTransport;

impl Transport for LogTransport {
    fn write(&self, pkt: &[u8]) -> host::Result<()> {
        println!("> {pkt:02X?}");
        Ok(())
    }

    fn set_filter(&self, filter: &[u8]) -> host::Result<()> {
        println!("filter {filter:02X?}");
        Ok(())
    }

    fn is_dev_up(&self) -> bool {
        true
    }
}

#[derive(Debug, Default)]
struct EphemeralKeys;

impl KeyStore for EphemeralKeys {
    fn add_long_term_key(&self, peer: Addr, _key: Key, ediv: u16, _rand: [u8; 8]) {
        info!("New key for {peer} (EDIV {ediv})");
    }
}

/// Readable and writable scratch value.
#[derive(Debug, Default)]
struct Echo(Mutex<Vec<u8>>);

impl Handler for Echo {
    fn read(&self, offset: u16) -> IoResult<Vec<u8>> {
        Ok(self.0.lock().iter().copied().skip(offset.into()).collect())
    }

    fn write(&self, _offset: u16, value: &[u8], _without_response: bool) -> IoResult<()> {
        *self.0.lock() = value.to_vec();
        Ok(())
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let config = Config {
        name: String::from("echo"),
        ..Config::default()
    };
    let (mut p, mut events) =
        Peripheral::new(LogTransport, &config, Arc::new(EphemeralKeys));
    p.set_services(&[Service::new(
        "FFF0".parse::<bluelet::gap::Uuid>()?,
        vec![Characteristic::new(
            "FFF1".parse::<bluelet::gap::Uuid>()?,
            Prop::READ | Prop::WRITE | Prop::NOTIFY,
            Echo::default(),
        )],
    )]);
    p.start_advertising("echo", &["FFF0".parse()?])?;

    let (pkts, rx) = tokio::sync::mpsc::unbounded_channel::<Vec<u8>>();
    // A real embedder keeps `pkts` alive and feeds controller reads into it;
    // closing the channel stops the pump.
    drop(pkts);
    p.run(rx).await?;

    while let Ok(evt) = events.try_recv() {
        match evt {
            Event::Accept(peer) => info!("Connected to {peer}"),
            evt => info!("{evt:?}"),
        }
    }
    Ok(())
}
