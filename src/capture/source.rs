use anyhow::{anyhow, Result};
use log::{debug, error, info, trace, warn};
use pcap::{Capture, Device};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::capture::decoder::PacketDecoder;
use crate::models::config::AppConfig;
use crate::models::record::PacketRecord;

/// Headers are all the accounting engine looks at, so a short snaplen
/// keeps the kernel from copying payloads around
const SNAPLEN: i32 = 512;

/// Read timeout so the capture loop can notice shutdown
const READ_TIMEOUT_MS: i32 = 1000;

/// Give up after this many capture errors in a row
const MAX_CONSECUTIVE_ERRORS: u32 = 5;

/// Opens the capture device and feeds decoded records to the sensor
/// loop over a bounded channel.
pub struct CaptureSource;

impl CaptureSource {
    /// Open the configured interface and spawn the blocking capture
    /// loop. Returns the record channel and the loop's join handle.
    pub fn start(config: &AppConfig) -> Result<(mpsc::Receiver<PacketRecord>, JoinHandle<()>)> {
        let interface = match &config.interface {
            Some(name) => name.clone(),
            None => return Err(anyhow!("No interface specified")),
        };

        // Prefer the fully configured device from the device list;
        // fall back to opening by name.
        let device = Device::list()
            .map_err(|e| {
                warn!("Failed to list devices: {}", e);
                e
            })
            .ok()
            .and_then(|devices| devices.into_iter().find(|d| d.name == interface))
            .unwrap_or_else(|| Device::from(interface.as_str()));

        info!("Opening capture on interface: {}", device.name);
        let capture = Capture::from_device(device)?
            .promisc(config.promiscuous)
            .snaplen(SNAPLEN)
            .timeout(READ_TIMEOUT_MS);

        let mut active = capture.open()?;

        let filter = config.filter.clone().unwrap_or_else(|| "ip or ip6".to_string());
        info!("Applying filter: {}", filter);
        active.filter(&filter, true)?;

        let (tx, rx) = mpsc::channel(1024);
        let handle = tokio::task::spawn_blocking(move || {
            Self::run_capture(active, tx, interface);
        });

        Ok((rx, handle))
    }

    /// Blocking capture loop: read, decode, hand off. Exits when the
    /// receiving side is dropped or errors persist.
    fn run_capture(
        mut capture: Capture<pcap::Active>,
        tx: mpsc::Sender<PacketRecord>,
        interface: String,
    ) {
        info!("Capture loop started on {}", interface);
        let decoder = PacketDecoder::new();
        let mut consecutive_errors = 0u32;

        loop {
            match capture.next_packet() {
                Ok(packet) => {
                    consecutive_errors = 0;
                    let Some(record) = decoder.decode(packet.data) else {
                        continue;
                    };
                    trace!(
                        "Decoded {} bytes {} -> {}",
                        record.length,
                        record.src_addr,
                        record.dst_addr
                    );
                    if tx.blocking_send(record).is_err() {
                        debug!("Record channel closed, stopping capture");
                        break;
                    }
                }
                Err(pcap::Error::TimeoutExpired) => {
                    // Normal when the wire is quiet; also our chance to
                    // notice the receiver going away
                    if tx.is_closed() {
                        break;
                    }
                }
                Err(e) => {
                    error!("Error capturing packet: {}", e);
                    consecutive_errors += 1;
                    if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                        error!(
                            "Too many consecutive capture errors ({}), stopping",
                            consecutive_errors
                        );
                        break;
                    }
                    std::thread::sleep(std::time::Duration::from_millis(100));
                }
            }
        }

        info!("Capture loop stopped on {}", interface);
    }

    /// Names of capture-capable interfaces on this machine
    pub fn list_interfaces() -> Vec<String> {
        match Device::list() {
            Ok(devices) => devices.into_iter().map(|d| d.name).collect(),
            Err(e) => {
                error!("Failed to list interfaces from pcap: {}", e);
                pnet_datalink::interfaces()
                    .into_iter()
                    .map(|i| i.name)
                    .collect()
            }
        }
    }
}
