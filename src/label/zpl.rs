// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the plc-cycle-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! ZPL rendering and raw network printing
//!
//! Zebra printers accept raw ZPL on TCP port 9100. The template matches the
//! commissioned 591x300 dot label: QR code on the left, the identifier
//! fields beside it, part description and plant name centered below.

use std::time::Duration;

use async_trait::async_trait;
use log::{error, info};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time;

use crate::config::PrinterConfig;
use crate::label::{LabelRequest, LabelSink};

/// Render the label as a ZPL program.
pub fn render_zpl(label: &LabelRequest) -> String {
    format!(
        "^XA\n\
         ^PW591\n\
         ^LL300\n\
         ~SD15\n\
         \n\
         ^FO50,60\n\
         ^BQN,2,5\n\
         ^FDLA,{qr}^FS\n\
         \n\
         ^FO220,35^A0N,32,32^FD{part_no}^FS\n\
         ^FO220,68^A0N,32,32^FD{revision}^FS\n\
         ^FO220,101^A0N,32,32^FD{vendor_code}^FS\n\
         ^FO220,134^A0N,32,32^FD{mfg_date}^FS\n\
         ^FO220,167^A0N,32,32^FD{serial_no}^FS\n\
         \n\
         ^FO0,210\n\
         ^FB591,1,0,C,0\n\
         ^A0N,32,32\n\
         ^FD{part_desc}^FS\n\
         \n\
         ^FO0,250\n\
         ^FB591,1,0,C,0\n\
         ^A0N,32,32\n\
         ^FD AUTOLINE INDUST LTD ^FS\n\
         ^XZ",
        qr = label.qr_payload,
        part_no = label.part_no,
        revision = label.revision,
        vendor_code = label.vendor_code,
        mfg_date = label.mfg_date,
        serial_no = label.serial_no,
        part_desc = label.part_description,
    )
}

/// Ships rendered ZPL to the printer's raw port over TCP.
#[derive(Debug, Default)]
pub struct ZplNetworkPrinter;

impl ZplNetworkPrinter {
    pub fn new() -> Self {
        Self
    }

    async fn send(&self, printer: &PrinterConfig, payload: &[u8]) -> std::io::Result<()> {
        let timeout = Duration::from_millis(printer.timeout_ms);
        let addr = format!("{}:{}", printer.host, printer.port);
        let mut stream = time::timeout(timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out"))??;
        time::timeout(timeout, stream.write_all(payload))
            .await
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "write timed out"))??;
        stream.shutdown().await
    }
}

#[async_trait]
impl LabelSink for ZplNetworkPrinter {
    async fn print(&self, printer: &PrinterConfig, label: &LabelRequest) -> bool {
        let zpl = render_zpl(label);
        info!(
            "Sending label for {} to printer {}:{} ({} bytes)",
            label.qr_payload,
            printer.host,
            printer.port,
            zpl.len()
        );
        match self.send(printer, zpl.as_bytes()).await {
            Ok(()) => {
                info!("Label for {} printed", label.qr_payload);
                true
            }
            Err(err) => {
                error!(
                    "Failed to print label on {}:{}: {}",
                    printer.host, printer.port, err
                );
                false
            }
        }
    }
}
