//! OS serial port enumeration.

use serialport::SerialPortType;
use soarm_traits::{PortEnumerator, PortInfo, UsbIds};

use crate::error::HwError;

/// Lists the serial ports the operating system currently exposes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPorts;

impl PortEnumerator for SystemPorts {
    fn ports(&self) -> Result<Vec<PortInfo>, Box<dyn std::error::Error + Send + Sync>> {
        let found =
            serialport::available_ports().map_err(|e| HwError::Enumeration(e.to_string()))?;
        tracing::trace!(count = found.len(), "enumerated serial ports");
        Ok(found.into_iter().map(to_port_info).collect())
    }
}

fn to_port_info(p: serialport::SerialPortInfo) -> PortInfo {
    match p.port_type {
        SerialPortType::UsbPort(usb) => PortInfo {
            name: p.port_name,
            usb: Some(UsbIds {
                vid: usb.vid,
                pid: usb.pid,
            }),
            product: usb.product,
        },
        _ => PortInfo::new(p.port_name),
    }
}
