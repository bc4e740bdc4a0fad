//! Serial endpoint discovery

use crossbeam_channel::Sender;
use serialport::SerialPortType;

/// Kind of a detected serial endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortKind {
    /// USB serial adapter
    Usb {
        vendor_id: u16,
        product_id: u16,
        manufacturer: Option<String>,
        product: Option<String>,
        serial_number: Option<String>,
    },
    Bluetooth,
    Pci,
    Unknown,
}

/// A detected serial endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// Name to pass to [`LinkConnection::open`](super::LinkConnection::open)
    pub name: String,
    pub kind: PortKind,
}

impl PortInfo {
    /// Get a display-friendly description of this endpoint
    pub fn display_name(&self) -> String {
        match &self.kind {
            PortKind::Usb {
                vendor_id,
                product_id,
                manufacturer,
                product,
                ..
            } => {
                let label: Vec<&str> = [manufacturer.as_deref(), product.as_deref()]
                    .into_iter()
                    .flatten()
                    .collect();
                if label.is_empty() {
                    format!("{} - USB ({:04x}:{:04x})", self.name, vendor_id, product_id)
                } else {
                    format!(
                        "{} - {} ({:04x}:{:04x})",
                        self.name,
                        label.join(" "),
                        vendor_id,
                        product_id
                    )
                }
            }
            PortKind::Bluetooth => format!("{} - Bluetooth", self.name),
            PortKind::Pci => format!("{} - PCI", self.name),
            PortKind::Unknown => self.name.clone(),
        }
    }
}

impl std::fmt::Display for PortInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl From<serialport::SerialPortInfo> for PortInfo {
    fn from(info: serialport::SerialPortInfo) -> Self {
        let kind = match info.port_type {
            SerialPortType::UsbPort(usb) => PortKind::Usb {
                vendor_id: usb.vid,
                product_id: usb.pid,
                manufacturer: usb.manufacturer,
                product: usb.product,
                serial_number: usb.serial_number,
            },
            SerialPortType::BluetoothPort => PortKind::Bluetooth,
            SerialPortType::PciPort => PortKind::Pci,
            SerialPortType::Unknown => PortKind::Unknown,
        };
        Self {
            name: info.port_name,
            kind,
        }
    }
}

/// List available serial endpoints, sorted by name
///
/// Enumeration failures are logged and yield an empty list.
pub fn list_ports() -> Vec<PortInfo> {
    match serialport::available_ports() {
        Ok(ports) => {
            let mut ports: Vec<PortInfo> = ports.into_iter().map(PortInfo::from).collect();
            ports.sort_by(|a, b| a.name.cmp(&b.name));
            ports
        }
        Err(e) => {
            tracing::warn!("Serial port enumeration failed: {}", e);
            Vec::new()
        }
    }
}

/// List endpoints on a helper thread and send the result through a channel
pub fn list_ports_async(sender: Sender<Vec<PortInfo>>) {
    std::thread::spawn(move || {
        let _ = sender.send(list_ports());
    });
}
