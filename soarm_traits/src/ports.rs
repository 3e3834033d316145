//! Serial port enumeration.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsbIds {
    pub vid: u16,
    pub pid: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    pub name: String,
    /// Present for USB-attached devices.
    pub usb: Option<UsbIds>,
    pub product: Option<String>,
}

impl PortInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            usb: None,
            product: None,
        }
    }

    pub fn with_usb(mut self, vid: u16, pid: u16) -> Self {
        self.usb = Some(UsbIds { vid, pid });
        self
    }
}

pub trait PortEnumerator: Send {
    fn ports(&self) -> Result<Vec<PortInfo>, Box<dyn std::error::Error + Send + Sync>>;
}

impl<T: PortEnumerator + ?Sized> PortEnumerator for Box<T> {
    fn ports(&self) -> Result<Vec<PortInfo>, Box<dyn std::error::Error + Send + Sync>> {
        (**self).ports()
    }
}
