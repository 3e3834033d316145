//! Locating the arm's serial port.
//!
//! Two strategies: match the USB bridge PID, or ask the operator to unplug
//! the arm and diff the port list. Ambiguity is reported, never resolved by
//! guessing.

use soarm_traits::{PortEnumerator, PortInfo};

use crate::error::DiscoveryError;

/// USB product ids of the serial bridges this arm family ships with.
pub const KNOWN_PIDS: [u16; 2] = [21971, 29987];

/// Name fragments of devices worth showing as candidates.
const CANDIDATE_PATTERNS: [&str; 4] = ["ttyUSB", "ttyACM", "cu.usb", "COM"];

/// First port whose USB PID is a known arm bridge.
pub fn find_by_pid(ports: &[PortInfo]) -> Option<String> {
    ports
        .iter()
        .find(|p| p.usb.is_some_and(|u| KNOWN_PIDS.contains(&u.pid)))
        .map(|p| p.name.clone())
}

/// The single port present in `before` but missing from `after`.
pub fn diff_ports(before: &[String], after: &[String]) -> Result<String, DiscoveryError> {
    let removed: Vec<String> = before
        .iter()
        .filter(|p| !after.contains(p))
        .cloned()
        .collect();
    match removed.as_slice() {
        [one] => Ok(one.clone()),
        [] => Err(DiscoveryError::NoDifference {
            before: before.to_vec(),
            after: after.to_vec(),
        }),
        _ => Err(DiscoveryError::Ambiguous { removed }),
    }
}

pub struct PortDiscovery {
    enumerator: Box<dyn PortEnumerator>,
}

impl std::fmt::Debug for PortDiscovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortDiscovery").finish_non_exhaustive()
    }
}

impl PortDiscovery {
    pub fn new(enumerator: Box<dyn PortEnumerator>) -> Self {
        Self { enumerator }
    }

    pub fn ports(&self) -> Result<Vec<PortInfo>, DiscoveryError> {
        self.enumerator
            .ports()
            .map_err(|e| DiscoveryError::Enumeration(e.to_string()))
    }

    /// Port names, for a later `find_by_disconnect`.
    pub fn snapshot(&self) -> Result<Vec<String>, DiscoveryError> {
        Ok(self.ports()?.into_iter().map(|p| p.name).collect())
    }

    /// Ports that look like USB serial adapters. Display only.
    pub fn candidate_ports(&self) -> Result<Vec<PortInfo>, DiscoveryError> {
        Ok(self
            .ports()?
            .into_iter()
            .filter(|p| p.usb.is_some() || CANDIDATE_PATTERNS.iter().any(|pat| p.name.contains(pat)))
            .collect())
    }

    pub fn find_by_pid(&self) -> Result<Option<String>, DiscoveryError> {
        let found = find_by_pid(&self.ports()?);
        if let Some(port) = &found {
            tracing::info!(port, "arm controller found by USB PID");
        }
        Ok(found)
    }

    /// Compare the current port list against one taken before unplugging.
    pub fn find_by_disconnect(&self, before: &[String]) -> Result<String, DiscoveryError> {
        let after = self.snapshot()?;
        let port = diff_ports(before, &after)?;
        tracing::info!(port, "arm controller found by disconnect");
        Ok(port)
    }

    /// PID match, or `NotFound`.
    pub fn discover(&self) -> Result<String, DiscoveryError> {
        self.find_by_pid()?.ok_or(DiscoveryError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| (*s).to_string()).collect()
    }

    #[rstest]
    #[case(&["A", "B"], &["A"], Ok("B"))]
    #[case(&["A", "B"], &["B", "A", "C"], Err(0))]
    #[case(&["A"], &["A"], Err(0))]
    #[case(&["A", "B"], &[], Err(2))]
    fn diff_cases(#[case] before: &[&str], #[case] after: &[&str], #[case] expected: Result<&str, usize>) {
        let got = diff_ports(&names(before), &names(after));
        match (got, expected) {
            (Ok(port), Ok(want)) => assert_eq!(port, want),
            (Err(DiscoveryError::NoDifference { .. }), Err(0)) => {}
            (Err(DiscoveryError::Ambiguous { removed }), Err(n)) => assert_eq!(removed.len(), n),
            (other, want) => panic!("got {other:?}, want {want:?}"),
        }
    }

    #[test]
    fn pid_match_ignores_other_usb_devices() {
        let ports = vec![
            PortInfo::new("/dev/ttyS0"),
            PortInfo::new("/dev/ttyUSB0").with_usb(0x0403, 0x6001),
            PortInfo::new("/dev/ttyACM0").with_usb(0x1a86, 29987),
        ];
        assert_eq!(find_by_pid(&ports).as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(find_by_pid(&ports[..2]), None);
    }

    #[test]
    fn candidates_skip_builtin_uarts() {
        let d = PortDiscovery::new(Box::new(crate::mocks::StaticPorts(vec![
            PortInfo::new("/dev/ttyS0"),
            PortInfo::new("/dev/ttyUSB0"),
            PortInfo::new("/dev/serial-bridge").with_usb(0x1a86, 21971),
        ])));
        let names: Vec<String> = d.candidate_ports().unwrap().into_iter().map(|p| p.name).collect();
        assert_eq!(names, ["/dev/ttyUSB0", "/dev/serial-bridge"]);
    }
}
