//! Human-readable error descriptions and structured JSON error formatting.

use soarm_core::limits::LimitViolation;
use soarm_core::{
    BuildError, CalibrationError, ConnectError, DiscoveryError, SetupError, WorkerError,
};

fn hint(what: impl std::fmt::Display, causes: &str, fix: &str) -> String {
    format!("What happened: {what}.\nLikely causes: {causes}\nHow to fix: {fix}")
}

fn discovery_text(de: &DiscoveryError) -> String {
    match de {
        DiscoveryError::NotFound => hint(
            "No serial port with a known arm controller was found",
            "The arm is unplugged, powered off, or uses an unrecognised USB bridge.",
            "Plug the arm in, pass --port explicitly, or set robot.port in the config. `soarm find-port --unplug` can locate it.",
        ),
        DiscoveryError::NoDifference { .. } => hint(
            "No port disappeared while the arm was unplugged",
            "The cable was not removed, or the OS kept the device node.",
            "Unplug the arm's USB cable before pressing Enter, then retry.",
        ),
        DiscoveryError::Ambiguous { removed } => hint(
            format_args!("Several ports disappeared at once ({})", removed.join(", ")),
            "More than one USB serial device was unplugged.",
            "Leave other devices connected and unplug only the arm.",
        ),
        DiscoveryError::Enumeration(msg) => hint(
            format_args!("Serial ports could not be listed ({msg})"),
            "Missing permissions or an OS-level enumeration failure.",
            "Check permissions on the serial devices (e.g. the dialout group) and retry.",
        ),
    }
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingOpener | BuildError::MissingEnumerator => hint(
                be,
                "The controller was assembled without a bus or port backend.",
                "This is a wiring bug in the CLI; please report it.",
            ),
            BuildError::InvalidConfig(msg) => hint(
                format_args!("Invalid configuration ({msg})"),
                "Missing or out-of-range values in the TOML.",
                "Edit the config file, then rerun.",
            ),
        };
    }

    if let Some(ce) = err.downcast_ref::<ConnectError>() {
        return match ce {
            ConnectError::Open { port, source } => hint(
                format_args!("Could not open the bus on {port} ({source})"),
                "Wrong port, the device is in use by another program, or missing permissions.",
                "Check the port with `soarm ports`, close other serial programs, and retry.",
            ),
            ConnectError::Discovery(de) => discovery_text(de),
        };
    }

    if let Some(de) = err.downcast_ref::<DiscoveryError>() {
        return discovery_text(de);
    }

    if let Some(se) = err.downcast_ref::<SetupError>() {
        return match se {
            SetupError::NoMotor { port } => hint(
                format_args!("No servo answered on {port} at any supported baud rate"),
                "The servo is not connected, not powered, or on a different port.",
                "Connect exactly one servo, check its power supply, and retry.",
            ),
            SetupError::MultipleMotors { ids, baudrate } => hint(
                format_args!("Several servos answered at {baudrate} baud (ids {ids:?})"),
                "More than one servo is daisy-chained to the controller board.",
                "Disconnect all but the servo being configured, then retry.",
            ),
            SetupError::Verification { what, .. } => hint(
                se,
                "The servo did not accept the write, often because its EEPROM is locked or power dipped.",
                format!("Power-cycle the servo and rerun; the {what} is unchanged if the read-back failed.").as_str(),
            ),
            SetupError::UnsupportedBaud(b) => hint(
                format_args!("Baud rate {b} is not supported by the servos"),
                "A typo in --baudrate.",
                "Use one of 4800, 9600, 14400, 19200, 38400, 57600, 115200 or 1000000.",
            ),
            SetupError::Open { .. } | SetupError::Bus { .. } => hint(
                se,
                "The port is in use, was unplugged, or the servo lost power mid-write.",
                "Reconnect the controller board and retry.",
            ),
        };
    }

    if let Some(ce) = err.downcast_ref::<CalibrationError>() {
        return match ce {
            CalibrationError::MissingProfile { model, serial_id } => hint(
                format_args!("No calibration profile is stored for {model}/{serial_id}"),
                "The arm has not been calibrated yet, or calibration.dir points elsewhere.",
                "Run `soarm calibrate` first, or import an older profile with `soarm import-legacy`.",
            ),
            CalibrationError::PoseUnchanged { joint } => hint(
                format_args!("Joint {joint} read the same position in both poses"),
                "The arm was not moved between the home and reference poses.",
                "Move every joint to the reference pose before pressing Enter.",
            ),
            CalibrationError::Profile(pe) => hint(
                format_args!("The calibration profile could not be used ({pe})"),
                "A corrupt or hand-edited JSON file, or an unwritable calibration directory.",
                "Fix or delete the profile file and rerun the calibration.",
            ),
            _ => hint(
                ce,
                "The arm is disconnected or stopped answering.",
                "Reconnect the arm and restart the calibration.",
            ),
        };
    }

    if let Some(lv) = err.downcast_ref::<LimitViolation>() {
        return hint(
            lv,
            "The target lies outside the calibrated range for that joint.",
            "Pick a target inside the range shown by `soarm state`, or recalibrate.",
        );
    }

    if err.downcast_ref::<WorkerError>().is_some() {
        return hint(
            "The controller thread stopped unexpectedly",
            "A panic on the bus thread.",
            "Re-run with --log-level=debug and report the log.",
        );
    }

    // String-based heuristics for errors coming from init or config
    let msg = err
        .chain()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(": ");
    let lower = msg.to_ascii_lowercase();

    if lower.contains("invalid configuration") || lower.contains("parse config") {
        return hint(
            format_args!("Configuration is invalid ({msg})"),
            "A typo in the TOML or an out-of-range value.",
            "Edit the TOML config and try again.",
        );
    }

    if lower.contains("read config") {
        return hint(
            format_args!("The config file could not be read ({msg})"),
            "Wrong --config path or missing permissions.",
            "Check the path passed to --config.",
        );
    }

    // Generic fallback
    format!(
        "Something went wrong: {msg}\nHow to fix: Re-run with --log-level=debug for details."
    )
}

/// Stable exit codes per error family; anything untyped is 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if let Some(ce) = err.downcast_ref::<ConnectError>() {
        return match ce {
            ConnectError::Open { .. } => 3,
            ConnectError::Discovery(_) => 4,
        };
    }
    if err.downcast_ref::<DiscoveryError>().is_some() {
        return 4;
    }
    if err.downcast_ref::<SetupError>().is_some() {
        return 5;
    }
    if err.downcast_ref::<CalibrationError>().is_some() {
        return 6;
    }
    if err.downcast_ref::<LimitViolation>().is_some() {
        return 7;
    }
    1
}

fn reason_name(err: &eyre::Report) -> &'static str {
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::InvalidConfig(_) => "InvalidConfig",
            _ => "Build",
        };
    }
    if let Some(ce) = err.downcast_ref::<ConnectError>() {
        return match ce {
            ConnectError::Open { .. } => "ConnectionFault",
            ConnectError::Discovery(_) => "PortNotFound",
        };
    }
    if let Some(de) = err.downcast_ref::<DiscoveryError>() {
        return match de {
            DiscoveryError::NotFound => "PortNotFound",
            DiscoveryError::NoDifference { .. } => "NoDifference",
            DiscoveryError::Ambiguous { .. } => "AmbiguousPort",
            DiscoveryError::Enumeration(_) => "Enumeration",
        };
    }
    if let Some(se) = err.downcast_ref::<SetupError>() {
        return match se {
            SetupError::NoMotor { .. } => "NoMotor",
            SetupError::MultipleMotors { .. } => "MultipleMotors",
            SetupError::Verification { .. } => "VerificationFailed",
            SetupError::UnsupportedBaud(_) => "UnsupportedBaud",
            SetupError::Open { .. } | SetupError::Bus { .. } => "SetupBus",
        };
    }
    if err.downcast_ref::<CalibrationError>().is_some() {
        return "Calibration";
    }
    if err.downcast_ref::<LimitViolation>().is_some() {
        return "LimitViolation";
    }
    "Error"
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let msg = humanize(err);
    let reason = reason_name(err);
    let details = if let Some(lv) = err.downcast_ref::<LimitViolation>() {
        Some(json!({
            "joint": lv.joint_index,
            "target": lv.target,
            "reason": lv.reason.to_string(),
            "bound": lv.bound.map(|(_, b)| b),
        }))
    } else if let Some(SetupError::MultipleMotors { ids, baudrate }) = err.downcast_ref::<SetupError>() {
        Some(json!({ "ids": ids, "baudrate": baudrate }))
    } else {
        None
    };

    let obj = match details {
        Some(d) => json!({ "reason": reason, "details": d, "message": msg }),
        None => json!({ "reason": reason, "message": msg }),
    };
    obj.to_string()
}
