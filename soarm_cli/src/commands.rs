//! Subcommand implementations. Results go to stdout, logs to stderr.

use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use eyre::{Result, WrapErr};
use serde_json::{Value, json};
use soarm_config::{Config, LegacyTickProfile};
use soarm_core::discovery::{self, PortDiscovery};
use soarm_core::setup::{MotorCheck, SetupStatus};
use soarm_core::{
    ControlEvent, ControllerWorker, JOINT_COUNT, JOINT_NAMES, KeyEventKind, PollingCfg,
    RobotController, RobotState, StepReport, StepStatus, TwoPoseCalibration,
};
use soarm_hardware::{SimulatedArm, SystemPorts};

use crate::cli::{Cli, Commands, SimChain};

/// Ticks either side of centre swept by `calibrate --demo` (45 degrees).
const DEMO_SWEEP_TICKS: i32 = 512;
const CENTER_TICKS: i32 = 2048;

pub fn dispatch(cli: &Cli, cfg: &Config) -> Result<()> {
    let arm = sim_chain(cli.sim);
    let json = cli.json;
    match &cli.cmd {
        Commands::Ports { all } => list_ports(*all, json),
        Commands::FindPort { unplug } => find_port(*unplug, json),
        Commands::State { port } => {
            let mut c = connected(cfg, &arm, port.as_deref())?;
            print_state(&c.state(), json);
            Ok(())
        }
        Commands::Move {
            port,
            joint,
            degrees,
        } => move_joint(cfg, &arm, port.as_deref(), *joint, *degrees, json),
        Commands::Voltage { port } => voltage(cfg, &arm, port.as_deref(), json),
        Commands::Calibrate { port, demo } => {
            let mut c = connected(cfg, &arm, port.as_deref())?;
            if *demo {
                calibrate_demo(&mut c, &arm, json)
            } else {
                calibrate_interactive(&mut c, json)
            }
        }
        Commands::Home { port } => {
            let mut c = connected(cfg, &arm, port.as_deref())?;
            if !c.home() {
                eyre::bail!("home movement failed");
            }
            print_state(&c.state(), json);
            Ok(())
        }
        Commands::Zero { port } => {
            let mut c = connected(cfg, &arm, port.as_deref())?;
            if !c.zero_joints() {
                eyre::bail!("zeroing failed");
            }
            let path = c.calibration().save_profile()?;
            emit(
                json,
                &json!({ "event": "profile_saved", "path": path }),
                &format!("Zero pose saved to {}", path.display()),
            );
            Ok(())
        }
        Commands::TwoPose { port, out } => two_pose(cfg, &arm, port.as_deref(), out, json),
        Commands::ImportLegacy { file } => import_legacy(cfg, &arm, file, json),
        Commands::Teleop { port } => teleop(cfg, &arm, port.clone(), json),
        Commands::SetupMotor { port, id, baudrate } => {
            let mut c = controller(cfg, &arm)?;
            let port = setup_port(&c, cfg, port.as_deref())?;
            let done = c.configure_motor(&port, *id, *baudrate)?;
            emit(
                json,
                &json!({
                    "event": "motor_configured",
                    "id": done.id,
                    "baudrate": done.baudrate,
                    "previous_id": done.previous_id,
                    "previous_baudrate": done.previous_baudrate,
                }),
                &format!(
                    "Motor {} -> {} at {} baud (was {} baud)",
                    done.previous_id, done.id, done.baudrate, done.previous_baudrate
                ),
            );
            Ok(())
        }
        Commands::SetupArm { port, role } => setup_arm(cfg, &arm, port.as_deref(), *role, json),
        Commands::CheckMotor { port } => {
            let mut c = controller(cfg, &arm)?;
            let port = setup_port(&c, cfg, port.as_deref())?;
            match c.check_motor_id(&port)? {
                MotorCheck::Single { id, baudrate } => emit(
                    json,
                    &json!({ "event": "motor", "id": id, "baudrate": baudrate }),
                    &format!("Motor id {id} at {baudrate} baud"),
                ),
                MotorCheck::Multiple(found) => emit(
                    json,
                    &json!({ "event": "motors", "found": found }),
                    &format!("Several motors answered (id, baud): {found:?}; connect only one"),
                ),
            }
            Ok(())
        }
        Commands::ResetMotor {
            port,
            current,
            new,
            baudrate,
        } => {
            let mut c = controller(cfg, &arm)?;
            let port = setup_port(&c, cfg, port.as_deref())?;
            let done = c.reset_motor_id(&port, *current, *new, *baudrate)?;
            emit(
                json,
                &json!({ "event": "motor_reset", "previous_id": done.previous_id, "id": done.id }),
                &format!("Motor {} is now id {}", done.previous_id, done.id),
            );
            Ok(())
        }
    }
}

fn sim_chain(chain: SimChain) -> SimulatedArm {
    match chain {
        SimChain::Arm => SimulatedArm::six_axis(),
        SimChain::Single => {
            let arm = SimulatedArm::new();
            arm.add_servo(1, soarm_traits::DEFAULT_BAUDRATE);
            arm
        }
        SimChain::Empty => SimulatedArm::new(),
    }
}

fn controller(cfg: &Config, arm: &SimulatedArm) -> Result<RobotController> {
    RobotController::builder()
        .with_config(cfg)
        .with_opener(arm.opener())
        .with_ports(SystemPorts)
        .build()
}

fn connected(cfg: &Config, arm: &SimulatedArm, port: Option<&str>) -> Result<RobotController> {
    let mut c = controller(cfg, arm)?;
    let port = c.connect(port)?;
    tracing::info!(port, "connected");
    Ok(c)
}

/// Explicit port, then the configured one, then a PID match.
fn setup_port(c: &RobotController, cfg: &Config, port: Option<&str>) -> Result<String> {
    if let Some(p) = port.or(cfg.robot.port.as_deref()) {
        return Ok(p.to_owned());
    }
    Ok(c.discovery().discover()?)
}

fn emit(json: bool, value: &Value, text: &str) {
    if json {
        println!("{value}");
    } else {
        println!("{text}");
    }
}

fn print_state(state: &RobotState, json: bool) {
    if json {
        let joints: Vec<Value> = (0..JOINT_COUNT)
            .map(|i| {
                json!({
                    "name": JOINT_NAMES[i],
                    "position": state.positions[i],
                    "min": state.limits[i].min,
                    "max": state.limits[i].max,
                })
            })
            .collect();
        println!(
            "{}",
            json!({ "event": "state", "connected": state.connected, "joints": joints })
        );
        return;
    }
    for i in 0..JOINT_COUNT {
        println!(
            "{:<14} {:>8.2}  [{:.1}, {:.1}]",
            JOINT_NAMES[i], state.positions[i], state.limits[i].min, state.limits[i].max
        );
    }
}

fn print_report(report: &StepReport, json: bool) {
    let status = match report.status {
        StepStatus::Success => "success",
        StepStatus::InProgress => "in_progress",
        StepStatus::Error => "error",
    };
    emit(
        json,
        &json!({ "event": "calibration_step", "status": status, "message": report.message }),
        &report.message,
    );
}

fn list_ports(all: bool, json: bool) -> Result<()> {
    let discovery = PortDiscovery::new(Box::new(SystemPorts));
    let ports = if all {
        discovery.ports()?
    } else {
        discovery.candidate_ports()?
    };
    for p in ports {
        let arm = discovery::find_by_pid(std::slice::from_ref(&p)).is_some();
        let usb = p.usb.map(|u| format!("{:04x}:{:04x}", u.vid, u.pid));
        emit(
            json,
            &json!({ "event": "port", "name": p.name, "usb": usb, "product": p.product, "arm": arm }),
            &format!(
                "{}{}{}",
                p.name,
                usb.as_deref().map(|u| format!("  {u}")).unwrap_or_default(),
                if arm { "  (arm controller)" } else { "" }
            ),
        );
    }
    Ok(())
}

fn find_port(unplug: bool, json: bool) -> Result<()> {
    let discovery = PortDiscovery::new(Box::new(SystemPorts));
    let port = if unplug {
        let before = discovery.snapshot()?;
        eprintln!("Ports: {before:?}");
        eprintln!("Unplug the arm's USB cable and press Enter");
        let mut line = String::new();
        std::io::stdin()
            .read_line(&mut line)
            .wrap_err("read confirmation from stdin")?;
        // the device node can linger briefly after the cable is pulled
        let gone = soarm_hardware::util::wait_until(
            || discovery.snapshot().is_ok_and(|now| now.len() < before.len()),
            Duration::from_secs(3),
            Duration::from_millis(100),
        );
        if gone.is_err() {
            tracing::warn!("port list unchanged after 3 s");
        }
        discovery.find_by_disconnect(&before)?
    } else {
        discovery.discover()?
    };
    emit(
        json,
        &json!({ "event": "port_found", "port": port }),
        &format!("Arm port: {port}"),
    );
    Ok(())
}

fn move_joint(
    cfg: &Config,
    arm: &SimulatedArm,
    port: Option<&str>,
    joint: usize,
    degrees: f64,
    json: bool,
) -> Result<()> {
    let mut c = connected(cfg, arm, port)?;
    soarm_core::limits::check(joint, degrees, c.adapter().limits())?;
    if !c.adapter_mut().move_joint_absolute(joint, degrees) {
        eyre::bail!("goal write for joint {joint} failed");
    }
    print_state(&c.state(), json);
    Ok(())
}

fn voltage(cfg: &Config, arm: &SimulatedArm, port: Option<&str>, json: bool) -> Result<()> {
    let mut c = connected(cfg, arm, port)?;
    let volts = c.adapter_mut().read_supply_voltage();
    let class = c.adapter_mut().detect_voltage();
    emit(
        json,
        &json!({ "event": "voltage", "volts": volts, "class": class.to_string() }),
        &match volts {
            Some(v) => format!("Supply {v:.1} V ({class})"),
            None => format!("Supply unreadable, assuming {class}"),
        },
    );
    Ok(())
}

fn calibrate_demo(c: &mut RobotController, arm: &SimulatedArm, json: bool) -> Result<()> {
    for _ in 0..2 {
        let report = c.calibrate_step();
        print_report(&report, json);
        if report.status == StepStatus::Error {
            eyre::bail!("calibration failed: {}", report.message);
        }
    }
    for (joint, id) in (1..=6u8).enumerate() {
        for ticks in [
            CENTER_TICKS - DEMO_SWEEP_TICKS,
            CENTER_TICKS + DEMO_SWEEP_TICKS,
            CENTER_TICKS,
        ] {
            arm.set_position(id, ticks);
            c.update_realtime_positions();
        }
        if !c.calibration_mut().auto_record_current_joint() {
            eyre::bail!("no range tracked for {}", JOINT_NAMES[joint]);
        }
    }
    loop {
        let report = c.calibrate_step();
        print_report(&report, json);
        match report.status {
            StepStatus::Success => return Ok(()),
            StepStatus::Error => eyre::bail!("calibration failed: {}", report.message),
            StepStatus::InProgress => {}
        }
    }
}

const CALIBRATE_HELP: &str = "Enter: next step | min | max | auto | skip | show | reset | q";

fn calibrate_interactive(c: &mut RobotController, json: bool) -> Result<()> {
    eprintln!("{CALIBRATE_HELP}");
    let mut finished = false;
    prompt_loop(|line| {
        match line {
            "" | "next" => {
                let report = c.calibrate_step();
                print_report(&report, json);
                if report.status == StepStatus::Success {
                    finished = true;
                    return Ok(false);
                }
            }
            "min" => refused_unless(c.record_joint_min(), "min"),
            "max" => refused_unless(c.record_joint_max(), "max"),
            "auto" => refused_unless(c.calibration_mut().auto_record_current_joint(), "auto"),
            "skip" => refused_unless(c.calibration_mut().next_joint(), "skip"),
            "show" => {
                let snap = c.update_realtime_positions();
                emit(
                    json,
                    &json!({
                        "event": "realtime",
                        "joint": snap.current_joint_index,
                        "positions": snap.positions,
                        "min": snap.min_positions,
                        "max": snap.max_positions,
                    }),
                    &format!(
                        "joint {}: positions {:.1?} min {:.1?} max {:.1?}",
                        snap.current_joint_index,
                        snap.positions,
                        snap.min_positions,
                        snap.max_positions
                    ),
                );
            }
            "reset" => c.calibration_mut().reset_wizard(),
            "q" | "quit" => return Ok(false),
            _ => eprintln!("{CALIBRATE_HELP}"),
        }
        Ok(true)
    })?;
    if !finished {
        tracing::warn!("calibration left unfinished; nothing saved");
    }
    Ok(())
}

fn refused_unless(ok: bool, what: &str) {
    if !ok {
        tracing::warn!(command = what, "not available at this wizard step");
    }
}

fn two_pose(
    cfg: &Config,
    arm: &SimulatedArm,
    port: Option<&str>,
    out: &Path,
    json: bool,
) -> Result<()> {
    let mut c = connected(cfg, arm, port)?;
    c.adapter_mut().disable_torque();
    let mut cal = TwoPoseCalibration::new();
    let mut poses = 0;
    eprintln!("Move the arm to the home pose and press Enter");
    prompt_loop(|_| {
        if cal.home_captured() {
            poses = 2;
            return Ok(false);
        }
        cal.capture_home_from(c.adapter_mut())?;
        poses = 1;
        eprintln!("Move the arm to the reference pose and press Enter");
        Ok(true)
    })?;
    if poses < 2 {
        eyre::bail!("two-pose calibration interrupted");
    }
    let legacy = cal.finish_from(c.adapter_mut())?;
    let text = legacy
        .to_json_pretty()
        .map_err(soarm_core::CalibrationError::from)?;
    soarm_config::atomic::write_atomic(out, text.as_bytes())
        .wrap_err_with(|| format!("write {}", out.display()))?;
    emit(
        json,
        &json!({ "event": "tick_profile_saved", "path": out }),
        &format!("Tick profile written to {}", out.display()),
    );
    Ok(())
}

fn import_legacy(cfg: &Config, arm: &SimulatedArm, file: &Path, json: bool) -> Result<()> {
    let text =
        std::fs::read_to_string(file).wrap_err_with(|| format!("read {}", file.display()))?;
    let legacy =
        LegacyTickProfile::from_json(&text).map_err(soarm_core::CalibrationError::from)?;
    let mut c = controller(cfg, arm)?;
    c.calibration_mut().import_legacy(&legacy);
    let path = c.calibration().save_profile()?;
    emit(
        json,
        &json!({ "event": "profile_saved", "path": path }),
        &format!("Imported profile saved to {}", path.display()),
    );
    Ok(())
}

fn describe(ev: &ControlEvent) -> (Value, String) {
    match ev {
        ControlEvent::ModeChanged(mode) => (
            json!({ "event": "mode", "mode": format!("{mode:?}") }),
            format!("mode: {mode:?}"),
        ),
        ControlEvent::Estop { active } => (
            json!({ "event": "estop", "active": active }),
            format!("emergency stop {}", if *active { "ON" } else { "off" }),
        ),
        ControlEvent::SpeedChanged(m) => (
            json!({ "event": "speed", "multiplier": m }),
            format!("speed x{m:.1}"),
        ),
        ControlEvent::JointMove {
            joint,
            delta,
            success,
        } => (
            json!({ "event": "joint_move", "joint": joint, "delta": delta, "success": success }),
            format!(
                "{} {delta:+.1}{}",
                JOINT_NAMES.get(*joint).copied().unwrap_or("?"),
                if *success { "" } else { " (blocked)" }
            ),
        ),
        ControlEvent::CartesianMove {
            axis,
            delta,
            success,
        } => (
            json!({ "event": "cartesian_move", "axis": axis, "delta": delta, "success": success }),
            format!("axis {axis} {delta:?} success={success}"),
        ),
        ControlEvent::Gripper { open, success } => (
            json!({ "event": "gripper", "open": open, "success": success }),
            format!(
                "gripper {}{}",
                if *open { "open" } else { "closed" },
                if *success { "" } else { " (blocked)" }
            ),
        ),
        ControlEvent::Ignored { reason } => (
            json!({ "event": "ignored", "reason": reason }),
            format!("ignored: {reason}"),
        ),
    }
}

const TELEOP_HELP: &str = "joints: i/k j/l u/o 7/9 8/0 y/h | cartesian: w/s a/d q/e r/f t/g z/x | \
m mode | space e-stop | +/- speed | c gripper | quit";

fn teleop(cfg: &Config, arm: &SimulatedArm, port: Option<String>, json: bool) -> Result<()> {
    let c = controller(cfg, arm)?;
    let mut worker = ControllerWorker::spawn(c, PollingCfg::from(&cfg.polling));
    let port = worker.call(move |c| c.connect(port.as_deref()))??;
    tracing::info!(port, "connected");
    worker.call(RobotController::start_control)??;
    eprintln!("{TELEOP_HELP}");

    prompt_loop(|line| {
        if matches!(line, "quit" | "exit") {
            return Ok(false);
        }
        if line.is_empty() {
            return Ok(true);
        }
        let key = line.to_owned();
        let ev = worker.call(move |c| {
            let ev = c.handle_key(&key, KeyEventKind::Down);
            c.handle_key(&key, KeyEventKind::Up);
            ev
        })?;
        if let Some(ev) = ev {
            let (value, text) = describe(&ev);
            emit(json, &value, &text);
        }
        Ok(true)
    })?;

    if let Some(state) = worker.latest_state() {
        print_state(&state, json);
    }
    worker.call(RobotController::stop_control)?;
    worker.shutdown();
    Ok(())
}

fn setup_arm(
    cfg: &Config,
    arm: &SimulatedArm,
    port: Option<&str>,
    role: crate::cli::Role,
    json: bool,
) -> Result<()> {
    let mut c = controller(cfg, arm)?;
    c.begin_setup(role.into());
    if let Some(p) = port.or(cfg.robot.port.as_deref()) {
        c.set_setup_port(p);
    }
    let Some(port) = c.setup().session().port.clone() else {
        eyre::bail!("no arm port found; pass --port");
    };
    let baudrate = cfg.robot.baudrate;

    let prompt = |c: &RobotController| {
        if let Some(slot) = c.setup().session().current_motor() {
            eprintln!(
                "Connect only the {} servo (id {}) and press Enter",
                slot.name, slot.id
            );
        }
    };
    prompt(&c);
    let mut failure = None;
    prompt_loop(|line| {
        if matches!(line, "q" | "quit") {
            return Ok(false);
        }
        let Some(slot) = c.setup().session().current_motor().cloned() else {
            return Ok(false);
        };
        match c.configure_motor(&port, slot.id, baudrate) {
            Ok(done) => emit(
                json,
                &json!({ "event": "motor_configured", "name": slot.name, "id": done.id }),
                &format!("{} configured as id {}", slot.name, done.id),
            ),
            Err(e) => {
                failure = Some(e);
                return Ok(false);
            }
        }
        if c.setup().session().status == SetupStatus::Completed {
            return Ok(false);
        }
        prompt(&c);
        Ok(true)
    })?;
    if let Some(e) = failure {
        return Err(e.into());
    }
    if c.setup().session().status == SetupStatus::Completed {
        emit(
            json,
            &json!({ "event": "setup_completed", "role": soarm_core::RobotRole::from(role).as_str() }),
            "All motors configured",
        );
    }
    Ok(())
}

/// Feed trimmed stdin lines to `f` until EOF, Ctrl-C, or `f` returns false.
fn prompt_loop(mut f: impl FnMut(&str) -> Result<bool>) -> Result<()> {
    let stop = interrupt_flag()?;
    let lines = stdin_lines();
    while !stop.load(Ordering::SeqCst) {
        match lines.recv_timeout(Duration::from_millis(100)) {
            Ok(line) => {
                if !f(line.trim())? {
                    return Ok(());
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return Ok(()),
        }
    }
    tracing::info!("interrupted");
    Ok(())
}

fn interrupt_flag() -> Result<Arc<AtomicBool>> {
    static FLAG: std::sync::OnceLock<Arc<AtomicBool>> = std::sync::OnceLock::new();
    if let Some(flag) = FLAG.get() {
        return Ok(Arc::clone(flag));
    }
    let flag = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&flag);
    ctrlc::set_handler(move || handler_flag.store(true, Ordering::SeqCst))
        .wrap_err("install Ctrl-C handler")?;
    Ok(Arc::clone(FLAG.get_or_init(|| flag)))
}

/// Lines from stdin on a reader thread; the channel closes at EOF.
fn stdin_lines() -> Receiver<String> {
    let (tx, rx) = crossbeam_channel::unbounded();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}
