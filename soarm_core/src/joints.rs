//! Joint indexing shared by every component.

pub const JOINT_COUNT: usize = soarm_config::JOINTS;

pub const JOINT_NAMES: [&str; JOINT_COUNT] = [
    "shoulder_pan",
    "shoulder_lift",
    "elbow_flex",
    "wrist_flex",
    "wrist_roll",
    "gripper",
];

pub const GRIPPER: usize = 5;

/// Bus id of the servo driving joint `index` (index + 1).
pub fn servo_id(index: usize) -> Option<u8> {
    if index < JOINT_COUNT {
        u8::try_from(index + 1).ok()
    } else {
        None
    }
}

pub fn joint_name(index: usize) -> &'static str {
    JOINT_NAMES.get(index).copied().unwrap_or("unknown")
}

/// Ids of all six servos in joint order.
pub const SERVO_IDS: [u8; JOINT_COUNT] = [1, 2, 3, 4, 5, 6];
