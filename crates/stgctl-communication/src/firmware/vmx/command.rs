//! VMX Command Vocabulary
//!
//! Every instruction the driver can put on the wire, described by a static
//! table of command specs (name, template, family, arity). Commands are built
//! as typed values and rendered to their ASCII token only when appended to a
//! program, so nothing unrecognized can reach the controller. Raw tokens
//! typed by a user go through [`Command::parse`], which accepts only the
//! templates in [`COMMAND_TABLE`].

use std::fmt;
use stgctl_core::{Axis, ControllerError, Error, Result};

/// Byte the controller emits when a program finishes
pub const PROGRAM_COMPLETE: u8 = b'^';

/// Reply to a verify request when the controller is ready
pub const READY_CODE: &[u8] = b"R";

/// Command family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandFamily {
    /// Indexing, speed and pause instructions stored in a program
    Motion,
    /// Controller operations (run, clear, reset, ...)
    Operation,
    /// Status requests answered with a reply
    Status,
}

impl fmt::Display for CommandFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Motion => write!(f, "motion"),
            Self::Operation => write!(f, "operation"),
            Self::Status => write!(f, "status"),
        }
    }
}

/// Arguments a command template takes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Fixed token
    None,
    /// Motor number only
    Motor,
    /// Motor number and a value
    MotorValue,
    /// A value only
    Value,
}

/// Static description of one command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSpec {
    /// Stable command name
    pub name: &'static str,
    /// Wire template; `{m}` is the motor number, `{x}` the value
    pub template: &'static str,
    /// Family the command belongs to
    pub family: CommandFamily,
    /// Arguments the template takes
    pub arity: Arity,
    /// Whether the controller only honors the command outside a program
    pub immediate_only: bool,
}

const fn spec(
    name: &'static str,
    template: &'static str,
    family: CommandFamily,
    arity: Arity,
    immediate_only: bool,
) -> CommandSpec {
    CommandSpec {
        name,
        template,
        family,
        arity,
        immediate_only,
    }
}

use Arity::{Motor, MotorValue, Value};
use CommandFamily::{Motion, Operation as Op, Status};

const INDEX_RELATIVE: CommandSpec = spec("index_relative", "I{m}M{x}", Motion, MotorValue, false);
const INDEX_ABSOLUTE: CommandSpec = spec("index_absolute", "IA{m}M{x}", Motion, MotorValue, false);
const INDEX_TO_ZERO: CommandSpec = spec("index_to_zero", "IA{m}M0", Motion, Motor, false);
const SET_ZERO: CommandSpec = spec("set_zero", "IA{m}M-0", Motion, Motor, false);
const INDEX_POSITIVE_LIMIT: CommandSpec =
    spec("index_positive_limit", "I{m}M0", Motion, Motor, false);
const INDEX_NEGATIVE_LIMIT: CommandSpec =
    spec("index_negative_limit", "I{m}M-0", Motion, Motor, false);
const SET_SPEED: CommandSpec = spec("set_speed", "S{m}M{x}", Motion, MotorValue, false);
const PAUSE: CommandSpec = spec("pause", "P{x}", Motion, Value, false);
const RUN: CommandSpec = spec("run", "R", Op, Arity::None, false);
const CLEAR: CommandSpec = spec("clear", "C", Op, Arity::None, false);
const ORIGIN: CommandSpec = spec("origin", "N", Op, Arity::None, false);
const KILL: CommandSpec = spec("kill", "K", Op, Arity::None, true);
const DECELERATE: CommandSpec = spec("decelerate", "D", Op, Arity::None, true);
const ECHO_OFF: CommandSpec = spec("echo_off", "E", Op, Arity::None, true);
const ECHO_ON: CommandSpec = spec("echo_on", "F", Op, Arity::None, true);
const RESET: CommandSpec = spec("reset", "res", Op, Arity::None, true);
const JOG: CommandSpec = spec("jog", "J", Op, Arity::None, true);
const RECORD_POSITION: CommandSpec = spec("record_position", "!", Op, Arity::None, true);
const VERIFY: CommandSpec = spec("verify", "V", Status, Arity::None, true);
const POSITION_X: CommandSpec = spec("position_x", "X", Status, Arity::None, true);
const POSITION_Y: CommandSpec = spec("position_y", "Y", Status, Arity::None, true);
const POSITION_Z: CommandSpec = spec("position_z", "M", Status, Arity::None, true);
const RECORDED_X: CommandSpec = spec("recorded_x", "x", Status, Arity::None, true);
const RECORDED_Y: CommandSpec = spec("recorded_y", "y", Status, Arity::None, true);
const LIST_PROGRAM: CommandSpec = spec("list_program", "lst", Status, Arity::None, true);

/// The complete VMX vocabulary understood by this driver
pub const COMMAND_TABLE: &[CommandSpec] = &[
    INDEX_RELATIVE,
    INDEX_ABSOLUTE,
    INDEX_TO_ZERO,
    SET_ZERO,
    INDEX_POSITIVE_LIMIT,
    INDEX_NEGATIVE_LIMIT,
    SET_SPEED,
    PAUSE,
    RUN,
    CLEAR,
    ORIGIN,
    KILL,
    DECELERATE,
    ECHO_OFF,
    ECHO_ON,
    RESET,
    JOG,
    RECORD_POSITION,
    VERIFY,
    POSITION_X,
    POSITION_Y,
    POSITION_Z,
    RECORDED_X,
    RECORDED_Y,
    LIST_PROGRAM,
];

/// Look up a command spec by name
pub fn lookup(name: &str) -> Option<&'static CommandSpec> {
    COMMAND_TABLE.iter().find(|s| s.name == name)
}

/// All specs of one family, in table order
pub fn vocabulary(family: CommandFamily) -> impl Iterator<Item = &'static CommandSpec> {
    COMMAND_TABLE.iter().filter(move |s| s.family == family)
}

/// Controller operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Run the stored program
    Run,
    /// Clear the stored program (does not stop a running one)
    Clear,
    /// Set the current position of all motors as the origin
    Origin,
    /// Stop immediately
    Kill,
    /// Decelerate to a stop
    Decelerate,
    /// On-line mode, echo off
    EchoOff,
    /// On-line mode, echo on
    EchoOn,
    /// Reset the controller
    Reset,
    /// Jog mode
    Jog,
    /// Record the current positions in the FIFO (only while indexing)
    RecordPosition,
}

impl Operation {
    /// All operations in table order
    pub const ALL: [Operation; 10] = [
        Operation::Run,
        Operation::Clear,
        Operation::Origin,
        Operation::Kill,
        Operation::Decelerate,
        Operation::EchoOff,
        Operation::EchoOn,
        Operation::Reset,
        Operation::Jog,
        Operation::RecordPosition,
    ];

    /// Static spec row for this operation
    pub fn spec(&self) -> &'static CommandSpec {
        match self {
            Self::Run => &RUN,
            Self::Clear => &CLEAR,
            Self::Origin => &ORIGIN,
            Self::Kill => &KILL,
            Self::Decelerate => &DECELERATE,
            Self::EchoOff => &ECHO_OFF,
            Self::EchoOn => &ECHO_ON,
            Self::Reset => &RESET,
            Self::Jog => &JOG,
            Self::RecordPosition => &RECORD_POSITION,
        }
    }

    /// Wire token
    pub fn token(&self) -> &'static str {
        self.spec().template
    }

    /// Parse an exact operation token
    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.token() == token)
    }
}

/// Status request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusQuery {
    /// Controller state; `R` means ready
    Verify,
    /// Live position of motor 1
    PositionX,
    /// Live position of motor 2
    PositionY,
    /// Live position of motor 3
    PositionZ,
    /// Recorded position of motor 1
    RecordedX,
    /// Recorded position of motor 2
    RecordedY,
    /// List the stored program
    ListProgram,
}

impl StatusQuery {
    /// All status requests in table order
    pub const ALL: [StatusQuery; 7] = [
        StatusQuery::Verify,
        StatusQuery::PositionX,
        StatusQuery::PositionY,
        StatusQuery::PositionZ,
        StatusQuery::RecordedX,
        StatusQuery::RecordedY,
        StatusQuery::ListProgram,
    ];

    /// Position request for an axis; recorded positions exist only for X and Y
    pub fn position(axis: Axis, recorded: bool) -> Option<Self> {
        match (axis, recorded) {
            (Axis::X, false) => Some(Self::PositionX),
            (Axis::Y, false) => Some(Self::PositionY),
            (Axis::Z, false) => Some(Self::PositionZ),
            (Axis::X, true) => Some(Self::RecordedX),
            (Axis::Y, true) => Some(Self::RecordedY),
            (Axis::Z, true) => None,
        }
    }

    /// Static spec row for this request
    pub fn spec(&self) -> &'static CommandSpec {
        match self {
            Self::Verify => &VERIFY,
            Self::PositionX => &POSITION_X,
            Self::PositionY => &POSITION_Y,
            Self::PositionZ => &POSITION_Z,
            Self::RecordedX => &RECORDED_X,
            Self::RecordedY => &RECORDED_Y,
            Self::ListProgram => &LIST_PROGRAM,
        }
    }

    /// Wire token
    pub fn token(&self) -> &'static str {
        self.spec().template
    }

    /// Parse an exact status token
    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|q| q.token() == token)
    }
}

/// A single VMX instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Index a motor by a signed, non-zero step count
    IndexRelative {
        /// Motor
        axis: Axis,
        /// Steps; zero is reserved for the limit commands on the wire
        steps: i64,
    },
    /// Index a motor to an absolute position
    IndexAbsolute {
        /// Motor
        axis: Axis,
        /// Target position relative to the origin
        position: i64,
    },
    /// Index a motor back to its zero
    IndexToZero {
        /// Motor
        axis: Axis,
    },
    /// Make the current motor position its zero
    SetZero {
        /// Motor
        axis: Axis,
    },
    /// Index a motor until it hits a limit switch
    IndexToLimit {
        /// Motor
        axis: Axis,
        /// Positive or negative limit
        positive: bool,
    },
    /// Set motor speed in steps per second
    SetSpeed {
        /// Motor
        axis: Axis,
        /// Steps per second
        speed: u32,
    },
    /// Pause the program
    Pause {
        /// Tenths of a second
        tenths: u32,
    },
    /// Controller operation
    Operation(Operation),
    /// Status request
    Status(StatusQuery),
}

impl Command {
    /// Static spec row for this command
    pub fn spec(&self) -> &'static CommandSpec {
        match self {
            Self::IndexRelative { .. } => &INDEX_RELATIVE,
            Self::IndexAbsolute { .. } => &INDEX_ABSOLUTE,
            Self::IndexToZero { .. } => &INDEX_TO_ZERO,
            Self::SetZero { .. } => &SET_ZERO,
            Self::IndexToLimit { positive: true, .. } => &INDEX_POSITIVE_LIMIT,
            Self::IndexToLimit { positive: false, .. } => &INDEX_NEGATIVE_LIMIT,
            Self::SetSpeed { .. } => &SET_SPEED,
            Self::Pause { .. } => &PAUSE,
            Self::Operation(op) => op.spec(),
            Self::Status(query) => query.spec(),
        }
    }

    /// Command family
    pub fn family(&self) -> CommandFamily {
        self.spec().family
    }

    /// Whether the command may only be sent on its own, outside a program
    pub fn is_immediate_only(&self) -> bool {
        self.spec().immediate_only
    }

    /// Whether a program containing this command takes time to complete
    pub fn takes_time(&self) -> bool {
        matches!(
            self,
            Self::IndexRelative { .. }
                | Self::IndexAbsolute { .. }
                | Self::IndexToZero { .. }
                | Self::IndexToLimit { .. }
                | Self::Pause { .. }
        )
    }

    /// Render the ASCII token
    pub fn render(&self) -> String {
        match *self {
            Self::IndexRelative { axis, steps } => format!("I{}M{}", axis.motor(), steps),
            Self::IndexAbsolute { axis, position } => {
                format!("IA{}M{}", axis.motor(), position)
            }
            Self::IndexToZero { axis } => format!("IA{}M0", axis.motor()),
            Self::SetZero { axis } => format!("IA{}M-0", axis.motor()),
            Self::IndexToLimit { axis, positive } => {
                format!("I{}M{}", axis.motor(), if positive { "0" } else { "-0" })
            }
            Self::SetSpeed { axis, speed } => format!("S{}M{}", axis.motor(), speed),
            Self::Pause { tenths } => format!("P{}", tenths),
            Self::Operation(op) => op.token().to_string(),
            Self::Status(query) => query.token().to_string(),
        }
    }

    /// Parse a raw token against one family's vocabulary
    pub fn parse(family: CommandFamily, token: &str) -> Result<Self> {
        let parsed = match family {
            CommandFamily::Motion => parse_motion(token),
            CommandFamily::Operation => Operation::from_token(token).map(Self::Operation),
            CommandFamily::Status => StatusQuery::from_token(token).map(Self::Status),
        };
        parsed.ok_or_else(|| {
            Error::from(ControllerError::UnsupportedCommand {
                token: token.to_string(),
                family: family.to_string(),
            })
        })
    }

    /// Parse a raw token from any family
    pub fn from_token(token: &str) -> Option<Self> {
        [
            CommandFamily::Operation,
            CommandFamily::Status,
            CommandFamily::Motion,
        ]
        .into_iter()
        .find_map(|family| Self::parse(family, token).ok())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl From<Operation> for Command {
    fn from(op: Operation) -> Self {
        Self::Operation(op)
    }
}

impl From<StatusQuery> for Command {
    fn from(query: StatusQuery) -> Self {
        Self::Status(query)
    }
}

fn parse_axis(motor: &str) -> Option<Axis> {
    motor.parse::<u8>().ok().and_then(Axis::from_motor)
}

fn parse_motion(token: &str) -> Option<Command> {
    if let Some(rest) = token.strip_prefix("IA") {
        let (motor, value) = rest.split_once('M')?;
        let axis = parse_axis(motor)?;
        return match value {
            "0" => Some(Command::IndexToZero { axis }),
            "-0" => Some(Command::SetZero { axis }),
            _ => value
                .parse()
                .ok()
                .map(|position| Command::IndexAbsolute { axis, position }),
        };
    }
    if let Some(rest) = token.strip_prefix('I') {
        let (motor, value) = rest.split_once('M')?;
        let axis = parse_axis(motor)?;
        return match value {
            "0" => Some(Command::IndexToLimit {
                axis,
                positive: true,
            }),
            "-0" => Some(Command::IndexToLimit {
                axis,
                positive: false,
            }),
            _ => value
                .parse()
                .ok()
                .map(|steps| Command::IndexRelative { axis, steps }),
        };
    }
    if let Some(rest) = token.strip_prefix('S') {
        let (motor, value) = rest.split_once('M')?;
        let axis = parse_axis(motor)?;
        return value
            .parse()
            .ok()
            .map(|speed| Command::SetSpeed { axis, speed });
    }
    if let Some(value) = token.strip_prefix('P') {
        return value.parse().ok().map(|tenths| Command::Pause { tenths });
    }
    None
}

/// How a command is executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// Append to the pending program; nothing is sent
    #[default]
    Queued,
    /// Discard the pending program and send the command on its own now
    Immediate,
}

impl ExecutionMode {
    /// Resolve the mode for a command; immediate-only commands are always immediate
    pub fn resolve(self, command: &Command) -> Self {
        if command.is_immediate_only() {
            Self::Immediate
        } else {
            self
        }
    }
}
