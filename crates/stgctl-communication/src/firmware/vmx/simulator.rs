//! Simulated VMX controller
//!
//! A [`SerialPort`] that interprets the VMX vocabulary against a simple
//! model of three motors bounded by limit switches. Programs that index or
//! pause complete "later": their `^` is held back until input has been
//! flushed and drained, the way a moving stage answers a real controller.
//! A [`SimulatorHandle`] shares the state so callers can inspect writes and
//! script faults while the port itself is owned by a driver.

use super::command::{Command, Operation, StatusQuery, PROGRAM_COMPLETE};
use crate::communication::SerialPort;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::io;
use std::sync::Arc;
use stgctl_core::{Axis, Size};

/// Physical limits and start point of the simulated stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatorConfig {
    /// Steps between the negative and positive limit switches of X and Y
    pub travel: Size,
    /// Steps between the limit switches of motor 3
    pub z_travel: i64,
    /// Physical start position measured from the negative limits
    pub start: Size,
    /// Verify answers busy this many times before answering ready
    pub busy_verifies: usize,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            travel: Size::new(11954, 11979),
            z_travel: 0,
            start: Size::new(5977, 5989),
            busy_verifies: 0,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Motor {
    /// Steps from the negative limit switch
    position: i64,
    /// Physical position reported as zero
    origin: i64,
    travel: i64,
    recorded: VecDeque<i64>,
}

impl Motor {
    fn reported(&self) -> i64 {
        self.position - self.origin
    }

    fn move_to(&mut self, physical: i64) {
        self.position = physical.clamp(0, self.travel);
    }
}

#[derive(Debug, Default)]
struct SimState {
    motors: [Motor; 3],
    program: Vec<Command>,
    input: VecDeque<u8>,
    pending_completions: usize,
    programs_run: usize,
    hung_programs: HashSet<usize>,
    writes: Vec<String>,
    rejected: Vec<String>,
    verifies: usize,
    busy_verifies: usize,
    online: bool,
    echo: bool,
    closed: bool,
}

impl SimState {
    fn motor(&mut self, axis: Axis) -> &mut Motor {
        &mut self.motors[(axis.motor() - 1) as usize]
    }

    fn reply(&mut self, text: &str) {
        self.input.extend(text.bytes());
    }

    fn handle_payload(&mut self, payload: &str) {
        self.writes.push(payload.to_string());
        for token in payload.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            match Command::from_token(token) {
                Some(command) => self.handle(command),
                None => {
                    tracing::debug!("Simulator rejected token '{}'", token);
                    self.rejected.push(token.to_string());
                }
            }
        }
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Operation(op) => self.operate(op),
            Command::Status(query) => self.answer(query),
            motion => self.program.push(motion),
        }
    }

    fn operate(&mut self, op: Operation) {
        match op {
            Operation::Run => self.run_program(),
            Operation::Clear => self.program.clear(),
            Operation::Origin => {
                for motor in self.motors.iter_mut() {
                    motor.origin = motor.position;
                }
            }
            Operation::Kill | Operation::Decelerate => self.pending_completions = 0,
            Operation::EchoOff | Operation::EchoOn => {
                self.online = true;
                self.echo = op == Operation::EchoOn;
            }
            Operation::Reset => {
                self.program.clear();
                self.pending_completions = 0;
                self.online = false;
            }
            Operation::Jog => self.online = false,
            Operation::RecordPosition => {
                for motor in self.motors.iter_mut() {
                    let reported = motor.reported();
                    motor.recorded.push_back(reported);
                }
            }
        }
    }

    fn answer(&mut self, query: StatusQuery) {
        match query {
            StatusQuery::Verify => {
                self.verifies += 1;
                if self.online && self.verifies > self.busy_verifies {
                    self.reply("R");
                } else {
                    self.reply("B");
                }
            }
            StatusQuery::PositionX | StatusQuery::PositionY | StatusQuery::PositionZ => {
                let axis = match query {
                    StatusQuery::PositionX => Axis::X,
                    StatusQuery::PositionY => Axis::Y,
                    _ => Axis::Z,
                };
                let reported = self.motor(axis).reported();
                self.reply(&format!("{:+}\r", reported));
            }
            StatusQuery::RecordedX | StatusQuery::RecordedY => {
                let axis = if query == StatusQuery::RecordedX {
                    Axis::X
                } else {
                    Axis::Y
                };
                let motor = self.motor(axis);
                let value = motor.recorded.pop_front().unwrap_or_else(|| motor.reported());
                self.reply(&format!("{:+}\r", value));
            }
            StatusQuery::ListProgram => {
                let listing = self
                    .program
                    .iter()
                    .map(Command::render)
                    .collect::<Vec<_>>()
                    .join(",");
                self.reply(&format!("{}\r", listing));
            }
        }
    }

    fn run_program(&mut self) {
        let index = self.programs_run;
        self.programs_run += 1;
        let program = self.program.clone();
        let takes_time = program.iter().any(Command::takes_time);

        for command in program {
            match command {
                Command::IndexRelative { axis, steps } => {
                    let motor = self.motor(axis);
                    let target = motor.position + steps;
                    motor.move_to(target);
                }
                Command::IndexAbsolute { axis, position } => {
                    let motor = self.motor(axis);
                    let target = motor.origin + position;
                    motor.move_to(target);
                }
                Command::IndexToZero { axis } => {
                    let motor = self.motor(axis);
                    let target = motor.origin;
                    motor.move_to(target);
                }
                Command::SetZero { axis } => {
                    let motor = self.motor(axis);
                    motor.origin = motor.position;
                }
                Command::IndexToLimit { axis, positive } => {
                    let motor = self.motor(axis);
                    motor.position = if positive { motor.travel } else { 0 };
                }
                _ => {}
            }
        }

        if self.hung_programs.contains(&index) {
            tracing::debug!("Simulator holding program {} forever", index);
        } else if takes_time {
            self.pending_completions += 1;
        } else {
            self.input.push_back(PROGRAM_COMPLETE);
        }
    }
}

/// Simulated VMX controller port
#[derive(Debug)]
pub struct SimulatedPort {
    name: String,
    state: Arc<Mutex<SimState>>,
}

impl SimulatedPort {
    /// Create a simulated controller and a handle to inspect it
    pub fn new(config: SimulatorConfig) -> (Self, SimulatorHandle) {
        let mut state = SimState {
            busy_verifies: config.busy_verifies,
            ..SimState::default()
        };
        let travel = [config.travel.x, config.travel.y, config.z_travel];
        let start = [config.start.x, config.start.y, 0];
        for (i, motor) in state.motors.iter_mut().enumerate() {
            motor.travel = travel[i].max(0);
            motor.position = start[i].clamp(0, motor.travel);
        }
        let state = Arc::new(Mutex::new(state));
        (
            Self {
                name: "simulated-vmx".to_string(),
                state: state.clone(),
            },
            SimulatorHandle { state },
        )
    }

    /// Another handle onto this port's state
    pub fn handle(&self) -> SimulatorHandle {
        SimulatorHandle {
            state: self.state.clone(),
        }
    }
}

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "simulated port is closed")
}

impl SerialPort for SimulatedPort {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(closed_error());
        }
        let payload = String::from_utf8_lossy(data).to_string();
        state.handle_payload(&payload);
        Ok(data.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(closed_error());
        }
        if state.input.is_empty() && state.pending_completions > 0 {
            state.pending_completions -= 1;
            state.input.push_back(PROGRAM_COMPLETE);
        }
        let mut n = 0;
        while n < buf.len() {
            match state.input.pop_front() {
                Some(byte) => {
                    buf[n] = byte;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }

    fn clear_input(&mut self) -> io::Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(closed_error());
        }
        state.input.clear();
        Ok(())
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn close(&mut self) -> io::Result<()> {
        self.state.lock().closed = true;
        Ok(())
    }
}

/// Shared view of a [`SimulatedPort`]
#[derive(Debug, Clone)]
pub struct SimulatorHandle {
    state: Arc<Mutex<SimState>>,
}

impl SimulatorHandle {
    /// Every payload written so far, in order
    pub fn writes(&self) -> Vec<String> {
        self.state.lock().writes.clone()
    }

    /// Forget recorded writes
    pub fn clear_writes(&self) {
        self.state.lock().writes.clear();
    }

    /// Tokens the simulated controller did not understand
    pub fn rejected(&self) -> Vec<String> {
        self.state.lock().rejected.clone()
    }

    /// Never complete the `index`th program run (counting from zero)
    pub fn hang_program(&self, index: usize) {
        self.state.lock().hung_programs.insert(index);
    }

    /// Number of programs run so far
    pub fn programs_run(&self) -> usize {
        self.state.lock().programs_run
    }

    /// Position an axis currently reports
    pub fn position(&self, axis: Axis) -> i64 {
        self.state.lock().motor(axis).reported()
    }

    /// Steps from the negative limit switch
    pub fn physical_position(&self, axis: Axis) -> i64 {
        self.state.lock().motor(axis).position
    }

    /// Queue raw bytes as if the controller had sent them
    pub fn inject_input(&self, bytes: &[u8]) {
        self.state.lock().input.extend(bytes.iter().copied());
    }

    /// Whether on-line mode is enabled
    pub fn is_online(&self) -> bool {
        self.state.lock().online
    }

    /// Whether echo is enabled
    pub fn echo_enabled(&self) -> bool {
        self.state.lock().echo
    }

    /// Whether the port was closed
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_all(port: &mut SimulatedPort) -> String {
        let mut buf = [0u8; 128];
        let n = port.read(&mut buf).unwrap();
        String::from_utf8_lossy(&buf[..n]).to_string()
    }

    #[test]
    fn test_verify_requires_online_mode() {
        let (mut port, _handle) = SimulatedPort::new(SimulatorConfig::default());
        port.write(b"V").unwrap();
        assert_eq!(read_all(&mut port), "B");
        port.write(b"F").unwrap();
        port.write(b"V").unwrap();
        assert_eq!(read_all(&mut port), "R");
    }

    #[test]
    fn test_motion_completion_survives_flush() {
        let (mut port, handle) = SimulatedPort::new(SimulatorConfig::default());
        port.write(b"C,I1M0,R").unwrap();
        port.clear_input().unwrap();
        assert_eq!(read_all(&mut port), "^");
        assert_eq!(read_all(&mut port), "");
        assert_eq!(handle.physical_position(Axis::X), 11954);
    }

    #[test]
    fn test_origin_resets_reported_positions() {
        let (mut port, handle) = SimulatedPort::new(SimulatorConfig::default());
        port.write(b"C,I1M-0,I2M-0,R").unwrap();
        port.write(b"C,N").unwrap();
        assert_eq!(handle.position(Axis::X), 0);
        port.write(b"C,IA1M100,IA2M-50,R").unwrap();
        assert_eq!(handle.position(Axis::X), 100);
        assert_eq!(handle.position(Axis::Y), 0);
    }

    #[test]
    fn test_hung_program_never_completes() {
        let (mut port, handle) = SimulatedPort::new(SimulatorConfig::default());
        handle.hang_program(0);
        port.write(b"C,I1M0,R").unwrap();
        assert_eq!(read_all(&mut port), "");
        assert_eq!(handle.programs_run(), 1);
    }

    #[test]
    fn test_unknown_tokens_are_recorded() {
        let (mut port, handle) = SimulatedPort::new(SimulatorConfig::default());
        port.write(b"C,bogus").unwrap();
        assert_eq!(handle.rejected(), vec!["bogus".to_string()]);
    }
}
