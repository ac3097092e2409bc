use std::{
    env,
    sync::{Arc, Mutex},
    time::Duration,
};

use genesys_psu::{
    broadcast::Broadcast,
    command::CommandChannel,
    session::DeviceSession,
    transport::{Address, Transport},
    types::State,
};
use inquire::Select;
use serialport::SerialPort;

// Configuration constants - adjust these for your setup
const BAUD_RATE: u32 = 19200;
// Normal commands are answered well within this, fast queries shorten it themselves.
const SERIAL_TIMEOUT_MS: u64 = 500;
const SUPPLY_ADDRESS: u8 = 6;
const UNDER_VOLTAGE_LIMIT: f64 = 4.5;
const OUTPUT_VOLTAGE: f64 = 5.0;
const OVER_VOLTAGE_PROTECTION: f64 = 5.5;
const CURRENT_LIMIT: f64 = 0.1;
const STABILIZATION_DELAY_MS: u64 = 1000;

pub struct PortWrapper {
    port: Box<dyn SerialPort>,
    name: String,
}

#[derive(Debug)]
pub struct IoError(std::io::Error);

impl From<serialport::Error> for IoError {
    fn from(value: serialport::Error) -> Self {
        IoError(value.into())
    }
}

impl core::fmt::Display for IoError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for IoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

impl embedded_io::Error for IoError {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self.0.kind() {
            std::io::ErrorKind::NotFound => embedded_io::ErrorKind::NotFound,
            std::io::ErrorKind::PermissionDenied => embedded_io::ErrorKind::PermissionDenied,
            std::io::ErrorKind::BrokenPipe => embedded_io::ErrorKind::BrokenPipe,
            std::io::ErrorKind::InvalidInput => embedded_io::ErrorKind::InvalidInput,
            std::io::ErrorKind::InvalidData => embedded_io::ErrorKind::InvalidData,
            std::io::ErrorKind::TimedOut => embedded_io::ErrorKind::TimedOut,
            std::io::ErrorKind::Interrupted => embedded_io::ErrorKind::Interrupted,
            std::io::ErrorKind::Unsupported => embedded_io::ErrorKind::Unsupported,
            std::io::ErrorKind::OutOfMemory => embedded_io::ErrorKind::OutOfMemory,
            _ => embedded_io::ErrorKind::Other,
        }
    }
}

impl embedded_io::ErrorType for PortWrapper {
    type Error = IoError;
}

impl embedded_io::Read for PortWrapper {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        std::io::Read::read(&mut self.port, buf).map_err(IoError)
    }
}

impl embedded_io::Write for PortWrapper {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        std::io::Write::write(&mut self.port, buf).map_err(IoError)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        std::io::Write::flush(&mut self.port).map_err(IoError)
    }
}

impl Transport for PortWrapper {
    fn port_name(&self) -> &str {
        &self.name
    }

    fn baud_rate(&self) -> u32 {
        self.port.baud_rate().unwrap_or_default()
    }

    fn timeout(&self) -> Duration {
        self.port.timeout()
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), Self::Error> {
        self.port.set_timeout(timeout).map_err(IoError::from)
    }
}

fn main() {
    // Get serial port from command line arg or interactive selection
    let port_name = env::args().nth(1).unwrap_or_else(|| {
        // List available serial ports
        let ports = serialport::available_ports().expect("Failed to enumerate serial ports");

        if ports.is_empty() {
            eprintln!("No serial ports found!");
            std::process::exit(1);
        }

        let port_names: Vec<String> = ports.iter().map(|p| p.port_name.clone()).collect();

        // Interactive selection
        Select::new("Select a serial port:", port_names)
            .prompt()
            .expect("Failed to select port")
    });

    println!("Using port: {}", port_name);

    // Open serial port, 8N1 is the serialport default
    let port = serialport::new(&port_name, BAUD_RATE)
        .timeout(Duration::from_millis(SERIAL_TIMEOUT_MS))
        .open()
        .expect("Failed to open serial port");

    let port = PortWrapper {
        port,
        name: port_name,
    };

    // One channel per bus, shared by every supply on it
    let channel: CommandChannel<PortWrapper, 128> =
        CommandChannel::new(port).expect("Unsupported baud rate");
    let channel = Arc::new(Mutex::new(channel));

    let address = Address::try_from(SUPPLY_ADDRESS).expect("Address out of range");
    let psu = DeviceSession::open(channel.clone(), address).unwrap();
    println!("Identity: {}", psu.identity().unwrap());
    println!("Envelope: {:#?}", psu.envelope());

    println!(
        "Responsive: {}, multi-drop: {}",
        psu.is_responsive().unwrap(),
        psu.is_multi_drop_enabled().unwrap()
    );

    // Widen the protection window, set the voltage, then narrow it again
    psu.program_voltage_window(UNDER_VOLTAGE_LIMIT, OUTPUT_VOLTAGE, OVER_VOLTAGE_PROTECTION)
        .unwrap();
    println!(
        "Voltage {}V, UVL {}V, OVP {}V",
        OUTPUT_VOLTAGE, UNDER_VOLTAGE_LIMIT, OVER_VOLTAGE_PROTECTION
    );

    psu.program_current(CURRENT_LIMIT).unwrap();
    println!("Set current limit to {}A", CURRENT_LIMIT);

    // Refused, the live OVP only allows up to OVP / 1.05
    if let Err(e) = psu.program_voltage(OVER_VOLTAGE_PROTECTION) {
        println!("As expected: {}", e);
    }

    psu.set_output(true).unwrap();
    println!("Output enabled");

    // Wait for output to stabilize
    std::thread::sleep(Duration::from_millis(STABILIZATION_DELAY_MS));

    println!("{:#?}", psu.readings().unwrap());
    println!("Mode: {}", psu.operation_mode().unwrap());
    println!("{:#?}", psu.status().unwrap());
    println!("{:#?}", psu.fast_registers().unwrap());
    println!(
        "Powered on for {} hours",
        psu.power_on_time().unwrap().to_minutes() / 60
    );

    // Every supply on the bus at once
    let group = Broadcast::new(channel);
    group.group_set_output(State::Off).unwrap();
    println!("All outputs disabled");
}
