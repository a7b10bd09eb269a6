//! Serial port selection.
//!
//! Resolution order: explicit `--port`, the configured port, then
//! auto-detection. Known USB bridges (built-in list plus remembered
//! devices) are preferred; with several candidates the user picks one
//! interactively unless running non-interactively.

use {
    crate::{CliError, config::Config},
    anyhow::Result,
    console::style,
    dialoguer::{Confirm, Error as DialoguerError, Select, theme::ColorfulTheme},
    log::{debug, error, info},
    std::io::IsTerminal,
    stkflash::{DetectedPort, detect_ports},
};

/// Options for serial port selection.
#[derive(Debug, Clone, Default)]
pub struct SerialOptions {
    /// Explicit port specified via CLI.
    pub port: Option<String>,
    /// Offer every port, not only recognised boards.
    pub list_all_ports: bool,
    /// Fail instead of prompting.
    pub non_interactive: bool,
    /// Ask for confirmation even for a single recognised port.
    pub confirm_port: bool,
}

/// Outcome of port selection.
pub struct SelectedPort {
    /// The selected port.
    pub port: DetectedPort,
    /// Whether it matched a built-in or remembered device.
    pub is_known: bool,
}

impl SelectedPort {
    fn new(port: DetectedPort, config: &Config) -> Self {
        let is_known = is_known_device(&port, config);
        Self { port, is_known }
    }
}

fn usage_err(message: impl Into<String>) -> anyhow::Error {
    CliError::Usage(message.into()).into()
}

fn cancelled() -> anyhow::Error {
    CliError::Cancelled("port selection cancelled".to_string()).into()
}

/// Select a serial port interactively or automatically.
pub fn select_serial_port(options: &SerialOptions, config: &Config) -> Result<SelectedPort> {
    if let Some(name) = &options.port {
        return Ok(find_port_by_name(name, config));
    }

    if let Some(name) = &config.port.connection.serial {
        debug!("Using port from config: {name}");
        return Ok(find_port_by_name(name, config));
    }

    let ports = detect_ports();
    if ports.is_empty() {
        return Err(usage_err("no serial ports found; connect a board or pass --port"));
    }

    let mut candidates = candidates(ports, config, options.list_all_ports);

    if options.non_interactive {
        return select_non_interactive_port(candidates, config);
    }

    match candidates.len() {
        0 => Err(usage_err("no serial ports available")),
        1 => {
            let selected = SelectedPort::new(candidates.remove(0), config);
            if selected.is_known && !options.confirm_port {
                info!(
                    "Auto-selected port: {} [{}]",
                    selected.port.name,
                    selected.port.device.name()
                );
                Ok(selected)
            } else {
                ensure_interactive_terminal()?;
                confirm_single_port(selected)
            }
        },
        _ => {
            ensure_interactive_terminal()?;
            select_port_interactive(candidates, config)
        },
    }
}

/// Narrow detected ports to recognised boards unless none are, or the
/// caller asked for everything. Recognised boards sort first.
fn candidates(ports: Vec<DetectedPort>, config: &Config, list_all: bool) -> Vec<DetectedPort> {
    let any_known = ports.iter().any(|p| is_known_device(p, config));
    let mut selection: Vec<DetectedPort> = if list_all || !any_known {
        ports
    } else {
        ports
            .into_iter()
            .filter(|p| is_known_device(p, config))
            .collect()
    };
    selection.sort_by_key(|p| !is_known_device(p, config));
    selection
}

/// Without prompts only a single candidate is acceptable.
fn select_non_interactive_port(
    mut candidates: Vec<DetectedPort>,
    config: &Config,
) -> Result<SelectedPort> {
    match candidates.len() {
        1 => Ok(SelectedPort::new(candidates.remove(0), config)),
        0 => Err(usage_err("no serial ports available")),
        n => Err(usage_err(format!(
            "found multiple ({n}) serial ports; pass --port in non-interactive mode"
        ))),
    }
}

fn ensure_interactive_terminal() -> Result<()> {
    if std::io::stdin().is_terminal() && std::io::stderr().is_terminal() {
        Ok(())
    } else {
        Err(usage_err(
            "port selection needs an interactive terminal; pass --port",
        ))
    }
}

fn map_prompt_error(err: DialoguerError) -> anyhow::Error {
    match err {
        DialoguerError::IO(io_err) if io_err.kind() == std::io::ErrorKind::Interrupted => {
            cancelled()
        },
        DialoguerError::IO(io_err) => usage_err(format!("prompt failed: {io_err}")),
    }
}

/// Look a port up by name, keeping its USB metadata when it is present.
fn find_port_by_name(name: &str, config: &Config) -> SelectedPort {
    let ports = detect_ports();
    let found = ports
        .iter()
        .find(|p| p.name == name)
        .or_else(|| ports.iter().find(|p| p.name.eq_ignore_ascii_case(name)));

    match found {
        Some(port) => SelectedPort::new(port.clone(), config),
        // Not enumerated (e.g. a pty or a port hidden by the OS): trust the user.
        None => SelectedPort {
            port: DetectedPort::plain(name),
            is_known: false,
        },
    }
}

/// Check if a port matches a built-in or remembered device.
fn is_known_device(port: &DetectedPort, config: &Config) -> bool {
    if port.device.is_known() {
        return true;
    }
    match (port.vid, port.pid) {
        (Some(vid), Some(pid)) => config.port.usb_device.iter().any(|d| d.matches(vid, pid)),
        _ => false,
    }
}

fn port_label(port: &DetectedPort, config: &Config) -> String {
    let name = if is_known_device(port, config) {
        style(&port.name).bold().to_string()
    } else {
        port.name.clone()
    };

    let device = if port.device.is_known() {
        format!(" [{}]", style(port.device.name()).yellow())
    } else if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
        format!(" ({vid:04X}:{pid:04X})")
    } else {
        String::new()
    };

    let product = port
        .product
        .as_ref()
        .map(|p| format!(" - {}", style(p).dim()))
        .unwrap_or_default();

    format!("{name}{device}{product}")
}

fn select_port_interactive(ports: Vec<DetectedPort>, config: &Config) -> Result<SelectedPort> {
    eprintln!(
        "{} Detected {} serial ports",
        style("ℹ").blue(),
        ports.len()
    );
    eprintln!("{}", style("Recognised boards are shown in bold").dim());

    // Keep labels on one line in narrow terminals.
    let max_width = usize::from(console::Term::stderr().size().1).saturating_sub(4);
    let labels: Vec<String> = ports
        .iter()
        .map(|p| console::truncate_str(&port_label(p, config), max_width, "\u{2026}").into_owned())
        .collect();

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Select the board's serial port")
        .items(&labels)
        .default(0)
        .interact_opt()
        .map_err(map_prompt_error)?
        .ok_or_else(cancelled)?;

    let port = ports
        .into_iter()
        .nth(selection)
        .ok_or_else(|| anyhow::anyhow!("Invalid port index: {selection}"))?;
    Ok(SelectedPort::new(port, config))
}

fn confirm_single_port(selected: SelectedPort) -> Result<SelectedPort> {
    let product = selected
        .port
        .product
        .as_ref()
        .map(|p| format!(" - {p}"))
        .unwrap_or_default();

    let confirmed = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(format!("Use {}{product}?", selected.port.name))
        .default(true)
        .interact_opt()
        .map_err(map_prompt_error)?
        .unwrap_or(false);

    if confirmed {
        Ok(selected)
    } else {
        Err(cancelled())
    }
}

/// Offer to remember an unrecognised USB adapter for auto-detection.
pub fn ask_remember_port(port: &DetectedPort, config: &mut Config) -> Result<()> {
    let (Some(vid), Some(pid)) = (port.vid, port.pid) else {
        return Ok(());
    };
    if config.port.usb_device.iter().any(|d| d.matches(vid, pid)) {
        return Ok(());
    }
    if ensure_interactive_terminal().is_err() {
        return Ok(());
    }

    let confirmed = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(format!(
            "Remember USB device {vid:04X}:{pid:04X} for auto-detection?"
        ))
        .default(false)
        .interact_opt()
        .map_err(map_prompt_error)?
        .unwrap_or(false);

    if confirmed {
        if let Err(e) = config.remember_usb_device(vid, pid) {
            error!("Failed to save port configuration: {e}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::config::UsbDevice,
        console::measure_text_width,
        stkflash::DeviceKind,
    };

    fn usb(name: &str, device: DeviceKind, vid: u16, pid: u16) -> DetectedPort {
        DetectedPort {
            device,
            vid: Some(vid),
            pid: Some(pid),
            ..DetectedPort::plain(name)
        }
    }

    fn assert_usage(result: Result<SelectedPort>) {
        let err = result.err().expect("expected error");
        assert!(matches!(
            err.downcast_ref::<CliError>(),
            Some(CliError::Usage(_))
        ));
    }

    #[test]
    fn test_is_known_device_builtin() {
        let port = usb("/dev/ttyUSB0", DeviceKind::Ch340, 0x1A86, 0x7523);
        assert!(is_known_device(&port, &Config::default()));
    }

    #[test]
    fn test_is_known_device_unknown() {
        let port = usb("/dev/ttyUSB0", DeviceKind::Unknown, 0x9999, 0x9999);
        assert!(!is_known_device(&port, &Config::default()));
        assert!(!is_known_device(&DetectedPort::plain("/dev/ttyS0"), &Config::default()));
    }

    #[test]
    fn test_is_known_device_remembered() {
        let port = usb("/dev/ttyUSB0", DeviceKind::Unknown, 0xABCD, 0x1234);
        let mut config = Config::default();
        config.port.usb_device.push(UsbDevice {
            vid: 0xABCD,
            pid: 0x1234,
        });
        assert!(is_known_device(&port, &config));
    }

    #[test]
    fn test_candidates_prefer_known_boards() {
        let ports = vec![
            DetectedPort::plain("/dev/ttyS0"),
            usb("/dev/ttyACM0", DeviceKind::Arduino, 0x2341, 0x0043),
        ];
        let picked = candidates(ports.clone(), &Config::default(), false);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].name, "/dev/ttyACM0");

        let all = candidates(ports, &Config::default(), true);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].name, "/dev/ttyACM0");
    }

    #[test]
    fn test_candidates_fall_back_to_all_ports() {
        let ports = vec![
            DetectedPort::plain("/dev/ttyS0"),
            DetectedPort::plain("/dev/ttyS1"),
        ];
        assert_eq!(candidates(ports, &Config::default(), false).len(), 2);
    }

    #[test]
    fn test_select_non_interactive_multiple_ports_returns_usage_error() {
        let ports = vec![
            DetectedPort::plain("/dev/ttyUSB0"),
            DetectedPort::plain("/dev/ttyUSB1"),
        ];
        assert_usage(select_non_interactive_port(ports, &Config::default()));
    }

    #[test]
    fn test_select_non_interactive_no_ports_returns_usage_error() {
        assert_usage(select_non_interactive_port(vec![], &Config::default()));
    }

    #[test]
    fn test_select_non_interactive_single_port() {
        let ports = vec![usb("/dev/ttyACM0", DeviceKind::Arduino, 0x2341, 0x0043)];
        let selected = select_non_interactive_port(ports, &Config::default()).unwrap();
        assert_eq!(selected.port.name, "/dev/ttyACM0");
        assert!(selected.is_known);
    }

    #[test]
    fn test_port_label_contents() {
        console::set_colors_enabled(false);
        let mut port = usb("/dev/ttyUSB0", DeviceKind::Ftdi, 0x0403, 0x6001);
        port.product = Some("FT232R".to_string());
        assert_eq!(
            port_label(&port, &Config::default()),
            "/dev/ttyUSB0 [FTDI] - FT232R"
        );

        let unknown = usb("/dev/ttyUSB1", DeviceKind::Unknown, 0x1234, 0x5678);
        assert_eq!(
            port_label(&unknown, &Config::default()),
            "/dev/ttyUSB1 (1234:5678)"
        );
    }

    #[test]
    fn test_truncated_label_fits_width() {
        let mut port = usb("/dev/verylongttyusb0", DeviceKind::Ch340, 0x1A86, 0x7523);
        port.product = Some("Very Long Product Name That Would Wrap".to_string());
        let label = port_label(&port, &Config::default());
        let truncated = console::truncate_str(&label, 26, "\u{2026}");
        assert!(measure_text_width(&truncated) <= 26);
        assert!(console::strip_ansi_codes(&truncated).starts_with("/dev/verylong"));
    }

    #[test]
    fn test_explicit_port_not_enumerated_is_kept() {
        let selected = find_port_by_name("/dev/pts/99-stkflash-test", &Config::default());
        assert_eq!(selected.port.name, "/dev/pts/99-stkflash-test");
        assert!(!selected.is_known);
    }
}
