//! `info` and `list-ports` commands.

use super::connect;
use crate::{Cli, config::Config};
use anyhow::{Context, Result};
use console::style;
use stkflash::{DetectedPort, DeviceInfo, Transport, auto_detect_port, detect_ports};

/// Info command implementation.
pub(crate) fn cmd_info(cli: &Cli, config: &mut Config, json: bool) -> Result<()> {
    let mut programmer = connect(cli, config, None)?;
    programmer.reset_target();
    let info = programmer
        .read_device_info()
        .context("failed to read device info")?;
    let port = programmer.port().name().to_string();

    if json {
        println!("{}", serde_json::to_string_pretty(&info_json(&port, &info))?);
        return Ok(());
    }

    let (major, minor) = info.firmware_version();
    eprintln!("{}", style("Device Information").bold().underlined());
    eprintln!("  {:<18} {}", style("Port:").dim(), port);
    eprintln!("  {:<18} {}", style("Part:").dim(), style(info.part_name()).cyan());
    eprintln!("  {:<18} {}", style("Signature:").dim(), info.signature_hex());
    eprintln!("  {:<18} {}", style("Hardware version:").dim(), info.hardware_version());
    eprintln!("  {:<18} {major}.{minor}", style("Bootloader:").dim());
    if let Some(part) = info.part() {
        eprintln!("  {:<18} {} KiB", style("Flash:").dim(), part.flash_size() / 1024);
    }
    Ok(())
}

fn info_json(port: &str, info: &DeviceInfo) -> serde_json::Value {
    let (major, minor) = info.firmware_version();
    serde_json::json!({
        "ok": true,
        "data": {
            "port": port,
            "part": info.part().map(|p| p.to_string()),
            "signature": info.signature_hex(),
            "hardware_version": info.hardware_version(),
            "firmware_version": format!("{major}.{minor}"),
            "flash_size": info.part().map(|p| p.flash_size()),
            "parameters": info.parameters,
        }
    })
}

fn ports_json(ports: &[DetectedPort]) -> serde_json::Value {
    let ports: Vec<serde_json::Value> = ports
        .iter()
        .map(|p| {
            serde_json::json!({
                "name": p.name,
                "device": p.device.name(),
                "known": p.device.is_known(),
                "vid": p.vid,
                "pid": p.pid,
                "manufacturer": p.manufacturer,
                "product": p.product,
                "serial": p.serial,
            })
        })
        .collect();
    serde_json::json!({
        "ok": true,
        "data": {
            "ports": ports,
        }
    })
}

/// List ports command implementation.
pub(crate) fn cmd_list_ports(json: bool) -> Result<()> {
    let detected = detect_ports();

    if json {
        println!("{}", serde_json::to_string_pretty(&ports_json(&detected))?);
        return Ok(());
    }

    eprintln!("{}", style("Available serial ports").bold().underlined());

    if detected.is_empty() {
        eprintln!("  {}", style("No serial ports found").dim());
        return Ok(());
    }

    for port in &detected {
        let device = if port.device.is_known() {
            format!(" [{}]", style(port.device.name()).yellow())
        } else {
            String::new()
        };
        let vid_pid = match (port.vid, port.pid) {
            (Some(vid), Some(pid)) => format!(" ({vid:04X}:{pid:04X})"),
            _ => String::new(),
        };
        let product = port
            .product
            .as_deref()
            .map(|p| format!(" - {}", style(p).dim()))
            .unwrap_or_default();

        eprintln!(
            "  {} {}{device}{vid_pid}{product}",
            style("•").green(),
            style(&port.name).cyan()
        );
    }

    if let Ok(auto_port) = auto_detect_port() {
        eprintln!(
            "\n{} Auto-detected: {}",
            style("→").green().bold(),
            style(&auto_port.name).cyan().bold()
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use stkflash::DeviceKind;

    #[test]
    fn test_info_json_shape() {
        let info = DeviceInfo {
            parameters: [0x02, 0x04, 0x04, 0x03, 0, 0, 0, 0, 0, 0],
            signature: [0x1E, 0x95, 0x0F],
        };
        let value = info_json("/dev/ttyACM0", &info);

        assert_eq!(value["ok"], true);
        let data = &value["data"];
        assert_eq!(data["port"], "/dev/ttyACM0");
        assert_eq!(data["part"], "ATmega328P");
        assert_eq!(data["signature"], "1E 95 0F");
        assert_eq!(data["hardware_version"], 2);
        assert_eq!(data["firmware_version"], "4.4");
        assert_eq!(data["flash_size"], 32768);
        assert_eq!(data["parameters"].as_array().unwrap().len(), 10);
    }

    #[test]
    fn test_info_json_unknown_part() {
        let info = DeviceInfo {
            parameters: [0; 10],
            signature: [0xFF, 0xFF, 0xFF],
        };
        let value = info_json("COM3", &info);
        assert!(value["data"]["part"].is_null());
        assert!(value["data"]["flash_size"].is_null());
    }

    #[test]
    fn test_ports_json_shape() {
        let mut arduino = DetectedPort::plain("/dev/ttyACM0");
        arduino.device = DeviceKind::Arduino;
        arduino.vid = Some(0x2341);
        arduino.pid = Some(0x0043);
        let value = ports_json(&[arduino, DetectedPort::plain("/dev/ttyS0")]);

        let ports = value["data"]["ports"].as_array().unwrap();
        assert_eq!(ports.len(), 2);
        assert_eq!(ports[0]["device"], "Arduino");
        assert_eq!(ports[0]["known"], true);
        assert_eq!(ports[0]["vid"], 0x2341);
        assert_eq!(ports[1]["known"], false);
        assert!(ports[1]["vid"].is_null());
    }
}
