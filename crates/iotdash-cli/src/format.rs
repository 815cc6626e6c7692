//! Output formatting for log entries and the device table.

use owo_colors::OwoColorize;
use time::OffsetDateTime;
use time::macros::format_description;

use iotdash_types::{Device, DeviceTree, LogEntry, Severity};

/// Formatting options for output.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormatOptions {
    /// Disable colored output.
    pub no_color: bool,
    /// Suppress informational log lines.
    pub quiet: bool,
}

impl FormatOptions {
    pub fn new(no_color: bool, quiet: bool) -> Self {
        Self { no_color, quiet }
    }

    /// Whether a log entry should be shown.
    pub fn shows(&self, entry: &LogEntry) -> bool {
        !self.quiet || matches!(entry.severity, Severity::Error | Severity::Warning)
    }
}

/// Format a severity tag with color.
#[must_use]
pub fn format_severity(severity: Severity, no_color: bool) -> String {
    let label = match severity {
        Severity::Info => "INFO",
        Severity::Success => " OK ",
        Severity::Warning => "WARN",
        Severity::Error => "FAIL",
    };

    if no_color {
        format!("[{}]", label)
    } else {
        match severity {
            Severity::Info => format!("[{}]", label.cyan()),
            Severity::Success => format!("[{}]", label.green()),
            Severity::Warning => format!("[{}]", label.yellow()),
            Severity::Error => format!("[{}]", label.red()),
        }
    }
}

/// Format a timestamp as `HH:MM:SS`.
#[must_use]
pub fn format_time(timestamp: OffsetDateTime) -> String {
    timestamp
        .format(format_description!("[hour]:[minute]:[second]"))
        .unwrap_or_default()
}

/// Format one activity log line.
#[must_use]
pub fn format_log_entry(entry: &LogEntry, opts: &FormatOptions) -> String {
    let time = format_time(entry.timestamp);
    let time = if opts.no_color {
        time
    } else {
        time.dimmed().to_string()
    };
    format!(
        "{} {} {}",
        time,
        format_severity(entry.severity, opts.no_color),
        entry.message
    )
}

/// Format a number without a trailing `.0` for whole values.
#[must_use]
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{:.0}", value)
    } else {
        format!("{:.1}", value)
    }
}

/// Format the reading of a single device.
#[must_use]
pub fn format_device_value(device: &Device, no_color: bool) -> String {
    match device {
        Device::Switch { value } => {
            let label = value.to_string();
            match (no_color, value.is_on()) {
                (true, _) => label,
                (false, true) => label.green().bold().to_string(),
                (false, false) => label.dimmed().to_string(),
            }
        }
        Device::Dimmer { .. } | Device::Sensor { .. } => {
            let reading = if device.unit().is_empty() {
                format_number(device.value())
            } else {
                format!("{} {}", format_number(device.value()), device.unit())
            };
            format!(
                "{} ({}% of {})",
                reading,
                device.percentage(),
                format_number(device.upper_limit())
            )
        }
    }
}

/// Format the device table.
#[must_use]
pub fn format_device_table(devices: &DeviceTree, no_color: bool) -> String {
    if devices.is_empty() {
        return "No devices. Run `iotdash guide` to see the expected tree shape.\n".to_string();
    }

    let key_width = devices
        .iter()
        .map(|(key, _)| key.chars().count())
        .max()
        .unwrap_or(0)
        .max("DEVICE".len());

    let mut output = String::new();
    let header = format!("{:<key_width$}  {:<6}  VALUE", "DEVICE", "KIND");
    if no_color {
        output.push_str(&header);
    } else {
        output.push_str(&header.bold().to_string());
    }
    output.push('\n');

    for (key, device) in devices.iter() {
        output.push_str(&format!(
            "{:<key_width$}  {:<6}  {}\n",
            key,
            device.kind().as_str(),
            format_device_value(device, no_color)
        ));
    }

    let (switches, dimmers, sensors) = devices.counts();
    output.push_str(&format!(
        "{} devices: {} switches, {} dimmers, {} sensors\n",
        devices.len(),
        switches,
        dimmers,
        sensors
    ));
    output
}
