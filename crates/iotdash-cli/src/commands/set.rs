//! Set command implementation.

use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Result, anyhow, bail};

use iotdash_core::{Connector, SyncStore};
use iotdash_types::{ConnectionConfig, Device};

use crate::format::{FormatOptions, format_number};
use crate::util::{LogPrinter, close_session, open_session};

/// Value argument of the set command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SetValue {
    /// Write this number.
    Number(f64),
    /// Flip a switch.
    Toggle,
}

impl FromStr for SetValue {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "on" | "true" => Ok(SetValue::Number(1.0)),
            "off" | "false" => Ok(SetValue::Number(0.0)),
            "toggle" => Ok(SetValue::Toggle),
            other => {
                let value: f64 = other
                    .parse()
                    .map_err(|_| anyhow!("'{}' is not a number, on, off, or toggle", s))?;
                if !value.is_finite() {
                    bail!("'{}' is not a finite number", s);
                }
                Ok(SetValue::Number(value))
            }
        }
    }
}

/// Check `value` against the kind of `device` before anything is written.
///
/// Switches take 0 or 1, dimmers stay within `0..=upper_limit`, and sensors
/// are not written from the command line.
fn check_value(key: &str, device: &Device, value: SetValue) -> Result<SetValue> {
    match (device, value) {
        (Device::Sensor { .. }, _) => {
            bail!("'{}' is a sensor; sensor readings cannot be set", key)
        }
        (Device::Switch { .. }, SetValue::Toggle) => Ok(value),
        (_, SetValue::Toggle) => bail!("'{}' is a {}, only switches toggle", key, device.kind()),
        (Device::Switch { .. }, SetValue::Number(n)) if n == 0.0 || n == 1.0 => Ok(value),
        (Device::Switch { .. }, SetValue::Number(n)) => bail!(
            "'{}' is a switch; expected on, off, 0 or 1, got {}",
            key,
            format_number(n)
        ),
        (Device::Dimmer { .. }, SetValue::Number(n)) => {
            let limit = device.upper_limit();
            if (0.0..=limit).contains(&n) {
                Ok(value)
            } else {
                bail!(
                    "{} is out of range for '{}' (0 to {})",
                    format_number(n),
                    key,
                    format_number(limit)
                )
            }
        }
    }
}

pub async fn cmd_set<C: Connector>(
    store: &Arc<SyncStore<C>>,
    config: ConnectionConfig,
    key: &str,
    value: SetValue,
    opts: FormatOptions,
) -> Result<()> {
    let mut printer = LogPrinter::new(opts);
    open_session(store, config, &mut printer).await?;

    let Some(device) = store.device(key) else {
        close_session(store, &mut printer, false).await?;
        bail!("No device '{}'. Create it first with `iotdash create`.", key);
    };
    let value = match check_value(key, &device, value) {
        Ok(value) => value,
        Err(e) => {
            close_session(store, &mut printer, false).await?;
            return Err(e);
        }
    };

    match value {
        SetValue::Number(value) => store.update_device_value(key, value).await,
        SetValue::Toggle => store.toggle_switch(key).await,
    }

    let failed = printer.flush(store);
    close_session(store, &mut printer, failed).await
}
