use serde::{Deserialize, Deserializer};
use tracing::debug;

use crate::api::Api;
use crate::normalize::normalize;
use crate::types::{Field, Mode};
use crate::{Error, Result};

/// Setpoints move in whole degrees.
pub const SETPOINT_STEP: f64 = 1.0;

/// Device details as returned by the system-details endpoint. Only the
/// hardware inventory is modelled.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SystemDetails {
    #[serde(default, deserialize_with = "presence")]
    pub heater_in_system: bool,
    #[serde(default)]
    pub heater: Option<UnitDetails>,
    #[serde(rename = "AOCFixedInSystem", default, deserialize_with = "presence")]
    pub aoc_fixed_in_system: bool,
    #[serde(rename = "AOCFixed", default)]
    pub aoc_fixed: Option<UnitDetails>,
    #[serde(rename = "AOCInverterInSystem", default, deserialize_with = "presence")]
    pub aoc_inverter_in_system: bool,
    #[serde(rename = "AOCInverter", default)]
    pub aoc_inverter: Option<UnitDetails>,
    #[serde(rename = "NoOfEVAPInSystem", default, deserialize_with = "count")]
    pub evap_count: u32,
    #[serde(rename = "EVAPCooler", default)]
    pub evap_cooler: Option<UnitDetails>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UnitDetails {
    pub minimum_temperature: f64,
    pub maximum_temperature: f64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Loose {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Loose {
    fn as_f64(&self) -> f64 {
        match self {
            Loose::Bool(b) => f64::from(u8::from(*b)),
            Loose::Number(n) => *n,
            Loose::Text(s) => match s.trim() {
                "true" | "True" => 1.0,
                other => other.parse().unwrap_or(0.0),
            },
        }
    }
}

// Firmware revisions disagree on whether presence is `true` or `1`.
fn presence<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<bool, D::Error> {
    Ok(Option::<Loose>::deserialize(d)?.is_some_and(|v| v.as_f64() != 0.0))
}

fn count<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<u32, D::Error> {
    Ok(Option::<Loose>::deserialize(d)?
        .map(|v| v.as_f64().max(0.0) as u32)
        .unwrap_or(0))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemperatureRange {
    pub min: f64,
    pub max: f64,
}

impl TemperatureRange {
    pub fn normalize(&self, celsius: f64) -> f64 {
        normalize(celsius, self.min, self.max, SETPOINT_STEP)
    }
}

impl From<UnitDetails> for TemperatureRange {
    fn from(unit: UnitDetails) -> Self {
        Self {
            min: unit.minimum_temperature,
            max: unit.maximum_temperature,
        }
    }
}

/// The kind of cooling hardware fitted. Each reports its running state under
/// its own field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoolingVariant {
    /// Fixed-speed add-on cooler.
    FixedAoc,
    /// Inverter-driven add-on cooler.
    InverterAoc,
    Evaporative,
}

impl CoolingVariant {
    pub fn running_field(&self) -> Field {
        match self {
            CoolingVariant::FixedAoc => Field::FixedAocRunning,
            CoolingVariant::InverterAoc => Field::InverterAocRunning,
            CoolingVariant::Evaporative => Field::EvapCoolerRunning,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeatingCapability {
    pub range: TemperatureRange,
}

impl HeatingCapability {
    pub fn running_field(&self) -> Field {
        Field::HeaterRunning
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoolingCapability {
    pub variant: CoolingVariant,
    pub range: TemperatureRange,
}

/// Which modes a device can run in. A missing mode is `None`; there is no
/// zero-range placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Capabilities {
    pub heating: Option<HeatingCapability>,
    pub cooling: Option<CoolingCapability>,
}

impl Capabilities {
    /// Cooling precedence: fixed AOC, then inverter AOC, then evaporative.
    pub fn from_details(details: &SystemDetails) -> Result<Self> {
        let heating = if details.heater_in_system {
            Some(HeatingCapability {
                range: unit_range("Heater", details.heater)?,
            })
        } else {
            None
        };

        let cooling = if details.aoc_fixed_in_system {
            Some((CoolingVariant::FixedAoc, unit_range("AOCFixed", details.aoc_fixed)?))
        } else if details.aoc_inverter_in_system {
            Some((
                CoolingVariant::InverterAoc,
                unit_range("AOCInverter", details.aoc_inverter)?,
            ))
        } else if details.evap_count > 0 {
            Some((
                CoolingVariant::Evaporative,
                unit_range("EVAPCooler", details.evap_cooler)?,
            ))
        } else {
            None
        }
        .map(|(variant, range)| CoolingCapability { variant, range });

        Ok(Self { heating, cooling })
    }

    pub fn supports(&self, mode: Mode) -> bool {
        self.range(mode).is_some()
    }

    pub fn range(&self, mode: Mode) -> Option<TemperatureRange> {
        match mode {
            Mode::Heat => self.heating.map(|h| h.range),
            Mode::Cool => self.cooling.map(|c| c.range),
        }
    }

    pub fn running_field(&self, mode: Mode) -> Option<Field> {
        match mode {
            Mode::Heat => self.heating.map(|h| h.running_field()),
            Mode::Cool => self.cooling.map(|c| c.variant.running_field()),
        }
    }

    pub fn supported_modes(&self) -> Vec<Mode> {
        [Mode::Heat, Mode::Cool]
            .into_iter()
            .filter(|m| self.supports(*m))
            .collect()
    }
}

fn unit_range(name: &str, unit: Option<UnitDetails>) -> Result<TemperatureRange> {
    unit.map(TemperatureRange::from).ok_or_else(|| {
        Error::Decode(<serde_json::Error as serde::de::Error>::custom(format!(
            "{name} is flagged as installed but has no temperature range"
        )))
    })
}

/// Fetch the device's hardware inventory and derive its capabilities.
pub(crate) async fn detect(api: &Api, device_id: &str) -> Result<Capabilities> {
    let details = api.system_details(device_id).await?;
    debug!(device_id, ?details, "system details");
    let caps = Capabilities::from_details(&details)?;
    debug!(device_id, ?caps, "supported modes");
    Ok(caps)
}
